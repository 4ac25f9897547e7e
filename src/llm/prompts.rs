//! LLM prompts for judging and answer generation.

/// Collection of prompts used by the evaluator.
pub struct Prompts;

impl Prompts {
    /// System prompt for the judge model.
    pub fn judge_system() -> &'static str {
        "You are an expert evaluator of retrieval-augmented generation (RAG) systems. You score answers strictly against the rubric you are given and always respond with valid JSON."
    }

    /// Scoring prompt. Placeholders: `{question}`, `{chunk_count}`,
    /// `{context}`, `{answer}`.
    pub fn judge_scoring() -> &'static str {
        r#"Evaluate the quality of the answer below using the five criteria, each on an integer scale from 1 (worst) to 5 (best).

QUESTION:
{question}

RETRIEVED CONTEXT ({chunk_count} CHUNKS):
{context}

GENERATED ANSWER:
{answer}

CRITERIA (1-5):
1. factual_consistency: Is the answer grounded in the context? Are there hallucinations?
2. instruction_following: Does the answer address what was asked?
3. domain_knowledge: Does it use the subject area's terminology and concepts correctly?
4. context_precision: Is the retrieved context relevant to the question?
5. context_coverage: Does the retrieved context contain all the information needed to answer?

Respond with exactly this JSON structure and nothing else:
{
  "factual_consistency": {"score": <1-5>, "justification": "..."},
  "instruction_following": {"score": <1-5>, "justification": "..."},
  "domain_knowledge": {"score": <1-5>, "justification": "..."},
  "context_precision": {"score": <1-5>, "justification": "..."},
  "context_coverage": {"score": <1-5>, "justification": "..."},
  "overall_assessment": "one or two sentence summary"
}"#
    }

    /// Augmentation prompt for retrieve-then-generate pipelines.
    /// Placeholders: `{question}`, `{context}`.
    pub fn rag_answer() -> &'static str {
        r#"Answer the question using only the context below. If the context does not contain the answer, say so.

CONTEXT:
{context}

QUESTION:
{question}

ANSWER:"#
    }

    /// Fill `{name}` placeholders in a single pass, so substituted values
    /// that themselves contain braces are left untouched.
    pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let substituted = after.find('}').and_then(|close| {
                let name = &after[..close];
                vars.iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (*value, close))
            });

            match substituted {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::judge_system().is_empty());
        assert!(!Prompts::judge_scoring().is_empty());
        assert!(!Prompts::rag_answer().is_empty());
    }

    #[test]
    fn test_render_fills_known_placeholders() {
        let out = Prompts::render(
            Prompts::rag_answer(),
            &[("question", "What is due process?"), ("context", "Art. 5")],
        );
        assert!(out.contains("What is due process?"));
        assert!(out.contains("Art. 5"));
        assert!(!out.contains("{question}"));
    }

    #[test]
    fn test_render_leaves_json_braces_alone() {
        let out = Prompts::render(Prompts::judge_scoring(), &[("answer", "42")]);
        assert!(out.contains("\"factual_consistency\": {\"score\": <1-5>"));
        assert!(out.contains("42"));
        assert!(out.contains("{question}"));
    }

    #[test]
    fn test_render_does_not_expand_values() {
        let out = Prompts::render("{a} {b}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(out, "{b} x");
    }
}
