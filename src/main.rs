//! RAG Judge CLI
//!
//! Compare two RAG pipelines question by question, scored by an LLM judge.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_judge::{
    config::Config,
    evaluation::Orchestrator,
    llm::provider_from_config,
    presenter::{QuestionList, RecordSummary},
    question::QuestionSet,
    report::{Comparison, FileReportSink, ReportSink},
};
use std::io::Write;
use std::path::PathBuf;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing_subscriber::EnvFilter;

/// RAG Judge - side-by-side evaluation of two RAG pipelines
#[derive(Parser)]
#[command(name = "rag-judge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available questions
    List,

    /// Evaluate one question with both pipelines
    Evaluate {
        /// Question id
        id: u32,

        /// Skip judge scoring (fast mode)
        #[arg(long)]
        no_judge: bool,
    },

    /// Interactive menu (Ctrl-C at a prompt exits)
    Interactive,

    /// Test the judge model connection
    TestJudge,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::List => cmd_list(&config),
        Commands::Evaluate { id, no_judge } => cmd_evaluate(&config, id, !no_judge).await,
        Commands::Interactive => cmd_interactive(&config).await,
        Commands::TestJudge => cmd_test_judge(&config).await,
    }
}

fn load_questions(config: &Config) -> Result<QuestionSet> {
    QuestionSet::load(&config.questions_path).with_context(|| {
        format!(
            "Failed to load questions from '{}'",
            config.questions_path.display()
        )
    })
}

fn report_sink(config: &Config) -> FileReportSink {
    FileReportSink::new(&config.output_dir)
        .with_max_context_chunks(config.evaluation.max_context_chunks)
}

fn cmd_list(config: &Config) -> Result<()> {
    let questions = load_questions(config)?;
    print!("{}", QuestionList(&questions));
    Ok(())
}

async fn cmd_evaluate(config: &Config, id: u32, judge: bool) -> Result<()> {
    let questions = load_questions(config)?;
    let orchestrator =
        Orchestrator::from_config(config, questions, judge).context("Invalid configuration")?;

    run_evaluation(&orchestrator, &report_sink(config), config, id, judge).await
}

/// Evaluate, print and export one question.
///
/// Ctrl-C abandons the evaluation before anything is written.
async fn run_evaluation(
    orchestrator: &Orchestrator,
    sink: &FileReportSink,
    config: &Config,
    id: u32,
    judge: bool,
) -> Result<()> {
    let record = tokio::select! {
        record = orchestrator.evaluate(id, judge) => record.context("Evaluation aborted")?,
        _ = ctrl_c() => {
            println!("\nEvaluation abandoned, no report written.");
            return Ok(());
        }
    };

    let comparison = Comparison::from_record(&record, config.evaluation.max_context_chunks);
    println!("{}", RecordSummary::new(&record, comparison.as_ref()));

    let exported = sink.export(record).context("Failed to write report")?;
    println!("Report saved:");
    println!("  JSON:     {}", exported.json.display());
    println!("  Markdown: {}", exported.markdown.display());

    Ok(())
}

fn print_menu(judge_available: bool) {
    println!();
    println!("{}", "=".repeat(60));
    println!("  <id>  Evaluate a question with judge scoring");
    println!("  Q     Quick mode: evaluate without the judge");
    println!("  L     List questions");
    println!("  S     Exit");
    if !judge_available {
        println!("  (judge not configured, only quick mode is available)");
    }
    println!("{}", "=".repeat(60));
}

/// Read one trimmed line. `None` on end of input or when `interrupt`
/// resolves first.
async fn prompt_line<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    prompt: &str,
    interrupt: impl Future<Output = ()>,
) -> Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    tokio::select! {
        line = lines.next_line() => Ok(line?.map(|l| l.trim().to_string())),
        _ = interrupt => {
            println!();
            Ok(None)
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Menu loop. Ctrl-C while waiting for input leaves the loop; during an
/// evaluation it abandons only that evaluation.
async fn cmd_interactive(config: &Config) -> Result<()> {
    let questions = load_questions(config)?;
    let judge_available = config.validate_judge().is_ok();
    let orchestrator = Orchestrator::from_config(config, questions, judge_available)
        .context("Invalid configuration")?;
    let sink = report_sink(config);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print_menu(judge_available);
        let Some(choice) = prompt_line(&mut lines, "Choose an option: ", ctrl_c()).await? else {
            break;
        };

        let (id, judge) = match choice.to_uppercase().as_str() {
            "S" => break,
            "L" => {
                print!("{}", QuestionList(orchestrator.questions()));
                continue;
            }
            "Q" => {
                let Some(raw) = prompt_line(&mut lines, "Question id: ", ctrl_c()).await? else {
                    break;
                };
                (raw, false)
            }
            _ => (choice, true),
        };

        let Ok(id) = id.parse::<u32>() else {
            println!("Invalid option: '{}'", id);
            continue;
        };

        if let Err(e) = run_evaluation(&orchestrator, &sink, config, id, judge).await {
            println!("Error: {:#}", e);
        }
    }

    println!("Bye.");
    Ok(())
}

async fn cmd_test_judge(config: &Config) -> Result<()> {
    println!("Testing judge connection...\n");

    let judge = &config.judge;
    let key_prefix: String = judge.api_key.chars().take(8).collect();

    println!("Configuration:");
    println!("  Provider:  {}", judge.provider);
    println!("  API Base:  {}", judge.resolved_api_base());
    println!("  Model:     {}", judge.model);
    println!("  API Key:   {}...", key_prefix);
    println!();

    if let Err(e) = config.validate_judge() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let provider = provider_from_config(judge).context("Failed to build judge client")?;

    println!("Sending test request...");
    match provider.test_connection().await {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prompt_line_trims_input() {
        let mut lines = BufReader::new(&b"  7 \nS\n"[..]).lines();

        let first = prompt_line(&mut lines, "> ", std::future::pending()).await.unwrap();
        assert_eq!(first.as_deref(), Some("7"));
        let second = prompt_line(&mut lines, "> ", std::future::pending()).await.unwrap();
        assert_eq!(second.as_deref(), Some("S"));
        let end = prompt_line(&mut lines, "> ", std::future::pending()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_interrupt_ends_waiting_prompt() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();

        let line = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            prompt_line(&mut lines, "> ", async {}),
        )
        .await
        .expect("interrupt should end the prompt")
        .unwrap();
        assert!(line.is_none());
    }
}
