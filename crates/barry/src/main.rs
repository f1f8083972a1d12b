//! An interactive client for asking about chocolate products.
//!
//! Usage: `barry [gemini|ollama]`. Everything else comes from environment
//! variables, see `load_config`.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use barry::core::{Orchestrator, TranscriptSource};
use barry::{BackendConfig, ClientConfig, ClientConfigBuilder, SessionBuilder};
use barry_gemini_model::GeminiBackend;
use barry_model::ModelBackend;
use barry_ollama_model::OllamaBackend;
use barry_tool_session::WorkerConfigBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";
const RULE_WIDTH: usize = 60;

type Transcript = (String, TranscriptSource);

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("❌ Error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
    let on_transcript = move |transcript: &str, source| {
        transcript_tx.send((transcript.to_owned(), source)).ok();
    };

    println!("🚀 Starting Barry MCP Client...");
    let result = match config.backend().clone() {
        BackendConfig::Gemini(gemini) => {
            let backend = GeminiBackend::new(gemini);
            SessionBuilder::new(config, backend)
                .on_transcript(on_transcript)
                .run(async |orchestrator| {
                    print_banner("Gemini");
                    repl(orchestrator, transcript_rx).await
                })
                .await
        }
        BackendConfig::Ollama(ollama) => {
            let backend = OllamaBackend::new(ollama);
            if let Err(err) = backend.ensure_model_available().await {
                eprintln!("⚠️  {err}");
                return ExitCode::FAILURE;
            }
            let title = format!("Ollama ({})", config.backend().model());
            SessionBuilder::new(config, backend)
                .on_transcript(on_transcript)
                .run(async |orchestrator| {
                    print_banner(&title);
                    repl(orchestrator, transcript_rx).await
                })
                .await
        }
    };

    match result {
        Ok(()) => {
            println!("✓ Disconnected from Barry MCP Server");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("❌ Error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Builds the client configuration from the command line and the
/// environment.
///
/// - `GEMINI_API_KEY`: required for the Gemini backend.
/// - `OLLAMA_MODEL`, `OLLAMA_BASE_URL`: optional for the Ollama backend.
/// - `BARRY_SERVER_PATH`, `BARRY_SERVER_PYTHON`: the worker sources and
///   the interpreter that runs them.
/// - `BARRY_MAX_TOOL_ROUNDS`: optional cap on tool rounds per message.
fn load_config() -> Result<ClientConfig, String> {
    let backend = match env::args().nth(1).as_deref() {
        None | Some("gemini") => {
            let Ok(api_key) = env::var("GEMINI_API_KEY") else {
                return Err("GEMINI_API_KEY not set".to_owned());
            };
            BackendConfig::gemini(api_key, None)
        }
        Some("ollama") => BackendConfig::ollama(
            env::var("OLLAMA_MODEL").ok(),
            env::var("OLLAMA_BASE_URL").ok(),
        ),
        Some(other) => {
            return Err(format!(
                "Unknown backend `{other}`, expected `gemini` or `ollama`"
            ));
        }
    }
    .map_err(|err| err.to_string())?;

    let (Ok(server_path), Ok(server_python)) =
        (env::var("BARRY_SERVER_PATH"), env::var("BARRY_SERVER_PYTHON"))
    else {
        return Err("BARRY_SERVER_PATH or BARRY_SERVER_PYTHON not set".into());
    };
    let worker = WorkerConfigBuilder::with_source_root(server_path)
        .with_interpreter(server_python)
        .build()
        .map_err(|err| err.to_string())?;

    let mut builder = ClientConfigBuilder::new(worker, backend);
    if let Ok(rounds) = env::var("BARRY_MAX_TOOL_ROUNDS") {
        let rounds = rounds.trim().parse().map_err(|_| {
            format!("BARRY_MAX_TOOL_ROUNDS must be a number, got `{rounds}`")
        })?;
        builder = builder.with_max_tool_rounds(rounds);
    }
    builder.build().map_err(|err| err.to_string())
}

fn print_banner(backend: &str) {
    let rule = "=".repeat(RULE_WIDTH);
    println!("\n{rule}");
    println!("{}", format!("Barry MCP Client with {backend} - Ready!").bold());
    println!("{rule}");
    println!("\nYou can now ask questions about chocolate products.");
    println!("Examples:");
    println!("  - Show me 10 products where fat is greater than 30");
    println!("  - Give me 5 dark chocolate callets");
    println!("  - Find milk chocolate chips");
    println!("\nType 'quit' or 'exit' to stop.\n");
}

async fn repl<B: ModelBackend>(
    orchestrator: &mut Orchestrator<'_, B>,
    mut transcript_rx: mpsc::UnboundedReceiver<Transcript>,
) {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("{} ", "You:".bright_green().bold());
        std::io::stdout().flush().ok();

        let line = select! {
            line = read_line() => line,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(progress_style.clone());
        progress_bar.set_message("🤔 Thinking...");

        let reply = orchestrator.send_message(line);
        let mut reply = std::pin::pin!(reply);
        let result = loop {
            progress_bar.inc(1);
            select! {
                result = &mut reply => break Some(result),
                Some((transcript, source)) = transcript_rx.recv() => {
                    progress_bar.suspend(|| {
                        print_transcript(&transcript, source);
                    });
                }
                _ = sleep(Duration::from_millis(100)) => {}
                _ = signal::ctrl_c() => break None,
            }
        };
        progress_bar.finish_and_clear();

        // Transcripts emitted right before the reply are still queued.
        while let Ok((transcript, source)) = transcript_rx.try_recv() {
            print_transcript(&transcript, source);
        }

        match result {
            Some(Ok(reply)) => {
                println!(
                    "{}🤖 {}\n",
                    BAR_CHAR.bright_cyan(),
                    reply.bright_white()
                );
            }
            Some(Err(err)) => {
                println!("{}❌ Error: {err}\n", BAR_CHAR.bright_red());
            }
            None => break,
        }
    }

    println!("\n👋 Goodbye!");
}

fn print_transcript(transcript: &str, source: TranscriptSource) {
    match source {
        TranscriptSource::ToolCall => {
            println!("{}🔧 {}", BAR_CHAR.bright_yellow(), transcript);
        }
        TranscriptSource::ToolResult => {
            let bar = BAR_CHAR.bright_yellow();
            println!(
                "{bar}✓ Tool result received ({} chars)",
                transcript.chars().count()
            );
        }
        // Streamed deltas, the whole reply is printed once it is done.
        TranscriptSource::Assistant => {}
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
