//! Command-line surface: stream one chat completion to stdout.

use crate::config::Config;
use crate::provider::{ChatRequest, Message, Relay};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Follow the user's instructions carefully. Respond using markdown.";

/// Relay chat completions from an OpenAI-style backend as a text stream
#[derive(Parser, Debug)]
#[command(name = "chat-relay", version, about)]
pub struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream a completion for a prompt to stdout
    Chat(ChatArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Prompt sent as the last user message ("-" reads stdin)
    pub prompt: String,

    /// Model identifier (ignored by deployment-scoped backends)
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// System prompt
    #[arg(short, long, default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system: String,

    /// Sampling temperature
    #[arg(short, long, default_value_t = 1.0)]
    pub temperature: f32,

    /// API key for this request (overrides the configured key)
    #[arg(long)]
    pub api_key: Option<String>,

    /// JSON file with prior messages: [{"role": "user", "content": "..."}]
    #[arg(long)]
    pub messages: Option<PathBuf>,

    /// Upper bound on the whole call in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl ChatArgs {
    /// Assemble the request: prior messages, then the prompt.
    pub fn to_request(&self) -> Result<ChatRequest> {
        let mut messages = match &self.messages {
            Some(path) => read_messages(path)?,
            None => Vec::new(),
        };

        let prompt = if self.prompt == "-" {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read prompt from stdin")?;
            input
        } else {
            self.prompt.clone()
        };
        messages.push(Message::user(prompt));

        Ok(ChatRequest {
            model: self.model.clone(),
            system_prompt: self.system.clone(),
            temperature: self.temperature,
            messages: Arc::new(messages),
            api_key: self.api_key.clone(),
        })
    }
}

fn read_messages(path: &Path) -> Result<Vec<Message>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid messages in {}", path.display()))
}

/// Install a tracing subscriber.
///
/// `CHAT_RELAY_LOG=<file>` writes debug logs to a file. Otherwise `RUST_LOG`
/// enables logging to stderr. Stdout is reserved for the relayed text.
pub fn init_logging() {
    if let Ok(path) = std::env::var("CHAT_RELAY_LOG") {
        use std::fs::File;
        use tracing_subscriber::prelude::*;
        match File::create(&path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false);
                let filter = tracing_subscriber::EnvFilter::new("chat_relay=debug");
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(filter))
                    .try_init();
            }
            Err(err) => {
                eprintln!("Failed to create log file {path}: {err}");
            }
        }
    } else if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    }
}

pub async fn run(cli: Cli) -> ExitCode {
    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Config => {
            println!("{config:#?}");
            ExitCode::SUCCESS
        }
        Commands::Chat(args) => match chat(config, &args).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

async fn chat(config: Config, args: &ChatArgs) -> Result<()> {
    let request = args.to_request()?;

    let mut relay = Relay::new(Arc::new(config));
    if let Some(secs) = args.timeout {
        relay = relay.with_timeout(Duration::from_secs(secs));
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut stream = relay
        .stream_with_cancel(&request, &cancel)
        .await
        .context("Request failed")?;

    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = stream.next().await {
        let bytes = chunk.context("Stream interrupted")?;
        stdout.write_all(&bytes).await?;
        stdout.flush().await?;
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    Ok(())
}
