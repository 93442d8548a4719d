use chat_relay::cli::{Cli, init_logging};
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    chat_relay::cli::run(cli).await
}
