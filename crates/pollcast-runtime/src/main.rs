//! pollcast: chat message log served over WebSocket push, HTTP short-poll
//! and HTTP long-poll.

use clap::Parser;

mod cli;
mod client;
mod http_server;
mod protocol;
mod serve;
mod ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let command = args
        .command
        .unwrap_or_else(|| cli::Command::Serve(cli::ServeOpts::default()));

    match command {
        cli::Command::Serve(opts) => {
            let filter = std::env::var("POLLCAST_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("pollcast starting");
            serve::run_server(opts).await?;
        }
        cli::Command::Send(opts) => {
            client::cmd_send(&opts.url, &opts.text).await?;
        }
        cli::Command::Tail(opts) => {
            client::cmd_tail(&opts.url, opts.json, opts.new_only).await?;
        }
    }

    Ok(())
}
