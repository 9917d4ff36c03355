use anyhow::Context;
use clap::Parser;
use cost_navigator::{app, cli, load, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Load(cmd) => load::run(cmd).await.context("load failed"),
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Search(cmd) => app::search(cmd).context("search failed"),
        cli::Command::Ask(cmd) => app::ask(cmd).await.context("ask failed"),
    }
}
