use clap::{Parser, Subcommand};

use speechtotext::app;

#[derive(Parser)]
#[command(name = "speechtotext", version, about = "Transcode-then-recognize pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume Tasks and drive the transcode → recognize pipeline.
    Worker,
    /// Accept jobs over HTTP and enqueue them.
    Server,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ── Tracing / structured logging ──────────────────────────────────────────
    // Default level = INFO for this crate, WARN for everything else.
    // Override at runtime via RUST_LOG, e.g.:
    //   RUST_LOG=speechtotext=debug,lapin=warn speechtotext worker
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("speechtotext=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    // ── Run ───────────────────────────────────────────────────────────────────
    let result = match cli.command {
        Command::Worker => app::run_worker().await,
        Command::Server => app::run_server().await,
    };

    if let Err(e) = result {
        tracing::error!("❌ fatal: {e}");
        std::process::exit(1);
    }
}
