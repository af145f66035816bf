//! `quill-ls` binary entry point: the language server over stdin/stdout.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Stdout carries the protocol, so logs go to stderr only. `RUST_LOG`
/// overrides the default `info` filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "quill-ls starting");

    quill_ls::server::run(tokio::io::stdin(), tokio::io::stdout()).await?;

    tracing::info!("quill-ls stopped");
    Ok(())
}
