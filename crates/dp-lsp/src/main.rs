//! DP Language Server entry point.

use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

mod diagnostics;
mod document;
mod server;

use server::DpLanguageServer;

#[tokio::main]
async fn main() {
    // Initialize logging (no colors, stdout is the protocol channel)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting DP Language Server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(DpLanguageServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
