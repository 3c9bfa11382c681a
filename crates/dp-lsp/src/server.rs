//! Main LSP server implementation.
//!
//! A thin dispatcher: document sync and definition requests call into
//! the `dp-core` compilation session; no compiler logic lives here.

use async_trait::async_trait;
use dashmap::DashMap;
use dp_core::{
    CancelToken, CompilationSession, ContentResolver, FsResolver, ResolveError, SymbolPosition,
};
use std::sync::Arc;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::diagnostics::convert_diagnostic;
use crate::document::Document;

/// Resolver that prefers open editor buffers over the filesystem.
struct OverlayResolver {
    documents: Arc<DashMap<Url, Document>>,
    fallback: FsResolver,
}

#[async_trait]
impl ContentResolver for OverlayResolver {
    async fn exists(&self, source_id: &url::Url) -> bool {
        if self.overlay_text(source_id).is_some() {
            return true;
        }
        self.fallback.exists(source_id).await
    }

    async fn get_text(&self, source_id: &url::Url) -> std::result::Result<String, ResolveError> {
        if let Some(text) = self.overlay_text(source_id) {
            return Ok(text);
        }
        self.fallback.get_text(source_id).await
    }
}

impl OverlayResolver {
    fn overlay_text(&self, source_id: &url::Url) -> Option<String> {
        let uri = Url::parse(source_id.as_str()).ok()?;
        self.documents.get(&uri).map(|doc| doc.content())
    }
}

/// The DP Language Server.
pub struct DpLanguageServer {
    /// LSP client for sending notifications.
    client: Client,
    /// Open documents indexed by URI.
    documents: Arc<DashMap<Url, Document>>,
    /// The shared compilation session behind all requests.
    session: CompilationSession,
}

impl DpLanguageServer {
    /// Create a new language server instance.
    pub fn new(client: Client) -> Self {
        let documents = Arc::new(DashMap::new());
        let resolver = OverlayResolver {
            documents: documents.clone(),
            fallback: FsResolver::new(),
        };
        Self {
            client,
            documents,
            session: CompilationSession::new(Arc::new(resolver)),
        }
    }

    /// Compile a document and publish its diagnostics.
    async fn validate_document(&self, uri: &Url) {
        let version = self.documents.get(uri).map(|doc| doc.version);
        match self.session.compile(uri.as_str(), &CancelToken::new()).await {
            Ok(result) => {
                let diagnostics: Vec<_> =
                    result.diagnostics.iter().map(convert_diagnostic).collect();
                self.client
                    .publish_diagnostics(uri.clone(), diagnostics, version)
                    .await;
            }
            Err(err) => {
                tracing::warn!("compile failed for {}: {}", uri, err);
            }
        }
    }

    fn to_locations(&self, positions: Vec<SymbolPosition>, len: u32) -> Vec<Location> {
        positions
            .into_iter()
            .filter_map(|pos| {
                let uri = Url::parse(pos.source_id.as_str()).ok()?;
                let start = Position::new(pos.line.saturating_sub(1), pos.column.saturating_sub(1));
                let end = Position::new(start.line, start.character + len);
                Some(Location::new(uri, Range::new(start, end)))
            })
            .collect()
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for DpLanguageServer {
    async fn initialize(&self, _: InitializeParams) -> Result<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                definition_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "dp-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        tracing::info!("DP Language Server initialized");
        self.client
            .log_message(MessageType::INFO, "DP Language Server ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("DP Language Server shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        tracing::debug!("Document opened: {}", uri);

        let doc = Document::new(params.text_document.text, params.text_document.version);
        self.documents.insert(uri.clone(), doc);
        self.validate_document(&uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri.clone();
        tracing::debug!("Document changed: {}", uri);

        if let Some(mut doc) = self.documents.get_mut(&uri) {
            for change in params.content_changes {
                doc.apply_change(change, params.text_document.version);
            }
        }
        self.validate_document(&uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        tracing::debug!("Document saved: {}", params.text_document.uri);
        self.validate_document(&params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        tracing::debug!("Document closed: {}", params.text_document.uri);
        self.documents.remove(&params.text_document.uri);
        // Clear diagnostics for closed document
        self.client
            .publish_diagnostics(params.text_document.uri, vec![], None)
            .await;
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(word) = self
            .documents
            .get(uri)
            .and_then(|doc| doc.word_at_position(position))
        else {
            return Ok(None);
        };
        tracing::debug!("definition request for '{}'", word);

        // `$name` and `$global.name` are variables, everything else is
        // tried as a label.
        let lookup = if let Some(variable) = word.strip_prefix('$') {
            self.session.find_variable_definition(uri.as_str(), variable)
        } else {
            self.session.find_label_definition(uri.as_str(), &word)
        };

        let positions = lookup.unwrap_or_default();
        if positions.is_empty() {
            return Ok(None);
        }
        let locations = self.to_locations(positions, word.trim_start_matches('$').len() as u32);
        Ok(Some(GotoDefinitionResponse::Array(locations)))
    }
}
