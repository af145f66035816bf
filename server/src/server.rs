//! Request dispatch and the server event loop.
//!
//! One task reads frames; a writer task serializes every outgoing frame
//! through an mpsc channel; work that awaits the compiler or the client
//! (validation, formatting) runs as spawned tasks over shared state. A
//! superseded validation is not cancelled — whichever response lands last
//! owns the published diagnostics.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::analysis;
use crate::codec::{MessageReader, MessageWriter};
use crate::compiler::{self, Mode};
use crate::documents::DocumentStore;
use crate::formatting;
use crate::protocol::{self, Incoming};
use crate::settings::{CONFIG_SECTION, Settings, SettingsCache};

const WRITER_QUEUE_CAPACITY: usize = 64;

/// How long the client gets to answer a `workspace/configuration` request
/// before the document falls back to default settings.
const CONFIGURATION_TIMEOUT: Duration = Duration::from_secs(5);

struct ServerState {
    documents: Mutex<DocumentStore>,
    settings: Mutex<SettingsCache>,
    /// In-flight server→client requests, keyed by our request id.
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    next_request_id: AtomicU64,
    /// Whether the client can answer scoped configuration requests.
    scoped_configuration: AtomicBool,
    writer_tx: mpsc::Sender<Value>,
}

impl ServerState {
    fn new(writer_tx: mpsc::Sender<Value>) -> Self {
        Self {
            documents: Mutex::new(DocumentStore::new()),
            settings: Mutex::new(SettingsCache::new()),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            scoped_configuration: AtomicBool::new(false),
            writer_tx,
        }
    }

    async fn send(&self, frame: Value) {
        if self.writer_tx.send(frame).await.is_err() {
            tracing::debug!("writer task gone; dropping outgoing frame");
        }
    }

    /// Send a request to the client and wait (bounded) for its response.
    async fn request_client(&self, frame_for: impl FnOnce(u64) -> Value) -> Option<Value> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        self.send(frame_for(id)).await;

        match tokio::time::timeout(CONFIGURATION_TIMEOUT, rx).await {
            Ok(Ok(body)) => Some(body),
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().await.remove(&id);
                tracing::debug!(id, "client request went unanswered");
                None
            }
        }
    }

    /// Route a client response to whoever is waiting on it.
    async fn resolve_response(&self, id: u64, body: Value) {
        let waiter = self.pending.lock().await.remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(body);
            }
            None => tracing::debug!(id, "response for unknown or expired request"),
        }
    }

    /// Settings for one document: cached, else asked of the client, else
    /// the defaults.
    async fn settings_for(&self, uri: &str) -> Settings {
        if !self.scoped_configuration.load(Ordering::Relaxed) {
            return Settings::default();
        }
        if let Some(cached) = self.settings.lock().await.get(uri) {
            return cached.clone();
        }

        let resolved = match self
            .request_client(|id| protocol::configuration_request(id, uri, CONFIG_SECTION))
            .await
        {
            Some(body) => Settings::from_configuration(body.get("result").unwrap_or(&Value::Null)),
            None => Settings::default(),
        };

        self.settings
            .lock()
            .await
            .insert(uri.to_string(), resolved.clone());
        resolved
    }

    /// Run `analyze` over the document and publish a complete replacement
    /// diagnostic set (empty output clears prior diagnostics).
    async fn validate(&self, uri: String) {
        let text = match self.documents.lock().await.get(&uri) {
            Some(doc) => doc.text().to_string(),
            // Closed while the validation was queued.
            None => return,
        };

        let settings = self.settings_for(&uri).await;
        let output = compiler::invoke(&text, Mode::Analyze, &settings).await;
        let mut diagnostics = analysis::interpret(&output);
        diagnostics.truncate(settings.max_number_of_problems);

        tracing::debug!(uri = %uri, count = diagnostics.len(), "publishing diagnostics");
        self.send(protocol::publish_diagnostics(&uri, &diagnostics))
            .await;
    }

    /// Answer a formatting request. Always an edit list, never an error.
    async fn format(&self, id: Value, uri: String) {
        let text = self
            .documents
            .lock()
            .await
            .get(&uri)
            .map(|doc| doc.text().to_string());

        let edits = match text {
            Some(text) if !text.trim().is_empty() => {
                let settings = self.settings_for(&uri).await;
                let output = compiler::invoke(&text, Mode::Fmt, &settings).await;
                formatting::interpret(&text, &output)
            }
            _ => Vec::new(),
        };

        self.send(protocol::response(&id, json!(edits))).await;
    }
}

/// Run the server over the given streams until EOF or an `exit`
/// notification.
pub async fn run<R, W>(input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (writer_tx, mut writer_rx) = mpsc::channel::<Value>(WRITER_QUEUE_CAPACITY);
    let writer_task = tokio::spawn(async move {
        let mut writer = MessageWriter::new(output);
        while let Some(frame) = writer_rx.recv().await {
            if let Err(e) = writer.send(&frame).await {
                tracing::warn!(error = %e, "failed to write frame; stopping writer");
                break;
            }
        }
    });

    let state = Arc::new(ServerState::new(writer_tx));
    let mut reader = MessageReader::new(input);

    loop {
        let frame = match reader.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("client closed the connection");
                break;
            }
            Err(e) => {
                // Framing is unrecoverable once the byte stream desyncs.
                tracing::warn!(error = %e, "unreadable frame; shutting down");
                break;
            }
        };

        let Some(incoming) = protocol::classify(&frame) else {
            tracing::trace!("ignoring frame with no JSON-RPC shape");
            continue;
        };

        match incoming {
            Incoming::Response { id, body } => state.resolve_response(id, body).await,
            Incoming::Request { id, method, params } => {
                handle_request(&state, id, &method, params).await;
            }
            Incoming::Notification { method, params } => {
                if method == "exit" {
                    tracing::info!("exit requested");
                    break;
                }
                handle_notification(&state, &method, params).await;
            }
        }
    }

    drop(state);
    let _ = writer_task.await;
    Ok(())
}

async fn handle_request(state: &Arc<ServerState>, id: Value, method: &str, params: Option<Value>) {
    match method {
        "initialize" => {
            let scoped = protocol::supports_scoped_configuration(params.as_ref());
            state.scoped_configuration.store(scoped, Ordering::Relaxed);
            tracing::info!(scoped_configuration = scoped, "initialize");
            state
                .send(protocol::response(&id, protocol::initialize_result()))
                .await;
        }
        "shutdown" => {
            state.send(protocol::response(&id, Value::Null)).await;
        }
        "textDocument/completion" => {
            // Advertised but unimplemented: always the empty list.
            state.send(protocol::response(&id, json!([]))).await;
        }
        "textDocument/formatting" => {
            let uri = params
                .and_then(|p| serde_json::from_value::<protocol::DocumentParams>(p).ok())
                .map(|p| p.text_document.uri);
            match uri {
                Some(uri) => {
                    let state = Arc::clone(state);
                    tokio::spawn(async move { state.format(id, uri).await });
                }
                None => {
                    tracing::debug!("formatting request without a document; empty edit list");
                    state.send(protocol::response(&id, json!([]))).await;
                }
            }
        }
        other => {
            tracing::debug!(method = other, "unknown request");
            state.send(protocol::method_not_found(&id, other)).await;
        }
    }
}

async fn handle_notification(state: &Arc<ServerState>, method: &str, params: Option<Value>) {
    match method {
        "initialized" => tracing::debug!("client finished initializing"),
        "textDocument/didOpen" => {
            let Some(p) = parse_params::<protocol::DidOpenParams>(method, params) else {
                return;
            };
            let doc = p.text_document;
            tracing::debug!(uri = %doc.uri, version = doc.version, "document opened");
            state
                .documents
                .lock()
                .await
                .open(doc.uri.clone(), doc.version, doc.text);
            spawn_validation(state, doc.uri);
        }
        "textDocument/didChange" => {
            let Some(p) = parse_params::<protocol::DidChangeParams>(method, params) else {
                return;
            };
            let uri = p.text_document.uri;
            let applied = state.documents.lock().await.apply_changes(
                &uri,
                p.text_document.version,
                &p.content_changes,
            );
            if applied {
                spawn_validation(state, uri);
            } else {
                tracing::debug!(uri = %uri, "change for unopened document dropped");
            }
        }
        "textDocument/didClose" => {
            let Some(p) = parse_params::<protocol::DocumentParams>(method, params) else {
                return;
            };
            let uri = p.text_document.uri;
            tracing::debug!(uri = %uri, "document closed");
            state.documents.lock().await.close(&uri);
            state.settings.lock().await.remove(&uri);
        }
        "workspace/didChangeConfiguration" => {
            tracing::info!("configuration changed; flushing settings and revalidating");
            state.settings.lock().await.clear();
            let uris = state.documents.lock().await.uris();
            let state = Arc::clone(state);
            tokio::spawn(async move {
                for uri in uris {
                    state.validate(uri).await;
                }
            });
        }
        "workspace/didChangeWorkspaceFolders" => {
            // Observed, not acted upon.
            tracing::info!("workspace folders changed");
        }
        other => tracing::trace!(method = other, "ignoring notification"),
    }
}

fn spawn_validation(state: &Arc<ServerState>, uri: String) {
    let state = Arc::clone(state);
    tokio::spawn(async move { state.validate(uri).await });
}

fn parse_params<T: serde::de::DeserializeOwned>(method: &str, params: Option<Value>) -> Option<T> {
    match params {
        Some(params) => match serde_json::from_value(params) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::debug!(method, error = %e, "malformed params");
                None
            }
        },
        None => {
            tracing::debug!(method, "notification missing params");
            None
        }
    }
}
