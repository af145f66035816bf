//! Wire types for the LSP subset the server speaks.
//!
//! Incoming frames are classified into [`Incoming`] and the interesting
//! params are deserialized into typed structs; outgoing frames are built
//! with `json!` since they are write-only.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// LSP severity value for an error diagnostic.
pub const SEVERITY_ERROR: u8 = 1;

/// JSON-RPC "method not found" error code.
const METHOD_NOT_FOUND: i32 = -32601;

/// An incoming frame, classified by shape.
#[derive(Debug)]
pub enum Incoming {
    /// A client request carrying an id we must eventually answer.
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    /// A fire-and-forget notification.
    Notification {
        method: String,
        params: Option<Value>,
    },
    /// The client answering one of our own requests.
    Response { id: u64, body: Value },
}

/// Classify a raw frame. Returns `None` for frames that fit no JSON-RPC
/// shape (these are ignored upstream, not errors).
#[must_use]
pub fn classify(frame: &Value) -> Option<Incoming> {
    let method = frame.get("method").and_then(Value::as_str);
    let id = frame.get("id");
    let answers_us = frame.get("result").is_some() || frame.get("error").is_some();

    match (method, id) {
        (Some(method), Some(id)) => Some(Incoming::Request {
            id: id.clone(),
            method: method.to_string(),
            params: frame.get("params").cloned(),
        }),
        (Some(method), None) => Some(Incoming::Notification {
            method: method.to_string(),
            params: frame.get("params").cloned(),
        }),
        (None, Some(id)) if answers_us => Some(Incoming::Response {
            id: id.as_u64()?,
            body: frame.clone(),
        }),
        _ => None,
    }
}

/// Successful response to a client request.
#[must_use]
pub fn response(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// Error response for a request method we do not implement.
#[must_use]
pub fn method_not_found(id: &Value, method: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": METHOD_NOT_FOUND,
            "message": format!("Method not found: {method}")
        }
    })
}

/// Server-to-client notification.
#[must_use]
pub fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

/// Server-to-client request.
#[must_use]
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

/// `textDocument/publishDiagnostics` notification for `uri`. Publishing an
/// empty list clears whatever the client currently shows for the document.
#[must_use]
pub fn publish_diagnostics(uri: &str, diagnostics: &[Diagnostic]) -> Value {
    notification(
        "textDocument/publishDiagnostics",
        json!({ "uri": uri, "diagnostics": diagnostics }),
    )
}

/// `workspace/configuration` request scoped to one document.
#[must_use]
pub fn configuration_request(id: u64, scope_uri: &str, section: &str) -> Value {
    request(
        id,
        "workspace/configuration",
        json!({ "items": [{ "scopeUri": scope_uri, "section": section }] }),
    )
}

/// The `initialize` result: capabilities plus server info.
#[must_use]
pub fn initialize_result() -> Value {
    json!({
        "capabilities": {
            "textDocumentSync": {
                "openClose": true,
                // 2 = incremental
                "change": 2
            },
            "completionProvider": {
                "resolveProvider": false
            },
            "documentFormattingProvider": true
        },
        "serverInfo": {
            "name": "quill-ls",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Whether the client can answer `workspace/configuration` requests
/// scoped to a document. Without this we fall back to default settings.
#[must_use]
pub fn supports_scoped_configuration(initialize_params: Option<&Value>) -> bool {
    initialize_params
        .and_then(|p| p.pointer("/capabilities/workspace/configuration"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A published diagnostic. Severity is always [`SEVERITY_ERROR`] and the
/// source tag is fixed; the compiler's output format gives us nothing finer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: u8,
    pub source: &'static str,
    pub message: String,
}

/// A text replacement returned from `textDocument/formatting`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    pub uri: String,
    #[serde(default)]
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeParams {
    pub text_document: VersionedTextDocumentIdentifier,
    pub content_changes: Vec<ContentChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedTextDocumentIdentifier {
    pub uri: String,
    #[serde(default)]
    pub version: i32,
}

/// One entry of `contentChanges`. A missing range means the client sent
/// the full replacement text.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentChange {
    pub range: Option<Range>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

/// Shared shape of `didClose` and `textDocument/formatting` params — both
/// only need the document identifier here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentParams {
    pub text_document: TextDocumentIdentifier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_request() {
        let frame = json!({"jsonrpc": "2.0", "id": 3, "method": "shutdown"});
        match classify(&frame) {
            Some(Incoming::Request { id, method, params }) => {
                assert_eq!(id, json!(3));
                assert_eq!(method, "shutdown");
                assert!(params.is_none());
            }
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn classify_request_with_string_id() {
        let frame = json!({"jsonrpc": "2.0", "id": "abc", "method": "shutdown"});
        match classify(&frame) {
            Some(Incoming::Request { id, .. }) => assert_eq!(id, json!("abc")),
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn classify_notification() {
        let frame = json!({"jsonrpc": "2.0", "method": "exit"});
        match classify(&frame) {
            Some(Incoming::Notification { method, .. }) => assert_eq!(method, "exit"),
            other => panic!("expected Notification, got {other:?}"),
        }
    }

    #[test]
    fn classify_response() {
        let frame = json!({"jsonrpc": "2.0", "id": 9, "result": [null]});
        match classify(&frame) {
            Some(Incoming::Response { id, body }) => {
                assert_eq!(id, 9);
                assert_eq!(body["result"], json!([null]));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn classify_error_response() {
        let frame = json!({"jsonrpc": "2.0", "id": 9, "error": {"code": -1, "message": "no"}});
        assert!(matches!(
            classify(&frame),
            Some(Incoming::Response { id: 9, .. })
        ));
    }

    #[test]
    fn classify_rejects_shapeless_frames() {
        assert!(classify(&json!({"jsonrpc": "2.0"})).is_none());
        // Bare id with neither result nor error is not a response.
        assert!(classify(&json!({"jsonrpc": "2.0", "id": 1})).is_none());
    }

    #[test]
    fn method_not_found_shape() {
        let frame = method_not_found(&json!(4), "textDocument/hover");
        assert_eq!(frame["id"], 4);
        assert_eq!(frame["error"]["code"], METHOD_NOT_FOUND);
        assert!(
            frame["error"]["message"]
                .as_str()
                .unwrap()
                .contains("textDocument/hover")
        );
    }

    #[test]
    fn initialize_result_capabilities() {
        let result = initialize_result();
        assert_eq!(result["capabilities"]["textDocumentSync"]["change"], 2);
        assert_eq!(result["capabilities"]["documentFormattingProvider"], true);
        assert!(result["capabilities"]["completionProvider"].is_object());
        assert_eq!(result["serverInfo"]["name"], "quill-ls");
    }

    #[test]
    fn scoped_configuration_detection() {
        let with = json!({"capabilities": {"workspace": {"configuration": true}}});
        let without = json!({"capabilities": {"workspace": {}}});
        assert!(supports_scoped_configuration(Some(&with)));
        assert!(!supports_scoped_configuration(Some(&without)));
        assert!(!supports_scoped_configuration(None));
    }

    #[test]
    fn publish_diagnostics_serialization() {
        let diagnostic = Diagnostic {
            range: Range::new(Position::new(2, 4), Position::new(2, 4)),
            severity: SEVERITY_ERROR,
            source: "quillc",
            message: " unexpected token".to_string(),
        };
        let frame = publish_diagnostics("file:///demo.qll", std::slice::from_ref(&diagnostic));
        assert_eq!(frame["method"], "textDocument/publishDiagnostics");
        assert_eq!(frame["params"]["uri"], "file:///demo.qll");
        let body = &frame["params"]["diagnostics"][0];
        assert_eq!(body["severity"], 1);
        assert_eq!(body["source"], "quillc");
        assert_eq!(body["range"]["start"]["line"], 2);
        assert_eq!(body["range"]["start"]["character"], 4);
    }

    #[test]
    fn text_edit_uses_camel_case() {
        let edit = TextEdit {
            range: Range::new(Position::new(0, 0), Position::new(3, 0)),
            new_text: "x = 1\n".to_string(),
        };
        let body = serde_json::to_value(&edit).unwrap();
        assert_eq!(body["newText"], "x = 1\n");
        assert!(body.get("new_text").is_none());
    }

    #[test]
    fn configuration_request_shape() {
        let frame = configuration_request(11, "file:///demo.qll", "quill");
        assert_eq!(frame["method"], "workspace/configuration");
        assert_eq!(frame["id"], 11);
        assert_eq!(frame["params"]["items"][0]["scopeUri"], "file:///demo.qll");
        assert_eq!(frame["params"]["items"][0]["section"], "quill");
    }

    #[test]
    fn did_change_params_deserialization() {
        let params: DidChangeParams = serde_json::from_value(json!({
            "textDocument": {"uri": "file:///demo.qll", "version": 4},
            "contentChanges": [
                {"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}}, "text": "y"},
                {"text": "whole new text"}
            ]
        }))
        .unwrap();
        assert_eq!(params.text_document.version, 4);
        assert_eq!(params.content_changes.len(), 2);
        assert!(params.content_changes[0].range.is_some());
        assert!(params.content_changes[1].range.is_none());
    }
}
