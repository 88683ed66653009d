//! Builders for every message this client sends to the analysis server.

use lsp_types::{
    ClientCapabilities, ClientInfo, CompletionClientCapabilities,
    DidChangeTextDocumentParams, DidChangeWatchedFilesClientCapabilities,
    DidChangeWatchedFilesParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, FileEvent, GotoCapability, HoverClientCapabilities,
    InitializeParams, PublishDiagnosticsClientCapabilities, TextDocumentClientCapabilities,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentSyncClientCapabilities, Url, VersionedTextDocumentIdentifier,
    WorkspaceClientCapabilities, WorkspaceFolder,
};
use std::path::Path;

use crate::error::Result;
use crate::lsp::types::{MessageFactory, Notification, Request};
use crate::session::DocumentEvent;

/// Language id reported in didOpen notifications.
pub const LANGUAGE_ID: &str = "basic";

/// `initialize` request. The server reads `rootUri` to seed its workspace
/// scan, so it is populated alongside `workspaceFolders` when a workspace
/// root is known.
#[allow(deprecated)]
pub fn initialize_request(
    factory: &mut MessageFactory,
    workspace_root: Option<&Path>,
) -> Result<Request> {
    let root_uri = workspace_root.and_then(|p| Url::from_file_path(p).ok());
    let workspace_folders = root_uri.clone().map(|uri| {
        let name = workspace_root
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        vec![WorkspaceFolder { uri, name }]
    });

    let params = InitializeParams {
        process_id: Some(std::process::id()),
        root_uri,
        workspace_folders,
        client_info: Some(ClientInfo {
            name: "c64lsp-client".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        capabilities: ClientCapabilities {
            workspace: Some(WorkspaceClientCapabilities {
                did_change_watched_files: Some(DidChangeWatchedFilesClientCapabilities {
                    dynamic_registration: Some(false),
                    relative_pattern_support: Some(false),
                }),
                ..Default::default()
            }),
            text_document: Some(TextDocumentClientCapabilities {
                // The server advertises full-document sync, so the client
                // never sends incremental ranges.
                synchronization: Some(TextDocumentSyncClientCapabilities {
                    dynamic_registration: Some(false),
                    will_save: Some(false),
                    will_save_wait_until: Some(false),
                    did_save: Some(true),
                }),
                completion: Some(CompletionClientCapabilities::default()),
                hover: Some(HoverClientCapabilities::default()),
                definition: Some(GotoCapability::default()),
                publish_diagnostics: Some(PublishDiagnosticsClientCapabilities::default()),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    };

    Ok(factory.request("initialize", serde_json::to_value(params)?))
}

pub fn initialized_notification() -> Notification {
    Notification::new("initialized".to_string(), serde_json::json!({}))
}

/// Map a host document event to its protocol notification. Content changes
/// are sent as a single full-text change.
pub fn document_notification(event: &DocumentEvent) -> Result<Notification> {
    let notification = match event {
        DocumentEvent::Opened { uri, text, version } => {
            let params = DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri.clone(),
                    language_id: LANGUAGE_ID.to_string(),
                    version: *version,
                    text: text.clone(),
                },
            };
            Notification::new(
                "textDocument/didOpen".to_string(),
                serde_json::to_value(params)?,
            )
        }
        DocumentEvent::Changed { uri, text, version } => {
            let params = DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: uri.clone(),
                    version: *version,
                },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text: text.clone(),
                }],
            };
            Notification::new(
                "textDocument/didChange".to_string(),
                serde_json::to_value(params)?,
            )
        }
        DocumentEvent::Saved { uri, text } => {
            let params = DidSaveTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
                text: text.clone(),
            };
            Notification::new(
                "textDocument/didSave".to_string(),
                serde_json::to_value(params)?,
            )
        }
        DocumentEvent::Closed { uri } => {
            let params = DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
            };
            Notification::new(
                "textDocument/didClose".to_string(),
                serde_json::to_value(params)?,
            )
        }
    };

    Ok(notification)
}

pub fn watched_files_notification(changes: Vec<FileEvent>) -> Result<Notification> {
    let params = DidChangeWatchedFilesParams { changes };
    Ok(Notification::new(
        "workspace/didChangeWatchedFiles".to_string(),
        serde_json::to_value(params)?,
    ))
}

pub fn shutdown_request(factory: &mut MessageFactory) -> Request {
    factory.request("shutdown", serde_json::Value::Null)
}

pub fn exit_notification() -> Notification {
    Notification::new("exit".to_string(), serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::types::MessageFactory;

    #[test]
    fn test_initialize_request_shape() {
        let mut factory = MessageFactory::new();
        let request = initialize_request(&mut factory, Some(Path::new("/ws"))).unwrap();
        assert_eq!(request.method, "initialize");
        assert_eq!(request.id, 1);
        assert_eq!(
            request.params["processId"],
            serde_json::json!(std::process::id())
        );
        assert_eq!(request.params["rootUri"], "file:///ws");
        assert_eq!(request.params["clientInfo"]["name"], "c64lsp-client");
    }

    #[test]
    fn test_initialize_without_workspace_root() {
        let mut factory = MessageFactory::new();
        let request = initialize_request(&mut factory, None).unwrap();
        assert!(request.params["rootUri"].is_null());
        assert!(request.params["workspaceFolders"].is_null());
    }

    #[test]
    fn test_did_open_carries_language_id() {
        let uri = Url::parse("file:///games/foo.bas").unwrap();
        let event = DocumentEvent::Opened {
            uri,
            text: "10 PRINT \"HELLO\"".to_string(),
            version: 1,
        };
        let note = document_notification(&event).unwrap();
        assert_eq!(note.method, "textDocument/didOpen");
        assert_eq!(note.params["textDocument"]["languageId"], "basic");
        assert_eq!(note.params["textDocument"]["version"], 1);
    }

    #[test]
    fn test_did_change_is_full_text() {
        let uri = Url::parse("file:///games/foo.bas").unwrap();
        let event = DocumentEvent::Changed {
            uri,
            text: "20 GOTO 10".to_string(),
            version: 2,
        };
        let note = document_notification(&event).unwrap();
        assert_eq!(note.method, "textDocument/didChange");
        let changes = note.params["contentChanges"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes[0]["range"].is_null());
        assert_eq!(changes[0]["text"], "20 GOTO 10");
    }

    #[test]
    fn test_did_save_without_text() {
        let uri = Url::parse("file:///games/foo.bas").unwrap();
        let event = DocumentEvent::Saved { uri, text: None };
        let note = document_notification(&event).unwrap();
        assert_eq!(note.method, "textDocument/didSave");
        assert_eq!(
            note.params["textDocument"]["uri"],
            "file:///games/foo.bas"
        );
        assert!(note.params["text"].is_null());
    }

    #[test]
    fn test_did_close_carries_uri_only() {
        let uri = Url::parse("file:///games/foo.bas").unwrap();
        let note = document_notification(&DocumentEvent::Closed { uri }).unwrap();
        assert_eq!(note.method, "textDocument/didClose");
        assert_eq!(
            note.params["textDocument"]["uri"],
            "file:///games/foo.bas"
        );
    }

    #[test]
    fn test_shutdown_and_exit() {
        let mut factory = MessageFactory::new();
        let request = shutdown_request(&mut factory);
        assert_eq!(request.method, "shutdown");
        let exit = exit_notification();
        assert_eq!(exit.method, "exit");
    }
}
