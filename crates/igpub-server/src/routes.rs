//! Export HTTP handlers.

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use igpub_core::{CoreError, ErrorCategory, ExportFormat, ExportOptions};
use igpub_export::{BundleAssembler, xml};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::state::AppState;

/// Maps pipeline errors onto HTTP responses with a small JSON body.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.category() {
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// `POST /export/{implementationGuideId}`.
///
/// `exportFormat=1` responds with the assembled bundle document inline;
/// `exportFormat=2` kicks off a package export and responds with the
/// package id while the pipeline runs in the background.
pub async fn start_export(
    State(state): State<AppState>,
    Path(implementation_guide_id): Path<String>,
    Query(options): Query<ExportOptions>,
) -> Result<Response, ApiError> {
    match options.export_format {
        ExportFormat::Bundle => bundle_response(&state, &implementation_guide_id, &options).await,
        ExportFormat::Html => {
            if state
                .orchestrator
                .registry()
                .exporting(&implementation_guide_id)
            {
                // Advisory only: concurrent exports are allowed, each in
                // its own workspace.
                warn!(
                    implementation_guide_id,
                    "export requested while another export for this guide is in progress"
                );
            }
            let package_id = state
                .orchestrator
                .start_export(&implementation_guide_id, options)?;
            Ok(package_id.into_response())
        }
    }
}

async fn bundle_response(
    state: &AppState,
    implementation_guide_id: &str,
    options: &ExportOptions,
) -> Result<Response, ApiError> {
    let bundle = BundleAssembler::new(state.repository.as_ref())
        .assemble(implementation_guide_id)
        .await?;
    let document = bundle.to_fhir_json();

    if options.output_format().is_xml() {
        let body = xml::resource_to_xml(&document)?;
        Ok((
            [(header::CONTENT_TYPE, "application/fhir+xml")],
            body,
        )
            .into_response())
    } else {
        Ok(Json(document).into_response())
    }
}

/// `GET /export/{packageId}` — one-shot package download. The archive
/// store zips the workspace into memory and removes it, so a second
/// request for the same id is a 404.
pub async fn download_package(
    State(state): State<AppState>,
    Path(package_id): Path<String>,
) -> Result<Response, ApiError> {
    let archive = state.archive.clone();
    let id = package_id.clone();
    let bytes = tokio::task::spawn_blocking(move || archive.archive(&id))
        .await
        .map_err(|err| CoreError::Storage(format!("archive task failed: {err}")))??;

    debug!(package_id, size = bytes.len(), "package downloaded");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=ig-package.zip",
            ),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SocketCommand {
    subscribe: String,
}

/// `GET /socket` — progress event stream.
///
/// The client opens the socket with a chosen id and sends
/// `{"subscribe": "<socketId>"}`. Once acked, every export started with
/// that `socketId` streams its events here. Exports wait for the ack
/// before emitting, so subscribers never miss early progress.
pub async fn socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // First frame must be the subscribe command.
    let socket_id = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<SocketCommand>(text.as_str()) {
                    Ok(command) => break command.subscribe,
                    Err(_) => {
                        let _ = sink
                            .send(Message::Text(
                                json!({ "error": "expected {\"subscribe\": \"<socketId>\"}" })
                                    .to_string()
                                    .into(),
                            ))
                            .await;
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return,
        }
    };

    let mut events = state.broker().subscribe(&socket_id);
    if sink
        .send(Message::Text(
            json!({ "subscribed": socket_id }).to_string().into(),
        ))
        .await
        .is_err()
    {
        state.broker().remove(&socket_id);
        return;
    }
    state.broker().mark_ready(&socket_id);
    debug!(socket_id, "progress subscriber attached");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(payload) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(socket_id, skipped, "progress subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.broker().remove(&socket_id);
    debug!(socket_id, "progress subscriber detached");
}
