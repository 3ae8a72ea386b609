//! HTTP server for the guided rewrite session

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ExportError, ScribeError};
use crate::export::ExportFormat;
use crate::ingestion::{SourceFile, SourceLocation};
use crate::machine::{Advance, Approval};
use crate::orchestrator::SharedOrchestrator;
use crate::types::{Phase, SectionKey, SessionState};

/// One file sent over HTTP. Only inline content is accepted; server-side
/// paths are never read on behalf of a client.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadedFile {
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub content: String,
}

impl From<UploadedFile> for SourceFile {
    fn from(file: UploadedFile) -> Self {
        SourceFile {
            name: file.name,
            mime_type: file.mime_type,
            location: SourceLocation::Content(file.content),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadRequest {
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RegenerateRequest {
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ComposeRequestHttp {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub files: usize,
    pub sections_found: usize,
    pub phase: Phase,
}

#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    /// Section now awaiting a draft; absent once the article is complete
    pub next_section: Option<SectionKey>,
    pub complete: bool,
}

#[derive(Debug, Serialize)]
pub struct ComposeResponse {
    pub entry_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub applied: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub phase: Phase,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn reject(err: ScribeError) -> ApiError {
    let (status, label) = match &err {
        ScribeError::Busy => (StatusCode::CONFLICT, "Session busy"),
        ScribeError::Stale => (StatusCode::CONFLICT, "Session restarted"),
        ScribeError::Invariant(_) => (StatusCode::BAD_REQUEST, "Action not allowed"),
        ScribeError::Ingestion(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Ingestion failed"),
        ScribeError::Oracle(_) => (StatusCode::BAD_GATEWAY, "Text generation failed"),
        ScribeError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Persistence failed"),
        ScribeError::Export(ExportError::UnknownFormat(_)) => (StatusCode::BAD_REQUEST, "Unknown export format"),
        ScribeError::Export(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Export failed"),
    };
    if status.is_server_error() {
        error!("{}: {}", label, err);
    } else {
        warn!("{}: {}", label, err);
    }
    (
        status,
        Json(ErrorResponse {
            error: label.to_string(),
            details: Some(err.to_string()),
        }),
    )
}

fn bad_request(label: &str, details: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: label.to_string(),
            details: Some(details),
        }),
    )
}

async fn health_handler(State(orch): State<SharedOrchestrator>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "scribe".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        phase: orch.snapshot().await.phase,
    })
}

async fn session_handler(State(orch): State<SharedOrchestrator>) -> Json<SessionState> {
    Json(orch.snapshot().await)
}

async fn upload_handler(
    State(orch): State<SharedOrchestrator>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    info!("Received upload request: {} file(s)", req.files.len());
    let files = req.files.into_iter().map(SourceFile::from).collect();
    let summary = orch.upload_files(files).await.map_err(reject)?;
    Ok(Json(UploadResponse {
        files: summary.files,
        sections_found: summary.sections_found,
        phase: summary.phase,
    }))
}

async fn regenerate_handler(
    State(orch): State<SharedOrchestrator>,
    body: Option<Json<RegenerateRequest>>,
) -> Result<Json<SessionState>, ApiError> {
    let feedback = body.and_then(|Json(req)| req.feedback);
    orch.regenerate_structure(feedback).await.map_err(reject)?;
    Ok(Json(orch.snapshot().await))
}

async fn approve_structure_handler(
    State(orch): State<SharedOrchestrator>,
) -> Result<Json<SessionState>, ApiError> {
    orch.approve_structure().await.map_err(reject)?;
    Ok(Json(orch.snapshot().await))
}

async fn draft_handler(
    State(orch): State<SharedOrchestrator>,
    Json(req): Json<TextRequest>,
) -> Result<StatusCode, ApiError> {
    orch.set_draft_text(&req.text).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn polish_handler(State(orch): State<SharedOrchestrator>) -> Result<Json<SessionState>, ApiError> {
    orch.polish().await.map_err(reject)?;
    Ok(Json(orch.snapshot().await))
}

async fn advance_handler(State(orch): State<SharedOrchestrator>) -> Result<Json<AdvanceResponse>, ApiError> {
    let response = match orch.advance().await.map_err(reject)? {
        Advance::NextSection(key) => AdvanceResponse {
            next_section: Some(key),
            complete: false,
        },
        // The orchestrator resolves the references step before returning
        Advance::NeedsReferences { .. } | Advance::Complete => AdvanceResponse {
            next_section: None,
            complete: true,
        },
    };
    Ok(Json(response))
}

async fn edit_handler(
    State(orch): State<SharedOrchestrator>,
    Path(key): Path<String>,
    Json(req): Json<TextRequest>,
) -> Result<StatusCode, ApiError> {
    let key: SectionKey = key
        .parse()
        .map_err(|e: String| bad_request("Unknown section", e))?;
    orch.edit_article_section(key, &req.text).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn compose_handler(
    State(orch): State<SharedOrchestrator>,
    Json(req): Json<ComposeRequestHttp>,
) -> Result<Json<ComposeResponse>, ApiError> {
    let entry_id = orch.compose(&req.message).await.map_err(reject)?;
    Ok(Json(ComposeResponse { entry_id }))
}

async fn approve_suggestion_handler(
    State(orch): State<SharedOrchestrator>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let approval = orch.approve_suggestion(id).await.map_err(reject)?;
    Ok(Json(ApprovalResponse {
        applied: approval == Approval::Applied,
    }))
}

async fn save_handler(State(orch): State<SharedOrchestrator>) -> Result<StatusCode, ApiError> {
    orch.save().await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restart_handler(State(orch): State<SharedOrchestrator>) -> Result<StatusCode, ApiError> {
    orch.restart().await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_handler(
    State(orch): State<SharedOrchestrator>,
    Path(format): Path<String>,
) -> Result<Response, ApiError> {
    let format: ExportFormat = format.parse().map_err(|e: ExportError| reject(e.into()))?;
    let doc = orch.export(format).await.map_err(reject)?;
    let headers = [
        (header::CONTENT_TYPE, doc.content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", doc.file_name),
        ),
    ];
    Ok((headers, doc.bytes).into_response())
}

/// Create and configure the HTTP server
pub fn create_router(orch: SharedOrchestrator) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/session", get(session_handler))
        .route("/session/upload", post(upload_handler))
        .route("/session/structure/regenerate", post(regenerate_handler))
        .route("/session/structure/approve", post(approve_structure_handler))
        .route("/session/draft", post(draft_handler))
        .route("/session/polish", post(polish_handler))
        .route("/session/advance", post(advance_handler))
        .route("/session/article/:key", put(edit_handler))
        .route("/session/compose", post(compose_handler))
        .route("/session/suggestions/:id/approve", post(approve_suggestion_handler))
        .route("/session/save", post(save_handler))
        .route("/session/restart", post(restart_handler))
        .route("/session/export/:format", get(export_handler))
        .with_state(orch)
}

/// Run the HTTP server
pub async fn run_server(orch: SharedOrchestrator, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    info!("Starting scribe server on {}", addr);

    let app = create_router(orch);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use crate::persistence::MemoryStore;
    use crate::prompts;
    use crate::types::Catalog;
    use crate::Orchestrator;
    use std::sync::Arc;

    fn status_of<T>(result: Result<T, ApiError>) -> Option<StatusCode> {
        result.err().map(|(status, _)| status)
    }

    fn inline_upload(name: &str, content: &str) -> Json<UploadRequest> {
        Json(UploadRequest {
            files: vec![UploadedFile {
                name: name.to_string(),
                mime_type: Some("text/plain".to_string()),
                content: content.to_string(),
            }],
        })
    }

    #[test]
    fn test_upload_body_rejects_server_paths() {
        let body = r#"{"files": [{"name": "x", "mime_type": "text/plain", "path": "/etc/passwd"}]}"#;
        assert!(serde_json::from_str::<UploadRequest>(body).is_err());

        let body = r#"{"files": [{"name": "x", "path": "/etc/passwd", "content": ""}]}"#;
        assert!(serde_json::from_str::<UploadRequest>(body).is_err());

        let body = r#"{"files": [{"name": "paper.txt", "content": "The problem is X."}]}"#;
        let req: UploadRequest = serde_json::from_str(body).unwrap();
        let file = SourceFile::from(req.files.into_iter().next().unwrap());
        assert_eq!(file.name, "paper.txt");
        assert!(file.mime_type.is_none());
        assert!(matches!(file.location, SourceLocation::Content(ref text) if text == "The problem is X."));
    }

    #[test]
    fn test_reject_status_mapping() {
        assert_eq!(reject(ScribeError::Busy).0, StatusCode::CONFLICT);
        assert_eq!(reject(ScribeError::Stale).0, StatusCode::CONFLICT);
        let (status, Json(body)) = reject(ExportError::UnknownFormat("pdf".to_string()).into());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Unknown export format");
        assert!(body.details.is_some());
    }

    #[tokio::test]
    async fn test_handlers_map_errors_to_status() {
        let oracle = Arc::new(
            MockOracle::new()
                .failing_on(prompts::SYSTEM_STRUCTURE)
                .on(prompts::SYSTEM_EXTRACT, prompts::NOT_FOUND_SENTINEL)
                .otherwise("Fine."),
        );
        let orch = Orchestrator::new(oracle, Arc::new(MemoryStore::new()), Catalog::academic(), true);

        // Nothing to ingest
        let empty = Json(UploadRequest { files: Vec::new() });
        let status = status_of(upload_handler(State(orch.clone()), empty).await);
        assert_eq!(status, Some(StatusCode::UNPROCESSABLE_ENTITY));

        // Draft before upload is not allowed in this phase
        let draft = Json(TextRequest {
            text: "early".to_string(),
        });
        let status = status_of(draft_handler(State(orch.clone()), draft).await);
        assert_eq!(status, Some(StatusCode::BAD_REQUEST));

        let Json(summary) = upload_handler(State(orch.clone()), inline_upload("paper.txt", "The problem is X."))
            .await
            .map_err(|(status, _)| status)
            .unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.phase, Phase::Structuring);

        // The oracle keeps failing the structure call
        let status = status_of(regenerate_handler(State(orch.clone()), None).await);
        assert_eq!(status, Some(StatusCode::BAD_GATEWAY));
        assert_eq!(orch.snapshot().await.phase, Phase::Structuring);

        let status = status_of(export_handler(State(orch.clone()), Path("pdf".to_string())).await);
        assert_eq!(status, Some(StatusCode::BAD_REQUEST));

        let status = status_of(edit_handler(
            State(orch.clone()),
            Path("appendix".to_string()),
            Json(TextRequest { text: "x".to_string() }),
        )
        .await);
        assert_eq!(status, Some(StatusCode::BAD_REQUEST));

        let Json(health) = health_handler(State(orch.clone())).await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.phase, Phase::Structuring);
    }

    #[tokio::test]
    async fn test_draft_and_export_succeed_over_handlers() {
        let oracle = Arc::new(
            MockOracle::new()
                .on(prompts::SYSTEM_EXTRACT, prompts::NOT_FOUND_SENTINEL)
                .otherwise("Fine."),
        );
        let orch = Orchestrator::new_simple(oracle);
        upload_handler(State(orch.clone()), inline_upload("paper.txt", "The problem is X."))
            .await
            .map_err(|(status, _)| status)
            .unwrap();

        let draft = Json(TextRequest {
            text: "My draft".to_string(),
        });
        let status = draft_handler(State(orch.clone()), draft)
            .await
            .map_err(|(status, _)| status)
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(orch.snapshot().await.draft.get(SectionKey::Problem), "My draft");

        let response = match export_handler(State(orch.clone()), Path("md".to_string())).await {
            Ok(response) => response,
            Err((status, _)) => panic!("export failed with {}", status),
        };
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.contains("paper_improved.md"));
    }
}
