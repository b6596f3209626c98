//! Axum route handlers for the Evaluation API.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::evaluation::assessment::SELECTION_THRESHOLD_PCT;
use crate::evaluation::domain::{ApplicationInput, EvaluationResult};
use crate::evaluation::service::evaluate;
use crate::report::{export_filename, export_json, render_markdown, ReportView};
use crate::rubric::Criterion;
use crate::session::SessionContext;
use crate::state::AppState;

/// Header carrying the completion credential when it is not in the body.
pub const API_KEY_HEADER: &str = "x-api-key";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CriteriaResponse {
    pub criteria: Vec<Criterion>,
    pub max_score: u32,
    pub selection_threshold_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: Uuid,
    pub processing: bool,
    pub has_result: bool,
    pub created_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl From<&SessionContext> for SessionStatusResponse {
    fn from(session: &SessionContext) -> Self {
        Self {
            session_id: session.id,
            processing: session.processing,
            has_result: session.last_result.is_some(),
            created_at: session.created_at,
            evaluated_at: session.evaluated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub application_text: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub session_id: Uuid,
    pub result: EvaluationResult,
    pub report: ReportView,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/criteria
pub async fn handle_list_criteria(State(state): State<AppState>) -> Json<CriteriaResponse> {
    Json(CriteriaResponse {
        criteria: state.rubric.all().to_vec(),
        max_score: state.rubric.max_score(),
        selection_threshold_pct: SELECTION_THRESHOLD_PCT,
    })
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionStatusResponse>), AppError> {
    let session = state.sessions.create()?;
    Ok((StatusCode::CREATED, Json(SessionStatusResponse::from(&session))))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionStatusResponse>, AppError> {
    let session = state.sessions.get(session_id)?;
    Ok(Json(SessionStatusResponse::from(&session)))
}

/// POST /api/v1/sessions/:id/evaluate
///
/// Evaluates pasted application text. Blocks until the completion endpoint answers.
pub async fn handle_evaluate(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, AppError> {
    let credential = resolve_credential(request.api_key, &headers, &state);
    run_session_evaluation(state, session_id, request.application_text, credential).await
}

/// POST /api/v1/sessions/:id/evaluate/upload
///
/// Multipart form: `file` (UTF-8 plain text) and optional `api_key`.
pub async fn handle_evaluate_upload(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<EvaluateResponse>, AppError> {
    let mut application_text: Option<String> = None;
    let mut api_key: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart body", e, &state))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                if let Some(file_name) = field.file_name().map(str::to_string) {
                    if !file_name.to_lowercase().ends_with(".txt") {
                        return Err(AppError::Validation(format!(
                            "Only .txt files are accepted, got {file_name}"
                        )));
                    }
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read upload", e, &state))?;
                let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
                    AppError::Validation("Uploaded file must be UTF-8 text".to_string())
                })?;
                application_text = Some(text);
            }
            Some("api_key") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Invalid api_key field", e, &state))?;
                api_key = Some(value);
            }
            _ => {}
        }
    }

    let credential = resolve_credential(api_key, &headers, &state);
    run_session_evaluation(
        state,
        session_id,
        application_text.unwrap_or_default(),
        credential,
    )
    .await
}

/// GET /api/v1/sessions/:id/report
///
/// JSON `ReportView` by default, markdown with `?format=markdown`.
pub async fn handle_get_report(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let result = last_result(&state, session_id)?;

    match query.format.as_deref() {
        None | Some("json") => Ok(Json(ReportView::new(&result, &state.rubric)).into_response()),
        Some("markdown") | Some("md") => Ok((
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            render_markdown(&result, &state.rubric),
        )
            .into_response()),
        Some(other) => Err(AppError::Validation(format!(
            "Unknown report format '{other}' (expected json or markdown)"
        ))),
    }
}

/// GET /api/v1/sessions/:id/export
///
/// Downloads the raw evaluation as indented JSON.
pub async fn handle_export(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let result = last_result(&state, session_id)?;
    let body = export_json(&result).map_err(|e| AppError::Internal(e.into()))?;
    let disposition = content_disposition(&export_filename(&result));
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid Content-Disposition: {e}")))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

/// Body value, then `x-api-key` header, then the server default.
fn resolve_credential(
    body_key: Option<String>,
    headers: &HeaderMap,
    state: &AppState,
) -> Option<String> {
    let non_blank = |v: &str| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    };

    body_key
        .as_deref()
        .and_then(non_blank)
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(non_blank)
        })
        .or_else(|| state.config.openai_api_key.clone())
}

/// Checks out the session, evaluates, and checks it back in.
///
/// Runs on its own task, which completes and checks the session back in even
/// if the client disconnects.
async fn run_session_evaluation(
    state: AppState,
    session_id: Uuid,
    application_text: String,
    credential: Option<String>,
) -> Result<Json<EvaluateResponse>, AppError> {
    let mut session = state.sessions.checkout(session_id)?;

    let task_state = state.clone();
    let task = tokio::spawn(async move {
        let input = ApplicationInput::new(application_text);
        let outcome = evaluate(
            &mut session,
            &input,
            credential.as_deref(),
            task_state.llm.as_ref(),
            &task_state.rubric,
        )
        .await;
        let checked_in = task_state.sessions.checkin(session);
        checked_in.and(outcome)
    });

    let result = task
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("evaluation task failed: {e}")))??;

    let report = ReportView::new(&result, &state.rubric);
    Ok(Json(EvaluateResponse {
        session_id,
        result,
        report,
    }))
}

/// Body-limit failures become `PayloadTooLarge`, anything else `Validation`.
fn multipart_error(context: &str, err: MultipartError, state: &AppState) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!(
            "Upload exceeds the limit of {} bytes",
            state.config.max_upload_bytes
        ))
    } else {
        AppError::Validation(format!("{context}: {err}"))
    }
}

fn last_result(state: &AppState, session_id: Uuid) -> Result<EvaluationResult, AppError> {
    state
        .sessions
        .get(session_id)?
        .last_result
        .ok_or_else(|| AppError::NotFound(format!("Session {session_id} has no evaluation yet")))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();

    let mut encoded = String::new();
    for byte in filename.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
