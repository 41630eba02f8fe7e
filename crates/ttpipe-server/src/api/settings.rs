//! Per-session AI settings, keyed by the `x-session-id` header.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use ttpipe::sanitize::hash_id;
use ttpipe::{Provider, SessionSettings};

use crate::error::ApiError;
use crate::state::AppState;

const SESSION_HEADER: &str = "x-session-id";
/// Set by the AI middleware when it fetches the credential for a call.
const INTERNAL_HEADER: &str = "x-internal-request";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    pub provider: Provider,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendRequest {
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub provider: Provider,
    pub model: Option<String>,
    pub timeout_minutes: Option<u32>,
    pub has_credential: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl SettingsView {
    fn new(settings: &SessionSettings, reveal_credential: bool) -> Self {
        Self {
            provider: settings.provider,
            model: settings.model.clone(),
            timeout_minutes: settings.timeout_minutes,
            has_credential: settings.credential.is_some(),
            api_key: settings
                .credential
                .as_ref()
                .filter(|_| reveal_credential)
                .map(|c| c.expose_secret().to_string()),
        }
    }
}

fn session_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {} header", SESSION_HEADER)))
}

fn is_internal(headers: &HeaderMap) -> bool {
    headers
        .get(INTERNAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// PUT /api/v1/llm/settings
pub async fn put_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SettingsRequest>,
) -> Result<Json<SettingsView>, ApiError> {
    let session_id = session_id(&headers)?;

    let mut settings = SessionSettings::new(request.provider);
    if let Some(model) = request.model.filter(|m| !m.trim().is_empty()) {
        settings = settings.with_model(model);
    }
    if let Some(key) = request.api_key.filter(|k| !k.is_empty()) {
        settings = settings.with_credential(SecretString::from(key));
    }
    if let Some(minutes) = request.timeout_minutes {
        settings = settings.with_timeout_minutes(minutes);
    }

    if !state.sessions.set_settings(&session_id, &settings, None).await? {
        return Err(ApiError::Unavailable("Session store unavailable".to_string()));
    }
    tracing::info!(session = %hash_id(&session_id), provider = %settings.provider, "Session settings saved");

    Ok(Json(SettingsView::new(&settings, false)))
}

/// GET /api/v1/llm/settings
///
/// `x-internal-request: true` reveals the stored credential. The header is
/// trusted as is: this service must only be reachable from the internal
/// network, behind a gateway that authenticates callers and strips the
/// header from outside traffic.
pub async fn get_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SettingsView>, ApiError> {
    let session_id = session_id(&headers)?;
    let settings = state
        .sessions
        .get_settings(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No settings for this session".to_string()))?;

    Ok(Json(SettingsView::new(&settings, is_internal(&headers))))
}

/// DELETE /api/v1/llm/settings
pub async fn delete_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let session_id = session_id(&headers)?;
    state.sessions.clear(&session_id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/llm/settings/extend
pub async fn extend_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<ExtendRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session_id = session_id(&headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();

    if let Some(minutes) = request.timeout_minutes {
        let allowed = state.sessions.allowed_timeout_minutes();
        if !allowed.contains(&minutes) {
            return Err(ApiError::BadRequest(format!(
                "Session timeout of {} minutes is not allowed (allowed: {:?})",
                minutes, allowed
            )));
        }
    }

    let extended = state
        .sessions
        .extend(&session_id, request.timeout_minutes)
        .await;
    Ok(Json(serde_json::json!({ "extended": extended })))
}
