//! HTTP client for the HR-assistant backend.
//!
//! Carries no session state beyond the configured base URL; the bearer
//! credential is supplied per call by the caller. The HITL submission is a
//! strict one-shot request — non-2xx or transport failure surfaces as an
//! error and is never retried automatically. Idempotent GETs get a small
//! bounded attempt loop.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hrdesk_protocol::{ChatMessage, ChatSummary, MessageRole, derive_chat_title};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_GET_ATTEMPTS: usize = 2;
pub const DEFAULT_CHAT_PAGE_SIZE: usize = 20;

/// API client configuration.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl ApiClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("api_base_url_missing")]
    BaseUrlMissing,
    #[error("api_invalid_path")]
    InvalidPath,
    #[error("api_request_failed:{message}")]
    Request { message: String },
    #[error("api_read_failed:{message}")]
    Read { message: String },
    #[error("api_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("api_json_decode_failed:{message}")]
    Decode { message: String },
}

/// Body of `POST /hitl_response`: the draft fields merged with the
/// conversation and user ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitlResponseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leave_days: Option<u32>,
    pub conversation_id: String,
    pub user_id: String,
}

/// Body of a chat persistence append.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(rename = "type")]
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

/// Body of a chat creation: the derived title plus the first message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateChatRequest {
    pub title: String,
    #[serde(flatten)]
    pub first_message: SendMessageRequest,
}

impl CreateChatRequest {
    /// Build a creation request from the first message, deriving the title.
    pub fn from_first_message(first_message: SendMessageRequest) -> Self {
        Self {
            title: derive_chat_title(&first_message.content),
            first_message,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChatResponse {
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
struct LeaveBalanceResponse {
    leave_balance: u32,
}

/// Result of a document upload.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentUpload {
    pub public_url: String,
    pub stored_name: String,
}

/// The stored object name for an upload: `{unix_millis}_{file_name}`,
/// derived client-side so retried uploads get distinct names.
pub fn stored_document_name(now: DateTime<Utc>, file_name: &str) -> String {
    format!("{}_{}", now.timestamp_millis(), file_name)
}

/// HTTP client carrying the configured base URL and timeout.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    get_attempts: usize,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms),
            get_attempts: DEFAULT_GET_ATTEMPTS,
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn hitl_response_path() -> &'static str {
        "/hitl_response"
    }

    #[must_use]
    pub fn chats_path(offset: usize, limit: usize) -> String {
        format!("/chats?offset={offset}&limit={limit}")
    }

    #[must_use]
    pub fn create_chat_path() -> &'static str {
        "/chats"
    }

    #[must_use]
    pub fn messages_path(chat_id: &str) -> String {
        format!("/chats/{}/messages", chat_id.trim())
    }

    #[must_use]
    pub fn leave_balance_path() -> &'static str {
        "/leave_balance"
    }

    #[must_use]
    pub fn document_path(stored_name: &str) -> String {
        format!("/documents/{}", stored_name.trim())
    }

    /// Finalize a HITL response. Exactly one request; failure is surfaced
    /// and retry is a user-initiated re-invocation.
    pub async fn submit_hitl_response(
        &self,
        request: &HitlResponseRequest,
        access_token: &str,
    ) -> Result<(), ApiError> {
        self.post_ack(Self::hitl_response_path(), request, access_token)
            .await
    }

    /// Append a message to an existing chat.
    pub async fn send_message(
        &self,
        chat_id: &str,
        request: &SendMessageRequest,
        access_token: &str,
    ) -> Result<(), ApiError> {
        self.post_ack(Self::messages_path(chat_id).as_str(), request, access_token)
            .await
    }

    /// Create a chat from its first message.
    pub async fn create_chat(
        &self,
        request: &CreateChatRequest,
        access_token: &str,
    ) -> Result<CreateChatResponse, ApiError> {
        self.post_json(Self::create_chat_path(), request, access_token)
            .await
    }

    /// Authoritative ordered message list for a chat, ascending by creation
    /// time.
    pub async fn fetch_messages(
        &self,
        chat_id: &str,
        access_token: &str,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        self.get_json(Self::messages_path(chat_id).as_str(), access_token)
            .await
    }

    /// Paginated chat summaries for the caller, most recent first.
    pub async fn fetch_chats(
        &self,
        offset: usize,
        limit: usize,
        access_token: &str,
    ) -> Result<Vec<ChatSummary>, ApiError> {
        self.get_json(Self::chats_path(offset, limit).as_str(), access_token)
            .await
    }

    /// Current leave balance in days.
    pub async fn fetch_leave_balance(&self, access_token: &str) -> Result<u32, ApiError> {
        let response: LeaveBalanceResponse =
            self.get_json(Self::leave_balance_path(), access_token).await?;
        Ok(response.leave_balance)
    }

    /// Upload a document, returning its public URL and stored name. No side
    /// effects on the chat timeline; the caller decides what to do with the
    /// URL.
    pub async fn upload_document(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        now: DateTime<Utc>,
        access_token: &str,
    ) -> Result<DocumentUpload, ApiError> {
        let stored_name = stored_document_name(now, file_name);
        let url = self
            .endpoint(Self::document_path(&stored_name).as_str())
            .ok_or(ApiError::InvalidPath)?;

        let response = self
            .http
            .post(url.as_str())
            .header("x-request-id", request_id())
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .body(bytes)
            .send()
            .await
            .map_err(|error| ApiError::Request {
                message: error.to_string(),
            })?;

        decode_json_response(response).await
    }

    async fn post_ack<Req>(
        &self,
        path: &str,
        payload: &Req,
        access_token: &str,
    ) -> Result<(), ApiError>
    where
        Req: Serialize + ?Sized,
    {
        let response = self.send_post(path, payload, access_token).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let bytes = response.bytes().await.map_err(|error| ApiError::Read {
            message: error.to_string(),
        })?;
        Err(format_http_error(status, &bytes))
    }

    async fn post_json<Req, Res>(
        &self,
        path: &str,
        payload: &Req,
        access_token: &str,
    ) -> Result<Res, ApiError>
    where
        Req: Serialize + ?Sized,
        Res: for<'de> serde::Deserialize<'de>,
    {
        let response = self.send_post(path, payload, access_token).await?;
        decode_json_response(response).await
    }

    async fn send_post<Req>(
        &self,
        path: &str,
        payload: &Req,
        access_token: &str,
    ) -> Result<reqwest::Response, ApiError>
    where
        Req: Serialize + ?Sized,
    {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        self.http
            .post(url.as_str())
            .header("x-request-id", request_id())
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|error| ApiError::Request {
                message: error.to_string(),
            })
    }

    async fn get_json<T>(&self, path: &str, access_token: &str) -> Result<T, ApiError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        let mut last_error: Option<String> = None;

        for attempt in 0..self.get_attempts {
            let request = self
                .http
                .get(url.as_str())
                .header("x-request-id", request_id())
                .bearer_auth(access_token)
                .timeout(self.timeout);

            match request.send().await {
                Ok(response) => return decode_json_response(response).await,
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt + 1 >= self.get_attempts {
                        break;
                    }
                }
            }
        }

        Err(ApiError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

fn request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> ApiError {
    let body = non_empty_string(String::from_utf8_lossy(body).to_string())
        .unwrap_or_else(|| "<empty>".to_string());
    ApiError::Http { status, body }
}

fn normalize_base_url(base_url: &str) -> Result<String, ApiError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ApiError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| ApiError::Read {
        message: error.to_string(),
    })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| ApiError::Decode {
        message: error.to_string(),
    })
}

fn non_empty_string(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
