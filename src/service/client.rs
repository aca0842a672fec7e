//! `OrderService` trait and the HTTP implementation.
//!
//! [`HttpOrderService`] talks to the analysis backend over multipart HTTP.
//! All connection details come from [`ServiceConfig`]; nothing is hardcoded.
//!
//! [`MockOrderService`] (available under `#[cfg(test)]`) replays scripted
//! responses and records every call, so the engine and controller can be
//! tested without a server.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::audio::AudioClip;
use crate::config::ServiceConfig;

use super::types::{MenuCategory, OrderData, OrderResponse, ResponseEnvelope, ResponseStatus};

/// Multipart field carrying the recording.
const AUDIO_FIELD: &str = "audio_file";

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

/// Errors from a single remote call.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Connection, DNS, TLS or request-building failure.
    #[error("request failed: {0}")]
    Transport(String),

    /// No response within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The session identifier is unknown or expired on the server.
    #[error("session not found on the server")]
    SessionNotFound,

    /// Non-success HTTP status.
    #[error("service returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// The body was not the expected shape, or reported `status: error`.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else if e.is_decode() {
            ServiceError::Malformed(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// OrderService trait
// ---------------------------------------------------------------------------

/// Remote order analysis.
///
/// Implementors must be `Send + Sync` so they can be shared with spawned
/// request tasks behind an `Arc<dyn OrderService>`.  No method retries on
/// its own: replaying a clip is not idempotent server-side.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Analyse a fresh utterance.  `session_id` continues an established
    /// conversation; without it the server allocates a new one.
    async fn analyze(
        &self,
        clip: &AudioClip,
        session_id: Option<&str>,
    ) -> Result<OrderResponse, ServiceError>;

    /// Answer the pending clarification of `session_id`.
    async fn clarify(&self, clip: &AudioClip, session_id: &str)
        -> Result<OrderResponse, ServiceError>;

    /// Menu categories, in display order.
    async fn menu(&self) -> Result<Vec<MenuCategory>, ServiceError>;
}

// Compile-time assertion: Box<dyn OrderService> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn OrderService>) {}
};

// ---------------------------------------------------------------------------
// HttpOrderService
// ---------------------------------------------------------------------------

/// Multipart-over-HTTP client for the analysis backend.
pub struct HttpOrderService {
    client: reqwest::Client,
    config: ServiceConfig,
}

impl HttpOrderService {
    /// Build a client with the per-request timeout from `config.timeout_secs`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_clip(
        &self,
        path: &str,
        clip: &AudioClip,
        file_prefix: &str,
        session_id: Option<&str>,
        session_required: bool,
    ) -> Result<OrderResponse, ServiceError> {
        let part = Part::bytes(clip.bytes().to_vec())
            .file_name(clip.file_name(file_prefix))
            .mime_str(clip.content_type())?;
        let form = Form::new().part(AUDIO_FIELD, part);

        let mut request = self.client.post(self.url(path)).multipart(form);
        if let Some(id) = session_id {
            request = request.header(self.config.session_header.as_str(), id);
        }

        log::debug!(
            "service: POST {path} ({} bytes, session {:?})",
            clip.len(),
            session_id
        );
        let response = request.send().await?;

        if session_required && response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::SessionNotFound);
        }
        let envelope: ResponseEnvelope<OrderData> = read_json(response).await?;
        OrderResponse::from_envelope(envelope)
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Status {
            code: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn analyze(
        &self,
        clip: &AudioClip,
        session_id: Option<&str>,
    ) -> Result<OrderResponse, ServiceError> {
        self.post_clip(
            &self.config.analyze_path,
            clip,
            "audio_recording",
            session_id,
            false,
        )
        .await
    }

    async fn clarify(
        &self,
        clip: &AudioClip,
        session_id: &str,
    ) -> Result<OrderResponse, ServiceError> {
        self.post_clip(
            &self.config.clarify_path,
            clip,
            "clarification_response",
            Some(session_id),
            true,
        )
        .await
    }

    async fn menu(&self) -> Result<Vec<MenuCategory>, ServiceError> {
        let response = self.client.get(self.url(&self.config.menu_path)).send().await?;
        let envelope: ResponseEnvelope<Vec<MenuCategory>> = read_json(response).await?;
        if envelope.status != ResponseStatus::Success {
            return Err(ServiceError::Malformed("menu request reported error".into()));
        }
        envelope
            .data
            .ok_or_else(|| ServiceError::Malformed("menu response has no data".into()))
    }
}

// ---------------------------------------------------------------------------
// MockOrderService
// ---------------------------------------------------------------------------

/// A call observed by [`MockOrderService`].
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Analyze { session_id: Option<String> },
    Clarify { session_id: String },
    Menu,
}

/// Scripted order service: each `analyze`/`clarify` pops the next queued
/// result.  An exhausted script answers with a transport error.
#[cfg(test)]
#[derive(Default)]
pub struct MockOrderService {
    script: std::sync::Mutex<std::collections::VecDeque<Result<OrderResponse, ServiceError>>>,
    calls: std::sync::Mutex<Vec<ServiceCall>>,
    delay: std::time::Duration,
}

#[cfg(test)]
impl MockOrderService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next result.
    pub fn push(&self, result: Result<OrderResponse, ServiceError>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Wait this long before answering each call.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn answer(&self, call: ServiceCall) -> Result<OrderResponse, ServiceError> {
        self.calls.lock().unwrap().push(call);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(ServiceError::Transport("script exhausted".into())))
    }
}

#[cfg(test)]
#[async_trait]
impl OrderService for MockOrderService {
    async fn analyze(
        &self,
        _clip: &AudioClip,
        session_id: Option<&str>,
    ) -> Result<OrderResponse, ServiceError> {
        self.answer(ServiceCall::Analyze {
            session_id: session_id.map(str::to_string),
        })
        .await
    }

    async fn clarify(
        &self,
        _clip: &AudioClip,
        session_id: &str,
    ) -> Result<OrderResponse, ServiceError> {
        self.answer(ServiceCall::Clarify {
            session_id: session_id.to_string(),
        })
        .await
    }

    async fn menu(&self) -> Result<Vec<MenuCategory>, ServiceError> {
        self.calls.lock().unwrap().push(ServiceCall::Menu);
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
