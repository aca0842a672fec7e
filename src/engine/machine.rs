//! The conversation engine: routes clips to `analyze` or `clarify` and folds
//! each response into the [`OrderSession`].
//!
//! # Turn flow
//!
//! ```text
//! recording_started ──▶ (re-entrancy rule) ──▶ status "listening"
//! submit(clip)      ──▶ guard on, Submitting, pick Analyze | Clarify
//!                        └─ awaiting clarification without session id → NoActiveSession
//! apply(gen, result)
//!   ├─ gen mismatch            → StaleResponse (dropped)
//!   ├─ Err(..)                 → Failed, guard off, retry status, session untouched
//!   └─ Ok(response)
//!        ├─ order / session_id adopted (wholesale)
//!        ├─ casual             → mode unchanged, keep in-progress clarification
//!        ├─ needs clarification
//!        │     ├─ soft prompt  → Fresh, status = prompt
//!        │     ├─ over limit   → Fresh, ask to restate
//!        │     └─ otherwise    → AwaitingClarification, pending = first item
//!        ├─ resolved           → Fresh, status = message, or "item added"
//!        │                       when absent or asking for more items
//!        └─ order_complete     → commit + reset
//! close / reopen    ──▶ commit (close only) + fresh session, generation bump
//! ```
//!
//! The engine performs no I/O.  Every step returns a [`Transition`] and the
//! caller plays speech, renders status and forwards completions.

use crate::audio::{AudioClip, CaptureError};
use crate::config::{AppConfig, ConversationConfig, StatusTexts};
use crate::service::{OrderResponse, OrderService, ServiceError};
use crate::session::{OrderSession, SessionMode};

use super::state::{EngineError, EngineState, Operation, OrderComplete, Submission, Transition};

// ---------------------------------------------------------------------------
// dispatch
// ---------------------------------------------------------------------------

/// Run `operation` against `service`.
pub async fn dispatch(
    service: &dyn OrderService,
    clip: &AudioClip,
    operation: &Operation,
) -> Result<OrderResponse, ServiceError> {
    match operation {
        Operation::Analyze { session_id } => service.analyze(clip, session_id.as_deref()).await,
        Operation::Clarify { session_id } => service.clarify(clip, session_id).await,
    }
}

// ---------------------------------------------------------------------------
// ConversationEngine
// ---------------------------------------------------------------------------

pub struct ConversationEngine {
    session: OrderSession,
    state: EngineState,
    status: String,
    /// Bumped whenever the session is reset; responses carry the value they
    /// were submitted under.
    generation: u64,
    rules: ConversationConfig,
    texts: StatusTexts,
}

impl ConversationEngine {
    pub fn new(rules: ConversationConfig, texts: StatusTexts) -> Self {
        Self {
            session: OrderSession::new(),
            state: EngineState::Idle,
            status: texts.welcome.clone(),
            generation: 0,
            rules,
            texts,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.conversation.clone(), config.texts.clone())
    }

    /// Start from an existing session value.
    pub fn with_session(mut self, session: OrderSession) -> Self {
        self.session = session;
        self
    }

    /// Continue a conversation whose identifier survived a restart.
    pub fn resume(&mut self, session_id: impl Into<String>) -> Transition {
        let session_id = session_id.into();
        log::info!("engine: resuming session {session_id}");
        self.session = OrderSession::resumed(session_id);
        self.state = EngineState::Idle;
        self.status = self.texts.welcome.clone();
        self.snapshot()
    }

    pub fn session(&self) -> &OrderSession {
        &self.session
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current session and status with no side effects attached.
    pub fn snapshot(&self) -> Transition {
        self.transition(None, None)
    }

    fn transition(&self, speech: Option<String>, completion: Option<OrderComplete>) -> Transition {
        Transition {
            session: self.session.clone(),
            status: self.status.clone(),
            speech,
            completion,
        }
    }

    // -----------------------------------------------------------------------
    // Capture events
    // -----------------------------------------------------------------------

    /// The user began a new recording.
    ///
    /// Clears the pending clarification unless the previous response was
    /// small talk or the new recording answers it.
    ///
    /// # Errors
    ///
    /// [`EngineError::Busy`] while a clip is in flight.
    pub fn recording_started(&mut self) -> Result<Transition, EngineError> {
        if self.session.audio_processed_guard || self.state.is_busy() {
            return Err(EngineError::Busy);
        }
        self.state = EngineState::Idle;

        let keep_context =
            self.session.last_response_casual || self.session.is_awaiting_clarification();
        if !keep_context {
            self.session.pending_clarification = None;
        }

        self.status = if self.session.is_awaiting_clarification() {
            self.texts.listening_clarification.clone()
        } else {
            self.texts.listening.clone()
        };
        log::debug!(
            "engine: recording started (mode {:?}, pending kept: {keep_context})",
            self.session.mode
        );
        Ok(self.snapshot())
    }

    /// Surface a capture-layer failure.  The session is not touched.
    pub fn capture_failed(&mut self, error: &CaptureError) -> Transition {
        log::warn!("engine: capture failed: {error}");
        self.status = match error {
            CaptureError::PermissionDenied(_) => self.texts.microphone_denied.clone(),
            CaptureError::DeviceUnavailable(_) => self.texts.microphone_unavailable.clone(),
            CaptureError::EmptyRecording => self.texts.no_speech.clone(),
            CaptureError::AlreadyRecording => self.texts.busy.clone(),
            CaptureError::NotRecording | CaptureError::Encode(_) => self.texts.retry.clone(),
        };
        self.snapshot()
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Claim the guard for `clip` and choose the remote operation.
    ///
    /// # Errors
    ///
    /// [`EngineError::Busy`] while another clip is in flight (nothing
    /// changes).  [`EngineError::NoActiveSession`] when awaiting a
    /// clarification without a session identifier (guard stays clear, no
    /// call is made).
    pub fn submit(&mut self, clip: &AudioClip) -> Result<Submission, EngineError> {
        if self.session.audio_processed_guard || self.state.is_busy() {
            log::debug!("engine: clip rejected, another clip is in flight");
            return Err(EngineError::Busy);
        }

        let operation = match self.session.mode {
            SessionMode::AwaitingClarification => match self.session.session_id.clone() {
                Some(session_id) => Operation::Clarify { session_id },
                None => {
                    log::error!(
                        "engine: awaiting clarification without a session id; \
                         every clip fails until the session is closed or reopened"
                    );
                    self.session.audio_processed_guard = false;
                    self.state = EngineState::Failed;
                    self.status = self.texts.retry.clone();
                    return Err(EngineError::NoActiveSession);
                }
            },
            SessionMode::Fresh => Operation::Analyze {
                session_id: self.session.session_id.clone(),
            },
        };

        self.session.audio_processed_guard = true;
        self.state = EngineState::Submitting;
        self.status = match operation {
            Operation::Analyze { .. } => self.texts.analyzing.clone(),
            Operation::Clarify { .. } => self.texts.processing_clarification.clone(),
        };
        log::debug!(
            "engine: submitting {} byte clip as {:?} (generation {})",
            clip.len(),
            operation,
            self.generation
        );

        Ok(Submission {
            generation: self.generation,
            operation,
        })
    }

    /// Fold the outcome of a submitted clip into the session.
    ///
    /// # Errors
    ///
    /// [`EngineError::StaleResponse`] when `generation` is from a session
    /// that has been closed, or nothing is in flight.  Service failures map
    /// to `MalformedResponse`, `TransportFailure` or `SessionNotFound`; the
    /// status then holds the retry prompt and the session is unchanged apart
    /// from the cleared guard.
    pub fn apply(
        &mut self,
        generation: u64,
        result: Result<OrderResponse, ServiceError>,
    ) -> Result<Transition, EngineError> {
        if generation != self.generation || !self.state.is_busy() {
            log::debug!(
                "engine: dropping stale response (generation {generation}, current {})",
                self.generation
            );
            return Err(EngineError::StaleResponse);
        }

        match result {
            Ok(response) => Ok(self.apply_response(response)),
            Err(e) => {
                let error = EngineError::from(e);
                log::warn!("engine: request failed: {error}");
                self.session.audio_processed_guard = false;
                self.state = EngineState::Failed;
                self.status = self.texts.retry.clone();
                Err(error)
            }
        }
    }

    fn apply_response(&mut self, response: OrderResponse) -> Transition {
        if let Some(order) = response.order.clone() {
            self.session.current_order = Some(order);
        }
        if let Some(id) = response.session_id.clone() {
            self.session.session_id = Some(id);
        }

        let first_item = response.first_clarification().map(str::to_string);

        if response.is_casual_conversation {
            self.session.last_response_casual = true;
            match first_item {
                Some(item) => {
                    self.session.pending_clarification = Some(item);
                    if self.session.session_id.is_some() {
                        self.session.mode = SessionMode::AwaitingClarification;
                    }
                }
                None => self.session.pending_clarification = None,
            }
            self.status = response
                .message
                .clone()
                .unwrap_or_else(|| self.texts.conversing.clone());
        } else if let (true, Some(item)) = (response.needs_clarification, first_item) {
            self.session.last_response_casual = false;
            if self.rules.is_continue_prompt(&item) {
                log::debug!("engine: soft continue prompt, staying fresh");
                self.session.settle();
                self.status = item;
            } else {
                self.session.clarification_turns += 1;
                let limit = self.rules.max_clarification_turns;
                if limit > 0 && self.session.clarification_turns > limit {
                    log::warn!("engine: clarification limit of {limit} reached");
                    self.session.settle();
                    self.status = self.texts.clarification_limit.clone();
                } else {
                    if self.session.session_id.is_some() {
                        self.session.mode = SessionMode::AwaitingClarification;
                    }
                    self.session.pending_clarification = Some(item);
                    self.status = self.texts.clarification_instruction.clone();
                }
            }
        } else {
            self.session.last_response_casual = false;
            self.session.settle();
            let soft_prompt = response.asking_for_more_items
                || response
                    .message
                    .as_deref()
                    .is_some_and(|m| self.rules.is_continue_prompt(m));
            self.status = match (&response.message, soft_prompt) {
                (Some(message), false) => message.clone(),
                _ => self.texts.item_added.clone(),
            };
        }

        self.session.audio_processed_guard = false;
        self.state = EngineState::Idle;
        log::debug!(
            "engine: applied response (mode {:?}, pending {:?})",
            self.session.mode,
            self.session.pending_clarification
        );

        if response.order_complete {
            log::info!("engine: service reported the order complete");
            let mut done = self.close();
            done.speech = response.message;
            return done;
        }
        self.transition(response.message, None)
    }

    /// Submit, call the service and apply the result in one step.
    pub async fn process_clip(
        &mut self,
        clip: &AudioClip,
        service: &dyn OrderService,
    ) -> Result<Transition, EngineError> {
        let submission = self.submit(clip)?;
        let result = dispatch(service, clip, &submission.operation).await;
        self.apply(submission.generation, result)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// End the interaction, committing the order if it has any line.
    pub fn close(&mut self) -> Transition {
        let completion = if self.session.has_order_lines() {
            self.session
                .current_order
                .as_ref()
                .map(|order| OrderComplete {
                    order: order.completed(),
                    session_id: self.session.session_id.clone(),
                })
        } else {
            None
        };

        self.reset();
        self.status = match completion {
            Some(_) => self.texts.order_completed.clone(),
            None => self.texts.session_closed.clone(),
        };
        log::info!(
            "engine: session closed ({})",
            if completion.is_some() { "order committed" } else { "no order" }
        );
        self.transition(None, completion)
    }

    /// Begin a new interaction from an empty session.  Nothing is committed.
    pub fn reopen(&mut self) -> Transition {
        self.reset();
        self.status = self.texts.welcome.clone();
        self.snapshot()
    }

    fn reset(&mut self) {
        self.session = OrderSession::new();
        self.state = EngineState::Idle;
        self.generation += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
