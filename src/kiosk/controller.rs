//! Kiosk controller: drives capture, the conversation engine and the order
//! service from presentation commands.
//!
//! [`KioskController`] owns the [`ConversationEngine`] and the microphone and
//! responds to [`KioskCommand`]s received over a `tokio::sync::mpsc`
//! channel.  Everything the presentation layer needs comes back as
//! [`KioskEvent`]s.
//!
//! # Flow
//!
//! ```text
//! StartRecording ─▶ engine.recording_started ─▶ capture.start
//! StopRecording  ─▶ capture.stop ─▶ engine.submit
//!                     └─▶ spawn(timeout(dispatch))  ──┐
//!                                                     ▼
//! select! { command | call outcome } ─▶ engine.apply ─▶ events
//! Close          ─▶ capture.cancel ─▶ engine.close ─▶ OrderCompleted?
//! ```
//!
//! Remote calls run as spawned tasks so commands (notably `Close`) are
//! handled while a call is outstanding.  A late outcome for a closed
//! session is dropped by the engine's generation check.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::{AudioCapture, CaptureError, CaptureOptions, InputDevice};
use crate::config::AppConfig;
use crate::engine::{dispatch, ConversationEngine, EngineError, OrderComplete, Transition};
use crate::service::{OrderResponse, OrderService, ServiceError};
use crate::session::{OrderSession, SessionStore};

// ---------------------------------------------------------------------------
// Commands / events
// ---------------------------------------------------------------------------

/// Input from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskCommand {
    /// Start a new interaction from an empty session.
    Open,
    StartRecording,
    StopRecording,
    /// Microphone button: start when idle, stop when recording.
    ToggleRecording,
    /// Dismiss the interaction, committing any order.
    Close,
}

/// Output to the presentation layer.
#[derive(Debug, Clone)]
pub enum KioskEvent {
    RecordingStarted,
    RecordingStopped { duration_secs: f32 },
    /// New status line.
    Status { text: String },
    /// Session snapshot for the order summary.
    SessionUpdated { session: OrderSession },
    /// Text to read aloud.
    Speak { text: String },
    OrderCompleted(OrderComplete),
    /// A remote call failed; the session is unchanged and ready for retry.
    Failed { error: EngineError },
    CaptureFailed { error: CaptureError },
    /// A command was refused without any state change.
    Rejected { reason: String },
}

struct CallOutcome {
    generation: u64,
    result: Result<OrderResponse, ServiceError>,
}

// ---------------------------------------------------------------------------
// KioskController
// ---------------------------------------------------------------------------

/// Single-threaded cooperative controller for one kiosk.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_order_kiosk::audio::CpalDevice;
/// use voice_order_kiosk::config::AppConfig;
/// use voice_order_kiosk::kiosk::{KioskCommand, KioskController};
/// use voice_order_kiosk::service::HttpOrderService;
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let service = Arc::new(HttpOrderService::from_config(&config.service));
/// let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(64);
/// let (command_tx, command_rx) = tokio::sync::mpsc::channel(16);
///
/// let controller = KioskController::new(&config, CpalDevice::new(), service, event_tx);
/// command_tx.send(KioskCommand::ToggleRecording).await.unwrap();
/// controller.run(command_rx).await;
/// # }
/// ```
pub struct KioskController<D: InputDevice> {
    engine: ConversationEngine,
    capture: AudioCapture<D>,
    service: Arc<dyn OrderService>,
    events: mpsc::Sender<KioskEvent>,
    store: Option<SessionStore>,
    /// Identifier currently written to the store.
    persisted_id: Option<String>,
    resume_persisted: bool,
    request_timeout: Duration,
    recording_since: Option<Instant>,
    in_flight: usize,
}

impl<D: InputDevice> KioskController<D> {
    pub fn new(
        config: &AppConfig,
        device: D,
        service: Arc<dyn OrderService>,
        events: mpsc::Sender<KioskEvent>,
    ) -> Self {
        Self {
            engine: ConversationEngine::from_config(config),
            capture: AudioCapture::new(device, CaptureOptions::from_config(&config.audio)),
            service,
            events,
            store: None,
            persisted_id: None,
            resume_persisted: config.conversation.resume_persisted_session,
            request_timeout: config.service.timeout(),
            recording_since: None,
            in_flight: 0,
        }
    }

    /// Persist the session identifier in `store`, resuming a stored one if
    /// the configuration allows it.
    pub fn with_store(mut self, store: SessionStore) -> Self {
        if self.resume_persisted {
            match store.load() {
                Ok(Some(id)) => {
                    self.engine.resume(id.clone());
                    self.persisted_id = Some(id);
                }
                Ok(None) => {}
                Err(e) => log::warn!("kiosk: could not read {}: {e}", store.path().display()),
            }
        }
        self.store = Some(store);
        self
    }

    /// Override the per-call deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Run until `commands` is closed and every outstanding call has been
    /// applied or discarded.
    pub async fn run(mut self, mut commands: mpsc::Receiver<KioskCommand>) {
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<CallOutcome>(4);
        let mut accepting = true;

        self.emit(self.engine.snapshot()).await;

        loop {
            tokio::select! {
                command = commands.recv(), if accepting => match command {
                    Some(command) => self.handle_command(command, &outcome_tx).await,
                    None => {
                        log::info!("kiosk: command channel closed");
                        accepting = false;
                    }
                },
                Some(outcome) = outcome_rx.recv(), if self.in_flight > 0 => {
                    self.in_flight -= 1;
                    self.handle_outcome(outcome).await;
                }
                else => break,
            }

            if !accepting && self.in_flight == 0 {
                break;
            }
        }

        if self.capture.cancel() {
            log::debug!("kiosk: released microphone on shutdown");
        }
        log::info!("kiosk: controller shutting down");
    }

    // -----------------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------------

    async fn handle_command(
        &mut self,
        command: KioskCommand,
        outcomes: &mpsc::Sender<CallOutcome>,
    ) {
        log::debug!("kiosk: {command:?}");
        match command {
            KioskCommand::Open => self.handle_open().await,
            KioskCommand::StartRecording => self.handle_start().await,
            KioskCommand::StopRecording => self.handle_stop(outcomes).await,
            KioskCommand::ToggleRecording => {
                if self.capture.is_recording() {
                    self.handle_stop(outcomes).await;
                } else {
                    self.handle_start().await;
                }
            }
            KioskCommand::Close => self.handle_close().await,
        }
    }

    async fn handle_open(&mut self) {
        self.capture.cancel();
        self.recording_since = None;
        let transition = self.engine.reopen();
        self.forget_session();
        self.emit(transition).await;
    }

    async fn handle_start(&mut self) {
        if self.capture.is_recording() {
            self.send(KioskEvent::Rejected {
                reason: CaptureError::AlreadyRecording.to_string(),
            })
            .await;
            return;
        }

        let transition = match self.engine.recording_started() {
            Ok(t) => t,
            Err(e) => {
                self.send(KioskEvent::Rejected {
                    reason: e.to_string(),
                })
                .await;
                return;
            }
        };

        match self.capture.start() {
            Ok(()) => {
                self.recording_since = Some(Instant::now());
                self.send(KioskEvent::RecordingStarted).await;
                self.emit(transition).await;
            }
            Err(e) => self.capture_failed(e).await,
        }
    }

    async fn handle_stop(&mut self, outcomes: &mpsc::Sender<CallOutcome>) {
        if !self.capture.is_recording() {
            log::debug!("kiosk: stop ignored, not recording");
            return;
        }

        let result = self.capture.stop().await;
        let duration_secs = self
            .recording_since
            .take()
            .map(|t| t.elapsed().as_secs_f32())
            .unwrap_or_default();
        self.send(KioskEvent::RecordingStopped { duration_secs }).await;

        let clip = match result {
            Ok(clip) => clip,
            Err(e) => {
                self.capture_failed(e).await;
                return;
            }
        };

        let submission = match self.engine.submit(&clip) {
            Ok(submission) => submission,
            Err(EngineError::Busy) => {
                self.send(KioskEvent::Rejected {
                    reason: EngineError::Busy.to_string(),
                })
                .await;
                return;
            }
            Err(error) => {
                self.send(KioskEvent::Failed { error }).await;
                self.emit(self.engine.snapshot()).await;
                return;
            }
        };
        self.emit(self.engine.snapshot()).await;

        let service = Arc::clone(&self.service);
        let deadline = self.request_timeout;
        let tx = outcomes.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let call = dispatch(service.as_ref(), &clip, &submission.operation);
            let result = match tokio::time::timeout(deadline, call).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!("kiosk: request exceeded {deadline:?}");
                    Err(ServiceError::Timeout)
                }
            };
            let _ = tx
                .send(CallOutcome {
                    generation: submission.generation,
                    result,
                })
                .await;
        });
    }

    async fn handle_close(&mut self) {
        if self.capture.cancel() {
            self.recording_since = None;
            self.send(KioskEvent::RecordingStopped { duration_secs: 0.0 })
                .await;
        }
        let transition = self.engine.close();
        self.forget_session();
        self.emit(transition).await;
    }

    async fn handle_outcome(&mut self, outcome: CallOutcome) {
        let applied = self.engine.apply(outcome.generation, outcome.result);
        log::debug!("kiosk: engine {}", self.engine.state().label());
        match applied {
            Ok(transition) => {
                if transition.completion.is_some() {
                    self.forget_session();
                } else if let Some(id) = transition.session.session_id.clone() {
                    self.remember_session(id);
                }
                self.emit(transition).await;
            }
            Err(EngineError::StaleResponse) => {
                log::debug!("kiosk: discarded response for a closed session");
            }
            Err(error) => {
                self.send(KioskEvent::Failed { error }).await;
                self.emit(self.engine.snapshot()).await;
            }
        }
    }

    async fn capture_failed(&mut self, error: CaptureError) {
        let transition = self.engine.capture_failed(&error);
        self.send(KioskEvent::CaptureFailed { error }).await;
        self.emit(transition).await;
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    fn remember_session(&mut self, id: String) {
        if self.persisted_id.as_deref() == Some(id.as_str()) {
            return;
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&id) {
                log::warn!("kiosk: could not persist session id: {e}");
            }
        }
        self.persisted_id = Some(id);
    }

    fn forget_session(&mut self) {
        self.persisted_id = None;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                log::warn!("kiosk: could not clear persisted session id: {e}");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Event output
    // -----------------------------------------------------------------------

    async fn emit(&self, transition: Transition) {
        let Transition {
            session,
            status,
            speech,
            completion,
        } = transition;

        self.send(KioskEvent::SessionUpdated { session }).await;
        self.send(KioskEvent::Status { text: status }).await;
        if let Some(text) = speech {
            self.send(KioskEvent::Speak { text }).await;
        }
        if let Some(done) = completion {
            log::info!(
                "kiosk: order complete, {} line(s), total {}",
                done.order.items.len(),
                done.order.total_price
            );
            self.send(KioskEvent::OrderCompleted(done)).await;
        }
    }

    async fn send(&self, event: KioskEvent) {
        // The presentation layer may already be gone during shutdown.
        let _ = self.events.send(event).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;
    use crate::audio::MockInputDevice;
    use crate::config::StatusTexts;
    use crate::service::{MockOrderService, Order, OrderLine, ServiceCall};

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.audio.flush_ms = 0;
        config
    }

    fn americano() -> Order {
        Order {
            items: vec![OrderLine {
                name: "아메리카노".into(),
                quantity: 1,
                options: vec![],
                price: 4000,
            }],
            total_price: 4000,
            ..Order::default()
        }
    }

    fn resolved(session_id: Option<&str>) -> OrderResponse {
        OrderResponse {
            message: Some("아메리카노 1잔 추가했습니다.".into()),
            order: Some(americano()),
            session_id: session_id.map(str::to_string),
            ..OrderResponse::default()
        }
    }

    fn kiosk(
        device: MockInputDevice,
        service: Arc<MockOrderService>,
    ) -> (KioskController<MockInputDevice>, mpsc::Receiver<KioskEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let controller = KioskController::new(&config(), device, service, event_tx);
        (controller, event_rx)
    }

    async fn collect(mut rx: mpsc::Receiver<KioskEvent>) -> Vec<KioskEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    /// Receive until `pred` matches, failing the test after a second.
    async fn wait_for(
        rx: &mut mpsc::Receiver<KioskEvent>,
        pred: impl Fn(&KioskEvent) -> bool,
    ) -> KioskEvent {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match rx.recv().await {
                    Some(event) if pred(&event) => return event,
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    fn statuses(events: &[KioskEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                KioskEvent::Status { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn recorded_turn_updates_order_and_speaks() {
        let service = Arc::new(MockOrderService::new());
        service.push(Ok(resolved(Some("s-1"))));
        let (controller, rx) = kiosk(
            MockInputDevice::new().with_recording(0.5),
            Arc::clone(&service),
        );

        let (tx, cmd_rx) = mpsc::channel(16);
        tx.send(KioskCommand::ToggleRecording).await.unwrap();
        tx.send(KioskCommand::ToggleRecording).await.unwrap();
        drop(tx);
        controller.run(cmd_rx).await;

        let events = collect(rx).await;
        let texts = StatusTexts::default();
        let status = statuses(&events);
        assert!(status.contains(&texts.listening.as_str()));
        assert!(status.contains(&texts.analyzing.as_str()));
        assert_eq!(status.last(), Some(&"아메리카노 1잔 추가했습니다."));

        assert!(events.iter().any(|e| matches!(e, KioskEvent::RecordingStarted)));
        assert!(events
            .iter()
            .any(|e| matches!(e, KioskEvent::Speak { text } if text.contains("아메리카노"))));
        assert!(events.iter().any(|e| matches!(
            e,
            KioskEvent::SessionUpdated { session } if session.has_order_lines()
        )));
        assert_eq!(service.calls(), vec![ServiceCall::Analyze { session_id: None }]);
    }

    #[tokio::test]
    async fn close_commits_the_order() {
        let service = Arc::new(MockOrderService::new());
        service.push(Ok(resolved(Some("s-1"))));
        let (controller, mut rx) = kiosk(
            MockInputDevice::new().with_recording(0.3),
            Arc::clone(&service),
        );

        let (tx, cmd_rx) = mpsc::channel(16);
        let handle = tokio::spawn(controller.run(cmd_rx));

        tx.send(KioskCommand::StartRecording).await.unwrap();
        tx.send(KioskCommand::StopRecording).await.unwrap();
        wait_for(&mut rx, |e| matches!(e, KioskEvent::Speak { .. })).await;

        tx.send(KioskCommand::Close).await.unwrap();
        let event = wait_for(&mut rx, |e| matches!(e, KioskEvent::OrderCompleted(_))).await;
        let KioskEvent::OrderCompleted(done) = event else {
            unreachable!()
        };
        assert!(done.order.order_complete);
        assert_eq!(done.order.items, americano().items);

        drop(tx);
        handle.await.unwrap();
        let rest = collect(rx).await;
        assert!(!rest
            .iter()
            .any(|e| matches!(e, KioskEvent::OrderCompleted(_))));
    }

    #[tokio::test]
    async fn late_response_after_close_is_discarded() {
        let service = Arc::new(MockOrderService::new().with_delay(Duration::from_millis(50)));
        service.push(Ok(resolved(Some("s-1"))));
        let (controller, rx) = kiosk(
            MockInputDevice::new().with_recording(0.3),
            Arc::clone(&service),
        );

        let (tx, cmd_rx) = mpsc::channel(16);
        tx.send(KioskCommand::StartRecording).await.unwrap();
        tx.send(KioskCommand::StopRecording).await.unwrap();
        tx.send(KioskCommand::Close).await.unwrap();
        drop(tx);
        controller.run(cmd_rx).await;

        let events = collect(rx).await;
        assert_eq!(service.calls().len(), 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, KioskEvent::OrderCompleted(_))));
        assert!(!events.iter().any(|e| matches!(e, KioskEvent::Speak { .. })));
        assert_eq!(
            statuses(&events).last(),
            Some(&StatusTexts::default().session_closed.as_str())
        );
    }

    #[tokio::test]
    async fn recording_while_in_flight_is_rejected() {
        let service = Arc::new(MockOrderService::new().with_delay(Duration::from_millis(50)));
        service.push(Ok(resolved(Some("s-1"))));
        let device = MockInputDevice::new().with_recording(0.3).with_recording(0.3);
        let probe = Arc::clone(&device.probe);
        let (controller, rx) = kiosk(device, Arc::clone(&service));

        let (tx, cmd_rx) = mpsc::channel(16);
        tx.send(KioskCommand::StartRecording).await.unwrap();
        tx.send(KioskCommand::StopRecording).await.unwrap();
        tx.send(KioskCommand::StartRecording).await.unwrap();
        drop(tx);
        controller.run(cmd_rx).await;

        let events = collect(rx).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, KioskEvent::Rejected { .. })));
        assert_eq!(service.calls().len(), 1);
        assert_eq!(probe.opened(), 1);
        assert_eq!(probe.released(), 1);
    }

    #[tokio::test]
    async fn denied_microphone_surfaces_status() {
        let service = Arc::new(MockOrderService::new());
        let (controller, rx) = kiosk(MockInputDevice::denied(), Arc::clone(&service));

        let (tx, cmd_rx) = mpsc::channel(16);
        tx.send(KioskCommand::StartRecording).await.unwrap();
        drop(tx);
        controller.run(cmd_rx).await;

        let events = collect(rx).await;
        assert!(events.iter().any(|e| matches!(
            e,
            KioskEvent::CaptureFailed {
                error: CaptureError::PermissionDenied(_)
            }
        )));
        assert_eq!(
            statuses(&events).last(),
            Some(&StatusTexts::default().microphone_denied.as_str())
        );
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn slow_service_times_out_and_allows_retry() {
        let service = Arc::new(MockOrderService::new().with_delay(Duration::from_millis(500)));
        let (controller, rx) = kiosk(
            MockInputDevice::new().with_recording(0.3),
            Arc::clone(&service),
        );
        let controller = controller.with_request_timeout(Duration::from_millis(20));

        let (tx, cmd_rx) = mpsc::channel(16);
        tx.send(KioskCommand::StartRecording).await.unwrap();
        tx.send(KioskCommand::StopRecording).await.unwrap();
        drop(tx);
        controller.run(cmd_rx).await;

        let events = collect(rx).await;
        assert!(events.iter().any(|e| matches!(
            e,
            KioskEvent::Failed {
                error: EngineError::TransportFailure(_)
            }
        )));
        let last_session = events
            .iter()
            .rev()
            .find_map(|e| match e {
                KioskEvent::SessionUpdated { session } => Some(session.clone()),
                _ => None,
            })
            .unwrap();
        assert!(!last_session.audio_processed_guard);
        assert_eq!(
            statuses(&events).last(),
            Some(&StatusTexts::default().retry.as_str())
        );
    }

    #[tokio::test]
    async fn session_id_is_persisted_and_resumed() {
        let dir = tempdir().expect("temp dir");
        let store = SessionStore::at(dir.path().join("session.toml"));

        let service = Arc::new(MockOrderService::new());
        service.push(Ok(resolved(Some("s-42"))));
        let (controller, _rx) = kiosk(
            MockInputDevice::new().with_recording(0.3),
            Arc::clone(&service),
        );
        let controller = controller.with_store(store.clone());

        let (tx, cmd_rx) = mpsc::channel(16);
        tx.send(KioskCommand::StartRecording).await.unwrap();
        tx.send(KioskCommand::StopRecording).await.unwrap();
        drop(tx);
        controller.run(cmd_rx).await;
        assert_eq!(store.load().unwrap().as_deref(), Some("s-42"));

        // a restarted kiosk continues the same server-side conversation
        let service = Arc::new(MockOrderService::new());
        service.push(Ok(resolved(None)));
        let (controller, _rx) = kiosk(
            MockInputDevice::new().with_recording(0.3),
            Arc::clone(&service),
        );
        let controller = controller.with_store(store.clone());
        assert_eq!(
            controller.engine().session().session_id.as_deref(),
            Some("s-42")
        );

        let (tx, cmd_rx) = mpsc::channel(16);
        tx.send(KioskCommand::StartRecording).await.unwrap();
        tx.send(KioskCommand::StopRecording).await.unwrap();
        tx.send(KioskCommand::Close).await.unwrap();
        drop(tx);
        controller.run(cmd_rx).await;

        assert_eq!(
            service.calls(),
            vec![ServiceCall::Analyze {
                session_id: Some("s-42".into())
            }]
        );
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn close_while_recording_releases_microphone() {
        let service = Arc::new(MockOrderService::new());
        let device = MockInputDevice::new().with_recording(0.3);
        let probe = Arc::clone(&device.probe);
        let (controller, rx) = kiosk(device, Arc::clone(&service));

        let (tx, cmd_rx) = mpsc::channel(16);
        tx.send(KioskCommand::StartRecording).await.unwrap();
        tx.send(KioskCommand::Close).await.unwrap();
        drop(tx);
        controller.run(cmd_rx).await;

        assert_eq!(probe.released(), 1);
        assert!(service.calls().is_empty());
        let events = collect(rx).await;
        assert!(!events
            .iter()
            .any(|e| matches!(e, KioskEvent::OrderCompleted(_))));
    }
}
