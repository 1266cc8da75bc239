//! Dashboard sync loop: polls the camera, reconciles the view, and forwards
//! user actions as control requests.

pub mod bus;
pub mod poller;
pub mod reconciler;
pub mod region;
pub mod selection;

use std::sync::Arc;

use ccd_client::CameraApi;
use ccd_ops::PollStats;
use ccd_types::{
    api::CameraCommand,
    config::{PollConfig, UiConfig},
    events::{CommandEvent, DashboardEvent, LifecyclePhase},
    geometry::{DisplayRect, DisplaySize, SensorRect},
    view::{DashboardView, SelectionTarget},
    CcdError, Result,
};
use chrono::{Local, Utc};
use tokio::{sync::mpsc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    bus::EventSink,
    poller::{fetch_once, PollOutcome, PollResult, Poller},
    reconciler::{Reconciler, RenderContext},
    selection::SelectMode,
};

const CHANNEL_CAPACITY: usize = 64;

/// Requests coming from the user interface.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    SetExposureTime(f64),
    SetCoolerSetpoint(f64),
    /// Starts the cooler at the configured setpoint.
    StartCooler,
    StartExposure,
    ToggleContinuous,
    /// Saves the current image under a timestamped name.
    SaveImage,
    ToggleAutoSave,
    SetSubframe(SensorRect),
    ClearSubframe,
    SetRoi(SensorRect),
    ClearRoi,
    BeginSelection(SelectionTarget),
    CompleteSelection(DisplayRect),
    CancelSelection,
    ResizePreview(DisplaySize),
    Shutdown,
}

/// Owns every piece of mutable session state. All mutation happens on the
/// task running [`DashboardSync::run`].
pub struct DashboardSync<A, S>
where
    A: CameraApi + 'static,
    S: EventSink,
{
    api: Arc<A>,
    sink: S,
    stats: PollStats,
    poll: PollConfig,
    ui: UiConfig,
    reconciler: Reconciler,
    poller: Poller,
    mode: SelectMode,
    preview: DisplaySize,
    last_applied_seq: u64,
    poll_tx: mpsc::Sender<PollOutcome>,
    poll_rx: Option<mpsc::Receiver<PollOutcome>>,
    done_tx: mpsc::Sender<CommandEvent>,
    done_rx: Option<mpsc::Receiver<CommandEvent>>,
}

impl<A, S> DashboardSync<A, S>
where
    A: CameraApi + 'static,
    S: EventSink,
{
    pub fn new(
        api: Arc<A>,
        sink: S,
        stats: PollStats,
        poll: PollConfig,
        ui: UiConfig,
        preview: DisplaySize,
    ) -> Self {
        let (poll_tx, poll_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (done_tx, done_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let reconciler = Reconciler::new(api.base_url());
        Self {
            api,
            sink,
            poller: Poller::new(stats.clone()),
            stats,
            poll,
            ui,
            reconciler,
            mode: SelectMode::default(),
            preview,
            last_applied_seq: 0,
            poll_tx,
            poll_rx: Some(poll_rx),
            done_tx,
            done_rx: Some(done_rx),
        }
    }

    pub fn view(&self) -> &DashboardView {
        self.reconciler.view()
    }

    pub fn mode(&self) -> SelectMode {
        self.mode
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub async fn run(mut self, mut actions: mpsc::Receiver<UserAction>) -> Result<()> {
        let (Some(mut poll_rx), Some(mut done_rx)) = (self.poll_rx.take(), self.done_rx.take())
        else {
            return Err(sync_error("sync loop already consumed its channels"));
        };

        self.start_polling();
        self.sink
            .publish(DashboardEvent::lifecycle(
                LifecyclePhase::Started,
                Some(format!("polling {}", self.api.base_url())),
            ))
            .await?;

        loop {
            tokio::select! {
                Some(outcome) = poll_rx.recv() => self.handle_poll(outcome).await?,
                Some(done) = done_rx.recv() => self.handle_completion(done).await?,
                action = actions.recv() => match action {
                    Some(UserAction::Shutdown) | None => break,
                    Some(action) => self.handle_action(action).await?,
                },
            }
        }

        self.poller.stop();
        self.sink
            .publish(DashboardEvent::lifecycle(LifecyclePhase::Shutdown, None))
            .await?;
        info!("Sync loop finished");
        Ok(())
    }

    pub async fn handle_poll(&mut self, outcome: PollOutcome) -> Result<()> {
        match outcome.result {
            PollResult::Snapshot(snapshot) => {
                if outcome.seq <= self.last_applied_seq {
                    debug!(
                        "discarding response #{} older than applied #{}",
                        outcome.seq, self.last_applied_seq
                    );
                    self.stats.record_stale().await;
                    return Ok(());
                }
                self.last_applied_seq = outcome.seq;
                let ctx = self.render_context();
                self.reconciler.apply(&snapshot, &ctx);
                self.reconciler.session_mut().connection_lost = false;
                self.stats.record_applied().await;
                self.publish_view().await
            }
            PollResult::Malformed(reason) => {
                debug!("dropping poll #{}: {}", outcome.seq, reason);
                self.stats.record_dropped().await;
                Ok(())
            }
            PollResult::Failed(err) => {
                let failures = self.stats.record_failed().await;
                debug!("poll #{} failed ({} in a row): {}", outcome.seq, failures, err);
                let session = self.reconciler.session_mut();
                if failures >= self.poll.failure_threshold && !session.connection_lost {
                    warn!("camera unreachable after {} attempts: {}", failures, err);
                    session.connection_lost = true;
                    return self.publish_view().await;
                }
                Ok(())
            }
        }
    }

    pub async fn handle_action(&mut self, action: UserAction) -> Result<()> {
        match action {
            UserAction::SetExposureTime(seconds) => {
                if seconds.is_finite() && seconds > 0.0 {
                    self.dispatch(CameraCommand::SetExposureTime(seconds)).await
                } else {
                    warn!("ignoring exposure time {}", seconds);
                    Ok(())
                }
            }
            UserAction::SetCoolerSetpoint(setpoint) => {
                self.ui.cooler_setpoint_c = setpoint;
                self.dispatch(CameraCommand::SetCooler(setpoint)).await
            }
            UserAction::StartCooler => {
                if self.view().cooler_active {
                    warn!("cooler already running; the server offers no stop request");
                    return Ok(());
                }
                self.dispatch(CameraCommand::SetCooler(self.ui.cooler_setpoint_c))
                    .await
            }
            UserAction::StartExposure => {
                if !self.view().capture_enabled {
                    debug!("capture disabled while the camera is busy");
                    return Ok(());
                }
                self.dispatch(CameraCommand::StartExposure).await
            }
            UserAction::ToggleContinuous => {
                let session = self.reconciler.session_mut();
                session.continuous = !session.continuous;
                let command = if session.continuous {
                    CameraCommand::StartContinuousExposures
                } else {
                    CameraCommand::StopContinuousExposures
                };
                self.dispatch(command).await
            }
            UserAction::SaveImage => {
                let name = format!(
                    "{}_{}",
                    self.ui.save_prefix,
                    Local::now().format("%Y%m%d_%H%M%S")
                );
                self.dispatch(CameraCommand::SaveImage(name)).await
            }
            UserAction::ToggleAutoSave => {
                let session = self.reconciler.session_mut();
                let command = match session.autosave.take() {
                    Some(_) => CameraCommand::StopAutoSave,
                    None => {
                        session.autosave = Some(self.ui.save_prefix.clone());
                        CameraCommand::StartAutoSave(self.ui.save_prefix.clone())
                    }
                };
                self.dispatch(command).await
            }
            UserAction::SetSubframe(rect) => self.dispatch(CameraCommand::SetSubframe(rect)).await,
            UserAction::ClearSubframe => self.dispatch(CameraCommand::ClearSubframe).await,
            UserAction::SetRoi(rect) => self.dispatch(CameraCommand::SetRoi(rect)).await,
            UserAction::ClearRoi => self.dispatch(CameraCommand::ClearRoi).await,
            UserAction::BeginSelection(target) => self.begin_selection(target).await,
            UserAction::CompleteSelection(rect) => self.complete_selection(rect).await,
            UserAction::CancelSelection => {
                if self.mode.cancel() {
                    info!("selection cancelled");
                    self.resume_polling().await?;
                }
                Ok(())
            }
            UserAction::ResizePreview(size) => {
                self.preview = size;
                let ctx = self.render_context();
                self.reconciler.relayout(&ctx);
                self.publish_view().await
            }
            UserAction::Shutdown => Ok(()),
        }
    }

    pub async fn handle_completion(&mut self, done: CommandEvent) -> Result<()> {
        let session = self.reconciler.session_mut();
        session.loading = session.loading.saturating_sub(1);
        match &done.error {
            None => debug!("{} completed", done.path),
            Some(err) => warn!("{} failed: {}", done.path, err),
        }
        self.sink.publish(DashboardEvent::command(done)).await?;
        self.publish_view().await
    }

    async fn begin_selection(&mut self, target: SelectionTarget) -> Result<()> {
        if !self.mode.begin(target) {
            return Ok(());
        }
        self.poller.stop();
        self.reconciler.session_mut().selecting = Some(target);
        let ctx = self.render_context();
        self.reconciler.relayout(&ctx);
        self.sink
            .publish(DashboardEvent::lifecycle(
                LifecyclePhase::PollingSuspended,
                Some(format!("selecting {target:?}")),
            ))
            .await?;
        self.publish_view().await
    }

    async fn complete_selection(&mut self, rect: DisplayRect) -> Result<()> {
        let subframe = self.view().subframe;
        let Some(outcome) = self.mode.complete(rect, subframe, self.preview) else {
            debug!("selection completed while not selecting; ignored");
            return Ok(());
        };
        if let Some(command) = outcome.command {
            info!("{:?} selection -> {}", outcome.target, command);
            self.dispatch(command).await?;
        }
        self.resume_polling().await
    }

    async fn resume_polling(&mut self) -> Result<()> {
        self.reconciler.session_mut().selecting = None;
        let ctx = self.render_context();
        self.reconciler.relayout(&ctx);
        self.start_polling();
        self.sink
            .publish(DashboardEvent::lifecycle(LifecyclePhase::PollingResumed, None))
            .await?;
        self.publish_view().await
    }

    fn start_polling(&mut self) {
        self.poller.start(
            Duration::from_millis(self.poll.interval_ms),
            self.api.clone(),
            self.poll_tx.clone(),
        );
    }

    /// Sends `command` in the background; completion arrives on `done_rx`.
    async fn dispatch(&mut self, command: CameraCommand) -> Result<()> {
        self.reconciler.session_mut().loading += 1;
        let api = self.api.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let path = command.path();
            let result = api.send(command).await;
            let event = CommandEvent {
                path,
                ok: result.is_ok(),
                error: result.err().map(|err| err.to_string()),
            };
            // A closed channel means the loop is gone; nobody awaits the result.
            let _ = done.send(event).await;
        });
        self.publish_view().await
    }

    async fn publish_view(&self) -> Result<()> {
        self.sink
            .publish(DashboardEvent::view(self.reconciler.view().clone()))
            .await
    }

    fn render_context(&self) -> RenderContext {
        RenderContext {
            now_ms: Utc::now().timestamp_millis(),
            preview: self.preview,
            selecting: self.mode.target(),
        }
    }
}

/// Fetches and renders a single snapshot. Unlike the loop, a malformed
/// payload is reported as an error.
pub async fn render_once<A>(api: &A, preview: DisplaySize) -> Result<DashboardView>
where
    A: CameraApi + ?Sized,
{
    let outcome = fetch_once(api, 1).await;
    let snapshot = match outcome.result {
        PollResult::Snapshot(snapshot) => snapshot,
        PollResult::Malformed(reason) => return Err(CcdError::Payload(reason)),
        PollResult::Failed(err) => return Err(err),
    };
    let mut reconciler = Reconciler::new(api.base_url());
    let ctx = RenderContext {
        now_ms: Utc::now().timestamp_millis(),
        preview,
        selecting: None,
    };
    Ok(reconciler.apply(&snapshot, &ctx).clone())
}

pub fn sync_error(message: impl Into<String>) -> CcdError {
    CcdError::Sync(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DashboardBus;
    use ccd_client::MockCamera;
    use ccd_types::{api::ImageEndpoint, events::EventPayload, status::StatusSnapshot};
    use futures::StreamExt;
    use serde_json::json;
    use tokio::time::timeout;

    const PREVIEW: DisplaySize = DisplaySize::new(400.0, 300.0);

    fn sync_with(camera: Arc<MockCamera>) -> DashboardSync<MockCamera, DashboardBus> {
        DashboardSync::new(
            camera,
            DashboardBus::new(64),
            PollStats::new(),
            PollConfig {
                interval_ms: 20,
                failure_threshold: 2,
            },
            UiConfig::default(),
            PREVIEW,
        )
    }

    fn snapshot_outcome(seq: u64, value: serde_json::Value) -> PollOutcome {
        PollOutcome {
            seq,
            result: PollResult::Snapshot(StatusSnapshot::from_value(value).expect("object")),
        }
    }

    fn geometry() -> serde_json::Value {
        json!({
            "curImageTime": 1000,
            "statusVal": 1,
            "subFrameOriginX": 100, "subFrameOriginY": 0,
            "subFrameSizeX": 800, "subFrameSizeY": 600,
            "roiOriginX": 200, "roiOriginY": 100,
            "roiSizeX": 100, "roiSizeY": 100,
        })
    }

    #[tokio::test]
    async fn stale_responses_are_discarded() {
        let mut sync = sync_with(Arc::new(MockCamera::new()));
        sync.handle_poll(snapshot_outcome(2, json!({"statusVal": 2})))
            .await
            .unwrap();
        sync.handle_poll(snapshot_outcome(1, json!({"statusVal": 1})))
            .await
            .unwrap();
        assert_eq!(sync.view().field("statusVal"), Some("Exposure in Progress"));
        assert!(!sync.view().capture_enabled);
        assert_eq!(sync.stats.snapshot().await.stale, 1);
    }

    #[tokio::test]
    async fn repeated_failures_mark_connection_lost() {
        let mut sync = sync_with(Arc::new(MockCamera::new()));
        for seq in 1..=2 {
            sync.handle_poll(PollOutcome {
                seq,
                result: PollResult::Failed(CcdError::Transport("refused".into())),
            })
            .await
            .unwrap();
        }
        assert!(sync.view().session.connection_lost);

        sync.handle_poll(PollOutcome {
            seq: 3,
            result: PollResult::Malformed("not json".into()),
        })
        .await
        .unwrap();
        assert!(sync.view().session.connection_lost);

        sync.handle_poll(snapshot_outcome(4, json!({"statusVal": 1})))
            .await
            .unwrap();
        assert!(!sync.view().session.connection_lost);
        assert_eq!(sync.stats.snapshot().await.dropped, 1);
    }

    #[tokio::test]
    async fn busy_camera_ignores_capture_requests() {
        let camera = Arc::new(MockCamera::new());
        let mut sync = sync_with(camera.clone());
        sync.handle_poll(snapshot_outcome(1, json!({"statusVal": 3})))
            .await
            .unwrap();
        sync.handle_action(UserAction::StartExposure).await.unwrap();
        assert_eq!(sync.view().session.loading, 0);
        assert!(camera.sent_commands().is_empty());
    }

    #[tokio::test]
    async fn selection_suspends_and_resumes_polling() {
        let camera = Arc::new(MockCamera::new());
        let mut sync = sync_with(camera.clone());
        sync.handle_poll(snapshot_outcome(1, geometry())).await.unwrap();

        sync.handle_action(UserAction::BeginSelection(SelectionTarget::Subframe))
            .await
            .unwrap();
        assert!(!sync.is_polling());
        assert_eq!(
            sync.view().subframe_overlay,
            Some(DisplayRect::new(0.0, 0.0, 400.0, 300.0))
        );

        sync.handle_action(UserAction::CompleteSelection(DisplayRect::new(
            50.0, 0.0, 450.0, 300.0,
        )))
        .await
        .unwrap();
        assert!(sync.is_polling());
        assert_eq!(sync.mode(), SelectMode::Polling);
        assert_eq!(sync.view().subframe_overlay, None);
        assert_eq!(sync.view().session.loading, 1);

        let mut done_rx = sync.done_rx.take().expect("receiver");
        let done = timeout(Duration::from_secs(2), done_rx.recv())
            .await
            .expect("command completes")
            .expect("event");
        assert_eq!(done.path, "/setSubframe/200,0:800,600");
        sync.handle_completion(done).await.unwrap();
        assert_eq!(sync.view().session.loading, 0);
    }

    #[tokio::test]
    async fn flat_selection_is_submitted_unvalidated() {
        let camera = Arc::new(MockCamera::new());
        let mut sync = sync_with(camera.clone());
        sync.handle_poll(snapshot_outcome(1, geometry())).await.unwrap();
        sync.handle_action(UserAction::BeginSelection(SelectionTarget::Subframe))
            .await
            .unwrap();
        sync.handle_action(UserAction::CompleteSelection(DisplayRect::new(
            50.0, 0.0, 450.0, 0.0,
        )))
        .await
        .unwrap();
        assert!(sync.is_polling());
        assert_eq!(sync.view().session.loading, 1);

        let mut done_rx = sync.done_rx.take().expect("receiver");
        let done = timeout(Duration::from_secs(2), done_rx.recv())
            .await
            .expect("command completes")
            .expect("event");
        assert_eq!(done.path, "/setSubframe/200,0:800,0");
        assert!(done.ok);
    }

    #[tokio::test]
    async fn failed_command_clears_loading_and_is_reported() {
        let camera = Arc::new(MockCamera::new().failing_commands());
        let mut sync = sync_with(camera.clone());
        let mut events = sync.sink.subscribe();

        sync.handle_action(UserAction::ClearRoi).await.unwrap();
        assert_eq!(sync.view().session.loading, 1);

        let mut done_rx = sync.done_rx.take().expect("receiver");
        let done = timeout(Duration::from_secs(2), done_rx.recv())
            .await
            .expect("command completes")
            .expect("event");
        assert!(!done.ok);
        assert!(done.error.as_deref().is_some_and(|e| e.contains("/clearRoi")));

        sync.handle_completion(done).await.unwrap();
        assert_eq!(sync.view().session.loading, 0);
        assert_eq!(camera.sent_commands(), vec![CameraCommand::ClearRoi]);

        let reported = timeout(Duration::from_secs(2), async {
            while let Some(event) = events.next().await {
                if let EventPayload::Command(command) = event.payload {
                    return Some(command);
                }
            }
            None
        })
        .await
        .expect("command event within timeout")
        .expect("command event");
        assert!(!reported.ok);
    }

    #[tokio::test]
    async fn cancelled_selection_submits_nothing() {
        let camera = Arc::new(MockCamera::new());
        let mut sync = sync_with(camera.clone());
        sync.handle_poll(snapshot_outcome(1, geometry())).await.unwrap();
        sync.handle_action(UserAction::BeginSelection(SelectionTarget::Roi))
            .await
            .unwrap();
        sync.handle_action(UserAction::CancelSelection).await.unwrap();
        assert!(sync.is_polling());
        assert_eq!(sync.view().session.loading, 0);
        assert_eq!(sync.view().session.selecting, None);
    }

    #[tokio::test]
    async fn toggles_track_session_flags() {
        let camera = Arc::new(MockCamera::new());
        let mut sync = sync_with(camera.clone());
        sync.handle_action(UserAction::ToggleContinuous).await.unwrap();
        sync.handle_action(UserAction::ToggleAutoSave).await.unwrap();
        assert!(sync.view().session.continuous);
        assert_eq!(sync.view().session.autosave.as_deref(), Some("image"));

        sync.handle_action(UserAction::ToggleContinuous).await.unwrap();
        sync.handle_action(UserAction::ToggleAutoSave).await.unwrap();
        assert!(!sync.view().session.continuous);
        assert_eq!(sync.view().session.autosave, None);
        assert_eq!(sync.view().session.loading, 4);
    }

    #[tokio::test]
    async fn run_loop_renders_polled_snapshots() {
        let camera = Arc::new(MockCamera::new());
        camera.push_status(geometry().to_string());
        let bus = DashboardBus::new(64);
        let mut events = bus.subscribe();
        let sync = DashboardSync::new(
            camera.clone(),
            bus,
            PollStats::new(),
            PollConfig {
                interval_ms: 20,
                failure_threshold: 3,
            },
            UiConfig::default(),
            PREVIEW,
        );
        let (actions_tx, actions_rx) = mpsc::channel(8);
        let task = tokio::spawn(sync.run(actions_rx));

        let view = timeout(Duration::from_secs(2), async {
            while let Some(event) = events.next().await {
                if let EventPayload::View(view) = event.payload {
                    return Some(view);
                }
            }
            None
        })
        .await
        .expect("view within timeout")
        .expect("view event");
        assert_eq!(view.field("statusVal"), Some("Ready / Idle"));
        assert!(view.image_url(ImageEndpoint::Preview).is_some());
        assert_eq!(
            view.roi_overlay,
            Some(DisplayRect::new(100.0, 50.0, 150.0, 100.0))
        );

        actions_tx.send(UserAction::StartExposure).await.unwrap();
        actions_tx.send(UserAction::Shutdown).await.unwrap();
        let shutdown = timeout(Duration::from_secs(2), async {
            while let Some(event) = events.next().await {
                if let EventPayload::Lifecycle(lifecycle) = event.payload {
                    if lifecycle.phase == LifecyclePhase::Shutdown {
                        return true;
                    }
                }
            }
            false
        })
        .await
        .expect("shutdown within timeout");
        assert!(shutdown);
        task.await.expect("join").expect("clean exit");
    }

    #[tokio::test]
    async fn render_once_reports_malformed_payloads() {
        let camera = MockCamera::new();
        camera.push_status("garbage");
        assert!(render_once(&camera, PREVIEW).await.is_err());

        camera.push_status(json!({"statusVal": 0, "coolerOn": true}).to_string());
        let view = render_once(&camera, PREVIEW).await.expect("view");
        assert_eq!(view.field("statusVal"), Some("No Image"));
        assert_eq!(view.cooler_label, "Stop Cooler");
    }
}
