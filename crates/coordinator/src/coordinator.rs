//! Detection mode coordinator
//!
//! Owns the active strategy, the tick loop and the failure policy:
//! - `initialize` picks the requested mode, falling back to the other one
//! - `start_detection` registers the camera and listener and spawns the loop
//! - every tick runs under a busy guard; overlapping ticks are dropped
//! - consecutive failures past the ceiling switch mode; when the other
//!   mode is already exhausted or unavailable, detection stops

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alerting::{SosEvent, SosTrigger};
use camera_capture::FrameSource;
use dms::{DetectionMode, DetectionResult, ModelLoader};
use metrics::counter;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::client::SensorClient;
use crate::config::CoordinatorConfig;
use crate::listener::{Alarm, DetectionListener, LogAlarm};
use crate::local::LocalStrategy;
use crate::remote::RemoteStrategy;
use crate::scheduler::{DelayScheduler, TickScheduler};
use crate::strategy::{DetectionStrategy, Strategy, TickReport};
use crate::CoordinatorError;

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorState {
    Uninitialized,
    Initializing,
    Ready,
    Detecting,
    Stopped,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinatorState::Uninitialized => "uninitialized",
            CoordinatorState::Initializing => "initializing",
            CoordinatorState::Ready => "ready",
            CoordinatorState::Detecting => "detecting",
            CoordinatorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Result delivered to the listener
    Completed,
    /// Tick failed; consecutive failures so far
    Failed { attempts: u32 },
    /// Failure ceiling reached and the other mode took over
    FailedOver {
        from: DetectionMode,
        to: DetectionMode,
    },
    /// Both modes exhausted; detection stopped
    Fatal,
    /// Previous tick still in flight
    Skipped,
    /// Not detecting
    Idle,
}

async fn build_strategy(
    config: &CoordinatorConfig,
    loader: &Arc<dyn ModelLoader>,
    mode: DetectionMode,
) -> Result<Strategy, CoordinatorError> {
    let mut strategy = match mode {
        DetectionMode::Local => {
            let path = config
                .local_model_path
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| {
                    CoordinatorError::Initialization("no local model path configured".into())
                })?;
            Strategy::Local(LocalStrategy::new(path, Arc::clone(loader), config.dms.clone()))
        }
        DetectionMode::Backend => {
            let url = config
                .backend_url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| CoordinatorError::Initialization("no backend URL configured".into()))?;
            let client = SensorClient::new(url, config.request_timeout())?;
            Strategy::Remote(RemoteStrategy::new(client))
        }
    };
    strategy.initialize().await?;
    Ok(strategy)
}

async fn build_with_fallback(
    config: &CoordinatorConfig,
    loader: &Arc<dyn ModelLoader>,
    requested: DetectionMode,
) -> Result<Strategy, CoordinatorError> {
    let primary = match build_strategy(config, loader, requested).await {
        Ok(strategy) => return Ok(strategy),
        Err(e) => e,
    };

    let fallback = requested.other();
    if !config.has_mode(fallback) {
        return Err(CoordinatorError::Initialization(format!(
            "{requested} unavailable ({primary}) and no {fallback} fallback configured"
        )));
    }

    warn!(
        requested = %requested,
        fallback = %fallback,
        error = %primary,
        "Requested mode unavailable, falling back"
    );
    build_strategy(config, loader, fallback)
        .await
        .map_err(|secondary| {
            CoordinatorError::Initialization(format!(
                "{requested} unavailable ({primary}); {fallback} unavailable ({secondary})"
            ))
        })
}

/// Clears the busy flag when the tick ends, including on cancellation
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Engine {
    config: CoordinatorConfig,
    loader: Arc<dyn ModelLoader>,
    state: CoordinatorState,
    strategy: Option<Strategy>,
    failed_attempts: u32,
    /// Mode that hit its failure ceiling with no successful tick since
    exhausted: Option<DetectionMode>,
    source: Option<Box<dyn FrameSource>>,
    listener: Option<Box<dyn DetectionListener>>,
    sos: SosTrigger,
    alarm: Box<dyn Alarm>,
    last_result: Option<DetectionResult>,
    last_error: Option<String>,
    session_generation: u64,
    origin: Instant,
}

impl Engine {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn active_mode(&self) -> Option<DetectionMode> {
        self.strategy.as_ref().map(|s| s.mode())
    }

    fn open_source(&mut self) -> Result<(), CoordinatorError> {
        let source = self.source.as_mut().ok_or(CoordinatorError::NoFrameSource)?;
        if !source.is_open() {
            source.open()?;
            debug!("Camera acquired");
        }
        Ok(())
    }

    fn release_source(&mut self) {
        if let Some(source) = self.source.as_mut() {
            if source.is_open() {
                debug!("Camera released");
            }
            source.release();
        }
    }

    fn install(&mut self, strategy: Strategy, mode_tx: &watch::Sender<DetectionMode>) -> DetectionMode {
        let mode = strategy.mode();
        self.strategy = Some(strategy);
        self.failed_attempts = 0;
        self.session_generation += 1;
        mode_tx.send_replace(mode);
        mode
    }

    /// Fresh session: detector state, SOS and failure tracking
    fn reset_session(&mut self) {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.reset();
        }
        if self.sos.is_active() {
            self.alarm.silence();
        }
        self.sos.reset();
        self.failed_attempts = 0;
        self.exhausted = None;
        self.last_result = None;
        self.session_generation += 1;
    }

    fn halt(&mut self) {
        self.release_source();
        self.reset_session();
        self.state = if self.strategy.is_some() {
            CoordinatorState::Stopped
        } else {
            CoordinatorState::Uninitialized
        };
    }

    async fn tick(&mut self, mode_tx: &watch::Sender<DetectionMode>) -> TickOutcome {
        let now_ms = self.now_ms();
        self.poll_sos(now_ms);
        let Some(strategy) = self.strategy.as_mut() else {
            return TickOutcome::Idle;
        };
        let mode = strategy.mode();
        let source = match mode {
            DetectionMode::Local => self
                .source
                .as_mut()
                .map(|s| &mut **s as &mut dyn FrameSource),
            DetectionMode::Backend => None,
        };

        let processed = strategy.process_tick(source, now_ms).await;
        match processed {
            Ok(report) => {
                self.deliver(report, mode, now_ms);
                TickOutcome::Completed
            }
            Err(err) => self.record_failure(err, mode, mode_tx).await,
        }
    }

    fn deliver(&mut self, report: TickReport, mode: DetectionMode, now_ms: u64) {
        self.failed_attempts = 0;
        self.exhausted = None;
        counter!("dms_ticks_total", "mode" => mode.as_str()).increment(1);

        for _ in 0..report.severe_events {
            for transition in self.sos.on_severe_event(now_ms) {
                self.apply_sos(transition);
            }
        }

        let mut result = report.result;
        result.set_sos_active(self.sos.is_active());
        if let Some(listener) = self.listener.as_mut() {
            listener.on_result(&result);
        }
        self.last_result = Some(result);
    }

    /// Expire an SOS whose cooldown has run out, whether or not ticks succeed
    fn poll_sos(&mut self, now_ms: u64) {
        if let Some(transition) = self.sos.poll(now_ms) {
            self.apply_sos(transition);
        }
    }

    fn apply_sos(&mut self, transition: SosEvent) {
        match transition {
            SosEvent::Activated { event_count } => {
                counter!("dms_sos_activations_total").increment(1);
                self.alarm.sound(event_count);
            }
            SosEvent::Expired { .. } => {
                self.alarm.silence();
                if let Some(result) = self.last_result.as_mut() {
                    result.set_sos_active(false);
                }
            }
        }
    }

    async fn record_failure(
        &mut self,
        err: CoordinatorError,
        mode: DetectionMode,
        mode_tx: &watch::Sender<DetectionMode>,
    ) -> TickOutcome {
        self.failed_attempts += 1;
        counter!("dms_tick_failures_total", "mode" => mode.as_str()).increment(1);
        warn!(
            mode = %mode,
            attempts = self.failed_attempts,
            error = %err,
            "Detection tick failed"
        );
        self.last_error = Some(err.to_string());

        if self.failed_attempts < self.config.max_failed_attempts_before_fallback {
            return TickOutcome::Failed {
                attempts: self.failed_attempts,
            };
        }
        self.fail_over(mode, mode_tx).await
    }

    async fn fail_over(
        &mut self,
        from: DetectionMode,
        mode_tx: &watch::Sender<DetectionMode>,
    ) -> TickOutcome {
        let to = from.other();
        let attempts = self.failed_attempts;

        if self.exhausted == Some(to) {
            return self.fatal(format!(
                "{from} failed {attempts} consecutive ticks after {to} was already exhausted"
            ));
        }
        if !self.config.has_mode(to) {
            return self.fatal(format!(
                "{from} failed {attempts} consecutive ticks and no {to} fallback is configured"
            ));
        }

        warn!(from = %from, to = %to, attempts, "Failure ceiling reached, switching mode");
        let built = build_strategy(&self.config, &self.loader, to).await;
        let strategy = match built {
            Ok(strategy) => strategy,
            Err(e) => {
                return self.fatal(format!(
                    "{from} failed {attempts} consecutive ticks and {to} is unavailable: {e}"
                ))
            }
        };

        match to {
            DetectionMode::Local => {
                if let Err(e) = self.open_source() {
                    return self.fatal(format!("{from} exhausted and camera unavailable: {e}"));
                }
            }
            DetectionMode::Backend => self.release_source(),
        }

        self.install(strategy, mode_tx);
        self.exhausted = Some(from);
        counter!("dms_mode_switches_total", "to" => to.as_str()).increment(1);
        info!(mode = %to, "Failover complete");
        if let Some(listener) = self.listener.as_mut() {
            listener.on_mode_changed(from, to);
        }
        TickOutcome::FailedOver { from, to }
    }

    fn fatal(&mut self, reason: String) -> TickOutcome {
        let err = CoordinatorError::Exhausted(reason);
        error!(error = %err, "Detection stopped");
        self.halt();
        self.last_error = Some(err.to_string());
        if let Some(listener) = self.listener.as_mut() {
            listener.on_fatal(&err);
        }
        TickOutcome::Fatal
    }
}

struct Shared {
    engine: Mutex<Engine>,
    processing: AtomicBool,
    mode: watch::Sender<DetectionMode>,
}

async fn run_tick(shared: &Shared) -> TickOutcome {
    let Some(_busy) = ProcessingGuard::acquire(&shared.processing) else {
        debug!("Previous tick still in flight, skipping");
        return TickOutcome::Skipped;
    };
    let mut engine = shared.engine.lock().await;
    if engine.state != CoordinatorState::Detecting {
        return TickOutcome::Idle;
    }
    engine.tick(&shared.mode).await
}

/// Builder for [`DetectionCoordinator`]
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    loader: Arc<dyn ModelLoader>,
    scheduler: Option<Arc<dyn TickScheduler>>,
    alarm: Option<Box<dyn Alarm>>,
}

impl CoordinatorBuilder {
    /// Replace the default fixed-interval scheduler
    pub fn scheduler(mut self, scheduler: Arc<dyn TickScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn alarm(mut self, alarm: impl Alarm + 'static) -> Self {
        self.alarm = Some(Box::new(alarm));
        self
    }

    pub fn build(self) -> Result<DetectionCoordinator, CoordinatorError> {
        self.config.validate()?;

        let scheduler = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(DelayScheduler::new(self.config.detection_interval())),
        };
        let alarm = self.alarm.unwrap_or_else(|| Box::new(LogAlarm::default()));
        let (mode_tx, _) = watch::channel(self.config.mode);

        let engine = Engine {
            sos: SosTrigger::new(self.config.sos.clone()),
            config: self.config,
            loader: self.loader,
            state: CoordinatorState::Uninitialized,
            strategy: None,
            failed_attempts: 0,
            exhausted: None,
            source: None,
            listener: None,
            alarm,
            last_result: None,
            last_error: None,
            session_generation: 0,
            origin: Instant::now(),
        };

        Ok(DetectionCoordinator {
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                processing: AtomicBool::new(false),
                mode: mode_tx,
            }),
            scheduler,
            task: None,
        })
    }
}

/// Runs drowsiness detection in local or backend mode with failover
pub struct DetectionCoordinator {
    shared: Arc<Shared>,
    scheduler: Arc<dyn TickScheduler>,
    task: Option<JoinHandle<()>>,
}

impl DetectionCoordinator {
    pub fn builder(config: CoordinatorConfig, loader: Arc<dyn ModelLoader>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            loader,
            scheduler: None,
            alarm: None,
        }
    }

    pub fn new(config: CoordinatorConfig, loader: Arc<dyn ModelLoader>) -> Result<Self, CoordinatorError> {
        Self::builder(config, loader).build()
    }

    /// Bring up the configured mode, or the other one if it is unavailable
    pub async fn initialize(&mut self) -> Result<DetectionMode, CoordinatorError> {
        let mut engine = self.shared.engine.lock().await;
        if engine.state == CoordinatorState::Detecting {
            let mode = self.current_mode();
            info!(mode = %mode, "Already detecting, keeping current mode");
            return Ok(mode);
        }

        engine.state = CoordinatorState::Initializing;
        let requested = engine.config.mode;
        info!(mode = %requested, "Initializing detection coordinator");

        let built = build_with_fallback(&engine.config, &engine.loader, requested).await;
        match built {
            Ok(strategy) => {
                let mode = engine.install(strategy, &self.shared.mode);
                engine.state = CoordinatorState::Ready;
                info!(mode = %mode, "Detection coordinator ready");
                Ok(mode)
            }
            Err(e) => {
                error!(error = %e, "Detection coordinator initialization failed");
                engine.strategy = None;
                engine.state = CoordinatorState::Uninitialized;
                engine.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Start the tick loop. Calling while already detecting is a no-op.
    pub async fn start_detection<L>(
        &mut self,
        source: Box<dyn FrameSource>,
        listener: L,
    ) -> Result<(), CoordinatorError>
    where
        L: DetectionListener + 'static,
    {
        {
            let mut engine = self.shared.engine.lock().await;
            match engine.state {
                CoordinatorState::Detecting => {
                    info!("Detection already running");
                    return Ok(());
                }
                CoordinatorState::Ready | CoordinatorState::Stopped => {}
                state => return Err(CoordinatorError::NotReady(state)),
            }
            let mode = engine
                .active_mode()
                .ok_or(CoordinatorError::NotReady(engine.state))?;

            engine.source = Some(source);
            engine.listener = Some(Box::new(listener));
            engine.reset_session();
            if mode == DetectionMode::Local {
                engine.open_source()?;
            }
            engine.state = CoordinatorState::Detecting;
            info!(mode = %mode, "Detection started");
        }
        self.spawn_loop();
        Ok(())
    }

    /// Run one tick now. Skipped if another tick is in flight.
    pub async fn process_tick(&self) -> TickOutcome {
        run_tick(&self.shared).await
    }

    /// Cancel the loop, release the camera and reset the session
    pub async fn stop_detection(&mut self) {
        self.cancel_loop().await;
        let mut engine = self.shared.engine.lock().await;
        let was_detecting = engine.state == CoordinatorState::Detecting;
        engine.halt();
        if was_detecting {
            info!("Detection stopped");
        } else {
            debug!("Stop requested while not detecting");
        }
    }

    /// Switch to `mode`, resuming detection if it was running.
    ///
    /// If `mode` cannot be brought up the previous mode is restored and
    /// returned; if that fails too, detection stops with an error.
    pub async fn switch_mode(&mut self, mode: DetectionMode) -> Result<DetectionMode, CoordinatorError> {
        {
            let mut engine = self.shared.engine.lock().await;
            match engine.active_mode() {
                Some(active) if active == mode => {
                    debug!(mode = %mode, "Already in requested mode");
                    return Ok(mode);
                }
                Some(_) => {}
                None => {
                    engine.config.mode = mode;
                    drop(engine);
                    return self.initialize().await;
                }
            }
        }

        let previous = self.current_mode();
        self.cancel_loop().await;

        let mut engine = self.shared.engine.lock().await;
        let was_detecting = engine.state == CoordinatorState::Detecting;
        engine.release_source();
        info!(from = %previous, to = %mode, "Switching detection mode");

        let built = build_strategy(&engine.config, &engine.loader, mode).await;
        let active = match built {
            Ok(strategy) => {
                engine.config.mode = mode;
                counter!("dms_mode_switches_total", "to" => mode.as_str()).increment(1);
                engine.install(strategy, &self.shared.mode)
            }
            Err(err) => {
                warn!(mode = %mode, error = %err, "Mode switch failed, reverting");
                engine.last_error = Some(err.to_string());
                let reverted = build_strategy(&engine.config, &engine.loader, previous).await;
                match reverted {
                    Ok(strategy) => engine.install(strategy, &self.shared.mode),
                    Err(revert_err) => {
                        engine.strategy = None;
                        engine.halt();
                        let err = CoordinatorError::Initialization(format!(
                            "switch to {mode} failed ({err}); reverting to {previous} failed ({revert_err})"
                        ));
                        error!(error = %err, "Detection stopped");
                        engine.last_error = Some(err.to_string());
                        return Err(err);
                    }
                }
            }
        };
        engine.exhausted = None;

        if was_detecting {
            if active == DetectionMode::Local {
                if let Err(e) = engine.open_source() {
                    engine.halt();
                    return Err(e);
                }
            }
            engine.state = CoordinatorState::Detecting;
            drop(engine);
            self.spawn_loop();
        } else if engine.state != CoordinatorState::Stopped {
            engine.state = CoordinatorState::Ready;
        }
        Ok(active)
    }

    /// Driver acknowledged the SOS alarm
    pub async fn acknowledge_sos(&self) {
        let mut engine = self.shared.engine.lock().await;
        let was_active = engine.sos.is_active();
        engine.sos.acknowledge();
        if was_active {
            engine.alarm.silence();
        }
        if let Some(result) = engine.last_result.as_mut() {
            result.set_sos_active(false);
        }
    }

    pub fn current_mode(&self) -> DetectionMode {
        *self.shared.mode.borrow()
    }

    /// Observe mode changes, including automatic failover
    pub fn subscribe_mode(&self) -> watch::Receiver<DetectionMode> {
        self.shared.mode.subscribe()
    }

    pub async fn state(&self) -> CoordinatorState {
        self.shared.engine.lock().await.state
    }

    pub async fn is_detecting(&self) -> bool {
        self.state().await == CoordinatorState::Detecting
    }

    pub async fn failed_attempts(&self) -> u32 {
        self.shared.engine.lock().await.failed_attempts
    }

    /// Increments whenever the detector session is replaced or reset
    pub async fn session_generation(&self) -> u64 {
        self.shared.engine.lock().await.session_generation
    }

    pub async fn last_result(&self) -> Option<DetectionResult> {
        self.shared.engine.lock().await.last_result.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.shared.engine.lock().await.last_error.clone()
    }

    pub async fn sos_active(&self) -> bool {
        let mut engine = self.shared.engine.lock().await;
        let now_ms = engine.now_ms();
        engine.poll_sos(now_ms);
        engine.sos.is_active()
    }

    pub async fn sos_event_count(&self) -> u32 {
        let mut engine = self.shared.engine.lock().await;
        let now_ms = engine.now_ms();
        engine.poll_sos(now_ms);
        engine.sos.event_count()
    }

    fn spawn_loop(&mut self) {
        if let Some(previous) = self.task.take() {
            previous.abort();
        }
        let shared = Arc::clone(&self.shared);
        let scheduler = Arc::clone(&self.scheduler);
        self.task = Some(tokio::spawn(async move {
            loop {
                scheduler.next_tick().await;
                if matches!(run_tick(&shared).await, TickOutcome::Fatal | TickOutcome::Idle) {
                    break;
                }
            }
            debug!("Detection loop exited");
        }));
    }

    async fn cancel_loop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for DetectionCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Ok(mut engine) = self.shared.engine.try_lock() {
            engine.release_source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use crate::testing::{drowsiness_body, mount_online, ModelScript, ScriptedLoader, SharedCamera, Step};
    use dms::DmsAlert;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug)]
    enum Event {
        Result(DetectionResult),
        ModeChanged(DetectionMode, DetectionMode),
        Fatal(String),
    }

    struct ChannelListener(mpsc::UnboundedSender<Event>);

    impl DetectionListener for ChannelListener {
        fn on_result(&mut self, result: &DetectionResult) {
            let _ = self.0.send(Event::Result(result.clone()));
        }

        fn on_mode_changed(&mut self, from: DetectionMode, to: DetectionMode) {
            let _ = self.0.send(Event::ModeChanged(from, to));
        }

        fn on_fatal(&mut self, error: &CoordinatorError) {
            let _ = self.0.send(Event::Fatal(error.to_string()));
        }
    }

    fn listener() -> (ChannelListener, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelListener(tx), rx)
    }

    #[derive(Clone, Default)]
    struct CountingAlarm {
        sounds: Arc<AtomicU32>,
        silences: Arc<AtomicU32>,
    }

    impl Alarm for CountingAlarm {
        fn sound(&mut self, _event_count: u32) {
            self.sounds.fetch_add(1, Ordering::SeqCst);
        }

        fn silence(&mut self) {
            self.silences.fetch_add(1, Ordering::SeqCst);
        }
    }

    const MODEL: &str = "landmarks.onnx";

    fn local_config() -> CoordinatorConfig {
        CoordinatorConfig::local(MODEL)
    }

    fn api_url(server: &MockServer) -> String {
        format!("{}/api", server.uri())
    }

    fn backend_config(server: &MockServer) -> CoordinatorConfig {
        CoordinatorConfig {
            local_model_path: Some(MODEL.into()),
            request_timeout_ms: 1_000,
            ..CoordinatorConfig::backend(api_url(server))
        }
    }

    fn local_with_backend(server: &MockServer) -> CoordinatorConfig {
        CoordinatorConfig {
            backend_url: Some(api_url(server)),
            request_timeout_ms: 1_000,
            ..local_config()
        }
    }

    fn coordinator(
        config: CoordinatorConfig,
        script: &ModelScript,
    ) -> (DetectionCoordinator, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let coordinator =
            DetectionCoordinator::builder(config, Arc::new(ScriptedLoader::new(script.clone())))
                .scheduler(scheduler.clone())
                .build()
                .unwrap();
        (coordinator, scheduler)
    }

    async fn mount_drowsiness(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/api/drowsiness"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_initialize_local() {
        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(local_config(), &script);
        assert_eq!(coord.state().await, CoordinatorState::Uninitialized);

        assert_eq!(coord.initialize().await.unwrap(), DetectionMode::Local);
        assert_eq!(coord.current_mode(), DetectionMode::Local);
        assert_eq!(coord.state().await, CoordinatorState::Ready);
        assert_eq!(script.loads(), 1);
    }

    #[tokio::test]
    async fn test_initialize_fails_without_fallback() {
        let script = ModelScript::new(Step::Face(0.3));
        script.fail_loads(true);
        let (mut coord, _) = coordinator(local_config(), &script);

        assert!(matches!(
            coord.initialize().await,
            Err(CoordinatorError::Initialization(_))
        ));
        assert_eq!(coord.state().await, CoordinatorState::Uninitialized);
        assert!(coord.last_error().await.is_some());

        let camera = SharedCamera::new();
        let (listener, _rx) = listener();
        assert!(matches!(
            coord.start_detection(camera.boxed(), listener).await,
            Err(CoordinatorError::NotReady(CoordinatorState::Uninitialized))
        ));
        assert_eq!(camera.open_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_backend_falls_back_to_local() {
        // Nothing mounted: health check gets 404
        let server = MockServer::start().await;
        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(backend_config(&server), &script);

        assert_eq!(coord.initialize().await.unwrap(), DetectionMode::Local);
        assert_eq!(coord.current_mode(), DetectionMode::Local);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_backend() {
        let server = MockServer::start().await;
        mount_online(&server).await;
        let script = ModelScript::new(Step::Face(0.3));
        script.fail_loads(true);
        let (mut coord, _) = coordinator(local_with_backend(&server), &script);

        assert_eq!(coord.initialize().await.unwrap(), DetectionMode::Backend);
    }

    #[tokio::test]
    async fn test_backend_fails_over_to_local_after_ceiling() {
        let server = MockServer::start().await;
        mount_online(&server).await;
        mount_drowsiness(&server, ResponseTemplate::new(500)).await;

        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(backend_config(&server), &script);
        assert_eq!(coord.initialize().await.unwrap(), DetectionMode::Backend);
        let mut modes = coord.subscribe_mode();

        let camera = SharedCamera::new();
        let (listener, mut rx) = listener();
        coord.start_detection(camera.boxed(), listener).await.unwrap();
        assert!(!camera.is_held());

        assert_eq!(coord.process_tick().await, TickOutcome::Failed { attempts: 1 });
        assert_eq!(coord.process_tick().await, TickOutcome::Failed { attempts: 2 });
        assert_eq!(coord.current_mode(), DetectionMode::Backend);
        assert_eq!(coord.failed_attempts().await, 2);

        assert_eq!(
            coord.process_tick().await,
            TickOutcome::FailedOver {
                from: DetectionMode::Backend,
                to: DetectionMode::Local
            }
        );
        assert_eq!(coord.current_mode(), DetectionMode::Local);
        assert!(modes.has_changed().unwrap());
        assert_eq!(*modes.borrow_and_update(), DetectionMode::Local);
        assert_eq!(coord.failed_attempts().await, 0);
        assert!(camera.is_held());
        assert!(matches!(
            rx.try_recv(),
            Ok(Event::ModeChanged(DetectionMode::Backend, DetectionMode::Local))
        ));

        assert_eq!(coord.process_tick().await, TickOutcome::Completed);
        match rx.try_recv() {
            Ok(Event::Result(result)) => assert_eq!(result.source, DetectionMode::Local),
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backend_timeouts_fail_over_to_local() {
        let server = MockServer::start().await;
        mount_online(&server).await;
        mount_drowsiness(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(drowsiness_body(20, "normal"))
                .set_delay(Duration::from_millis(600)),
        )
        .await;

        let script = ModelScript::new(Step::Face(0.3));
        let config = CoordinatorConfig {
            request_timeout_ms: 150,
            ..backend_config(&server)
        };
        let (mut coord, _) = coordinator(config, &script);
        assert_eq!(coord.initialize().await.unwrap(), DetectionMode::Backend);

        let (listener, mut rx) = listener();
        coord.start_detection(SharedCamera::new().boxed(), listener).await.unwrap();

        assert_eq!(coord.process_tick().await, TickOutcome::Failed { attempts: 1 });
        assert!(coord.last_error().await.is_some());
        assert_eq!(coord.process_tick().await, TickOutcome::Failed { attempts: 2 });
        assert_eq!(
            coord.process_tick().await,
            TickOutcome::FailedOver {
                from: DetectionMode::Backend,
                to: DetectionMode::Local
            }
        );
        assert_eq!(coord.current_mode(), DetectionMode::Local);
        assert!(matches!(
            rx.try_recv(),
            Ok(Event::ModeChanged(DetectionMode::Backend, DetectionMode::Local))
        ));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(local_config(), &script);
        coord.initialize().await.unwrap();
        let (listener, _rx) = listener();
        coord.start_detection(SharedCamera::new().boxed(), listener).await.unwrap();

        script.push(Step::Fail, 2);
        coord.process_tick().await;
        coord.process_tick().await;
        assert_eq!(coord.failed_attempts().await, 2);

        assert_eq!(coord.process_tick().await, TickOutcome::Completed);
        assert_eq!(coord.failed_attempts().await, 0);

        script.push(Step::Fail, 2);
        assert_eq!(coord.process_tick().await, TickOutcome::Failed { attempts: 1 });
    }

    #[tokio::test]
    async fn test_local_exhaustion_without_backend_is_fatal() {
        let script = ModelScript::new(Step::Fail);
        let (mut coord, _) = coordinator(local_config(), &script);
        coord.initialize().await.unwrap();

        let camera = SharedCamera::new();
        let (listener, mut rx) = listener();
        coord.start_detection(camera.boxed(), listener).await.unwrap();
        assert!(camera.is_held());

        assert_eq!(coord.process_tick().await, TickOutcome::Failed { attempts: 1 });
        assert_eq!(coord.process_tick().await, TickOutcome::Failed { attempts: 2 });
        assert_eq!(coord.process_tick().await, TickOutcome::Fatal);

        assert_eq!(coord.state().await, CoordinatorState::Stopped);
        assert!(!camera.is_held());
        assert_eq!(camera.release_count(), 1);
        assert!(matches!(rx.try_recv(), Ok(Event::Fatal(_))));
        assert!(coord
            .last_error()
            .await
            .is_some_and(|e| e.contains("exhausted")));
        assert_eq!(coord.process_tick().await, TickOutcome::Idle);
    }

    #[tokio::test]
    async fn test_both_modes_exhausted() {
        let server = MockServer::start().await;
        mount_online(&server).await;
        mount_drowsiness(&server, ResponseTemplate::new(500)).await;

        let script = ModelScript::new(Step::Fail);
        let (mut coord, _) = coordinator(local_with_backend(&server), &script);
        assert_eq!(coord.initialize().await.unwrap(), DetectionMode::Local);

        let camera = SharedCamera::new();
        let (listener, mut rx) = listener();
        coord.start_detection(camera.boxed(), listener).await.unwrap();

        coord.process_tick().await;
        coord.process_tick().await;
        assert_eq!(
            coord.process_tick().await,
            TickOutcome::FailedOver {
                from: DetectionMode::Local,
                to: DetectionMode::Backend
            }
        );
        assert!(!camera.is_held());

        coord.process_tick().await;
        coord.process_tick().await;
        assert_eq!(coord.process_tick().await, TickOutcome::Fatal);
        assert!(!coord.is_detecting().await);

        assert!(matches!(rx.try_recv(), Ok(Event::ModeChanged(..))));
        assert!(matches!(rx.try_recv(), Ok(Event::Fatal(_))));
    }

    #[tokio::test]
    async fn test_switch_to_same_mode_is_noop() {
        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(local_config(), &script);
        coord.initialize().await.unwrap();
        let (listener, _rx) = listener();
        coord.start_detection(SharedCamera::new().boxed(), listener).await.unwrap();
        let generation = coord.session_generation().await;

        assert_eq!(coord.switch_mode(DetectionMode::Local).await.unwrap(), DetectionMode::Local);
        assert_eq!(coord.session_generation().await, generation);
        assert!(coord.is_detecting().await);
        assert_eq!(script.loads(), 1);
    }

    #[tokio::test]
    async fn test_switch_mode_round_trip() {
        let server = MockServer::start().await;
        mount_online(&server).await;
        mount_drowsiness(
            &server,
            ResponseTemplate::new(200).set_body_json(drowsiness_body(20, "normal")),
        )
        .await;

        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(local_with_backend(&server), &script);
        coord.initialize().await.unwrap();
        let camera = SharedCamera::new();
        let (listener, _rx) = listener();
        coord.start_detection(camera.boxed(), listener).await.unwrap();
        let generation = coord.session_generation().await;

        assert_eq!(
            coord.switch_mode(DetectionMode::Backend).await.unwrap(),
            DetectionMode::Backend
        );
        assert!(coord.session_generation().await > generation);
        assert!(coord.is_detecting().await);
        assert!(!camera.is_held());
        assert_eq!(coord.process_tick().await, TickOutcome::Completed);
        assert_eq!(
            coord.last_result().await.map(|r| r.source),
            Some(DetectionMode::Backend)
        );

        assert_eq!(
            coord.switch_mode(DetectionMode::Local).await.unwrap(),
            DetectionMode::Local
        );
        assert!(camera.is_held());
        assert_eq!(camera.open_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_switch_reverts_and_resumes() {
        // Backend configured but offline
        let server = MockServer::start().await;
        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(local_with_backend(&server), &script);
        coord.initialize().await.unwrap();
        let camera = SharedCamera::new();
        let (listener, _rx) = listener();
        coord.start_detection(camera.boxed(), listener).await.unwrap();

        assert_eq!(
            coord.switch_mode(DetectionMode::Backend).await.unwrap(),
            DetectionMode::Local
        );
        assert_eq!(coord.current_mode(), DetectionMode::Local);
        assert!(coord.is_detecting().await);
        assert!(camera.is_held());
        assert!(coord.last_error().await.is_some());
        assert_eq!(coord.process_tick().await, TickOutcome::Completed);
    }

    #[tokio::test]
    async fn test_failed_switch_and_revert_stops() {
        let server = MockServer::start().await;
        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(local_with_backend(&server), &script);
        coord.initialize().await.unwrap();
        let camera = SharedCamera::new();
        let (listener, _rx) = listener();
        coord.start_detection(camera.boxed(), listener).await.unwrap();

        // Model can no longer be loaded either
        script.fail_loads(true);
        assert!(matches!(
            coord.switch_mode(DetectionMode::Backend).await,
            Err(CoordinatorError::Initialization(_))
        ));
        assert!(!coord.is_detecting().await);
        assert!(!camera.is_held());
    }

    #[tokio::test]
    async fn test_stop_then_start_resets_counters() {
        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(local_config(), &script);
        coord.initialize().await.unwrap();
        let camera = SharedCamera::new();
        let (listener, _rx) = listener();
        coord.start_detection(camera.boxed(), listener).await.unwrap();

        script.push(Step::Face(0.3), 20);
        script.push(Step::Face(0.05), 5);
        script.push(Step::Face(0.3), 15);
        for _ in 0..40 {
            assert_eq!(coord.process_tick().await, TickOutcome::Completed);
        }
        script.push(Step::Nod(0.3), 5);
        for _ in 0..5 {
            assert_eq!(coord.process_tick().await, TickOutcome::Completed);
        }
        let before = coord.last_result().await.unwrap();
        assert_eq!(before.blink_count, 1);
        assert_eq!(before.nod_count, 1);

        coord.stop_detection().await;
        assert_eq!(coord.state().await, CoordinatorState::Stopped);
        assert!(!camera.is_held());
        assert!(coord.last_result().await.is_none());
        assert_eq!(coord.process_tick().await, TickOutcome::Idle);

        let (listener, _rx) = self::listener();
        coord.start_detection(camera.boxed(), listener).await.unwrap();
        assert!(camera.is_held());
        assert_eq!(coord.process_tick().await, TickOutcome::Completed);

        let after = coord.last_result().await.unwrap();
        assert_eq!(after.blink_count, 0);
        assert_eq!(after.nod_count, 0);
        assert!((after.ear_value - 0.3).abs() < 1e-4);
        assert_eq!(after.drowsiness_level, 9);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(local_config(), &script);
        coord.initialize().await.unwrap();

        let first = SharedCamera::new();
        let second = SharedCamera::new();
        let (listener_a, _rx_a) = listener();
        let (listener_b, _rx_b) = listener();
        coord.start_detection(first.boxed(), listener_a).await.unwrap();
        let generation = coord.session_generation().await;

        coord.start_detection(second.boxed(), listener_b).await.unwrap();
        assert_eq!(coord.session_generation().await, generation);
        assert!(first.is_held());
        assert_eq!(second.open_count(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let server = MockServer::start().await;
        mount_online(&server).await;
        mount_drowsiness(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(drowsiness_body(20, "normal"))
                .set_delay(Duration::from_millis(300)),
        )
        .await;

        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, _) = coordinator(backend_config(&server), &script);
        coord.initialize().await.unwrap();
        let (listener, _rx) = listener();
        coord.start_detection(SharedCamera::new().boxed(), listener).await.unwrap();

        let (first, second) = tokio::join!(coord.process_tick(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            coord.process_tick().await
        });
        assert_eq!(first, TickOutcome::Completed);
        assert_eq!(second, TickOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_loop_delivers_until_stopped() {
        let script = ModelScript::new(Step::Face(0.3));
        let (mut coord, scheduler) = coordinator(local_config(), &script);
        coord.initialize().await.unwrap();
        let (listener, mut rx) = listener();
        coord.start_detection(SharedCamera::new().boxed(), listener).await.unwrap();

        for _ in 0..2 {
            scheduler.trigger();
            assert!(matches!(rx.recv().await, Some(Event::Result(_))));
        }

        coord.stop_detection().await;
        scheduler.trigger();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_cadence() {
        let script = ModelScript::new(Step::Face(0.3));
        let mut coord =
            DetectionCoordinator::new(local_config(), Arc::new(ScriptedLoader::new(script.clone())))
                .unwrap();
        coord.initialize().await.unwrap();
        let (listener, mut rx) = listener();
        coord.start_detection(SharedCamera::new().boxed(), listener).await.unwrap();

        // Ticks at 100..=500ms
        tokio::time::sleep(Duration::from_millis(550)).await;
        coord.stop_detection().await;

        let mut delivered = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, Event::Result(_)));
            delivered += 1;
        }
        assert_eq!(delivered, 5);
    }

    /// Eyes shut for 16s: a prolonged closure every ~3.1s, SOS at ~15.5s
    async fn escalate_to_sos() -> (DetectionCoordinator, ModelScript, CountingAlarm) {
        let script = ModelScript::new(Step::Face(0.05));
        let alarm = CountingAlarm::default();
        let mut coord =
            DetectionCoordinator::builder(local_config(), Arc::new(ScriptedLoader::new(script.clone())))
                .scheduler(Arc::new(ManualScheduler::new()))
                .alarm(alarm.clone())
                .build()
                .unwrap();
        coord.initialize().await.unwrap();
        let (listener, _rx) = listener();
        coord.start_detection(SharedCamera::new().boxed(), listener).await.unwrap();

        for _ in 0..160 {
            coord.process_tick().await;
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        (coord, script, alarm)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sos_escalation_and_acknowledge() {
        let (coord, _script, alarm) = escalate_to_sos().await;

        assert!(coord.sos_active().await);
        assert_eq!(coord.sos_event_count().await, 5);
        assert_eq!(alarm.sounds.load(Ordering::SeqCst), 1);
        let result = coord.last_result().await.unwrap();
        assert!(result.sos_active);
        assert_eq!(result.alerts.first(), Some(&DmsAlert::Sos));

        coord.acknowledge_sos().await;
        assert!(!coord.sos_active().await);
        assert_eq!(coord.sos_event_count().await, 0);
        assert_eq!(alarm.silences.load(Ordering::SeqCst), 1);
        assert!(!coord.last_result().await.unwrap().sos_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sos_expires_while_ticks_fail() {
        let (coord, script, alarm) = escalate_to_sos().await;
        assert_eq!(alarm.sounds.load(Ordering::SeqCst), 1);

        script.push(Step::Fail, 2);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(coord.process_tick().await, TickOutcome::Failed { attempts: 1 });

        // Expired by the failed tick itself, before anyone asks
        assert_eq!(alarm.silences.load(Ordering::SeqCst), 1);
        assert!(!coord.sos_active().await);
        assert_eq!(coord.sos_event_count().await, 3);
        assert!(!coord.last_result().await.unwrap().sos_active);

        assert_eq!(coord.process_tick().await, TickOutcome::Failed { attempts: 2 });
        assert_eq!(alarm.silences.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sos_expires_without_ticks() {
        let (coord, _script, alarm) = escalate_to_sos().await;
        assert!(coord.sos_active().await);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!coord.sos_active().await);
        assert_eq!(alarm.silences.load(Ordering::SeqCst), 1);
    }
}
