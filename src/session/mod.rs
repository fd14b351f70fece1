//! Session lifecycle: UnInitialized -> Initialized -> Running <-> Paused -> Destroyed.
//!
//! All state lives on the thread that calls [`SessionManager::update`] once per
//! frame. Native callbacks and off-thread results come back through the
//! session's [`MainThreadQueue`] before they touch anything here. Operations
//! called in the wrong state are logged and ignored.

pub mod collaborators;
pub mod config;
pub mod events;

use crate::device::{DeviceDriver, DeviceEvent};
use crate::dispatch::main_thread::MainThreadQueue;
use crate::dispatch::{AsyncTaskExecutor, TimeoutRace};
use crate::error::{ErrorReport, KernalError, KernelResult, Severity};
use crate::lock_unpoisoned;
use crate::native::translate::NativeResultTranslator;
use crate::native::{
    DeviceType, FrameRateMode, GlassesDisconnectReason, LostTrackingReason, NativeResult,
};
use crate::tracking::{INVALID_PRESENT_TIME, TrackingDriver, TrackingType, adapt_tracking_type};
use collaborators::{HostPlatform, SessionCollaborators, TeardownCascade};
use config::{DisplaySettings, PoseTrackerSettings, SessionBehaviour, SessionConfig};
use events::{ListenerId, ListenerSet, SessionEvent, TrackingModeChangedResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long native teardown may take after the glasses go away before the
/// host is told to terminate anyway.
pub const SDK_RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    UnInitialized,
    Initialized,
    Running,
    Paused,
    Destroyed,
}

pub type FatalErrorHandler = Box<dyn FnOnce(ErrorReport) + Send>;
pub type TrackingModeCallback = Box<dyn FnOnce(TrackingModeChangedResult) + Send>;

/// Cleared when the session releases its drivers. Off-thread work reads it
/// while holding the driver lock, so a teardown that already took the driver
/// is never followed by more native calls.
#[derive(Clone)]
struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    fn retire(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn with<T, R>(&self, target: &Mutex<T>, task: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = lock_unpoisoned(target);
        if self.0.load(Ordering::SeqCst) {
            Some(task(&mut guard))
        } else {
            None
        }
    }
}

pub struct SessionManager {
    state: SessionState,
    errored: bool,
    pending_start: bool,
    tracking_type: TrackingType,
    mode_changing: bool,
    lost_tracking_reason: LostTrackingReason,
    last_reason: LostTrackingReason,
    device_type: Option<DeviceType>,
    config: SessionConfig,
    pose_tracker: Option<PoseTrackerSettings>,
    display_settings: DisplaySettings,
    display_settings_applied: bool,
    device: Arc<Mutex<DeviceDriver>>,
    tracking: Arc<Mutex<TrackingDriver>>,
    collaborators: SessionCollaborators,
    host: Arc<dyn HostPlatform>,
    executor: AsyncTaskExecutor,
    main_thread: MainThreadQueue<SessionManager>,
    listeners: ListenerSet,
    fatal_handler: Option<FatalErrorHandler>,
    release: Option<TimeoutRace>,
    liveness: Liveness,
}

impl SessionManager {
    pub fn new(
        device: DeviceDriver,
        tracking: TrackingDriver,
        collaborators: SessionCollaborators,
        host: Arc<dyn HostPlatform>,
    ) -> Self {
        let main_thread: MainThreadQueue<SessionManager> = MainThreadQueue::new();

        let queue = main_thread.clone();
        device.add_listener(Arc::new(move |event: DeviceEvent| {
            queue.run_on_main_thread(move |session: &mut SessionManager| {
                session.handle_device_event(event)
            });
        }));

        Self {
            state: SessionState::UnInitialized,
            errored: false,
            pending_start: false,
            tracking_type: TrackingType::default(),
            mode_changing: false,
            lost_tracking_reason: LostTrackingReason::PreInitializing,
            last_reason: LostTrackingReason::Initializing,
            device_type: None,
            config: SessionConfig::default(),
            pose_tracker: None,
            display_settings: DisplaySettings::default(),
            display_settings_applied: false,
            device: Arc::new(Mutex::new(device)),
            tracking: Arc::new(Mutex::new(tracking)),
            collaborators,
            host,
            executor: AsyncTaskExecutor::new(),
            main_thread,
            listeners: ListenerSet::default(),
            fatal_handler: None,
            release: None,
            liveness: Liveness::new(),
        }
    }

    pub fn with_display_settings(mut self, settings: DisplaySettings) -> Self {
        self.display_settings = settings;
        self
    }

    pub fn create_session(&mut self, behaviour: SessionBehaviour) -> KernelResult<()> {
        if self.errored || self.state != SessionState::UnInitialized {
            log::warn!(
                "[session] create_session rejected in state {:?} (errored={})",
                self.state,
                self.errored
            );
            return Ok(());
        }
        match self.prepare(behaviour) {
            Ok(()) => {
                self.transition(SessionState::Initialized);
                Ok(())
            }
            Err(err) => {
                self.report_error(err.clone());
                Err(err)
            }
        }
    }

    fn prepare(&mut self, behaviour: SessionBehaviour) -> KernelResult<()> {
        self.apply_display_settings();

        let SessionBehaviour {
            mut config,
            pose_tracker,
        } = behaviour;
        let pose_tracker = pose_tracker.ok_or_else(|| {
            KernalError::MissingComponent(
                "[session] create_session: pose tracker is missing".to_string(),
            )
        })?;

        let device_type = {
            let mut device = lock_unpoisoned(&self.device);
            device.init()?;
            let checked = device.device_type().and_then(|device_type| {
                if config.is_target_device(device_type) {
                    Ok(device_type)
                } else {
                    Err(KernalError::UnsupportedDevice(format!(
                        "[session] create_session: {device_type:?} is not one of [{}]",
                        config.target_device_types_desc()
                    )))
                }
            });
            if checked.is_err() {
                device.stop();
            }
            checked?
        };

        let tracking_type = if pose_tracker.auto_adapt {
            self.adapt(pose_tracker.tracking_type)
        } else {
            pose_tracker.tracking_type
        };
        if tracking_type != pose_tracker.tracking_type {
            log::warn!(
                "[session] tracking type adapted: {:?} => {tracking_type:?}",
                pose_tracker.tracking_type
            );
        }
        adapt_config(&mut config, device_type, tracking_type);

        log::info!("[session] create session: device={device_type:?} tracking={tracking_type:?}");
        self.device_type = Some(device_type);
        self.tracking_type = tracking_type;
        self.config = config;
        self.pose_tracker = Some(pose_tracker);

        let mode = tracking_type.mode();
        self.dispatch(
            "init_tracking_mode",
            &self.tracking,
            move |tracking: &mut TrackingDriver| tracking.init_tracking_mode(mode),
        );
        Ok(())
    }

    fn adapt(&self, requested: TrackingType) -> TrackingType {
        let device = lock_unpoisoned(&self.device);
        adapt_tracking_type(requested, |feature| {
            device.is_feature_supported(feature).unwrap_or(false)
        })
    }

    fn apply_display_settings(&mut self) {
        if self.display_settings_applied {
            return;
        }
        self.host.apply_display_settings(&self.display_settings);
        self.display_settings_applied = true;
    }

    /// Starts immediately from `Initialized`; from `UnInitialized` the start is
    /// deferred to the first [`Self::update`] after initialization.
    pub fn start_session(&mut self) {
        if self.errored {
            log::warn!("[session] start_session rejected: session errored");
            return;
        }
        match self.state {
            SessionState::UnInitialized => {
                log::debug!("[session] start_session waiting for initialization");
                self.pending_start = true;
            }
            SessionState::Initialized => self.begin_running(),
            state => log::warn!("[session] start_session rejected in state {state:?}"),
        }
    }

    fn begin_running(&mut self) {
        self.pending_start = false;
        let pose_tracker = self.pose_tracker.clone().unwrap_or_default();

        lock_unpoisoned(&self.collaborators.renderer)
            .initialize(&pose_tracker.left_eye, &pose_tracker.right_eye);
        lock_unpoisoned(&self.collaborators.trackables).start();

        self.dispatch(
            "start_tracking",
            &self.tracking,
            |tracking: &mut TrackingDriver| tracking.start(),
        );

        // Running once tracking start is queued, not when it is confirmed.
        self.transition(SessionState::Running);

        let config = self.config.clone();
        self.set_configuration(config);
    }

    pub fn set_configuration(&mut self, mut config: SessionConfig) {
        if self.errored
            || matches!(
                self.state,
                SessionState::UnInitialized | SessionState::Destroyed | SessionState::Paused
            )
        {
            log::warn!(
                "[session] set_configuration rejected in state {:?} (errored={})",
                self.state,
                self.errored
            );
            return;
        }
        if let Some(device_type) = self.device_type {
            adapt_config(&mut config, device_type, self.tracking_type);
        }
        let trackable = config.trackable_config();
        self.config = config;

        self.dispatch(
            "update_config",
            &self.tracking,
            move |tracking: &mut TrackingDriver| {
                tracking.update_config(trackable);
                Ok(())
            },
        );
    }

    pub fn recenter(&mut self) {
        if self.errored || self.state != SessionState::Running {
            log::warn!("[session] recenter rejected in state {:?}", self.state);
            return;
        }
        self.dispatch("recenter", &self.tracking, |tracking: &mut TrackingDriver| {
            tracking.recenter();
            Ok(())
        });
    }

    /// Pauses consumers before the drivers they read from, on this thread.
    pub fn disable_session(&mut self) {
        if self.state != SessionState::Running {
            log::warn!("[session] disable_session rejected in state {:?}", self.state);
            return;
        }
        lock_unpoisoned(&self.collaborators.trackables).pause();
        lock_unpoisoned(&self.collaborators.renderer).pause();
        lock_unpoisoned(&self.tracking).pause();
        lock_unpoisoned(&self.device).pause();
        self.transition(SessionState::Paused);
    }

    /// Exact reverse of [`Self::disable_session`].
    pub fn resume_session(&mut self) {
        if self.state != SessionState::Paused {
            log::warn!("[session] resume_session rejected in state {:?}", self.state);
            return;
        }
        lock_unpoisoned(&self.device).resume();
        lock_unpoisoned(&self.tracking).resume();
        lock_unpoisoned(&self.collaborators.renderer).resume();
        lock_unpoisoned(&self.collaborators.trackables).resume();
        self.transition(SessionState::Running);
    }

    pub fn destroy_session(&mut self) {
        if matches!(
            self.state,
            SessionState::UnInitialized | SessionState::Destroyed
        ) {
            return;
        }
        self.transition(SessionState::Destroyed);
        self.pending_start = false;
        self.liveness.retire();
        self.teardown().run();
    }

    fn teardown(&self) -> TeardownCascade {
        TeardownCascade {
            collaborators: self.collaborators.clone(),
            tracking: Arc::clone(&self.tracking),
            device: Arc::clone(&self.device),
        }
    }

    /// Single entry for every classified error. The first fatal error notifies
    /// the host and tears the session down; anything after it is dropped.
    pub fn report_error(&mut self, error: KernalError) {
        if self.errored {
            log::warn!("[session] error ignored after fatal error: {error}");
            return;
        }
        match error.severity() {
            Severity::Normal => {
                log::warn!("[session] recoverable error: {error}");
                self.publish(SessionEvent::RecoverableError(error));
            }
            Severity::High => {
                log::error!("[session] fatal error: {error}");
                self.errored = true;
                self.pending_start = false;
                self.liveness.retire();
                match self.fatal_handler.take() {
                    Some(handler) => handler(ErrorReport::from(error)),
                    None => log::error!("[session] no fatal error handler installed"),
                }
                self.destroy_session();
            }
        }
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Glasses(kind) => {
                log::info!("[session] glasses {kind:?}");
                self.publish(SessionEvent::GlassesStateChanged(kind));
            }
            DeviceEvent::Disconnected(reason) => self.on_glasses_disconnected(reason),
        }
    }

    fn on_glasses_disconnected(&mut self, reason: GlassesDisconnectReason) {
        self.publish(SessionEvent::GlassesDisconnected(reason));
        let terminate = reason == GlassesDisconnectReason::GlassesDisconnect
            || self.config.force_kill_on_glasses_switch_mode;

        if matches!(
            self.state,
            SessionState::UnInitialized | SessionState::Destroyed
        ) {
            log::info!(
                "[session] glasses disconnected ({reason:?}) with nothing to release in state {:?}",
                self.state
            );
            if terminate {
                self.host.terminate(true);
            }
            return;
        }

        log::warn!("[session] glasses disconnected ({reason:?}), releasing session");
        self.transition(SessionState::Destroyed);
        self.pending_start = false;
        self.liveness.retire();

        let cascade = self.teardown();
        let released_host = Arc::clone(&self.host);
        let timeout_host = Arc::clone(&self.host);
        let race = self.executor.run_off_thread_with_timeout(
            move |guard| {
                cascade.run();
                if guard.complete() && terminate {
                    released_host.terminate(true);
                }
            },
            move || {
                log::error!("[session] native release timed out");
                if terminate {
                    timeout_host.terminate(false);
                }
            },
            SDK_RELEASE_TIMEOUT,
        );
        match race {
            Ok(race) => self.release = Some(race),
            Err(err) => {
                log::error!("[session] release not dispatched: {err}");
                self.teardown().run();
                if terminate {
                    self.host.terminate(true);
                }
            }
        }
    }

    /// Switches tracking off-thread. `on_changed` runs exactly once on the
    /// calling thread: right away when the change is rejected, otherwise from
    /// [`Self::update`] once the switch has been attempted.
    pub fn change_tracking_mode<F>(
        &mut self,
        target: TrackingType,
        auto_adapt: bool,
        on_changed: F,
    ) -> bool
    where
        F: FnOnce(TrackingModeChangedResult) + Send + 'static,
    {
        let blocked =
            self.mode_changing || self.errored || self.state == SessionState::Destroyed;
        let target = if auto_adapt && !blocked {
            self.adapt(target)
        } else {
            target
        };
        if blocked || target == self.tracking_type {
            log::warn!(
                "[session] change tracking mode to {target:?} rejected (current={:?}, changing={}, state={:?})",
                self.tracking_type,
                self.mode_changing,
                self.state
            );
            on_changed(TrackingModeChangedResult {
                success: false,
                tracking_type: self.tracking_type,
            });
            return false;
        }

        log::info!("[session] changing tracking mode {:?} => {target:?}", self.tracking_type);
        self.publish(SessionEvent::TrackingModeChanging {
            from: self.tracking_type,
            to: target,
        });
        self.mode_changing = true;

        let callback: TrackingModeCallback = Box::new(on_changed);
        let slot = Arc::new(Mutex::new(Some(callback)));
        let pending = Arc::clone(&slot);
        let tracking = Arc::clone(&self.tracking);
        let liveness = self.liveness.clone();
        let queue = self.main_thread.clone();
        let dispatched = self.executor.run_off_thread(move || {
            let outcome = liveness
                .with(&*tracking, |driver: &mut TrackingDriver| {
                    driver.switch_tracking_mode(target.mode())
                })
                .unwrap_or_else(|| Err(mode_change_failed()));
            queue.run_on_main_thread(move |session: &mut SessionManager| {
                let on_changed = lock_unpoisoned(&pending).take();
                session.finish_mode_change(target, outcome, on_changed)
            });
        });
        if let Err(err) = dispatched {
            log::error!("[session] change tracking mode not dispatched: {err}");
            let on_changed = lock_unpoisoned(&slot).take();
            self.finish_mode_change(target, Err(mode_change_failed()), on_changed);
            return false;
        }
        true
    }

    fn finish_mode_change(
        &mut self,
        target: TrackingType,
        outcome: KernelResult<()>,
        on_changed: Option<TrackingModeCallback>,
    ) {
        self.mode_changing = false;
        let success = match outcome {
            Ok(()) => {
                self.tracking_type = target;
                true
            }
            Err(err) => {
                log::error!("[session] change tracking mode failed: {err}");
                false
            }
        };
        let result = TrackingModeChangedResult {
            success,
            tracking_type: self.tracking_type,
        };
        log::info!("[session] tracking mode change finished: {result:?}");
        if let Some(on_changed) = on_changed {
            on_changed(result);
        }
        self.publish(SessionEvent::TrackingModeChanged(result));
    }

    /// Per-frame entry point for the host.
    pub fn update(&mut self, delta_seconds: f64) {
        let queue = self.main_thread.clone();
        queue.advance(delta_seconds);
        for action in queue.take_due() {
            action(self);
        }

        if self.pending_start {
            match self.state {
                SessionState::Initialized if !self.errored => self.begin_running(),
                SessionState::UnInitialized if !self.errored => {
                    log::debug!("[session] waiting for initialization")
                }
                _ => self.pending_start = false,
            }
        }

        self.on_pre_update();
    }

    fn on_pre_update(&mut self) {
        if self.state != SessionState::Running
            || self.errored
            || self.mode_changing
            || self.tracking_type == TrackingType::Tracking0Dof
        {
            return;
        }
        let Some(reason) = lock_unpoisoned(&self.tracking).lost_tracking_reason() else {
            return;
        };
        self.lost_tracking_reason = reason;

        if self.tracking_type != TrackingType::Tracking0DofStable {
            let lost = reason != LostTrackingReason::None;
            let was_lost = self.last_reason != LostTrackingReason::None;
            if lost && !was_lost {
                log::warn!("[session] hmd lost tracking: {reason:?}");
                self.publish(SessionEvent::HmdLostTracking);
            } else if !lost && was_lost {
                log::info!("[session] hmd pose ready");
                self.publish(SessionEvent::HmdPoseReady);
            }
        }
        self.last_reason = reason;
    }

    /// Runs `task` against `target` on the worker unless the session has
    /// been released by then. Errors come back to [`Self::report_error`].
    fn dispatch<T, F>(&self, func: &'static str, target: &Arc<Mutex<T>>, task: F)
    where
        T: Send + 'static,
        F: FnOnce(&mut T) -> KernelResult<()> + Send + 'static,
    {
        let target = Arc::clone(target);
        let liveness = self.liveness.clone();
        let queue = self.main_thread.clone();
        let dispatched = self.executor.run_off_thread(move || {
            match liveness.with(&*target, task) {
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    queue.run_on_main_thread(move |session: &mut SessionManager| {
                        session.report_error(err)
                    });
                }
                None => log::debug!("[session] {func} skipped: session released"),
            }
        });
        if let Err(err) = dispatched {
            log::error!("[session] {func} not dispatched: {err}");
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        log::info!("[session] {from:?} => {to:?}");
        self.state = to;
        self.publish(SessionEvent::StateChanged { from, to });
    }

    fn publish(&mut self, event: SessionEvent) {
        self.listeners.publish(&event);
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.listeners.add(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Replaces the handler that receives the first fatal error.
    pub fn set_fatal_error_handler<F>(&mut self, handler: F)
    where
        F: FnOnce(ErrorReport) + Send + 'static,
    {
        self.fatal_handler = Some(Box::new(handler));
    }

    /// Applied off-thread; values are clamped by the device.
    pub fn set_brightness(&mut self, brightness: i32) {
        if self.errored || self.state == SessionState::Destroyed {
            log::warn!("[session] set_brightness rejected in state {:?}", self.state);
            return;
        }
        self.dispatch("set_brightness", &self.device, move |device: &mut DeviceDriver| {
            device.set_brightness(brightness);
            Ok(())
        });
    }

    pub fn brightness(&self) -> i32 {
        lock_unpoisoned(&self.device).brightness()
    }

    pub fn set_frame_rate_mode(&mut self, mode: FrameRateMode) -> bool {
        if !matches!(self.state, SessionState::Running | SessionState::Paused) {
            log::warn!("[session] set_frame_rate_mode rejected in state {:?}", self.state);
            return false;
        }
        lock_unpoisoned(&self.tracking).set_frame_rate_mode(mode)
    }

    pub fn frame_present_time_by_count(&self, count: i32) -> u64 {
        if self.state != SessionState::Running {
            return INVALID_PRESENT_TIME;
        }
        lock_unpoisoned(&self.tracking).frame_present_time_by_count(count)
    }

    pub fn set_focus_distance(&mut self, distance: f32) {
        if self.state != SessionState::Running {
            return;
        }
        lock_unpoisoned(&self.collaborators.renderer).set_focus_distance(distance);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(
            self.state,
            SessionState::UnInitialized | SessionState::Destroyed
        )
    }

    pub fn is_errored(&self) -> bool {
        self.errored
    }

    pub fn is_tracking_mode_changing(&self) -> bool {
        self.mode_changing
    }

    pub fn tracking_type(&self) -> TrackingType {
        self.tracking_type
    }

    pub fn lost_tracking_reason(&self) -> LostTrackingReason {
        self.lost_tracking_reason
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        self.device_type
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn device(&self) -> Arc<Mutex<DeviceDriver>> {
        Arc::clone(&self.device)
    }

    pub fn tracking(&self) -> Arc<Mutex<TrackingDriver>> {
        Arc::clone(&self.tracking)
    }

    pub fn executor(&self) -> &AsyncTaskExecutor {
        &self.executor
    }

    pub fn main_thread(&self) -> MainThreadQueue<SessionManager> {
        self.main_thread.clone()
    }

    /// The pending release race started by a glasses disconnect, if any.
    pub fn take_release(&mut self) -> Option<TimeoutRace> {
        self.release.take()
    }
}

fn mode_change_failed() -> KernalError {
    NativeResultTranslator::translate(NativeResult::Failure, "session", "change_tracking_mode")
}

/// Plane and image finding need 6DoF tracking on a device that has it.
fn adapt_config(config: &mut SessionConfig, device_type: DeviceType, tracking_type: TrackingType) {
    let reason = if device_type == DeviceType::NrealAir {
        "device has no trackable finding"
    } else if tracking_type != TrackingType::Tracking6Dof {
        "tracking is not 6dof"
    } else {
        return;
    };
    if config.disable_finding() {
        log::warn!("[session] plane and image finding disabled: {reason}");
    }
}
