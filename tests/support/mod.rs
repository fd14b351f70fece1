#![allow(dead_code)]

use glasses_kernel::device::DeviceDriver;
use glasses_kernel::native::DeviceType;
use glasses_kernel::native::simulated::{
    CallJournal, FaultPlan, GlassesSignal, SimulatedBackend, TrackingMonitor,
};
use glasses_kernel::session::SessionManager;
use glasses_kernel::session::collaborators::{
    HostPlatform, InputLayer, Renderer, SessionCollaborators, TrackableManager,
};
use glasses_kernel::session::config::{
    DisplaySettings, EyeCamera, PoseTrackerSettings, SessionBehaviour, SessionConfig,
};
use glasses_kernel::tracking::TrackingDriver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FRAME: f64 = 1.0 / 60.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Writes `<prefix>.<call>` into the shared journal for every collaborator call.
pub struct Recorder {
    prefix: &'static str,
    journal: CallJournal,
}

impl Recorder {
    pub fn new(prefix: &'static str, journal: &CallJournal) -> Self {
        Self {
            prefix,
            journal: journal.clone(),
        }
    }

    fn record(&self, call: &str) {
        self.journal.record(format!("{}.{}", self.prefix, call));
    }
}

impl Renderer for Recorder {
    fn initialize(&mut self, _left: &EyeCamera, _right: &EyeCamera) {
        self.record("initialize");
    }

    fn pause(&mut self) {
        self.record("pause");
    }

    fn resume(&mut self) {
        self.record("resume");
    }

    fn destroy(&mut self) {
        self.record("destroy");
    }

    fn set_focus_distance(&mut self, _distance: f32) {
        self.record("set_focus_distance");
    }
}

impl TrackableManager for Recorder {
    fn start(&mut self) {
        self.record("start");
    }

    fn pause(&mut self) {
        self.record("pause");
    }

    fn resume(&mut self) {
        self.record("resume");
    }

    fn stop(&mut self) {
        self.record("stop");
    }
}

impl InputLayer for Recorder {
    fn destroy(&mut self) {
        self.record("destroy");
    }
}

#[derive(Default)]
pub struct RecordingHost {
    display_settings: Mutex<Vec<DisplaySettings>>,
    terminations: Mutex<Vec<bool>>,
}

impl RecordingHost {
    pub fn display_settings_applied(&self) -> usize {
        self.display_settings.lock().unwrap().len()
    }

    pub fn terminations(&self) -> Vec<bool> {
        self.terminations.lock().unwrap().clone()
    }
}

impl HostPlatform for RecordingHost {
    fn apply_display_settings(&self, settings: &DisplaySettings) {
        self.display_settings.lock().unwrap().push(*settings);
    }

    fn terminate(&self, released: bool) {
        self.terminations.lock().unwrap().push(released);
    }
}

pub struct Harness {
    pub session: SessionManager,
    pub journal: CallJournal,
    pub faults: FaultPlan,
    pub signal: GlassesSignal,
    pub monitor: TrackingMonitor,
    pub host: Arc<RecordingHost>,
}

impl Harness {
    pub fn new(device_type: DeviceType) -> Self {
        init_logging();
        let SimulatedBackend {
            hmd,
            glasses,
            tracking,
            journal,
            faults,
            signal,
            monitor,
        } = SimulatedBackend::new(device_type);

        let host = Arc::new(RecordingHost::default());
        let collaborators = SessionCollaborators::new(
            Box::new(Recorder::new("renderer", &journal)),
            Box::new(Recorder::new("trackables", &journal)),
            Box::new(Recorder::new("input", &journal)),
        );
        let session = SessionManager::new(
            DeviceDriver::new(Box::new(hmd), Box::new(glasses)),
            TrackingDriver::new(Box::new(tracking)),
            collaborators,
            host.clone(),
        );

        Self {
            session,
            journal,
            faults,
            signal,
            monitor,
            host,
        }
    }

    /// A session that has been created, started and has finished its
    /// off-thread start-up work.
    pub fn running(device_type: DeviceType) -> Self {
        let mut harness = Self::new(device_type);
        harness
            .session
            .create_session(behaviour())
            .expect("create session");
        harness.session.start_session();
        harness.settle();
        harness
    }

    /// Waits for queued native work, then runs one frame so its results land.
    pub fn settle(&mut self) {
        assert!(
            self.session.executor().flush(Duration::from_secs(5)),
            "async work did not finish"
        );
        self.session.update(FRAME);
    }

    /// Journal entries whose call name starts with one of `prefixes`.
    pub fn calls(&self, prefixes: &[&str]) -> Vec<String> {
        self.journal
            .entries()
            .into_iter()
            .filter(|entry| prefixes.iter().any(|prefix| entry.starts_with(prefix)))
            .collect()
    }
}

pub fn behaviour() -> SessionBehaviour {
    SessionBehaviour::new(SessionConfig::default(), PoseTrackerSettings::default())
}
