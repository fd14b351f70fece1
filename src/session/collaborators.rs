//! Host-supplied components the session drives but does not own.

use super::config::{DisplaySettings, EyeCamera};
use crate::device::DeviceDriver;
use crate::lock_unpoisoned;
use crate::tracking::TrackingDriver;
use std::sync::{Arc, Mutex};

pub trait Renderer: Send {
    fn initialize(&mut self, left: &EyeCamera, right: &EyeCamera);
    fn pause(&mut self);
    fn resume(&mut self);
    fn destroy(&mut self);
    fn set_focus_distance(&mut self, distance: f32);
}

pub trait TrackableManager: Send {
    fn start(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
}

pub trait InputLayer: Send {
    fn destroy(&mut self);
}

/// Process-level services only the host can provide.
pub trait HostPlatform: Send + Sync {
    fn apply_display_settings(&self, settings: &DisplaySettings);
    /// Asks the host to end the process. `released` is false when native
    /// teardown did not finish in time.
    fn terminate(&self, released: bool);
}

pub type SharedRenderer = Arc<Mutex<Box<dyn Renderer>>>;
pub type SharedTrackableManager = Arc<Mutex<Box<dyn TrackableManager>>>;
pub type SharedInputLayer = Arc<Mutex<Box<dyn InputLayer>>>;

#[derive(Clone)]
pub struct SessionCollaborators {
    pub renderer: SharedRenderer,
    pub trackables: SharedTrackableManager,
    pub input: SharedInputLayer,
}

impl SessionCollaborators {
    pub fn new(
        renderer: Box<dyn Renderer>,
        trackables: Box<dyn TrackableManager>,
        input: Box<dyn InputLayer>,
    ) -> Self {
        Self {
            renderer: Arc::new(Mutex::new(renderer)),
            trackables: Arc::new(Mutex::new(trackables)),
            input: Arc::new(Mutex::new(input)),
        }
    }
}

/// Ordered release of everything a session holds. Consumers go before the
/// drivers they read from.
pub(crate) struct TeardownCascade {
    pub(crate) collaborators: SessionCollaborators,
    pub(crate) tracking: Arc<Mutex<TrackingDriver>>,
    pub(crate) device: Arc<Mutex<DeviceDriver>>,
}

impl TeardownCascade {
    pub(crate) fn run(&self) {
        lock_unpoisoned(&self.collaborators.trackables).stop();
        lock_unpoisoned(&self.collaborators.renderer).destroy();
        lock_unpoisoned(&self.tracking).stop();
        lock_unpoisoned(&self.device).stop();
        lock_unpoisoned(&self.collaborators.input).destroy();
        log::info!("[session] teardown complete");
    }
}
