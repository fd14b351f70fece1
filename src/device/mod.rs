//! Owns the native HMD and glasses-controller handles.
//!
//! Queries are only answered while the glasses are running, plugged in and
//! initialized; otherwise they fail with [`KernalError::GlassesNotAvailable`].
//! Wear and disconnect notifications arrive on native threads and are fanned
//! out to registered [`DeviceListener`]s on that same thread, so listeners
//! must hand them off to the main thread before touching shared state.

use crate::error::{KernalError, KernelResult};
use crate::lifecycle::{RunState, SubsystemLifecycle};
use crate::lock_unpoisoned;
use crate::native::translate::NativeResultTranslator;
use crate::native::{
    DeviceHandle, DeviceType, DistortionParams, EyeProjection, Fov4f, GlassesDisconnectReason,
    GlassesTemperatureLevel, Mat3, NativeDevice, NativeGlassesController, NativeHmd,
    NativeResult, Pose, Resolution, SupportedFeature,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const MODULE: &str = "device";

pub const MIN_BRIGHTNESS: i32 = 0;
pub const MAX_BRIGHTNESS: i32 = 7;
/// Returned by [`DeviceDriver::brightness`] when the value cannot be read.
pub const INVALID_BRIGHTNESS: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlassesEventType {
    PutOn,
    PutOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceEvent {
    Glasses(GlassesEventType),
    Disconnected(GlassesDisconnectReason),
}

pub type DeviceListener = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

pub struct DeviceDriver {
    hmd: Box<dyn NativeHmd>,
    glasses: Box<dyn NativeGlassesController>,
    hmd_handle: Option<DeviceHandle>,
    glasses_handle: Option<DeviceHandle>,
    lifecycle: SubsystemLifecycle,
    init_error: Option<KernalError>,
    unplugged: Arc<AtomicBool>,
    listeners: Arc<Mutex<Vec<DeviceListener>>>,
}

impl DeviceDriver {
    pub fn new(hmd: Box<dyn NativeHmd>, glasses: Box<dyn NativeGlassesController>) -> Self {
        Self {
            hmd,
            glasses,
            hmd_handle: None,
            glasses_handle: None,
            lifecycle: SubsystemLifecycle::default(),
            init_error: None,
            unplugged: Arc::new(AtomicBool::new(false)),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Brings the glasses up once. A failed bring-up is remembered and raised
    /// again on every later call without touching the native layer.
    pub fn init(&mut self) -> KernelResult<()> {
        if let Some(err) = &self.init_error {
            return Err(err.clone());
        }
        self.start()
    }

    /// No-op unless stopped. Failures latch the init error.
    pub fn start(&mut self) -> KernelResult<()> {
        if !self.lifecycle.can_start() {
            return Ok(());
        }
        if let Err(err) = self.bring_up() {
            log::error!("[device] start failed: {err}");
            self.init_error = Some(err.clone());
            return Err(err);
        }
        self.lifecycle.mark(RunState::Running);
        log::info!(
            "[device] started {} / {}",
            self.hmd.label(),
            self.glasses.label()
        );
        Ok(())
    }

    /// Creates the glasses before the HMD. On failure, whatever was already
    /// created is released again before the error is returned.
    fn bring_up(&mut self) -> KernelResult<()> {
        let glasses = NativeResultTranslator::check(self.glasses.create(), MODULE, "glasses.create")?;
        self.glasses_handle = Some(glasses);

        let started = self.register_callbacks().and_then(|()| {
            NativeResultTranslator::check(self.glasses.start(), MODULE, "glasses.start")
        });
        if let Err(err) = started {
            self.release_glasses(false);
            return Err(err);
        }

        match NativeResultTranslator::check(self.hmd.create(), MODULE, "hmd.create") {
            Ok(hmd) => {
                self.hmd_handle = Some(hmd);
                Ok(())
            }
            Err(err) => {
                self.release_glasses(true);
                Err(err)
            }
        }
    }

    fn register_callbacks(&mut self) -> KernelResult<()> {
        let listeners = Arc::clone(&self.listeners);
        NativeResultTranslator::check(
            self.glasses
                .register_wear_callback(Arc::new(move |status: i32| match status {
                    1 => fan_out(&listeners, DeviceEvent::Glasses(GlassesEventType::PutOn)),
                    0 => fan_out(&listeners, DeviceEvent::Glasses(GlassesEventType::PutOff)),
                    other => log::warn!("[device] unknown wearing status {other}"),
                })),
            MODULE,
            "glasses.register_wear_callback",
        )?;

        let listeners = Arc::clone(&self.listeners);
        let unplugged = Arc::clone(&self.unplugged);
        NativeResultTranslator::check(
            self.glasses
                .register_disconnect_callback(Arc::new(move |reason: GlassesDisconnectReason| {
                    if unplugged.swap(true, Ordering::SeqCst) {
                        log::debug!("[device] ignoring repeated disconnect ({reason:?})");
                        return;
                    }
                    log::warn!("[device] glasses disconnected: {reason:?}");
                    fan_out(&listeners, DeviceEvent::Disconnected(reason));
                })),
            MODULE,
            "glasses.register_disconnect_callback",
        )
    }

    fn release_glasses(&mut self, started: bool) {
        if self.glasses_handle.is_none() {
            return;
        }
        if started {
            NativeResultTranslator::report(self.glasses.stop(), MODULE, "glasses.stop");
        }
        NativeResultTranslator::report(self.glasses.destroy(), MODULE, "glasses.destroy");
        self.glasses_handle = None;
    }

    pub fn pause(&mut self) -> bool {
        if !self.lifecycle.can_pause() {
            return false;
        }
        NativeResultTranslator::report(self.hmd.pause(), MODULE, "hmd.pause");
        NativeResultTranslator::report(self.glasses.pause(), MODULE, "glasses.pause");
        self.lifecycle.mark(RunState::Paused);
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.lifecycle.can_resume() {
            return false;
        }
        NativeResultTranslator::report(self.glasses.resume(), MODULE, "glasses.resume");
        NativeResultTranslator::report(self.hmd.resume(), MODULE, "hmd.resume");
        self.lifecycle.mark(RunState::Running);
        true
    }

    /// Releases both native handles. Works from running or paused.
    pub fn stop(&mut self) -> bool {
        if !self.lifecycle.can_stop() {
            return false;
        }
        self.release_glasses(true);
        NativeResultTranslator::report(self.hmd.destroy(), MODULE, "hmd.destroy");
        self.hmd_handle = None;
        self.lifecycle.mark(RunState::Stopped);
        log::info!("[device] stopped");
        true
    }

    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }

    pub fn is_available(&self) -> bool {
        self.lifecycle.is_running() && !self.is_unplugged() && self.init_error.is_none()
    }

    pub fn is_unplugged(&self) -> bool {
        self.unplugged.load(Ordering::SeqCst)
    }

    pub fn init_error(&self) -> Option<&KernalError> {
        self.init_error.as_ref()
    }

    pub fn hmd_handle(&self) -> Option<DeviceHandle> {
        self.hmd_handle
    }

    pub fn glasses_handle(&self) -> Option<DeviceHandle> {
        self.glasses_handle
    }

    pub fn add_listener(&self, listener: DeviceListener) {
        lock_unpoisoned(&self.listeners).push(listener);
    }

    fn ensure_available(&self, func: &str) -> KernelResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(KernalError::GlassesNotAvailable(format!(
                "[{MODULE}] {func}: glasses not available"
            )))
        }
    }

    pub fn device_type(&self) -> KernelResult<DeviceType> {
        self.ensure_available("device_type")?;
        NativeResultTranslator::check(self.hmd.device_type(), MODULE, "device_type")
    }

    pub fn is_feature_supported(&self, feature: SupportedFeature) -> KernelResult<bool> {
        self.ensure_available("is_feature_supported")?;
        NativeResultTranslator::check(
            self.hmd.is_feature_supported(feature),
            MODULE,
            "is_feature_supported",
        )
    }

    pub fn eye_resolution(&self, device: NativeDevice) -> KernelResult<Resolution> {
        self.ensure_available("eye_resolution")?;
        NativeResultTranslator::check(self.hmd.eye_resolution(device), MODULE, "eye_resolution")
    }

    /// Only the two display eyes have a field of view.
    pub fn eye_fov(&self, device: NativeDevice) -> KernelResult<Fov4f> {
        self.ensure_available("eye_fov")?;
        if !matches!(device, NativeDevice::LeftDisplay | NativeDevice::RightDisplay) {
            return Err(NativeResultTranslator::translate(
                NativeResult::InvalidArgument,
                MODULE,
                "eye_fov",
            ));
        }
        NativeResultTranslator::check(self.hmd.eye_fov(device), MODULE, "eye_fov")
    }

    pub fn device_pose_from_head(&self, device: NativeDevice) -> KernelResult<Pose> {
        self.ensure_available("device_pose_from_head")?;
        NativeResultTranslator::check(
            self.hmd.device_pose_from_head(device),
            MODULE,
            "device_pose_from_head",
        )
    }

    pub fn camera_intrinsic_matrix(&self, device: NativeDevice) -> KernelResult<Mat3> {
        self.ensure_available("camera_intrinsic_matrix")?;
        NativeResultTranslator::check(
            self.hmd.camera_intrinsic_matrix(device),
            MODULE,
            "camera_intrinsic_matrix",
        )
    }

    pub fn camera_distortion(&self, device: NativeDevice) -> KernelResult<DistortionParams> {
        self.ensure_available("camera_distortion")?;
        NativeResultTranslator::check(
            self.hmd.camera_distortion(device),
            MODULE,
            "camera_distortion",
        )
    }

    pub fn projection_matrix(&self, z_near: f32, z_far: f32) -> KernelResult<EyeProjection> {
        self.ensure_available("projection_matrix")?;
        NativeResultTranslator::check(
            self.hmd.projection_matrix(z_near, z_far),
            MODULE,
            "projection_matrix",
        )
    }

    pub fn temperature_level(&self) -> KernelResult<GlassesTemperatureLevel> {
        self.ensure_available("temperature_level")?;
        NativeResultTranslator::check(
            self.glasses.temperature_level(),
            MODULE,
            "temperature_level",
        )
    }

    /// Current brightness, or [`INVALID_BRIGHTNESS`] when it cannot be read.
    pub fn brightness(&self) -> i32 {
        if !self.is_available() {
            return INVALID_BRIGHTNESS;
        }
        NativeResultTranslator::report(self.glasses.brightness(), MODULE, "brightness")
            .unwrap_or(INVALID_BRIGHTNESS)
    }

    /// Values outside the supported range are clamped.
    pub fn set_brightness(&mut self, brightness: i32) -> bool {
        if !self.is_available() {
            log::warn!("[device] set_brightness ignored: glasses not available");
            return false;
        }
        let level = brightness.clamp(MIN_BRIGHTNESS, MAX_BRIGHTNESS);
        NativeResultTranslator::report(self.glasses.set_brightness(level), MODULE, "set_brightness")
            .is_some()
    }
}

fn fan_out(listeners: &Mutex<Vec<DeviceListener>>, event: DeviceEvent) {
    let snapshot: Vec<DeviceListener> = lock_unpoisoned(listeners).clone();
    for listener in snapshot {
        listener(event);
    }
}
