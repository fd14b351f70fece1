//! In-process stand-in for the native runtime. Behaves like a connected pair of
//! glasses, journals every native call, and lets callers inject failure codes,
//! wear/disconnect callbacks and lost-tracking reasons.

use super::{
    DeviceHandle, DeviceType, DisconnectCallback, DistortionParams, EyeProjection, Fov4f,
    FrameRateMode, GlassesDisconnectReason, GlassesTemperatureLevel, LostTrackingReason, Mat3,
    NativeDevice, NativeGlassesController, NativeHmd, NativeResult, NativeReturn, NativeTracking,
    Pose, PresentedHeadPose, Resolution, SupportedFeature, TrackableConfig, TrackingHandle,
    TrackingMode, WearCallback,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

const FRAME_INTERVAL_NANOS: u64 = 16_666_667;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// Ordered record of native calls, shared between simulated components.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: impl Into<String>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.as_str() == call)
            .count()
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Failure codes to return from specific native calls, keyed like the journal.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Arc<Mutex<HashMap<String, NativeResult>>>,
}

impl FaultPlan {
    pub fn inject(&self, call: impl Into<String>, code: NativeResult) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(call.into(), code);
    }

    pub fn clear(&self, call: &str) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(call);
    }

    fn check(&self, call: &str) -> NativeReturn<()> {
        match self
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(call)
        {
            Some(code) => code.into_return(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct CallSite {
    prefix: &'static str,
    journal: CallJournal,
    faults: FaultPlan,
}

impl CallSite {
    fn enter(&self, op: &str) -> NativeReturn<()> {
        let call = format!("{}.{}", self.prefix, op);
        self.journal.record(call.as_str());
        self.faults.check(&call)
    }
}

pub struct SimulatedHmd {
    site: CallSite,
    device_type: DeviceType,
    features: HashSet<SupportedFeature>,
    resolution: Resolution,
}

impl SimulatedHmd {
    fn new(site: CallSite, device_type: DeviceType, features: HashSet<SupportedFeature>) -> Self {
        Self {
            site,
            device_type,
            features,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
        }
    }
}

impl NativeHmd for SimulatedHmd {
    fn label(&self) -> &'static str {
        "Simulated HMD"
    }

    fn create(&mut self) -> NativeReturn<DeviceHandle> {
        self.site.enter("create")?;
        Ok(DeviceHandle::from_raw(next_handle()))
    }

    fn pause(&mut self) -> NativeReturn<()> {
        self.site.enter("pause")
    }

    fn resume(&mut self) -> NativeReturn<()> {
        self.site.enter("resume")
    }

    fn destroy(&mut self) -> NativeReturn<()> {
        self.site.enter("destroy")
    }

    fn device_type(&self) -> NativeReturn<DeviceType> {
        self.site.faults.check("hmd.device_type")?;
        Ok(self.device_type)
    }

    fn is_feature_supported(&self, feature: SupportedFeature) -> NativeReturn<bool> {
        self.site.faults.check("hmd.is_feature_supported")?;
        Ok(self.features.contains(&feature))
    }

    fn eye_resolution(&self, _device: NativeDevice) -> NativeReturn<Resolution> {
        Ok(self.resolution)
    }

    fn eye_fov(&self, device: NativeDevice) -> NativeReturn<Fov4f> {
        match device {
            NativeDevice::LeftDisplay | NativeDevice::RightDisplay => Ok(Fov4f {
                left: 0.4,
                right: 0.4,
                top: 0.22,
                bottom: 0.22,
            }),
            _ => Err(NativeResult::InvalidArgument),
        }
    }

    fn device_pose_from_head(&self, device: NativeDevice) -> NativeReturn<Pose> {
        let offset = match device {
            NativeDevice::LeftDisplay => -0.032,
            NativeDevice::RightDisplay => 0.032,
            _ => 0.0,
        };
        Ok(Pose {
            position: [offset, 0.0, 0.0],
            ..Pose::IDENTITY
        })
    }

    fn camera_intrinsic_matrix(&self, _device: NativeDevice) -> NativeReturn<Mat3> {
        let width = self.resolution.width as f32;
        let height = self.resolution.height as f32;
        Ok([
            [1000.0, 0.0, width / 2.0],
            [0.0, 1000.0, height / 2.0],
            [0.0, 0.0, 1.0],
        ])
    }

    fn camera_distortion(&self, _device: NativeDevice) -> NativeReturn<DistortionParams> {
        Ok(DistortionParams::default())
    }

    fn projection_matrix(&self, z_near: f32, z_far: f32) -> NativeReturn<EyeProjection> {
        if z_near <= 0.0 || z_far <= z_near {
            return Err(NativeResult::InvalidArgument);
        }
        let depth = z_far - z_near;
        let eye = [
            [1.25, 0.0, 0.0, 0.0],
            [0.0, 2.22, 0.0, 0.0],
            [0.0, 0.0, -(z_far + z_near) / depth, -1.0],
            [0.0, 0.0, -2.0 * z_far * z_near / depth, 0.0],
        ];
        Ok(EyeProjection {
            left: eye,
            right: eye,
        })
    }
}

#[derive(Default)]
struct GlassesCallbacks {
    wear: Option<WearCallback>,
    disconnect: Option<DisconnectCallback>,
}

/// Fires glasses callbacks the way the native runtime would, on whatever
/// thread the caller is on.
#[derive(Clone)]
pub struct GlassesSignal {
    callbacks: Arc<Mutex<GlassesCallbacks>>,
}

impl GlassesSignal {
    pub fn put_on(&self) {
        self.wear(1);
    }

    pub fn put_off(&self) {
        self.wear(0);
    }

    pub fn disconnect(&self, reason: GlassesDisconnectReason) {
        let callback = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .disconnect
            .clone();
        if let Some(callback) = callback {
            callback(reason);
        }
    }

    fn wear(&self, status: i32) {
        let callback = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .wear
            .clone();
        if let Some(callback) = callback {
            callback(status);
        }
    }
}

pub struct SimulatedGlasses {
    site: CallSite,
    callbacks: Arc<Mutex<GlassesCallbacks>>,
    brightness: i32,
}

impl NativeGlassesController for SimulatedGlasses {
    fn label(&self) -> &'static str {
        "Simulated Glasses Controller"
    }

    fn create(&mut self) -> NativeReturn<DeviceHandle> {
        self.site.enter("create")?;
        Ok(DeviceHandle::from_raw(next_handle()))
    }

    fn register_wear_callback(&mut self, callback: WearCallback) -> NativeReturn<()> {
        self.site.enter("register_wear_callback")?;
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .wear = Some(callback);
        Ok(())
    }

    fn register_disconnect_callback(&mut self, callback: DisconnectCallback) -> NativeReturn<()> {
        self.site.enter("register_disconnect_callback")?;
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .disconnect = Some(callback);
        Ok(())
    }

    fn start(&mut self) -> NativeReturn<()> {
        self.site.enter("start")
    }

    fn pause(&mut self) -> NativeReturn<()> {
        self.site.enter("pause")
    }

    fn resume(&mut self) -> NativeReturn<()> {
        self.site.enter("resume")
    }

    fn stop(&mut self) -> NativeReturn<()> {
        self.site.enter("stop")
    }

    fn destroy(&mut self) -> NativeReturn<()> {
        self.site.enter("destroy")
    }

    fn temperature_level(&self) -> NativeReturn<GlassesTemperatureLevel> {
        Ok(GlassesTemperatureLevel::Normal)
    }

    fn brightness(&self) -> NativeReturn<i32> {
        self.site.faults.check("glasses.brightness")?;
        Ok(self.brightness)
    }

    fn set_brightness(&mut self, brightness: i32) -> NativeReturn<()> {
        self.site.enter("set_brightness")?;
        self.brightness = brightness;
        Ok(())
    }
}

struct TrackingState {
    lost_reason: LostTrackingReason,
    mode: Option<TrackingMode>,
    frame_rate: FrameRateMode,
    config: Option<TrackableConfig>,
    latency: Duration,
}

/// Runtime control over a [`SimulatedTracking`] after it has been boxed.
#[derive(Clone)]
pub struct TrackingMonitor {
    state: Arc<Mutex<TrackingState>>,
}

impl TrackingMonitor {
    pub fn set_lost_reason(&self, reason: LostTrackingReason) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lost_reason = reason;
    }

    /// Delay applied to every tracking command, like a slow native runtime.
    pub fn set_latency(&self, latency: Duration) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latency = latency;
    }

    pub fn mode(&self) -> Option<TrackingMode> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mode
    }

    pub fn frame_rate(&self) -> FrameRateMode {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame_rate
    }

    pub fn config(&self) -> Option<TrackableConfig> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .config
    }
}

pub struct SimulatedTracking {
    site: CallSite,
    state: Arc<Mutex<TrackingState>>,
    epoch: Instant,
}

impl SimulatedTracking {
    fn command(&self, op: &str) -> NativeReturn<()> {
        let latency = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        self.site.enter(op)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut TrackingState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

impl NativeTracking for SimulatedTracking {
    fn label(&self) -> &'static str {
        "Simulated Tracking"
    }

    fn create(&mut self) -> NativeReturn<TrackingHandle> {
        self.site.enter("create")?;
        Ok(TrackingHandle::from_raw(next_handle()))
    }

    fn init_tracking_mode(&mut self, mode: TrackingMode) -> NativeReturn<()> {
        self.command("init_tracking_mode")?;
        self.with_state(|state| state.mode = Some(mode));
        Ok(())
    }

    fn start(&mut self) -> NativeReturn<()> {
        self.command("start")
    }

    fn pause(&mut self) -> NativeReturn<()> {
        self.command("pause")
    }

    fn resume(&mut self) -> NativeReturn<()> {
        self.command("resume")
    }

    fn recenter(&mut self) -> NativeReturn<()> {
        self.command("recenter")
    }

    fn switch_tracking_mode(&mut self, mode: TrackingMode) -> NativeReturn<()> {
        self.command("switch_tracking_mode")?;
        self.with_state(|state| state.mode = Some(mode));
        Ok(())
    }

    fn set_frame_rate_mode(&mut self, mode: FrameRateMode) -> NativeReturn<()> {
        self.command("set_frame_rate_mode")?;
        self.with_state(|state| state.frame_rate = mode);
        Ok(())
    }

    fn update_config(&mut self, config: TrackableConfig) -> NativeReturn<()> {
        self.command("update_config")?;
        self.with_state(|state| state.config = Some(config));
        Ok(())
    }

    fn destroy(&mut self) -> NativeReturn<()> {
        self.command("destroy")
    }

    fn frame_present_head_pose(&self) -> NativeReturn<PresentedHeadPose> {
        self.site.faults.check("tracking.frame_present_head_pose")?;
        let lost_reason = self.with_state(|state| state.lost_reason);
        Ok(PresentedHeadPose {
            pose: Pose::IDENTITY,
            lost_reason,
            timestamp: self.now_nanos(),
        })
    }

    fn frame_present_time_by_count(&self, count: i32) -> NativeReturn<u64> {
        if count < 0 {
            return Err(NativeResult::InvalidArgument);
        }
        Ok(self.now_nanos() + count as u64 * FRAME_INTERVAL_NANOS)
    }

    fn head_pose(&self, _timestamp: u64) -> NativeReturn<Pose> {
        Ok(Pose::IDENTITY)
    }

    fn hmd_time_nanos(&self) -> NativeReturn<u64> {
        Ok(self.now_nanos())
    }
}

/// A full set of simulated native components sharing one journal and one
/// fault plan.
pub struct SimulatedBackend {
    pub hmd: SimulatedHmd,
    pub glasses: SimulatedGlasses,
    pub tracking: SimulatedTracking,
    pub journal: CallJournal,
    pub faults: FaultPlan,
    pub signal: GlassesSignal,
    pub monitor: TrackingMonitor,
}

impl SimulatedBackend {
    pub fn new(device_type: DeviceType) -> Self {
        Self::with_journal(device_type, CallJournal::new())
    }

    pub fn with_journal(device_type: DeviceType, journal: CallJournal) -> Self {
        let faults = FaultPlan::default();
        let site = |prefix| CallSite {
            prefix,
            journal: journal.clone(),
            faults: faults.clone(),
        };

        let callbacks = Arc::new(Mutex::new(GlassesCallbacks::default()));
        let tracking_state = Arc::new(Mutex::new(TrackingState {
            lost_reason: LostTrackingReason::None,
            mode: None,
            frame_rate: FrameRateMode::Unlimited,
            config: None,
            latency: Duration::ZERO,
        }));

        Self {
            hmd: SimulatedHmd::new(site("hmd"), device_type, default_features(device_type)),
            glasses: SimulatedGlasses {
                site: site("glasses"),
                callbacks: Arc::clone(&callbacks),
                brightness: 3,
            },
            tracking: SimulatedTracking {
                site: site("tracking"),
                state: Arc::clone(&tracking_state),
                epoch: Instant::now(),
            },
            journal: journal.clone(),
            faults: faults.clone(),
            signal: GlassesSignal { callbacks },
            monitor: TrackingMonitor {
                state: tracking_state,
            },
        }
    }

    pub fn with_features(mut self, features: &[SupportedFeature]) -> Self {
        self.hmd.features = features.iter().copied().collect();
        self
    }
}

fn default_features(device_type: DeviceType) -> HashSet<SupportedFeature> {
    let features: &[SupportedFeature] = match device_type {
        DeviceType::NrealLight => &[
            SupportedFeature::Tracking6Dof,
            SupportedFeature::Tracking3Dof,
            SupportedFeature::TrackingFindingHorizontalPlane,
            SupportedFeature::TrackingFindingVerticalPlane,
            SupportedFeature::TrackingFindingMarker,
            SupportedFeature::Controller3Dof,
            SupportedFeature::WearingStatusOfGlasses,
            SupportedFeature::HandTracking,
            SupportedFeature::RgbCamera,
        ],
        DeviceType::NrealAir => &[
            SupportedFeature::Tracking3Dof,
            SupportedFeature::Controller3Dof,
            SupportedFeature::WearingStatusOfGlasses,
        ],
    };
    features.iter().copied().collect()
}
