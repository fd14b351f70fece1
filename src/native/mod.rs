//! Boundary between the kernel and the native glasses/tracking runtime.
//!
//! Every native call returns a [`NativeReturn`]; failing calls carry the raw
//! [`NativeResult`] code which [`translate::NativeResultTranslator`] turns into
//! a typed [`crate::error::KernalError`].

pub mod simulated;
pub mod translate;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeResult {
    Success,
    Failure,
    InvalidArgument,
    NotEnoughMemory,
    UnSupported,
    GlassesDisconnect,
    SdkVersionMismatch,
    SdcardPermissionDeny,
    RgbCameraDeviceNotFind,
    DpDeviceNotFind,
    TrackingNotRunning,
    GetDisplayFailure,
    GetDisplayModeMismatch,
    UnSupportedHandtrackingCalculation,
}

impl NativeResult {
    /// Maps a raw return code; codes the kernel does not know are plain failures.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => NativeResult::Success,
            1 => NativeResult::Failure,
            2 => NativeResult::InvalidArgument,
            3 => NativeResult::NotEnoughMemory,
            4 => NativeResult::UnSupported,
            5 => NativeResult::GlassesDisconnect,
            6 => NativeResult::SdkVersionMismatch,
            7 => NativeResult::SdcardPermissionDeny,
            8 => NativeResult::RgbCameraDeviceNotFind,
            9 => NativeResult::DpDeviceNotFind,
            10 => NativeResult::TrackingNotRunning,
            11 => NativeResult::GetDisplayFailure,
            12 => NativeResult::GetDisplayModeMismatch,
            14 => NativeResult::UnSupportedHandtrackingCalculation,
            _ => NativeResult::Failure,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            NativeResult::Success => 0,
            NativeResult::Failure => 1,
            NativeResult::InvalidArgument => 2,
            NativeResult::NotEnoughMemory => 3,
            NativeResult::UnSupported => 4,
            NativeResult::GlassesDisconnect => 5,
            NativeResult::SdkVersionMismatch => 6,
            NativeResult::SdcardPermissionDeny => 7,
            NativeResult::RgbCameraDeviceNotFind => 8,
            NativeResult::DpDeviceNotFind => 9,
            NativeResult::TrackingNotRunning => 10,
            NativeResult::GetDisplayFailure => 11,
            NativeResult::GetDisplayModeMismatch => 12,
            NativeResult::UnSupportedHandtrackingCalculation => 14,
        }
    }

    /// Wraps a raw status into a [`NativeReturn`].
    pub fn into_return(self) -> NativeReturn<()> {
        match self {
            NativeResult::Success => Ok(()),
            failure => Err(failure),
        }
    }
}

impl fmt::Display for NativeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

pub type NativeReturn<T> = Result<T, NativeResult>;

/// Opaque native handle of the HMD or the glasses controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque native handle of the tracking system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackingHandle(u64);

impl TrackingHandle {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    NrealLight,
    NrealAir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportedFeature {
    Tracking6Dof,
    Tracking3Dof,
    TrackingFindingHorizontalPlane,
    TrackingFindingVerticalPlane,
    TrackingFindingMarker,
    Controller3Dof,
    Controller6Dof,
    WearingStatusOfGlasses,
    HandTracking,
    RgbCamera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeDevice {
    Head,
    LeftDisplay,
    RightDisplay,
    RgbCamera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingMode {
    Mode6Dof,
    Mode3Dof,
    Mode0Dof,
    Mode0DofStable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameRateMode {
    Fps30,
    Unlimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LostTrackingReason {
    PreInitializing,
    None,
    Initializing,
    ExcessiveMotion,
    InsufficientFeatures,
    Relocalizing,
    EnterVrMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaneFindingMode {
    Disable,
    Horizontal,
    Vertical,
    Everything,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFindingMode {
    Disable,
    Enable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlassesTemperatureLevel {
    Normal,
    Warm,
    Hot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlassesDisconnectReason {
    GlassesDisconnect,
    NotifyToQuitApp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Field of view expressed as tangents of the four half angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fov4f {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

pub type Mat3 = [[f32; 3]; 3];
pub type Mat4 = [[f32; 4]; 4];

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistortionParams {
    pub coefficients: [f32; 8],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeProjection {
    pub left: Mat4,
    pub right: Mat4,
}

/// Head pose sampled for the frame currently being presented.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentedHeadPose {
    pub pose: Pose,
    pub lost_reason: LostTrackingReason,
    pub timestamp: u64,
}

/// Trackable-finding settings pushed to the tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackableConfig {
    pub plane_finding_mode: PlaneFindingMode,
    pub image_tracking_mode: ImageFindingMode,
}

/// Invoked from a native thread with the raw wearing status (1 = worn).
pub type WearCallback = Arc<dyn Fn(i32) + Send + Sync>;
/// Invoked from a native thread when the glasses go away.
pub type DisconnectCallback = Arc<dyn Fn(GlassesDisconnectReason) + Send + Sync>;

pub trait NativeGlassesController: Send {
    fn label(&self) -> &'static str;
    fn create(&mut self) -> NativeReturn<DeviceHandle>;
    fn register_wear_callback(&mut self, callback: WearCallback) -> NativeReturn<()>;
    fn register_disconnect_callback(&mut self, callback: DisconnectCallback) -> NativeReturn<()>;
    fn start(&mut self) -> NativeReturn<()>;
    fn pause(&mut self) -> NativeReturn<()>;
    fn resume(&mut self) -> NativeReturn<()>;
    fn stop(&mut self) -> NativeReturn<()>;
    fn destroy(&mut self) -> NativeReturn<()>;
    fn temperature_level(&self) -> NativeReturn<GlassesTemperatureLevel>;
    fn brightness(&self) -> NativeReturn<i32>;
    fn set_brightness(&mut self, brightness: i32) -> NativeReturn<()>;
}

pub trait NativeHmd: Send {
    fn label(&self) -> &'static str;
    fn create(&mut self) -> NativeReturn<DeviceHandle>;
    fn pause(&mut self) -> NativeReturn<()>;
    fn resume(&mut self) -> NativeReturn<()>;
    fn destroy(&mut self) -> NativeReturn<()>;
    fn device_type(&self) -> NativeReturn<DeviceType>;
    fn is_feature_supported(&self, feature: SupportedFeature) -> NativeReturn<bool>;
    fn eye_resolution(&self, device: NativeDevice) -> NativeReturn<Resolution>;
    fn eye_fov(&self, device: NativeDevice) -> NativeReturn<Fov4f>;
    fn device_pose_from_head(&self, device: NativeDevice) -> NativeReturn<Pose>;
    fn camera_intrinsic_matrix(&self, device: NativeDevice) -> NativeReturn<Mat3>;
    fn camera_distortion(&self, device: NativeDevice) -> NativeReturn<DistortionParams>;
    fn projection_matrix(&self, z_near: f32, z_far: f32) -> NativeReturn<EyeProjection>;
}

/// Tracking system plus the head-tracking queries that hang off it.
pub trait NativeTracking: Send {
    fn label(&self) -> &'static str;
    fn create(&mut self) -> NativeReturn<TrackingHandle>;
    fn init_tracking_mode(&mut self, mode: TrackingMode) -> NativeReturn<()>;
    fn start(&mut self) -> NativeReturn<()>;
    fn pause(&mut self) -> NativeReturn<()>;
    fn resume(&mut self) -> NativeReturn<()>;
    fn recenter(&mut self) -> NativeReturn<()>;
    fn switch_tracking_mode(&mut self, mode: TrackingMode) -> NativeReturn<()>;
    fn set_frame_rate_mode(&mut self, mode: FrameRateMode) -> NativeReturn<()>;
    fn update_config(&mut self, config: TrackableConfig) -> NativeReturn<()>;
    fn destroy(&mut self) -> NativeReturn<()>;
    fn frame_present_head_pose(&self) -> NativeReturn<PresentedHeadPose>;
    fn frame_present_time_by_count(&self, count: i32) -> NativeReturn<u64>;
    fn head_pose(&self, timestamp: u64) -> NativeReturn<Pose>;
    fn hmd_time_nanos(&self) -> NativeReturn<u64>;
}
