//! Owns the native tracking handle.
//!
//! Mode initialization and start are strict and return classified errors.
//! Everything after start is lenient: failures are logged and reported as
//! `false`, and calls made before a handle exists never reach the native layer.

use crate::error::KernelResult;
use crate::lifecycle::{RunState, SubsystemLifecycle};
use crate::native::translate::NativeResultTranslator;
use crate::native::{
    FrameRateMode, NativeResult, NativeTracking, Pose, PresentedHeadPose, SupportedFeature,
    TrackableConfig, TrackingHandle, TrackingMode,
};
use serde::{Deserialize, Serialize};

pub use crate::native::LostTrackingReason;

const MODULE: &str = "tracking";

/// Returned by [`TrackingDriver::frame_present_time_by_count`] when no time is known.
pub const INVALID_PRESENT_TIME: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrackingType {
    #[default]
    Tracking6Dof,
    Tracking3Dof,
    Tracking0Dof,
    Tracking0DofStable,
}

impl TrackingType {
    pub fn mode(self) -> TrackingMode {
        match self {
            TrackingType::Tracking6Dof => TrackingMode::Mode6Dof,
            TrackingType::Tracking3Dof => TrackingMode::Mode3Dof,
            TrackingType::Tracking0Dof => TrackingMode::Mode0Dof,
            TrackingType::Tracking0DofStable => TrackingMode::Mode0DofStable,
        }
    }
}

impl From<TrackingType> for TrackingMode {
    fn from(value: TrackingType) -> Self {
        value.mode()
    }
}

/// Falls back to the richest tracking type the device can actually provide.
pub fn adapt_tracking_type(
    requested: TrackingType,
    supports: impl Fn(SupportedFeature) -> bool,
) -> TrackingType {
    match requested {
        TrackingType::Tracking6Dof if supports(SupportedFeature::Tracking6Dof) => {
            TrackingType::Tracking6Dof
        }
        TrackingType::Tracking6Dof | TrackingType::Tracking3Dof
            if supports(SupportedFeature::Tracking3Dof) =>
        {
            TrackingType::Tracking3Dof
        }
        TrackingType::Tracking0DofStable if supports(SupportedFeature::Tracking3Dof) => {
            TrackingType::Tracking0DofStable
        }
        _ => TrackingType::Tracking0Dof,
    }
}

pub struct TrackingDriver {
    native: Box<dyn NativeTracking>,
    handle: Option<TrackingHandle>,
    lifecycle: SubsystemLifecycle,
    mode: Option<TrackingMode>,
}

impl TrackingDriver {
    pub fn new(native: Box<dyn NativeTracking>) -> Self {
        Self {
            native,
            handle: None,
            lifecycle: SubsystemLifecycle::default(),
            mode: None,
        }
    }

    pub fn create(&mut self) -> KernelResult<TrackingHandle> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }
        let handle = NativeResultTranslator::check(self.native.create(), MODULE, "create")?;
        log::info!("[tracking] created {} handle {}", self.native.label(), handle.raw());
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Only the first call per session reaches the native layer.
    pub fn init_tracking_mode(&mut self, mode: TrackingMode) -> KernelResult<()> {
        if let Some(current) = self.mode {
            log::warn!("[tracking] tracking mode already initialized as {current:?}");
            return Ok(());
        }
        self.create()?;
        NativeResultTranslator::check(
            self.native.init_tracking_mode(mode),
            MODULE,
            "init_tracking_mode",
        )?;
        log::info!("[tracking] initialized tracking mode {mode:?}");
        self.mode = Some(mode);
        Ok(())
    }

    pub fn start(&mut self) -> KernelResult<()> {
        if !self.lifecycle.can_start() {
            return Ok(());
        }
        self.create()?;
        NativeResultTranslator::check(self.native.start(), MODULE, "start")?;
        self.lifecycle.mark(RunState::Running);
        Ok(())
    }

    pub fn pause(&mut self) -> bool {
        if self.handle.is_none() || !self.lifecycle.can_pause() {
            return false;
        }
        NativeResultTranslator::report(self.native.pause(), MODULE, "pause");
        self.lifecycle.mark(RunState::Paused);
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.handle.is_none() || !self.lifecycle.can_resume() {
            return false;
        }
        NativeResultTranslator::report(self.native.resume(), MODULE, "resume");
        self.lifecycle.mark(RunState::Running);
        true
    }

    /// Destroys the native handle. A stopped driver can be initialized again.
    pub fn stop(&mut self) -> bool {
        if self.handle.is_none() {
            return false;
        }
        NativeResultTranslator::report(self.native.destroy(), MODULE, "destroy");
        self.handle = None;
        self.mode = None;
        self.lifecycle.mark(RunState::Stopped);
        log::info!("[tracking] stopped");
        true
    }

    pub fn recenter(&mut self) -> bool {
        if self.handle.is_none() {
            return false;
        }
        NativeResultTranslator::report(self.native.recenter(), MODULE, "recenter").is_some()
    }

    pub fn switch_tracking_mode(&mut self, mode: TrackingMode) -> KernelResult<()> {
        if self.handle.is_none() {
            return Err(NativeResultTranslator::translate(
                NativeResult::Failure,
                MODULE,
                "switch_tracking_mode",
            ));
        }
        NativeResultTranslator::check(
            self.native.switch_tracking_mode(mode),
            MODULE,
            "switch_tracking_mode",
        )?;
        self.mode = Some(mode);
        Ok(())
    }

    pub fn set_frame_rate_mode(&mut self, mode: FrameRateMode) -> bool {
        if self.handle.is_none() {
            return false;
        }
        NativeResultTranslator::report(
            self.native.set_frame_rate_mode(mode),
            MODULE,
            "set_frame_rate_mode",
        )
        .is_some()
    }

    pub fn update_config(&mut self, config: TrackableConfig) -> bool {
        if self.handle.is_none() {
            return false;
        }
        NativeResultTranslator::report(self.native.update_config(config), MODULE, "update_config")
            .is_some()
    }

    pub fn frame_present_head_pose(&self) -> Option<PresentedHeadPose> {
        self.handle?;
        NativeResultTranslator::report(
            self.native.frame_present_head_pose(),
            MODULE,
            "frame_present_head_pose",
        )
    }

    pub fn lost_tracking_reason(&self) -> Option<LostTrackingReason> {
        self.frame_present_head_pose().map(|pose| pose.lost_reason)
    }

    /// Presentation time `count` frames ahead, or [`INVALID_PRESENT_TIME`].
    pub fn frame_present_time_by_count(&self, count: i32) -> u64 {
        if self.handle.is_none() || !self.lifecycle.is_running() {
            return INVALID_PRESENT_TIME;
        }
        NativeResultTranslator::report(
            self.native.frame_present_time_by_count(count),
            MODULE,
            "frame_present_time_by_count",
        )
        .unwrap_or(INVALID_PRESENT_TIME)
    }

    pub fn head_pose(&self, timestamp: u64) -> Option<Pose> {
        self.handle?;
        NativeResultTranslator::report(self.native.head_pose(timestamp), MODULE, "head_pose")
    }

    pub fn hmd_time_nanos(&self) -> u64 {
        if self.handle.is_none() {
            return 0;
        }
        NativeResultTranslator::report(self.native.hmd_time_nanos(), MODULE, "hmd_time_nanos")
            .unwrap_or(0)
    }

    pub fn mode(&self) -> Option<TrackingMode> {
        self.mode
    }

    pub fn handle(&self) -> Option<TrackingHandle> {
        self.handle
    }

    pub fn state(&self) -> RunState {
        self.lifecycle.state()
    }
}
