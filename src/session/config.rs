use crate::native::{DeviceType, ImageFindingMode, PlaneFindingMode, TrackableConfig};
use crate::tracking::TrackingType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Devices an application declares it was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub target_device_types: Vec<DeviceType>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            target_device_types: vec![DeviceType::NrealLight, DeviceType::NrealAir],
        }
    }
}

impl ProjectConfig {
    pub fn target_device_types_desc(&self) -> String {
        self.target_device_types
            .iter()
            .map(|device| format!("{device:?}"))
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub plane_finding_mode: PlaneFindingMode,
    pub image_tracking_mode: ImageFindingMode,
    pub enable_notification: bool,
    /// Terminate the host when the glasses ask the app to quit.
    pub force_kill_on_glasses_switch_mode: bool,
    pub project: Option<ProjectConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            plane_finding_mode: PlaneFindingMode::Disable,
            image_tracking_mode: ImageFindingMode::Disable,
            enable_notification: false,
            force_kill_on_glasses_switch_mode: true,
            project: Some(ProjectConfig::default()),
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Without a project config no device is a target.
    pub fn is_target_device(&self, device: DeviceType) -> bool {
        self.project
            .as_ref()
            .is_some_and(|project| project.target_device_types.contains(&device))
    }

    pub fn target_device_types_desc(&self) -> String {
        self.project
            .as_ref()
            .map(ProjectConfig::target_device_types_desc)
            .unwrap_or_default()
    }

    pub fn trackable_config(&self) -> TrackableConfig {
        TrackableConfig {
            plane_finding_mode: self.plane_finding_mode,
            image_tracking_mode: self.image_tracking_mode,
        }
    }

    /// Turns off plane and image finding. Returns whether anything changed.
    pub(crate) fn disable_finding(&mut self) -> bool {
        let changed = self.plane_finding_mode != PlaneFindingMode::Disable
            || self.image_tracking_mode != ImageFindingMode::Disable;
        self.plane_finding_mode = PlaneFindingMode::Disable;
        self.image_tracking_mode = ImageFindingMode::Disable;
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeCamera {
    pub label: String,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl EyeCamera {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            near_plane: 0.3,
            far_plane: 1000.0,
        }
    }
}

/// The host's tracked head anchor and its two eye cameras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseTrackerSettings {
    pub tracking_type: TrackingType,
    pub auto_adapt: bool,
    pub left_eye: EyeCamera,
    pub right_eye: EyeCamera,
}

impl Default for PoseTrackerSettings {
    fn default() -> Self {
        Self {
            tracking_type: TrackingType::Tracking6Dof,
            auto_adapt: true,
            left_eye: EyeCamera::new("LeftCamera"),
            right_eye: EyeCamera::new("RightCamera"),
        }
    }
}

/// App-level display settings handed to the host once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub target_frame_rate: i32,
    pub vsync_count: i32,
    pub max_queued_frames: i32,
    pub fullscreen: bool,
    pub never_sleep: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            target_frame_rate: 240,
            vsync_count: 0,
            max_queued_frames: -1,
            fullscreen: true,
            never_sleep: true,
        }
    }
}

/// Everything `create_session` needs from the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionBehaviour {
    pub config: SessionConfig,
    pub pose_tracker: Option<PoseTrackerSettings>,
}

impl SessionBehaviour {
    pub fn new(config: SessionConfig, pose_tracker: PoseTrackerSettings) -> Self {
        Self {
            config,
            pose_tracker: Some(pose_tracker),
        }
    }
}
