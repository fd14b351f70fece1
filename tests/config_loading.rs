mod support;

use glasses_kernel::error::KernalError;
use glasses_kernel::native::{DeviceType, PlaneFindingMode};
use glasses_kernel::session::SessionState;
use glasses_kernel::session::config::{
    ConfigError, PoseTrackerSettings, SessionBehaviour, SessionConfig,
};
use std::io::Write;
use support::Harness;

#[test]
fn session_config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"{{
            "plane_finding_mode": "Horizontal",
            "force_kill_on_glasses_switch_mode": false,
            "project": {{ "target_device_types": ["NrealLight"] }}
        }}"#
    )
    .expect("write config");

    let config = SessionConfig::load(file.path()).expect("load config");
    assert_eq!(config.plane_finding_mode, PlaneFindingMode::Horizontal);
    assert!(!config.force_kill_on_glasses_switch_mode);
    assert!(config.is_target_device(DeviceType::NrealLight));
    assert!(!config.is_target_device(DeviceType::NrealAir));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = SessionConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn loaded_allow_list_rejects_other_devices() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, r#"{"project":{"target_device_types":["NrealLight"]}}"#)
        .expect("write config");
    let config = SessionConfig::load(&path).expect("load config");

    let mut harness = Harness::new(DeviceType::NrealAir);
    let err = harness
        .session
        .create_session(SessionBehaviour::new(config, PoseTrackerSettings::default()))
        .unwrap_err();
    assert!(matches!(err, KernalError::UnsupportedDevice(_)));
    assert_eq!(harness.session.state(), SessionState::UnInitialized);
}

#[test]
fn loaded_finding_modes_survive_on_six_dof_glasses() {
    let config = SessionConfig::from_json_str(r#"{"plane_finding_mode":"Everything"}"#)
        .expect("parse config");
    let mut harness = Harness::new(DeviceType::NrealLight);
    harness
        .session
        .create_session(SessionBehaviour::new(config, PoseTrackerSettings::default()))
        .expect("create session");
    harness.session.start_session();
    harness.settle();

    assert_eq!(
        harness.monitor.config().map(|c| c.plane_finding_mode),
        Some(PlaneFindingMode::Everything)
    );
}
