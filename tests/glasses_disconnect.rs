mod support;

use glasses_kernel::dispatch::RaceOutcome;
use glasses_kernel::error::KernalError;
use glasses_kernel::native::{DeviceType, GlassesDisconnectReason};
use glasses_kernel::session::SessionState;
use glasses_kernel::session::config::{PoseTrackerSettings, SessionBehaviour, SessionConfig};
use glasses_kernel::session::events::SessionEvent;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::Harness;

#[test]
fn disconnect_releases_session_and_terminates_once() {
    let mut harness = Harness::running(DeviceType::NrealLight);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    harness
        .session
        .subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    harness.journal.clear();

    harness
        .signal
        .disconnect(GlassesDisconnectReason::GlassesDisconnect);
    assert_eq!(harness.session.state(), SessionState::Running);
    harness.session.update(support::FRAME);

    assert_eq!(harness.session.state(), SessionState::Destroyed);
    let race = harness.session.take_release().expect("release started");
    assert_eq!(race.join(), RaceOutcome::Completed);
    assert_eq!(harness.host.terminations(), vec![true]);
    assert_eq!(
        harness.journal.entries(),
        vec![
            "trackables.stop",
            "renderer.destroy",
            "tracking.destroy",
            "glasses.stop",
            "glasses.destroy",
            "hmd.destroy",
            "input.destroy",
        ]
    );
    assert_eq!(
        events.lock().unwrap()[0],
        SessionEvent::GlassesDisconnected(GlassesDisconnectReason::GlassesDisconnect)
    );
}

#[test]
fn hung_release_forces_termination_without_release() {
    let mut harness = Harness::running(DeviceType::NrealLight);
    harness.monitor.set_latency(Duration::from_secs(3));

    harness
        .signal
        .disconnect(GlassesDisconnectReason::GlassesDisconnect);
    harness.session.update(support::FRAME);

    let race = harness.session.take_release().expect("release started");
    assert_eq!(race.join(), RaceOutcome::TimedOut);
    assert_eq!(harness.host.terminations(), vec![false]);
    // The release still ran to the end, it just lost the race.
    assert_eq!(harness.journal.count("input.destroy"), 1);
}

#[test]
fn quit_request_without_force_kill_only_releases() {
    let mut harness = Harness::new(DeviceType::NrealLight);
    let config = SessionConfig {
        force_kill_on_glasses_switch_mode: false,
        ..SessionConfig::default()
    };
    harness
        .session
        .create_session(SessionBehaviour::new(config, PoseTrackerSettings::default()))
        .expect("create session");
    harness.session.start_session();
    harness.settle();

    harness
        .signal
        .disconnect(GlassesDisconnectReason::NotifyToQuitApp);
    harness.session.update(support::FRAME);

    let race = harness.session.take_release().expect("release started");
    assert_eq!(race.join(), RaceOutcome::Completed);
    assert_eq!(harness.session.state(), SessionState::Destroyed);
    assert!(harness.host.terminations().is_empty());
}

#[test]
fn repeated_disconnect_is_ignored() {
    let mut harness = Harness::running(DeviceType::NrealLight);

    harness
        .signal
        .disconnect(GlassesDisconnectReason::GlassesDisconnect);
    harness
        .signal
        .disconnect(GlassesDisconnectReason::GlassesDisconnect);
    harness.session.update(support::FRAME);
    harness.session.update(support::FRAME);

    let race = harness.session.take_release().expect("release started");
    race.join();
    assert!(harness.session.take_release().is_none());
    assert_eq!(harness.host.terminations(), vec![true]);
    assert_eq!(harness.journal.count("hmd.destroy"), 1);
}

#[test]
fn disconnect_after_fatal_error_still_terminates() {
    let mut harness = Harness::running(DeviceType::NrealLight);
    harness
        .session
        .report_error(KernalError::SdkVersionMismatch("version".into()));
    assert_eq!(harness.session.state(), SessionState::Destroyed);
    harness.journal.clear();

    harness
        .signal
        .disconnect(GlassesDisconnectReason::GlassesDisconnect);
    harness.session.update(support::FRAME);

    assert_eq!(harness.host.terminations(), vec![true]);
    assert!(harness.session.take_release().is_none());
    assert!(harness.journal.entries().is_empty());
}

#[test]
fn quit_request_before_create_still_terminates() {
    let mut harness = Harness::new(DeviceType::NrealLight);
    harness
        .session
        .device()
        .lock()
        .unwrap()
        .init()
        .expect("init device");

    harness
        .signal
        .disconnect(GlassesDisconnectReason::NotifyToQuitApp);
    harness.session.update(support::FRAME);

    assert_eq!(harness.session.state(), SessionState::UnInitialized);
    assert_eq!(harness.host.terminations(), vec![true]);
}
