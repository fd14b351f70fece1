//! Run-state bookkeeping shared by the device and tracking drivers.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Gates start/pause/resume/stop so each native transition happens at most
/// once per state. A paused subsystem can still be stopped.
#[derive(Debug, Default)]
pub struct SubsystemLifecycle {
    state: RunState,
}

impl SubsystemLifecycle {
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn can_start(&self) -> bool {
        self.state == RunState::Stopped
    }

    pub fn can_pause(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn can_resume(&self) -> bool {
        self.state == RunState::Paused
    }

    pub fn can_stop(&self) -> bool {
        self.state != RunState::Stopped
    }

    pub fn mark(&mut self, state: RunState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_subsystem_is_still_stoppable() {
        let mut lifecycle = SubsystemLifecycle::default();
        assert!(lifecycle.can_start());
        lifecycle.mark(RunState::Running);
        assert!(lifecycle.can_pause());
        assert!(!lifecycle.can_resume());
        lifecycle.mark(RunState::Paused);
        assert!(lifecycle.can_resume());
        assert!(lifecycle.can_stop());
        lifecycle.mark(RunState::Stopped);
        assert!(!lifecycle.can_stop());
        assert!(!lifecycle.can_pause());
    }
}
