//! Database Synchronization Tasks
//!
//! The two periodic passes that keep the live object set and the database
//! aligned: [`refresh::RefreshTask`] pulls declarative configuration and
//! sensor values into the objects, [`persist::PersistTask`] pushes commanded
//! output present-values back.
//!
//! Authority is split and never crosses: refresh touches everything except
//! the commanded present-value of output objects, persist touches nothing
//! else. Either task failing leaves the object set on its last-known values
//! and retries on the next cycle.

use log::{info, warn};

pub mod persist;
pub mod refresh;

pub use persist::PersistTask;
pub use refresh::RefreshTask;

/// Per-task connection lifecycle. Transitions:
/// `Disconnected -> Connecting -> Open -> Failing -> Disconnected`;
/// `Failing -> Disconnected` happens deterministically at the end of the
/// failing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Failing,
}

/// Connection state tracker shared by both tasks; transitions are logged
/// with the owning task's name
#[derive(Debug)]
pub struct TaskHealth {
    task: &'static str,
    state: ConnectionState,
}

impl TaskHealth {
    pub fn new(task: &'static str) -> Self {
        Self {
            task,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn open(&mut self) {
        if self.state != ConnectionState::Open {
            info!("{}: database connection open", self.task);
        }
        self.state = ConnectionState::Open;
    }

    pub fn failing(&mut self, error: &dyn std::fmt::Display) {
        warn!("{}: {}", self.task, error);
        self.state = ConnectionState::Failing;
    }

    /// End-of-cycle transition: a failing connection is dropped so the next
    /// cycle reconnects
    pub fn end_cycle(&mut self) {
        if self.state == ConnectionState::Failing {
            self.state = ConnectionState::Disconnected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_transitions() {
        let mut health = TaskHealth::new("refresh");
        assert_eq!(health.state(), ConnectionState::Disconnected);

        health.connecting();
        assert_eq!(health.state(), ConnectionState::Connecting);

        health.open();
        assert_eq!(health.state(), ConnectionState::Open);

        health.failing(&"boom");
        assert_eq!(health.state(), ConnectionState::Failing);

        health.end_cycle();
        assert_eq!(health.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_healthy_cycle_keeps_connection() {
        let mut health = TaskHealth::new("persist");
        health.connecting();
        health.open();
        health.end_cycle();
        assert_eq!(health.state(), ConnectionState::Open);
    }
}
