//! Composite motion routines built on the control operations.

use crate::config::RoutineConfig;
use crate::gripper::Gripper;
use crate::registers::{GripState, values};
use crate::transport::Connector;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Force used by [`Gripper::open`] when none is given.
pub const OPEN_FORCE: i64 = values::FORCE_MAX as i64;
/// Position used by [`Gripper::open`] when none is given.
pub const OPEN_POSITION: i64 = values::POSITION_MAX as i64;
/// Force used by [`Gripper::close`] when none is given.
pub const CLOSE_FORCE: i64 = values::FORCE_MIN as i64;
/// Position used by [`Gripper::close`] when none is given.
pub const CLOSE_POSITION: i64 = values::POSITION_MIN as i64;

/// Polling behaviour of the routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutineSettings {
    pub poll_interval: Duration,
    pub init_attempts: u32,
    pub motion_attempts: u32,
}

impl Default for RoutineSettings {
    fn default() -> Self {
        Self::from(&RoutineConfig::default())
    }
}

impl From<&RoutineConfig> for RoutineSettings {
    fn from(config: &RoutineConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            init_attempts: config.init_attempts,
            motion_attempts: config.motion_attempts,
        }
    }
}

impl<C: Connector> Gripper<C> {
    /// Initialize and wait until the device reports it is ready.
    pub async fn init_wait(&self, full: bool) -> bool {
        if !self.init(full).await {
            return false;
        }

        sleep(self.routines.poll_interval).await;
        for attempt in 1..=self.routines.init_attempts {
            if self.is_init().await {
                return true;
            }
            if attempt < self.routines.init_attempts {
                sleep(self.routines.poll_interval).await;
            }
        }

        debug!(
            "Gripper not initialized after {} polls",
            self.routines.init_attempts
        );
        false
    }

    /// Initialize only if the device is not initialized yet.
    pub async fn auto_init(&self) -> bool {
        if self.is_init().await {
            return true;
        }
        self.init_wait(false).await
    }

    /// Wait until the fingers stop moving.
    ///
    /// An unreadable status counts as stopped.
    pub async fn wait_grip(&self) -> bool {
        sleep(self.routines.poll_interval).await;
        for attempt in 1..=self.routines.motion_attempts {
            if GripState::from_raw(self.get_grip_status().await) != Some(GripState::InMotion) {
                return true;
            }
            if attempt < self.routines.motion_attempts {
                sleep(self.routines.poll_interval).await;
            }
        }

        debug!(
            "Gripper still moving after {} polls",
            self.routines.motion_attempts
        );
        false
    }

    /// Initialize if needed, apply force, move, and optionally wait for motion to end.
    async fn move_fingers(&self, force: i64, position: i64, wait: bool) -> bool {
        if !self.auto_init().await {
            return false;
        }
        if !self.set_force(force).await {
            return false;
        }
        if !self.set_position(position).await {
            return false;
        }
        if wait {
            return self.wait_grip().await;
        }
        true
    }

    pub async fn open(&self, force: i64, position: i64, wait: bool) -> bool {
        self.move_fingers(force, position, wait).await
    }

    pub async fn close(&self, force: i64, position: i64, wait: bool) -> bool {
        self.move_fingers(force, position, wait).await
    }

    /// Close a fully open gripper, open it otherwise.
    pub async fn toggle(&self) -> bool {
        self.auto_init().await;
        if i64::from(self.get_actual_position().await) != OPEN_POSITION {
            self.open(OPEN_FORCE, OPEN_POSITION, true).await
        } else {
            self.close(CLOSE_FORCE, CLOSE_POSITION, true).await
        }
    }
}
