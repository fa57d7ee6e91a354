//! Gripper control operations.
//!
//! Each operation maps to exactly one register transaction. Faults are
//! logged by the link layer and reported here only as `false` or
//! [`FAULT_SENTINEL`]; nothing below this boundary reaches the caller.

use crate::error::ModbusFault;
use crate::link::LinkManager;
use crate::registers::{Register, values};
use crate::routines::RoutineSettings;
use crate::transport::Connector;
use tracing::warn;

/// Value returned by reading operations when the transaction failed.
pub const FAULT_SENTINEL: i32 = -1;

/// Clamp a requested force (%) to the range the device accepts.
pub fn clamp_force(force: i64) -> i32 {
    force.clamp(i64::from(values::FORCE_MIN), i64::from(values::FORCE_MAX)) as i32
}

/// Clamp a requested finger position to the range the device accepts.
pub fn clamp_position(position: i64) -> i32 {
    position.clamp(
        i64::from(values::POSITION_MIN),
        i64::from(values::POSITION_MAX),
    ) as i32
}

fn settle(outcome: Result<(), ModbusFault>) -> bool {
    outcome.is_ok()
}

fn settle_value(outcome: Result<i32, ModbusFault>) -> i32 {
    outcome.unwrap_or(FAULT_SENTINEL)
}

/// Control facade of one AG-95 gripper.
pub struct Gripper<C: Connector> {
    link: LinkManager<C>,
    pub(crate) routines: RoutineSettings,
}

impl<C: Connector> Gripper<C> {
    pub fn new(link: LinkManager<C>) -> Self {
        Self {
            link,
            routines: RoutineSettings::default(),
        }
    }

    pub fn with_routine_settings(mut self, routines: RoutineSettings) -> Self {
        self.routines = routines;
        self
    }

    pub fn link(&self) -> &LinkManager<C> {
        &self.link
    }

    async fn write(&self, register: Register, value: impl Into<i32>) -> Result<(), ModbusFault> {
        self.link
            .write_register(register.address(), value.into())
            .await
    }

    async fn read(&self, register: Register) -> Result<i32, ModbusFault> {
        self.link.read_register(register.address()).await
    }

    /// Open the link and run the warm-up transaction. A live link is kept.
    pub async fn connect(&self) -> bool {
        match self.link.ensure_connected().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Gripper connect failed: {}", e);
                false
            }
        }
    }

    /// Start initialization; `full` searches the stroke limits again.
    pub async fn init(&self, full: bool) -> bool {
        let value = if full {
            values::INITIALIZE_FULL
        } else {
            values::INITIALIZE
        };
        settle(self.write(Register::Initialize, value).await)
    }

    pub async fn is_init(&self) -> bool {
        matches!(
            self.read(Register::InitState).await,
            Ok(state) if state == i32::from(values::INIT_STATE_READY)
        )
    }

    /// Give IO lines priority over Modbus (`true`) or control over Modbus only.
    pub async fn set_io_control(&self, io_control: bool) -> bool {
        let value = if io_control {
            values::IO_MODE_IO_MODBUS
        } else {
            values::IO_MODE_MODBUS
        };
        settle(self.write(Register::IoModeSwitch, value).await)
    }

    /// Choose whether initialization ends with the fingers open or closed.
    pub async fn set_init_grip_open(&self, open: bool) -> bool {
        let value = if open {
            values::INIT_GRIPPER_OPEN
        } else {
            values::INIT_GRIPPER_CLOSED
        };
        settle(self.write(Register::InitGripperPosition, value).await)
    }

    /// Set the gripping force, saturated to 20-100 %.
    pub async fn set_force(&self, force: i64) -> bool {
        settle(self.write(Register::GripperForce, clamp_force(force)).await)
    }

    /// Command a finger position, saturated to 0 (closed) - 1000 (open).
    ///
    /// Returns once the command is accepted, not when the fingers arrive.
    pub async fn set_position(&self, position: i64) -> bool {
        settle(
            self.write(Register::GripperPosition, clamp_position(position))
                .await,
        )
    }

    /// Current finger position, or -1.
    pub async fn get_actual_position(&self) -> i32 {
        settle_value(self.read(Register::ActualGripperPosition).await)
    }

    /// Grip state code (see [`GripState`](crate::registers::GripState)), or -1.
    pub async fn get_grip_status(&self) -> i32 {
        settle_value(self.read(Register::GripState).await)
    }
}
