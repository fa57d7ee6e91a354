//! In-memory simulation of an AG-95 gripper.
//!
//! Implements the transport seam so the whole bridge can run without
//! hardware. Faults can be injected to exercise the link lifecycle.

use crate::error::TransportError;
use crate::registers::{self, GripState, Register, values};
use crate::transport::{Connector, RegisterIo};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Transactions kept for inspection; older entries are dropped.
pub const HISTORY_LIMIT: usize = 1024;

fn record<T>(history: &mut VecDeque<T>, entry: T) {
    if history.len() == HISTORY_LIMIT {
        history.pop_front();
    }
    history.push_back(entry);
}

#[derive(Debug, Default)]
struct SimState {
    registers: HashMap<u16, u16>,
    writes: VecDeque<(u16, u16)>,
    reads: VecDeque<u16>,
    opens: u64,
    offline: bool,
    failing_opens: u32,
    failing_transactions: u32,
    object_position: Option<u16>,
    motion_polls: u32,
    pending_motion: u32,
    init_polls: u32,
    pending_init: u32,
}

/// Handle to a simulated gripper. Clones share the same device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGripper {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedGripper {
    /// A powered, uninitialized gripper with factory settings.
    pub fn new() -> Self {
        let sim = Self::default();
        {
            let mut state = sim.lock();
            for register in registers::REGISTER_MAP {
                state.registers.insert(register.address, 0);
            }
            state
                .registers
                .insert(Register::GripperForce.address(), values::FORCE_MIN);
            state.registers.insert(
                Register::GripState.address(),
                GripState::Arrived.raw(),
            );
        }
        sim
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connector opening links to this device.
    pub fn connector(&self) -> SimulatedConnector {
        SimulatedConnector {
            device: self.clone(),
        }
    }

    /// Unplug (or replug) the device. While offline, opens and transactions fail.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Fail the next `count` open attempts.
    pub fn fail_next_opens(&self, count: u32) {
        self.lock().failing_opens = count;
    }

    /// Fail the next `count` transactions (warm-up included).
    pub fn fail_next_transactions(&self, count: u32) {
        self.lock().failing_transactions = count;
    }

    /// Place an object between the fingers at the given position.
    pub fn set_object_position(&self, position: Option<u16>) {
        self.lock().object_position = position;
    }

    /// Number of grip state polls reporting motion after each position command.
    pub fn set_motion_polls(&self, polls: u32) {
        self.lock().motion_polls = polls;
    }

    /// Number of init state polls reporting "not ready" after each initialize command.
    pub fn set_init_polls(&self, polls: u32) {
        self.lock().init_polls = polls;
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.lock().registers.get(&address).copied()
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.lock().registers.insert(address, value);
    }

    /// Most recent successful writes, in order.
    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.lock().writes.iter().copied().collect()
    }

    /// Successful writes to one register, in order.
    pub fn writes_to(&self, address: u16) -> Vec<u16> {
        self.lock()
            .writes
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Addresses of the most recent successful reads, in order.
    pub fn reads(&self) -> Vec<u16> {
        self.lock().reads.iter().copied().collect()
    }

    /// Number of successful opens.
    pub fn opens(&self) -> u64 {
        self.lock().opens
    }

    fn open(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.offline {
            return Err(io::Error::new(io::ErrorKind::NotFound, "device unplugged").into());
        }
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "port busy").into());
        }
        state.opens += 1;
        Ok(())
    }

    fn check_line(state: &mut SimState) -> Result<(), TransportError> {
        if state.offline {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no response").into());
        }
        if state.failing_transactions > 0 {
            state.failing_transactions -= 1;
            return Err(TransportError::Protocol("invalid CRC".to_string()));
        }
        Ok(())
    }

    fn read(&self, address: u16) -> Result<u16, TransportError> {
        let mut state = self.lock();
        Self::check_line(&mut state)?;

        let descriptor = registers::by_address(address)
            .ok_or_else(|| TransportError::Exception("IllegalDataAddress".to_string()))?;
        if !descriptor.access.readable() {
            return Err(TransportError::Exception("IllegalFunction".to_string()));
        }

        let mut value = state.registers.get(&address).copied().unwrap_or(0);
        if address == Register::GripState.address() && state.pending_motion > 0 {
            state.pending_motion -= 1;
            value = GripState::InMotion.raw();
        } else if address == Register::InitState.address() && state.pending_init > 0 {
            state.pending_init -= 1;
            value = values::INIT_STATE_NOT_READY;
        }

        record(&mut state.reads, address);
        Ok(value)
    }

    fn write(&self, address: u16, value: u16) -> Result<(), TransportError> {
        let mut state = self.lock();
        Self::check_line(&mut state)?;

        let descriptor = registers::by_address(address)
            .ok_or_else(|| TransportError::Exception("IllegalDataAddress".to_string()))?;
        if !descriptor.access.writable() {
            return Err(TransportError::Exception("IllegalFunction".to_string()));
        }
        if !descriptor.domain.contains(value) {
            return Err(TransportError::Exception("IllegalDataValue".to_string()));
        }

        state.registers.insert(address, value);
        record(&mut state.writes, (address, value));

        if address == Register::Initialize.address() {
            let closed = state.registers.get(&Register::InitGripperPosition.address())
                == Some(&values::INIT_GRIPPER_CLOSED);
            let home = if closed {
                values::POSITION_MIN
            } else {
                values::POSITION_MAX
            };
            state
                .registers
                .insert(Register::InitState.address(), values::INIT_STATE_READY);
            state.pending_init = state.init_polls;
            Self::move_to(&mut state, home);
        } else if address == Register::GripperPosition.address() {
            Self::move_to(&mut state, value);
        }

        Ok(())
    }

    fn move_to(state: &mut SimState, target: u16) {
        let current = state
            .registers
            .get(&Register::ActualGripperPosition.address())
            .copied()
            .unwrap_or(0);

        // Closing onto an object stops the fingers at the object.
        let (position, grip) = match state.object_position {
            Some(object) if target < object && current >= object => (object, GripState::Caught),
            _ => (target, GripState::Arrived),
        };

        state
            .registers
            .insert(Register::ActualGripperPosition.address(), position);
        state
            .registers
            .insert(Register::GripState.address(), grip.raw());
        state.pending_motion = state.motion_polls;
    }
}

/// Opens links to a [`SimulatedGripper`].
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    device: SimulatedGripper,
}

impl Connector for SimulatedConnector {
    type Io = SimulatedLink;

    async fn open(&self) -> Result<SimulatedLink, TransportError> {
        self.device.open()?;
        Ok(SimulatedLink {
            device: self.device.clone(),
        })
    }

    fn endpoint(&self) -> String {
        "simulated AG-95".to_string()
    }
}

/// Open link to a [`SimulatedGripper`].
#[derive(Debug)]
pub struct SimulatedLink {
    device: SimulatedGripper,
}

impl RegisterIo for SimulatedLink {
    async fn read_register(&mut self, address: u16) -> Result<u16, TransportError> {
        self.device.read(address)
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<(), TransportError> {
        self.device.write(address, value)
    }
}
