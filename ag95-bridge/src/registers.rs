//! Register map of the DH AG-95 gripper.
//!
//! Every register is a single 16-bit holding register addressed with a
//! two-byte address (high byte = register group). The table is `'static`
//! and never changes at runtime.

use serde::Serialize;

/// Access mode of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn readable(&self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }

    pub fn writable(&self) -> bool {
        matches!(self, Access::WriteOnly | Access::ReadWrite)
    }
}

/// Set of values a register accepts or reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueDomain {
    /// Inclusive range.
    Range { min: u16, max: u16 },
    /// Enumerated values.
    OneOf { values: &'static [u16] },
}

impl ValueDomain {
    /// Check whether a raw register value belongs to this domain.
    pub fn contains(&self, value: u16) -> bool {
        match self {
            ValueDomain::Range { min, max } => (*min..=*max).contains(&value),
            ValueDomain::OneOf { values } => values.contains(&value),
        }
    }
}

/// Static description of one device register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterDescriptor {
    pub name: &'static str,
    pub address: u16,
    pub access: Access,
    pub domain: ValueDomain,
}

/// Raw register values with a fixed meaning.
pub mod values {
    /// Initialization: move fingers to the stored min and max position.
    pub const INITIALIZE: u16 = 0x01;
    /// Full initialization: search the min and max position.
    pub const INITIALIZE_FULL: u16 = 0xA5;

    /// Minimum gripping force (%), roughly 45N.
    pub const FORCE_MIN: u16 = 20;
    /// Maximum gripping force (%), roughly 160N.
    pub const FORCE_MAX: u16 = 100;

    /// Fully closed.
    pub const POSITION_MIN: u16 = 0;
    /// Fully open, a stroke of roughly 95mm.
    pub const POSITION_MAX: u16 = 1000;

    pub const INIT_STATE_NOT_READY: u16 = 0;
    pub const INIT_STATE_READY: u16 = 1;

    pub const INIT_GRIPPER_OPEN: u16 = 0;
    pub const INIT_GRIPPER_CLOSED: u16 = 1;

    /// Control over Modbus RTU only.
    pub const IO_MODE_MODBUS: u16 = 0;
    /// Control over IO as priority, falling back to Modbus RTU.
    pub const IO_MODE_IO_MODBUS: u16 = 1;
}

/// Registers driven by the control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Initialize,
    GripperForce,
    GripperPosition,
    InitState,
    GripState,
    ActualGripperPosition,
    InitGripperPosition,
    IoModeSwitch,
}

impl Register {
    /// Wire address of the register.
    pub const fn address(self) -> u16 {
        self.descriptor().address
    }

    pub const fn descriptor(self) -> &'static RegisterDescriptor {
        match self {
            Register::Initialize => &INITIALIZE,
            Register::GripperForce => &GRIPPER_FORCE,
            Register::GripperPosition => &GRIPPER_POSITION,
            Register::InitState => &INIT_STATE,
            Register::GripState => &GRIP_STATE,
            Register::ActualGripperPosition => &ACTUAL_GRIPPER_POSITION,
            Register::InitGripperPosition => &INIT_GRIPPER_POSITION,
            Register::IoModeSwitch => &IO_MODE_SWITCH,
        }
    }
}

/// Grip state reported by the `GripState` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GripState {
    /// Fingers are in motion.
    InMotion = 0,
    /// Fingers reached the reference position, no object detected or object dropped.
    Arrived = 1,
    /// Fingers stopped because an object is gripped.
    Caught = 2,
    /// Fingers at the reference position after a gripped object was dropped.
    Dropped = 3,
}

impl GripState {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(GripState::InMotion),
            1 => Some(GripState::Arrived),
            2 => Some(GripState::Caught),
            3 => Some(GripState::Dropped),
            _ => None,
        }
    }

    pub fn raw(self) -> u16 {
        self as u16
    }
}

const fn rw(name: &'static str, address: u16, domain: ValueDomain) -> RegisterDescriptor {
    RegisterDescriptor {
        name,
        address,
        access: Access::ReadWrite,
        domain,
    }
}

const fn ro(name: &'static str, address: u16, domain: ValueDomain) -> RegisterDescriptor {
    RegisterDescriptor {
        name,
        address,
        access: Access::ReadOnly,
        domain,
    }
}

const BINARY: ValueDomain = ValueDomain::OneOf { values: &[0, 1] };
const FORCE: ValueDomain = ValueDomain::Range {
    min: values::FORCE_MIN,
    max: values::FORCE_MAX,
};
const POSITION: ValueDomain = ValueDomain::Range {
    min: values::POSITION_MIN,
    max: values::POSITION_MAX,
};

// Basic control
pub const INITIALIZE: RegisterDescriptor = rw(
    "Initialize",
    0x0100,
    ValueDomain::OneOf {
        values: &[values::INITIALIZE, values::INITIALIZE_FULL],
    },
);
pub const GRIPPER_FORCE: RegisterDescriptor = rw("GripperForce", 0x0101, FORCE);
pub const GRIPPER_POSITION: RegisterDescriptor = rw("GripperPosition", 0x0103, POSITION);

// Status
pub const INIT_STATE: RegisterDescriptor = ro("InitState", 0x0200, BINARY);
pub const GRIP_STATE: RegisterDescriptor =
    ro("GripState", 0x0201, ValueDomain::OneOf { values: &[0, 1, 2, 3] });
pub const ACTUAL_GRIPPER_POSITION: RegisterDescriptor =
    ro("ActualGripperPosition", 0x0202, POSITION);

// Configuration. Only InitGripperPosition and IOModeSwitch are driven here,
// the others are listed so the address space is complete.
pub const SAVE_PARAMETERS: RegisterDescriptor = rw("SaveParameters", 0x0300, BINARY);
pub const INIT_GRIPPER_POSITION: RegisterDescriptor = rw("InitGripperPosition", 0x0301, BINARY);
pub const SLAVE_ADDRESS: RegisterDescriptor =
    rw("SlaveAddress", 0x0302, ValueDomain::Range { min: 0, max: 255 });
// 0 = 115200 ... 5 = 4800
pub const BAUD_RATE: RegisterDescriptor =
    rw("BaudRate", 0x0303, ValueDomain::Range { min: 0, max: 5 });
pub const STOP_BITS: RegisterDescriptor = rw("StopBits", 0x0304, BINARY);
pub const PARITY: RegisterDescriptor = rw("Parity", 0x0305, ValueDomain::Range { min: 0, max: 2 });
pub const IO_PARAMETER_TEST: RegisterDescriptor =
    rw("IoParameterTest", 0x0400, ValueDomain::Range { min: 1, max: 4 });
pub const IO_MODE_SWITCH: RegisterDescriptor = rw("IOModeSwitch", 0x0402, BINARY);

// IO parameter groups, three slots per group starting at 0x0405.
pub const IO_POSITION_1: RegisterDescriptor = rw("IoPosition1", 0x0405, POSITION);
pub const IO_FORCE_1: RegisterDescriptor = rw("IoForce1", 0x0406, FORCE);
pub const IO_POSITION_2: RegisterDescriptor = rw("IoPosition2", 0x0408, POSITION);
pub const IO_FORCE_2: RegisterDescriptor = rw("IoForce2", 0x0409, FORCE);
pub const IO_POSITION_3: RegisterDescriptor = rw("IoPosition3", 0x040B, POSITION);
pub const IO_FORCE_3: RegisterDescriptor = rw("IoForce3", 0x040C, FORCE);
pub const IO_POSITION_4: RegisterDescriptor = rw("IoPosition4", 0x040E, POSITION);
pub const IO_FORCE_4: RegisterDescriptor = rw("IoForce4", 0x040F, FORCE);

/// The complete register map, ordered by address.
pub static REGISTER_MAP: &[RegisterDescriptor] = &[
    INITIALIZE,
    GRIPPER_FORCE,
    GRIPPER_POSITION,
    INIT_STATE,
    GRIP_STATE,
    ACTUAL_GRIPPER_POSITION,
    SAVE_PARAMETERS,
    INIT_GRIPPER_POSITION,
    SLAVE_ADDRESS,
    BAUD_RATE,
    STOP_BITS,
    PARITY,
    IO_PARAMETER_TEST,
    IO_MODE_SWITCH,
    IO_POSITION_1,
    IO_FORCE_1,
    IO_POSITION_2,
    IO_FORCE_2,
    IO_POSITION_3,
    IO_FORCE_3,
    IO_POSITION_4,
    IO_FORCE_4,
];

/// Find a register by wire address.
pub fn by_address(address: u16) -> Option<&'static RegisterDescriptor> {
    REGISTER_MAP.iter().find(|r| r.address == address)
}

/// Find a register by symbolic name (case-insensitive).
pub fn by_name(name: &str) -> Option<&'static RegisterDescriptor> {
    REGISTER_MAP
        .iter()
        .find(|r| r.name.eq_ignore_ascii_case(name))
}
