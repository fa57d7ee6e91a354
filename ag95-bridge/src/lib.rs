//! Remote-procedure bridge for the DH AG-95 gripper.
//!
//! The bridge drives the gripper over Modbus RTU and exposes its control and
//! status registers as simple remote procedures, so robot-side scripts can
//! open, close, set force and query state without speaking the wire
//! protocol.
//!
//! # Layers
//!
//! - [`transport`] - Opens the serial link ([`transport::RtuConnector`])
//! - [`link`] - Single-register transactions with lazy reconnect
//! - [`gripper`] - Control operations; faults become `false`/`-1`
//! - [`routines`] - Composite open/close/wait routines
//! - [`rpc`] - HTTP endpoint
//!
//! [`sim`] provides a simulated device for tests and hardware-free runs.

pub mod config;
pub mod error;
pub mod gripper;
pub mod link;
pub mod registers;
pub mod routines;
pub mod rpc;
pub mod sim;
pub mod transport;

pub use config::BridgeConfig;
pub use error::{ConnectError, LinkFault, ModbusFault, TransportError};
pub use gripper::{FAULT_SENTINEL, Gripper};
pub use link::{LinkManager, LinkSettings, LinkStats, LinkStatus};
pub use routines::RoutineSettings;
pub use transport::{Connector, RegisterIo, RtuConnector};
