//! Transport handle: an open link that performs single-register transactions.
//!
//! [`Connector`] opens a link, [`RegisterIo`] is the open link itself. The
//! production implementation runs the `tokio-modbus` RTU client over a
//! `tokio-serial` port; framing and CRC are handled by `tokio-modbus`.

use crate::config::{Parity, ReadFunction, SerialConfig};
use crate::error::TransportError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::debug;

/// An open link bound to one slave.
///
/// Dropping the value releases the underlying port.
pub trait RegisterIo: Send + 'static {
    /// Read one register.
    fn read_register(
        &mut self,
        address: u16,
    ) -> impl Future<Output = Result<u16, TransportError>> + Send;

    /// Write one register (function 0x06).
    fn write_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Opens links to the gripper.
pub trait Connector: Send + Sync + 'static {
    type Io: RegisterIo;

    /// Perform exactly one attempt to open a link.
    fn open(&self) -> impl Future<Output = Result<Self::Io, TransportError>> + Send;

    /// Human-readable endpoint, used in logs.
    fn endpoint(&self) -> String;
}

/// Connector for a Modbus RTU serial line.
#[derive(Debug, Clone)]
pub struct RtuConnector {
    config: SerialConfig,
}

impl RtuConnector {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

impl Connector for RtuConnector {
    type Io = RtuIo;

    async fn open(&self) -> Result<RtuIo, TransportError> {
        let parity = match self.config.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        };

        let stop_bits = match self.config.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let builder = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(tokio_serial::DataBits::Eight)
            .timeout(self.config.read_timeout());

        let serial = tokio_serial::SerialStream::open(&builder)?;
        debug!(
            "Opened {} at {} baud, slave {}, reads with function {:#04x}",
            self.config.port,
            self.config.baud_rate,
            self.config.slave,
            self.config.read_function.code()
        );

        Ok(RtuIo {
            ctx: rtu::attach_slave(serial, Slave(self.config.slave)),
            read_function: self.config.read_function,
            timeout: self.config.transaction_timeout(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{} (slave {})", self.config.port, self.config.slave)
    }
}

/// Open RTU client context.
pub struct RtuIo {
    ctx: Context,
    read_function: ReadFunction,
    timeout: Duration,
}

impl fmt::Debug for RtuIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtuIo")
            .field("read_function", &self.read_function)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RegisterIo for RtuIo {
    async fn read_register(&mut self, address: u16) -> Result<u16, TransportError> {
        let words = match self.read_function {
            ReadFunction::Holding => {
                transact(self.timeout, self.ctx.read_holding_registers(address, 1)).await?
            }
            ReadFunction::Input => {
                transact(self.timeout, self.ctx.read_input_registers(address, 1)).await?
            }
        };

        words
            .first()
            .copied()
            .ok_or_else(|| TransportError::Protocol("Empty register response".to_string()))
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<(), TransportError> {
        transact(self.timeout, self.ctx.write_single_register(address, value)).await
    }
}

/// Bound one request/response exchange and flatten the client's nested result.
async fn transact<T, E, X>(
    budget: Duration,
    request: impl Future<Output = Result<Result<T, X>, E>>,
) -> Result<T, TransportError>
where
    E: fmt::Display,
    X: fmt::Debug,
{
    tokio::time::timeout(budget, request)
        .await
        .map_err(|_| TransportError::Timeout(budget))?
        .map_err(|e| TransportError::Protocol(e.to_string()))?
        .map_err(|e| TransportError::Exception(format!("{:?}", e)))
}
