//! Modbus transaction client with connection lifecycle management.
//!
//! The [`LinkManager`] owns the single link to the gripper. Every
//! transaction (connect, read, write) runs under one async mutex, so bytes of
//! two transactions never interleave on the wire and waiting callers are
//! served in arrival order.
//!
//! Lifecycle:
//!
//! ```text
//! Disconnected --open + warm-up ok--> Live
//! Disconnected --open/warm-up fails--> Disconnected
//! Live --any transaction fault------> Disconnected
//! ```
//!
//! A disconnected link is reopened lazily by the next transaction. The failed
//! transaction itself is never retried.

use crate::config::LinkConfig;
use crate::error::{ConnectError, LinkFault, ModbusFault};
use crate::registers::{Register, values};
use crate::transport::{Connector, RegisterIo};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Lifecycle settings of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Settle time after the warm-up transaction.
    pub warmup_delay: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::from(&LinkConfig::default())
    }
}

impl From<&LinkConfig> for LinkSettings {
    fn from(config: &LinkConfig) -> Self {
        Self {
            warmup_delay: Duration::from_millis(config.warmup_delay_ms),
        }
    }
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Live,
}

/// Counters describing the link history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Successful open + warm-up sequences.
    pub connects: u64,
    /// Open or warm-up attempts that failed.
    pub failed_connects: u64,
    pub read_faults: u64,
    pub write_faults: u64,
    /// Read faults that were actually logged.
    pub logged_read_faults: u64,
}

enum LinkState<Io> {
    Disconnected,
    // Left behind if an open is cancelled halfway; treated as not live.
    Connecting,
    Live(Io),
}

struct LinkInner<Io> {
    state: LinkState<Io>,
    log_read_faults: bool,
    stats: LinkStats,
}

impl<Io> LinkInner<Io> {
    /// Take the live handle out, leaving the link disconnected.
    fn take_live(&mut self) -> Option<Io> {
        match std::mem::replace(&mut self.state, LinkState::Disconnected) {
            LinkState::Live(io) => Some(io),
            _ => None,
        }
    }

    fn status(&self) -> LinkStatus {
        match self.state {
            LinkState::Disconnected => LinkStatus::Disconnected,
            LinkState::Connecting => LinkStatus::Connecting,
            LinkState::Live(_) => LinkStatus::Live,
        }
    }
}

/// Owner of the single link to the gripper.
pub struct LinkManager<C: Connector> {
    connector: C,
    settings: LinkSettings,
    inner: Mutex<LinkInner<C::Io>>,
}

impl<C: Connector> LinkManager<C> {
    pub fn new(connector: C, settings: LinkSettings) -> Self {
        Self {
            connector,
            settings,
            inner: Mutex::new(LinkInner {
                state: LinkState::Disconnected,
                log_read_faults: true,
                stats: LinkStats::default(),
            }),
        }
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    pub async fn status(&self) -> LinkStatus {
        self.inner.lock().await.status()
    }

    pub async fn stats(&self) -> LinkStats {
        self.inner.lock().await.stats
    }

    /// Bring the link up if it is not live. A live link is left untouched.
    pub async fn ensure_connected(&self) -> Result<(), ConnectError> {
        let mut inner = self.inner.lock().await;
        let io = self.acquire(&mut inner).await?;
        inner.state = LinkState::Live(io);
        Ok(())
    }

    /// Drop the link; the next transaction reopens it.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if inner.take_live().is_some() {
            info!("Closed gripper link {}", self.connector.endpoint());
        }
        inner.state = LinkState::Disconnected;
    }

    /// Read one register.
    ///
    /// Only the first of consecutive read faults is logged; logging resumes
    /// after the next successful reconnect.
    pub async fn read_register(&self, address: u16) -> Result<i32, ModbusFault> {
        let mut inner = self.inner.lock().await;

        let result = match self.acquire(&mut inner).await {
            Ok(mut io) => match io.read_register(address).await {
                Ok(value) => {
                    inner.state = LinkState::Live(io);
                    Ok(i32::from(value))
                }
                Err(e) => Err(LinkFault::from(e)),
            },
            Err(e) => Err(LinkFault::from(e)),
        };

        result.map_err(|source| {
            inner.state = LinkState::Disconnected;
            inner.stats.read_faults += 1;
            if inner.log_read_faults {
                inner.log_read_faults = false;
                inner.stats.logged_read_faults += 1;
                error!("Error in Modbus read of register {:#06x}: {}", address, source);
            } else {
                debug!("Suppressed Modbus read fault on register {:#06x}", address);
            }
            ModbusFault::FailedRead { address, source }
        })
    }

    /// Write one register (function 0x06).
    ///
    /// A value that does not fit 16 bits is rejected before the link is
    /// touched. It is the one failed write that leaves a live link live, since
    /// nothing went over the wire.
    pub async fn write_register(&self, address: u16, value: i32) -> Result<(), ModbusFault> {
        let word = u16::try_from(value).map_err(|_| {
            error!(
                "Error in Modbus write to register {:#06x}: value {} out of range",
                address, value
            );
            ModbusFault::FailedWrite {
                address,
                source: LinkFault::ValueOutOfRange(value),
            }
        })?;

        let mut inner = self.inner.lock().await;

        let result = match self.acquire(&mut inner).await {
            Ok(mut io) => match io.write_register(address, word).await {
                Ok(()) => {
                    inner.state = LinkState::Live(io);
                    Ok(())
                }
                Err(e) => Err(LinkFault::from(e)),
            },
            Err(e) => Err(LinkFault::from(e)),
        };

        result.map_err(|source| {
            inner.state = LinkState::Disconnected;
            inner.stats.write_faults += 1;
            error!("Error in Modbus write to register {:#06x}: {}", address, source);
            ModbusFault::FailedWrite { address, source }
        })
    }

    /// Hand out the live handle, reconnecting first if there is none.
    async fn acquire(&self, inner: &mut LinkInner<C::Io>) -> Result<C::Io, ConnectError> {
        if let Some(io) = inner.take_live() {
            return Ok(io);
        }

        inner.state = LinkState::Connecting;
        match self.open_and_warm_up().await {
            Ok(io) => {
                inner.state = LinkState::Disconnected;
                inner.log_read_faults = true;
                inner.stats.connects += 1;
                info!("Gripper link {} is live", self.connector.endpoint());
                Ok(io)
            }
            Err(e) => {
                inner.state = LinkState::Disconnected;
                inner.stats.failed_connects += 1;
                debug!("Connect to {} failed: {}", self.connector.endpoint(), e);
                Err(e)
            }
        }
    }

    async fn open_and_warm_up(&self) -> Result<C::Io, ConnectError> {
        let mut io = self.connector.open().await.map_err(ConnectError::Open)?;

        // The firmware may drop the first transmission after power-on.
        io.write_register(Register::IoModeSwitch.address(), values::IO_MODE_MODBUS)
            .await
            .map_err(ConnectError::WarmUp)?;

        tokio::time::sleep(self.settings.warmup_delay).await;
        Ok(io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::sim::SimulatedGripper;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tracing_test::traced_test;

    fn settings() -> LinkSettings {
        LinkSettings {
            warmup_delay: Duration::ZERO,
        }
    }

    fn manager(sim: &SimulatedGripper) -> LinkManager<crate::sim::SimulatedConnector> {
        LinkManager::new(sim.connector(), settings())
    }

    const IO_MODE: u16 = Register::IoModeSwitch.address();
    const INIT_STATE: u16 = Register::InitState.address();

    #[tokio::test]
    async fn test_connect_performs_warm_up() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);

        assert_eq!(link.status().await, LinkStatus::Disconnected);
        link.ensure_connected().await.unwrap();

        assert_eq!(link.status().await, LinkStatus::Live);
        assert_eq!(sim.writes(), vec![(IO_MODE, values::IO_MODE_MODBUS)]);
        assert_eq!(link.stats().await.connects, 1);
    }

    #[tokio::test]
    async fn test_connect_when_live_is_noop() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);

        link.ensure_connected().await.unwrap();
        link.ensure_connected().await.unwrap();

        assert_eq!(sim.opens(), 1);
        assert_eq!(sim.writes_to(IO_MODE).len(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_link_absent() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);
        sim.fail_next_opens(1);

        let result = link.ensure_connected().await;

        assert!(matches!(result, Err(ConnectError::Open(_))));
        assert_eq!(link.status().await, LinkStatus::Disconnected);
        assert_eq!(link.stats().await.failed_connects, 1);
    }

    #[tokio::test]
    async fn test_warm_up_failure_leaves_link_absent() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);
        sim.fail_next_transactions(1);

        let result = link.ensure_connected().await;

        assert!(matches!(result, Err(ConnectError::WarmUp(_))));
        assert_eq!(link.status().await, LinkStatus::Disconnected);

        // Next attempt opens a fresh link and succeeds.
        link.ensure_connected().await.unwrap();
        assert_eq!(sim.opens(), 2);
        assert_eq!(link.status().await, LinkStatus::Live);
    }

    #[tokio::test]
    async fn test_read_connects_lazily() {
        let sim = SimulatedGripper::new();
        sim.set_register(INIT_STATE, 1);
        let link = manager(&sim);

        assert_eq!(link.read_register(INIT_STATE).await.unwrap(), 1);
        assert_eq!(sim.opens(), 1);
        assert_eq!(link.status().await, LinkStatus::Live);
    }

    #[tokio::test]
    async fn test_fault_invalidates_and_next_call_reconnects_once() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);
        link.ensure_connected().await.unwrap();

        sim.fail_next_transactions(1);
        let fault = link.read_register(INIT_STATE).await.unwrap_err();

        assert!(matches!(fault, ModbusFault::FailedRead { address, .. } if address == INIT_STATE));
        assert_eq!(link.status().await, LinkStatus::Disconnected);
        assert_eq!(sim.opens(), 1);

        link.read_register(INIT_STATE).await.unwrap();
        assert_eq!(sim.opens(), 2);
        assert_eq!(sim.writes_to(IO_MODE).len(), 2);
    }

    #[tokio::test]
    async fn test_write_fault_invalidates() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);
        link.ensure_connected().await.unwrap();

        sim.fail_next_transactions(1);
        let fault = link
            .write_register(Register::GripperForce.address(), 50)
            .await
            .unwrap_err();

        assert!(matches!(fault, ModbusFault::FailedWrite { .. }));
        assert_eq!(link.status().await, LinkStatus::Disconnected);
        assert_eq!(link.stats().await.write_faults, 1);
        assert!(sim.writes_to(Register::GripperForce.address()).is_empty());
    }

    #[tokio::test]
    async fn test_device_exception_invalidates() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);
        link.ensure_connected().await.unwrap();

        let fault = link.read_register(0x0999).await.unwrap_err();

        assert!(matches!(
            fault.cause(),
            LinkFault::Transport(TransportError::Exception(_))
        ));
        assert_eq!(link.status().await, LinkStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_out_of_range_value_does_not_touch_link() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);

        for value in [-1, 65536] {
            let fault = link
                .write_register(Register::GripperPosition.address(), value)
                .await
                .unwrap_err();
            assert!(matches!(fault.cause(), LinkFault::ValueOutOfRange(v) if *v == value));
        }

        assert_eq!(sim.opens(), 0);
        assert_eq!(link.stats().await.write_faults, 0);
    }

    #[tokio::test]
    async fn test_out_of_range_value_keeps_live_link() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);
        link.ensure_connected().await.unwrap();

        assert!(link
            .write_register(Register::GripperPosition.address(), 70000)
            .await
            .is_err());

        assert_eq!(link.status().await, LinkStatus::Live);
        link.write_register(Register::GripperPosition.address(), 700)
            .await
            .unwrap();
        assert_eq!(sim.opens(), 1);
    }

    #[tokio::test]
    async fn test_connect_waits_for_warm_up_delay() {
        let sim = SimulatedGripper::new();
        let settings = LinkSettings::default();
        let delay = settings.warmup_delay;
        assert_eq!(delay, Duration::from_millis(100));
        let link = Arc::new(LinkManager::new(sim.connector(), settings));

        let start = std::time::Instant::now();
        let connect = tokio::spawn({
            let link = link.clone();
            async move { link.ensure_connected().await }
        });

        // Warm-up write is out, but the link is not reported usable yet.
        tokio::time::sleep(delay / 2).await;
        assert_eq!(sim.writes_to(IO_MODE), vec![values::IO_MODE_MODBUS]);
        assert!(!connect.is_finished());

        connect.await.unwrap().unwrap();
        assert!(start.elapsed() >= delay);
        assert_eq!(link.status().await, LinkStatus::Live);
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_as_transaction_fault() {
        let sim = SimulatedGripper::new();
        sim.set_offline(true);
        let link = manager(&sim);

        let fault = link
            .write_register(Register::GripperPosition.address(), 10)
            .await
            .unwrap_err();

        assert!(matches!(
            fault,
            ModbusFault::FailedWrite {
                source: LinkFault::Connect(ConnectError::Open(_)),
                ..
            }
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_read_fault_logging_is_suppressed() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);
        sim.set_offline(true);

        for _ in 0..5 {
            assert!(link.read_register(INIT_STATE).await.is_err());
        }

        let stats = link.stats().await;
        assert_eq!(stats.read_faults, 5);
        assert_eq!(stats.logged_read_faults, 1);
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("Error in Modbus read"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected 1 logged read fault, found {}", n)),
            }
        });
    }

    #[tokio::test]
    async fn test_read_fault_logging_resumes_after_reconnect() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);

        sim.set_offline(true);
        let _ = link.read_register(INIT_STATE).await;
        let _ = link.read_register(INIT_STATE).await;
        assert_eq!(link.stats().await.logged_read_faults, 1);

        sim.set_offline(false);
        link.read_register(INIT_STATE).await.unwrap();

        sim.set_offline(true);
        let _ = link.read_register(INIT_STATE).await;
        assert_eq!(link.stats().await.logged_read_faults, 2);
    }

    #[tokio::test]
    async fn test_write_faults_are_always_logged() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);
        sim.set_offline(true);

        for _ in 0..3 {
            assert!(link.write_register(IO_MODE, 1).await.is_err());
        }

        assert_eq!(link.stats().await.write_faults, 3);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let sim = SimulatedGripper::new();
        let link = manager(&sim);
        link.ensure_connected().await.unwrap();

        link.disconnect().await;
        assert_eq!(link.status().await, LinkStatus::Disconnected);

        link.ensure_connected().await.unwrap();
        assert_eq!(sim.opens(), 2);
    }

    /// Link that detects overlapping transactions.
    struct ExclusiveIo {
        busy: Arc<AtomicBool>,
        overlaps: Arc<AtomicU32>,
    }

    impl ExclusiveIo {
        async fn exchange(&self) {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.busy.store(false, Ordering::SeqCst);
        }
    }

    impl RegisterIo for ExclusiveIo {
        async fn read_register(&mut self, _address: u16) -> Result<u16, TransportError> {
            self.exchange().await;
            Ok(1)
        }

        async fn write_register(&mut self, _address: u16, _value: u16) -> Result<(), TransportError> {
            self.exchange().await;
            Ok(())
        }
    }

    struct ExclusiveConnector {
        busy: Arc<AtomicBool>,
        overlaps: Arc<AtomicU32>,
    }

    impl Connector for ExclusiveConnector {
        type Io = ExclusiveIo;

        async fn open(&self) -> Result<ExclusiveIo, TransportError> {
            Ok(ExclusiveIo {
                busy: self.busy.clone(),
                overlaps: self.overlaps.clone(),
            })
        }

        fn endpoint(&self) -> String {
            "exclusive".to_string()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transactions_never_interleave() {
        let overlaps = Arc::new(AtomicU32::new(0));
        let link = Arc::new(LinkManager::new(
            ExclusiveConnector {
                busy: Arc::new(AtomicBool::new(false)),
                overlaps: overlaps.clone(),
            },
            settings(),
        ));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let link = link.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    link.read_register(INIT_STATE).await.map(|_| ())
                } else {
                    link.write_register(IO_MODE, 1).await
                }
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(link.stats().await.connects, 1);
    }
}
