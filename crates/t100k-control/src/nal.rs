//! T100K network abstraction layer
//!
//! [`T100kNal`] owns the controllers, the UDP transport and the send loop.
//! Callers push pixel updates with [`T100kNal::update_data`]; the background
//! loop transmits every enabled controller at the configured frame rate and
//! is woken early whenever new data arrives.
//!
//! ## Example
//!
//! ```rust,no_run
//! use t100k_control::T100kNal;
//! use t100k_core::{Color, NalConfig, OutputItem};
//!
//! # #[tokio::main]
//! # async fn main() -> t100k_control::Result<()> {
//! let mut nal = T100kNal::new();
//! nal.initialize(NalConfig::default()).await?;
//! nal.start()?;
//!
//! nal.update_data([OutputItem::new(0, 3, 10, Color::new(0xFF, 0, 0))])?;
//!
//! nal.stop().await?;
//! nal.destroy().await;
//! # Ok(())
//! # }
//! ```

use crate::controller::Controller;
use crate::error::{NalError, Result};
use crate::interface;
use crate::protocol::{CONTINUATION_MARKER, FRAME_PACING, MARKER_PACING, START_MARKER};
use crate::scheduler::{Liveness, RateLimitedLoop, Work};
use crate::transport::Transport;
use anyhow::Context;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use t100k_core::{NalConfig, OutputItem};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Lifecycle of a [`T100kNal`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalState {
    /// Created, no controllers yet
    Uninitialized,
    /// Controllers and transport ready, loop not running
    Initialized,
    /// Send loop active
    Running,
    /// Send loop stopped, can be started again
    Stopped,
    /// Resources released
    Destroyed,
}

/// Network abstraction layer for a set of T100K controllers
pub struct T100kNal {
    state: NalState,
    controllers: Arc<[Controller]>,
    transport: Option<Arc<Transport>>,
    scheduler: Option<RateLimitedLoop>,
}

impl Default for T100kNal {
    fn default() -> Self {
        Self::new()
    }
}

impl T100kNal {
    /// Create an uninitialized NAL
    pub fn new() -> Self {
        Self {
            state: NalState::Uninitialized,
            controllers: Arc::from(Vec::new()),
            transport: None,
            scheduler: None,
        }
    }

    /// Build controllers, open the transport and prepare the send loop
    ///
    /// With `strict_address_check` the host must own an address on the
    /// controller subnet; otherwise [`NalError::NoUsableInterface`] is
    /// returned and nothing is left running.
    pub async fn initialize(&mut self, config: NalConfig) -> Result<()> {
        if !matches!(self.state, NalState::Uninitialized | NalState::Destroyed) {
            return Err(NalError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }
        config.validate()?;

        if config.strict_address_check {
            match interface::find_subnet_address(&config).await {
                Ok(local) => info!("Using host address {}", local),
                Err(e) => {
                    error!("{}", e);
                    return Err(e);
                }
            }
        } else {
            debug!("Address check disabled");
        }

        let controllers: Arc<[Controller]> = (0..config.max_controller_count)
            .map(|id| {
                let endpoint = SocketAddr::new(config.controller_addr(id).into(), config.port);
                Controller::new(id, endpoint)
            })
            .collect();

        let transport = Arc::new(
            Transport::bind(
                SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
                config.ack_timeout(),
            )
            .await?,
        );

        let cycle = SendCycle {
            controllers: Arc::clone(&controllers),
            transport: Arc::clone(&transport),
            flush_pending: AtomicBool::new(true),
        };
        let scheduler = RateLimitedLoop::new(config.min_interval(), cycle)
            .with_idle_interval(config.idle_refresh())
            .with_stop_grace(config.stop_grace());

        info!(
            "NAL initialized: {} controllers on {}:{}, {} fps",
            controllers.len(),
            config.subnet,
            config.port,
            config.target_frame_rate
        );

        self.controllers = controllers;
        self.transport = Some(transport);
        self.scheduler = Some(scheduler);
        self.state = NalState::Initialized;
        Ok(())
    }

    /// Start the send loop
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        match (self.state, self.scheduler.as_mut()) {
            (NalState::Initialized | NalState::Stopped, Some(scheduler)) => {
                scheduler.start();
                self.state = NalState::Running;
                Ok(())
            }
            (NalState::Running, _) => Ok(()),
            (state, _) => Err(NalError::InvalidState {
                operation: "start",
                state,
            }),
        }
    }

    /// Stop the send loop
    pub async fn stop(&mut self) -> Result<()> {
        match (self.state, self.scheduler.as_mut()) {
            (NalState::Running, Some(scheduler)) => {
                scheduler.stop().await;
                self.state = NalState::Stopped;
                Ok(())
            }
            (NalState::Stopped, _) => Ok(()),
            (state, _) => Err(NalError::InvalidState {
                operation: "stop",
                state,
            }),
        }
    }

    /// Apply pixel updates and wake the send loop
    ///
    /// Items are applied in order. On an invalid item the items before it
    /// stay applied (and are sent) and the error is returned.
    pub fn update_data(&self, items: impl IntoIterator<Item = OutputItem>) -> Result<()> {
        if !matches!(self.state, NalState::Initialized | NalState::Running) {
            return Err(NalError::InvalidState {
                operation: "update data",
                state: self.state,
            });
        }

        let mut written = 0usize;
        let mut outcome = Ok(());
        for item in items {
            if let Err(e) = self.apply(&item) {
                outcome = Err(e);
                break;
            }
            written += 1;
        }

        if written > 0 {
            if let Some(scheduler) = &self.scheduler {
                scheduler.wake();
            }
        }
        outcome
    }

    fn apply(&self, item: &OutputItem) -> Result<()> {
        let controller = self
            .controllers
            .get(usize::from(item.controller_id))
            .ok_or(NalError::UnknownController {
                id: item.controller_id,
                count: self.controllers.len(),
            })?;
        controller.set_pixel(item.universe_id, item.channel, item.color)
    }

    /// Stop the loop and release controllers and transport
    ///
    /// Safe to call more than once.
    pub async fn destroy(&mut self) {
        if self.state == NalState::Destroyed {
            return;
        }
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        self.transport = None;
        self.controllers = Arc::from(Vec::new());
        self.state = NalState::Destroyed;
        info!("NAL destroyed");
    }

    /// Current lifecycle state
    pub fn state(&self) -> NalState {
        self.state
    }

    /// Number of configured controllers
    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    /// Controller by id
    pub fn controller(&self, id: u8) -> Option<&Controller> {
        self.controllers.get(usize::from(id))
    }

    /// Whether a controller acknowledged its last send
    pub fn is_online(&self, id: u8) -> bool {
        self.controller(id).is_some_and(Controller::is_online)
    }

    /// Number of send cycles started
    pub fn cycle_count(&self) -> u64 {
        self.scheduler
            .as_ref()
            .map_or(0, RateLimitedLoop::cycle_count)
    }

    /// Local address of the transport socket
    pub fn transport_addr(&self) -> Option<SocketAddr> {
        self.transport
            .as_ref()
            .and_then(|transport| transport.local_addr().ok())
    }
}

/// Work item of the send loop
struct SendCycle {
    controllers: Arc<[Controller]>,
    transport: Arc<Transport>,
    /// Set until one cycle has sent every controller
    flush_pending: AtomicBool,
}

#[async_trait]
impl Work for SendCycle {
    async fn run(&self, alive: Liveness) -> anyhow::Result<()> {
        let flush_all = self.flush_pending.load(Ordering::Acquire);

        for controller in self.controllers.iter() {
            if !alive.is_alive() {
                debug!("Send cycle interrupted before controller {}", controller.id());
                return Ok(());
            }
            if flush_all || controller.is_enabled() {
                self.send_controller(controller)
                    .await
                    .with_context(|| format!("sending to controller {}", controller.id()))?;
            }
        }

        if flush_all {
            self.flush_pending.store(false, Ordering::Release);
            debug!("Initial flush of {} controllers done", self.controllers.len());
        }
        Ok(())
    }
}

impl SendCycle {
    async fn send_controller(&self, controller: &Controller) -> Result<()> {
        let endpoint = controller.endpoint();
        let frames = controller.snapshot();

        for frame in frames.iter() {
            self.transport.send(endpoint, frame).await?;
            sleep(FRAME_PACING).await;
        }
        let stale = self.transport.discard_pending()?;
        if stale > 0 {
            debug!(
                "Dropped {} stale datagrams before probing controller {}",
                stale,
                controller.id()
            );
        }
        self.transport.send(endpoint, &CONTINUATION_MARKER).await?;

        let online = self.transport.wait_ack(endpoint).await?.is_some();
        if !online {
            debug!("Controller {} offline", controller.id());
        }
        if controller.set_online(online) {
            info!(
                "Controller {} is now {}",
                controller.id(),
                if online { "online" } else { "offline" }
            );
        }

        sleep(MARKER_PACING).await;
        self.transport.send(endpoint, &START_MARKER).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use t100k_core::Color;

    fn offline_config(count: u8) -> NalConfig {
        NalConfig {
            strict_address_check: false,
            max_controller_count: count,
            target_frame_rate: 50,
            subnet: Ipv4Addr::new(127, 0, 0, 0),
            port: 9,
            ack_timeout_ms: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let mut nal = T100kNal::new();
        assert_eq!(nal.state(), NalState::Uninitialized);
        assert!(nal.start().is_err());
        assert!(nal.update_data(Vec::<OutputItem>::new()).is_err());

        nal.initialize(offline_config(2)).await.unwrap();
        assert_eq!(nal.state(), NalState::Initialized);
        assert_eq!(nal.controller_count(), 2);
        assert!(nal.initialize(offline_config(2)).await.is_err());

        nal.start().unwrap();
        assert_eq!(nal.state(), NalState::Running);
        nal.start().unwrap();

        nal.stop().await.unwrap();
        assert_eq!(nal.state(), NalState::Stopped);
        assert!(nal.update_data(Vec::<OutputItem>::new()).is_err());

        nal.start().unwrap();
        nal.destroy().await;
        assert_eq!(nal.state(), NalState::Destroyed);
        assert_eq!(nal.controller_count(), 0);
        nal.destroy().await;
        assert!(nal.start().is_err());

        // Destroyed instances can be initialized again
        nal.initialize(offline_config(1)).await.unwrap();
        assert_eq!(nal.controller_count(), 1);
        nal.destroy().await;
    }

    #[tokio::test]
    async fn test_controller_endpoints() {
        let mut nal = T100kNal::new();
        nal.initialize(offline_config(3)).await.unwrap();
        assert_eq!(
            nal.controller(2).unwrap().endpoint(),
            "127.0.0.52:9".parse::<SocketAddr>().unwrap()
        );
        assert!(nal.controller(3).is_none());
        nal.destroy().await;
    }

    #[tokio::test]
    async fn test_update_data_applies_until_error() {
        let mut nal = T100kNal::new();
        nal.initialize(offline_config(2)).await.unwrap();

        let result = nal.update_data([
            OutputItem::new(0, 3, 10, Color::new(0xFF, 0, 0)),
            OutputItem::new(5, 0, 0, Color::WHITE),
            OutputItem::new(1, 0, 0, Color::WHITE),
        ]);
        assert!(matches!(
            result,
            Err(NalError::UnknownController { id: 5, count: 2 })
        ));
        assert!(nal.controller(0).unwrap().is_enabled());
        assert!(!nal.controller(1).unwrap().is_enabled());

        assert!(matches!(
            nal.update_data([OutputItem::new(1, 0, 1024, Color::WHITE)]),
            Err(NalError::PixelOutOfRange(1024))
        ));
        nal.destroy().await;
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut nal = T100kNal::new();
        let config = NalConfig {
            target_frame_rate: 0,
            ..offline_config(1)
        };
        assert!(matches!(
            nal.initialize(config).await,
            Err(NalError::InvalidConfig(_))
        ));
        assert_eq!(nal.state(), NalState::Uninitialized);
    }

    #[tokio::test]
    async fn test_strict_check_failure_leaves_nothing_running() {
        let mut nal = T100kNal::new();
        let config = NalConfig {
            strict_address_check: true,
            subnet: Ipv4Addr::new(198, 51, 100, 0),
            ..offline_config(1)
        };
        assert!(matches!(
            nal.initialize(config).await,
            Err(NalError::NoUsableInterface(_))
        ));
        assert_eq!(nal.state(), NalState::Uninitialized);
        assert_eq!(nal.cycle_count(), 0);
        assert!(nal.transport_addr().is_none());
    }
}
