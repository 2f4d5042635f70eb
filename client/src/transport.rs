//! Outgoing packet transports
//!
//! `UdpTransport` writes packets straight to the server socket.
//! `NetworkSimulator` wraps any transport and degrades player moves with
//! configurable latency, jitter and loss, for testing the netcode on a
//! local connection.

use crate::ClientError;
use bincode::serialize;
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use shared::Packet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;

/// Future returned by [`Transport::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + 'a>>;

pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, packet: &'a Packet) -> SendFuture<'a>;
}

/// Sends packets on a UDP socket connected to the server
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// `socket` must already be connected to the server address.
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl Transport for UdpTransport {
    fn send<'a>(&'a self, packet: &'a Packet) -> SendFuture<'a> {
        Box::pin(async move {
            let data = serialize(packet)?;
            self.socket.send(&data).await?;
            Ok::<(), ClientError>(())
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetemConfig {
    pub delay_ms: f64,
    pub jitter_ms: f64,
    /// Probability in [0, 1] that a move is dropped
    pub loss: f64,
}

impl NetemConfig {
    pub fn is_enabled(&self) -> bool {
        self.delay_ms > 0.0 || self.jitter_ms > 0.0 || self.loss > 0.0
    }

    /// Fate of one packet: `None` if it is lost, otherwise its delay.
    pub fn plan<R: Rng>(&self, rng: &mut R) -> Option<Duration> {
        if self.loss > 0.0 && rng.gen::<f64>() < self.loss {
            return None;
        }

        let jitter = if self.jitter_ms > 0.0 {
            rng.gen_range(-self.jitter_ms..=self.jitter_ms)
        } else {
            0.0
        };
        let delay = (self.delay_ms + jitter).max(0.0);

        Some(Duration::from_secs_f64(delay / 1000.0))
    }
}

/// Transport wrapper that delays and drops `PlayerMove` packets.
///
/// Every other packet passes straight through so joins and clock pings see
/// the real link.
pub struct NetworkSimulator {
    inner: Arc<dyn Transport>,
    config: NetemConfig,
    rng: Mutex<StdRng>,
}

impl NetworkSimulator {
    pub fn new(inner: Arc<dyn Transport>, config: NetemConfig, rng: StdRng) -> Self {
        Self {
            inner,
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn plan(&self) -> Option<Duration> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.config.plan(&mut *rng)
    }
}

impl Transport for NetworkSimulator {
    fn send<'a>(&'a self, packet: &'a Packet) -> SendFuture<'a> {
        Box::pin(async move {
            if !matches!(packet, Packet::PlayerMove { .. }) {
                return self.inner.send(packet).await;
            }

            let Some(delay) = self.plan() else {
                debug!("Simulated loss of {}", packet.name());
                return Ok::<(), ClientError>(());
            };
            if delay.is_zero() {
                return self.inner.send(packet).await;
            }

            let inner = Arc::clone(&self.inner);
            let packet = packet.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = inner.send(&packet).await {
                    debug!("Delayed {} failed: {}", packet.name(), e);
                }
            });

            Ok(())
        })
    }
}
