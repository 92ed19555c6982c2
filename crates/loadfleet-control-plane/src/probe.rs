//! Health probes: the external liveness signal for workers.
//!
//! A worker's bootstrap never reports back, so the controller learns that a
//! worker came up (or went away) only by probing its address.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::trace;

/// Answers whether the worker at an address is up.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, address: IpAddr) -> bool;
}

/// Healthy when a TCP connection to the worker's control port succeeds.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self, address: IpAddr) -> bool {
        let target = SocketAddr::new(address, self.port);
        let healthy = matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(target)).await,
            Ok(Ok(_))
        );
        trace!(target = %target, healthy, "Probed worker");
        healthy
    }
}
