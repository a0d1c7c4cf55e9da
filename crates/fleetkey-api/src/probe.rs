// Device liveness probe
//
// "Is it answering" only: a TCP connect to the device's native API port.
// Authentication is not attempted.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Checks whether a device responds on the network.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_alive(&self, device: &str) -> bool;
}

/// Connects to `<device><host_suffix>:<port>` with a bounded wait.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host_suffix: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host_suffix: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host_suffix: host_suffix.into(),
            port,
            timeout,
        }
    }

    pub fn address(&self, device: &str) -> String {
        format!("{device}{}:{}", self.host_suffix, self.port)
    }
}

#[async_trait]
impl LivenessProbe for TcpProbe {
    async fn is_alive(&self, device: &str) -> bool {
        let addr = self.address(device);
        match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "probe connect failed");
                false
            }
            Err(_) => {
                debug!(%addr, "probe timed out");
                false
            }
        }
    }
}
