//! Gateway server management: serving a scenario's gateway over HTTP and
//! health checking it

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use slicemock_gateway::server::{serve_until, HEALTH_PATH};
use slicemock_gateway::{Gateway, GatewayResult};

use crate::error::{E2eError, E2eResult};

/// Handle to a gateway being served for one scenario.
///
/// Dropping the handle stops the server.
pub struct GatewayHandle {
    gateway: Gateway,
    addr: SocketAddr,
    base_url: String,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<GatewayResult<()>>>,
}

impl GatewayHandle {
    /// Serve `gateway` and wait until it answers health checks
    pub async fn spawn(gateway: Gateway, config: ServerConfig) -> E2eResult<Self> {
        let bind = format!("{}:{}", config.host, config.port.unwrap_or(0));
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|e| E2eError::GatewayStartup(format!("Failed to bind {}: {}", bind, e)))?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{}", addr);

        info!("Serving scenario gateway on {}", addr);

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(serve_until(listener, gateway.clone(), async move {
            let _ = stopped.await;
        }));

        let handle = GatewayHandle {
            gateway,
            addr,
            base_url,
            stop: Some(stop),
            task: Some(task),
        };

        handle.wait_for_healthy(config.startup_timeout).await?;

        debug!("Gateway is healthy at {}", handle.base_url);
        Ok(handle)
    }

    /// Wait for the gateway to respond to health checks
    async fn wait_for_healthy(&self, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}{}", self.base_url, HEALTH_PATH);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    // Connection refused is expected while the listener task starts
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(50)).await;
        }

        Err(E2eError::GatewayHealthCheck(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Stop serving and wait for in-flight requests to finish
    pub async fn stop(mut self) -> E2eResult<()> {
        info!("Stopping scenario gateway on {}", self.addr);
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(e) => return Err(E2eError::GatewayStartup(format!("server task failed: {}", e))),
            }
        }
        Ok(())
    }
}

impl Drop for GatewayHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Where and how long to wait for a scenario gateway
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,

    /// Port to listen on (None = any free port)
    pub port: Option<u16>,

    /// Timeout for the first successful health check
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            startup_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicemock_common::Seed;
    use slicemock_gateway::GatewayConfig;

    fn gateway() -> Gateway {
        Gateway::storefront(GatewayConfig::default(), Seed::storefront()).unwrap()
    }

    #[tokio::test]
    async fn test_spawn_serves_storefront() {
        let handle = GatewayHandle::spawn(gateway(), ServerConfig::default()).await.unwrap();
        assert!(handle.addr().port() > 0);

        let menu: serde_json::Value = reqwest::get(format!("{}/api/order/menu", handle.base_url()))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(menu.as_array().unwrap().len(), 4);
        assert_eq!(handle.gateway().intercepts().len(), 1);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_two_gateways_stay_isolated() {
        let a = GatewayHandle::spawn(gateway(), ServerConfig::default()).await.unwrap();
        let b = GatewayHandle::spawn(gateway(), ServerConfig::default()).await.unwrap();
        assert_ne!(a.addr(), b.addr());

        let client = reqwest::Client::new();
        client
            .delete(format!("{}/api/user/5", a.base_url()))
            .send()
            .await
            .unwrap();

        assert!(a.gateway().state().user("5").is_none());
        assert!(b.gateway().state().user("5").is_some());
    }
}
