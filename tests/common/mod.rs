//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use switchyard::config::ServerConfig;
use switchyard::http::HttpServer;
use switchyard::lifecycle::Shutdown;
use switchyard::Router;
use tokio::net::TcpListener;

/// A server bound to an ephemeral port; dropping it does not stop it,
/// call `stop`.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}

/// Serve `router` on 127.0.0.1 with the given per-request timeout.
pub async fn start_server(router: Router, timeout_ms: u64) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ServerConfig::default();
    config.listener.bind_address = addr.to_string();
    config.dispatch.timeout_ms = timeout_ms;

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        HttpServer::new(config, router).run(listener, rx).await.unwrap();
    });

    TestServer {
        addr,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
