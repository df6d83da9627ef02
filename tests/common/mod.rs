#![allow(dead_code)]

use std::sync::Arc;

use ipnet::IpNet;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use metrics_relay::config::{ClientConfig, StorageConfig};
use metrics_relay::server::{self, AppState};
use metrics_relay::storage::{MemStorage, Storage};
use metrics_relay::{HashKey, MetricClient};

/// A real server on an ephemeral port.
pub struct TestServer {
    pub addr: String,
    pub storage: Arc<dyn Storage>,
    shutdown: CancellationToken,
    handle: JoinHandle<metrics_relay::Result<()>>,
}

impl TestServer {
    pub async fn start(storage: Arc<dyn Storage>, key: HashKey) -> Self {
        Self::start_with_subnet(storage, key, None).await
    }

    pub async fn start_with_subnet(
        storage: Arc<dyn Storage>,
        key: HashKey,
        trusted_subnet: Option<IpNet>,
    ) -> Self {
        storage.init().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let state = AppState::with_subnet(storage.clone(), key, trusted_subnet);
        let handle = tokio::spawn(async move {
            server::serve(listener, state, async move { stop.cancelled().await }).await
        });

        Self {
            addr,
            storage,
            shutdown,
            handle,
        }
    }

    /// Server over a fresh in-memory store without file persistence.
    pub async fn in_memory(key: HashKey) -> Self {
        Self::start(Arc::new(MemStorage::new(StorageConfig::default())), key).await
    }

    /// In-memory server that only answers clients inside `subnet`.
    pub async fn restricted(subnet: &str) -> Self {
        let storage = Arc::new(MemStorage::new(StorageConfig::default()));
        Self::start_with_subnet(storage, HashKey::disabled(), Some(subnet.parse().unwrap())).await
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn client(&self, rate_limit: usize) -> MetricClient {
        MetricClient::new(&ClientConfig {
            address: self.addr.clone(),
            rate_limit,
            ..ClientConfig::default()
        })
        .unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
        self.storage.close().await;
    }
}
