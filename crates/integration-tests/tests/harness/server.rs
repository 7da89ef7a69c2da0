//! Test server wrapper that starts Heliox on a random port

use std::net::SocketAddr;
use std::sync::Arc;

use heliox_abuse::AbuseDetector;
use heliox_config::Config;
use heliox_core::headers::API_KEY;
use heliox_core::{KeyStore, MemoryCatalog, SharedClock, SystemClock, hash_secret};
use heliox_server::{KeyAdmin, Server};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::config::SECRET;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    catalog: Arc<MemoryCatalog>,
    keys: KeyAdmin,
    abuse: Option<Arc<AbuseDetector>>,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    /// Start a test server on the system clock
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        Self::start_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Start a test server whose pipeline reads time from `clock`
    ///
    /// Binds to port 0 for automatic port assignment
    pub async fn start_with_clock(config: Config, clock: SharedClock) -> anyhow::Result<Self> {
        let server = Server::with_clock(&config, clock)?;
        let catalog = Arc::clone(server.catalog());
        let keys = server.keys().clone();
        let abuse = server.abuse().cloned();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.serve_on(listener, shutdown.clone()));

        Ok(Self {
            addr,
            shutdown,
            client: reqwest::Client::new(),
            catalog,
            keys,
            abuse,
            task: Some(task),
        })
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET carrying the default key in `X-API-Key`
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).header(API_KEY, SECRET)
    }

    /// POST carrying the default key in `X-API-Key`
    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).header(API_KEY, SECRET)
    }

    pub fn catalog(&self) -> &Arc<MemoryCatalog> {
        &self.catalog
    }

    pub fn keys(&self) -> &KeyAdmin {
        &self.keys
    }

    pub fn abuse(&self) -> &Arc<AbuseDetector> {
        self.abuse.as_ref().expect("abuse detection enabled")
    }

    /// Id of the key with `secret`
    pub async fn key_id(&self, secret: &str) -> Uuid {
        self.catalog
            .find_by_hash(&hash_secret(secret))
            .await
            .unwrap()
            .expect("key is seeded")
            .id
    }

    /// Shut down and wait until queued outcome records are flushed
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.await.unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
