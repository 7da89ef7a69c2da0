//! Connection handle for the shared Redis backend
//!
//! Counter, cache and block-rule stores share one multiplexed connection
//! and one [`BackendCircuit`]. While the circuit is open the stores serve
//! from their in-process fallback instead of calling Redis.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;

use crate::circuit::BackendCircuit;

/// Failure talking to the shared backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Circuit is open, the call was not attempted
    #[error("shared backend degraded")]
    Degraded,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis command timed out after {0:?}")]
    Timeout(Duration),
}

/// Shared Redis connection with key namespacing and degraded-mode tracking
#[derive(Clone, Debug)]
pub struct SharedBackend {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    client: redis::Client,
    conn: RwLock<Option<MultiplexedConnection>>,
    key_prefix: String,
    command_timeout: Duration,
    circuit: BackendCircuit,
}

impl SharedBackend {
    /// Create a handle without connecting
    ///
    /// The first command establishes the connection, so a backend that is
    /// down at startup only puts the gateway in degraded mode.
    pub fn new(url: &str, key_prefix: &str, command_timeout: Duration) -> Result<Self, BackendError> {
        let client = redis::Client::open(url)?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                conn: RwLock::new(None),
                key_prefix: key_prefix.trim_end_matches(':').to_string(),
                command_timeout,
                circuit: BackendCircuit::new("redis"),
            }),
        })
    }

    /// Namespaced key
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.inner.key_prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    pub fn circuit(&self) -> &BackendCircuit {
        &self.inner.circuit
    }

    /// Run one backend operation under the circuit and command timeout
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, BackendError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        if !self.inner.circuit.allows_backend() {
            return Err(BackendError::Degraded);
        }

        let result = match self.connection().await {
            Ok(conn) => match tokio::time::timeout(self.inner.command_timeout, op(conn)).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(BackendError::Redis(e)),
                Err(_) => Err(BackendError::Timeout(self.inner.command_timeout)),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => {
                self.inner.circuit.record_success();
                Ok(value)
            }
            Err(e) => {
                if is_connection_error(&e) {
                    self.inner.conn.write().await.take();
                }
                self.inner.circuit.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BackendError> {
        if let Some(conn) = self.inner.conn.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.inner.conn.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.inner.command_timeout.max(Duration::from_secs(1)),
            self.inner.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| BackendError::Timeout(self.inner.command_timeout))??;

        *slot = Some(conn.clone());
        Ok(conn)
    }
}

fn is_connection_error(err: &BackendError) -> bool {
    match err {
        BackendError::Degraded => false,
        BackendError::Timeout(_) => true,
        BackendError::Redis(e) => e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal(),
    }
}
