//! Throwaway Redis server for component tests

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::config::RedisConfig;
use crate::error::{ComponentError, ComponentResult};
use crate::server::{find_free_port, ProcessConfig, ProcessHandle};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A `redis-server` process with no persistence, plus a client connection
pub struct RedisFeature {
    server: ProcessHandle,
    client: redis::Client,
    conn: MultiplexedConnection,
    port: u16,
}

impl RedisFeature {
    pub async fn start() -> ComponentResult<Self> {
        Self::with_config(&RedisConfig::default()).await
    }

    pub async fn with_config(config: &RedisConfig) -> ComponentResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };

        let mut server = ProcessHandle::spawn(
            ProcessConfig::new("redis-server", &config.binary_path)
                .arg("--port")
                .arg(port.to_string())
                .arg("--bind")
                .arg("127.0.0.1")
                .arg("--save")
                .arg("")
                .arg("--appendonly")
                .arg("no"),
        )?;

        let client = redis::Client::open(format!("redis://127.0.0.1:{port}/"))?;
        let timeout = Duration::from_millis(config.startup_timeout_ms);
        server
            .wait_until_ready(timeout, POLL_INTERVAL, || ping_once(&client))
            .await?;

        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis ready on 127.0.0.1:{}", port);

        Ok(Self {
            server,
            client,
            conn,
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection URL for the service under test
    pub fn url(&self) -> String {
        format!("redis://127.0.0.1:{}/", self.port)
    }

    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    pub async fn key_is_already_set(&mut self, key: &str, value: &str) -> ComponentResult<()> {
        self.conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    pub async fn key_has_value(&mut self, key: &str, expected: &str) -> ComponentResult<()> {
        let actual: Option<String> = self.conn.get(key).await?;
        match actual {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(ComponentError::AssertionFailed(format!(
                "unexpected value for key {key:?}: got {actual:?}, want {expected:?}"
            ))),
            None => Err(ComponentError::AssertionFailed(format!(
                "key {key:?} is not set, want {expected:?}"
            ))),
        }
    }

    pub async fn contains_no_value_for(&mut self, key: &str) -> ComponentResult<()> {
        let actual: Option<String> = self.conn.get(key).await?;
        match actual {
            None => Ok(()),
            Some(value) => Err(ComponentError::AssertionFailed(format!(
                "expected no value for key {key:?}, but found {value:?}"
            ))),
        }
    }

    pub async fn is_healthy(&mut self) -> ComponentResult<()> {
        redis::cmd("PING").query_async::<String>(&mut self.conn).await?;
        Ok(())
    }

    /// Kill the server mid-scenario to exercise failure paths
    pub fn stops_running(&mut self) -> ComponentResult<()> {
        self.server.stop()
    }

    /// Drop every key
    pub async fn reset(&mut self) -> ComponentResult<()> {
        debug!("FLUSHALL on redis port {}", self.port);
        redis::cmd("FLUSHALL").query_async::<()>(&mut self.conn).await?;
        Ok(())
    }

    pub fn close(&mut self) -> ComponentResult<()> {
        self.server.stop()
    }
}

impl std::fmt::Debug for RedisFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisFeature")
            .field("port", &self.port)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

async fn ping_once(client: &redis::Client) -> bool {
    match client.get_multiplexed_async_connection().await {
        Ok(mut conn) => redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok(),
        Err(_) => false,
    }
}
