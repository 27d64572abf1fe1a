//! Redis connection management.

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, FromRedisValue, RedisError};
use tracing::info;

use cachehub_core::config::engine::RedisEngineConfig;
use cachehub_core::error::{CacheError, ErrorKind};
use cachehub_core::result::CacheResult;

use crate::servers::{REDIS_PORT, ServerSpec};

/// Characters escaped in the password part of a connection URL.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// How commands reach the server.
#[derive(Clone)]
enum Link {
    /// One managed, reconnecting connection for the client's lifetime.
    Managed(ConnectionManager),
    /// A fresh multiplexed connection per command.
    PerCommand,
}

/// Redis client wrapper with connection management.
#[derive(Clone)]
pub struct RedisClient {
    /// Redis client handle.
    client: Client,
    /// Connection mode.
    link: Link,
    /// Connect and command timeout.
    timeout: Duration,
    /// Masked URL for logs.
    display_url: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("url", &self.display_url)
            .field("persistent", &matches!(self.link, Link::Managed(_)))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisClient {
    /// Create a client from configuration and verify the server answers `PING`.
    pub async fn connect(name: &str, config: &RedisEngineConfig) -> CacheResult<Self> {
        let url = redis_url(config)?;
        let display_url = mask_redis_url(&url);
        let timeout = Duration::from_millis(config.timeout_ms.max(1));
        info!(storage = name, url = %display_url, "Connecting to Redis");

        let client = Client::open(url.as_str()).map_err(|e| {
            CacheError::with_source(ErrorKind::Configuration, "Failed to create Redis client", e)
        })?;

        let link = if config.persistent {
            let manager = tokio::time::timeout(timeout, ConnectionManager::new(client.clone()))
                .await
                .map_err(|_| unavailable(&display_url, "connection timed out"))?
                .map_err(|e| {
                    CacheError::with_source(
                        ErrorKind::EngineUnavailable,
                        format!("Failed to connect to Redis at {display_url}"),
                        e,
                    )
                })?;
            Link::Managed(manager)
        } else {
            Link::PerCommand
        };

        let this = Self {
            client,
            link,
            timeout,
            display_url,
        };
        let pong: String = this.query(&redis::cmd("PING")).await.map_err(|e| {
            CacheError::with_source(
                ErrorKind::EngineUnavailable,
                format!("Redis at {} did not answer PING", this.display_url),
                e,
            )
        })?;
        if pong != "PONG" {
            return Err(unavailable(&this.display_url, &format!("unexpected PING reply '{pong}'")));
        }

        info!(storage = name, "Successfully connected to Redis");
        Ok(this)
    }

    /// Run one command with the configured timeout.
    pub async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, RedisError> {
        let fut = async {
            match &self.link {
                Link::Managed(manager) => {
                    let mut conn = manager.clone();
                    cmd.query_async(&mut conn).await
                }
                Link::PerCommand => {
                    let mut conn = self.client.get_multiplexed_async_connection().await?;
                    cmd.query_async(&mut conn).await
                }
            }
        };
        tokio::time::timeout(self.timeout, fut).await.unwrap_or_else(|_| {
            Err(RedisError::from(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Redis command timed out",
            )))
        })
    }

    /// Masked server URL.
    pub fn display_url(&self) -> &str {
        &self.display_url
    }
}

fn unavailable(url: &str, why: &str) -> CacheError {
    CacheError::engine_unavailable(format!("Redis at {url} unavailable: {why}"))
}

/// Build a `redis://` URL from the first configured server.
fn redis_url(config: &RedisEngineConfig) -> CacheResult<String> {
    let first = match config.servers.as_slice() {
        [] => return Err(CacheError::engine_unavailable("Redis storage has no server configured")),
        [only] => only,
        many => {
            return Err(CacheError::configuration(format!(
                "Redis storage takes a single server, got {}",
                many.len()
            )));
        }
    };
    let server = ServerSpec::parse(first, REDIS_PORT)?;
    let auth = match &config.password {
        Some(password) if !password.is_empty() => format!(":{}@", encode_userinfo(password)),
        _ => String::new(),
    };
    Ok(format!("redis://{auth}{}/{}", server.address(), config.database))
}

/// Percent-encode everything outside the URL unreserved set.
fn encode_userinfo(raw: &str) -> String {
    utf8_percent_encode(raw, USERINFO).to_string()
}

/// Mask password in Redis URL for safe logging.
fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos >= scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_from_config() {
        let config = RedisEngineConfig {
            servers: vec!["cache.local:6380".to_string()],
            database: 2,
            password: Some("p@ss:w".to_string()),
            ..Default::default()
        };
        let url = redis_url(&config).unwrap();
        assert_eq!(url, "redis://:p%40ss%3Aw@cache.local:6380/2");
        assert_eq!(mask_redis_url(&url), "redis://:****@cache.local:6380/2");
    }

    #[test]
    fn test_url_defaults_port() {
        let config = RedisEngineConfig {
            servers: vec!["localhost".to_string()],
            ..Default::default()
        };
        assert_eq!(redis_url(&config).unwrap(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_password_encoding() {
        assert_eq!(encode_userinfo("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(encode_userinfo("pa ss/é"), "pa%20ss%2F%C3%A9");
    }

    #[test]
    fn test_rejects_several_servers() {
        let config = RedisEngineConfig {
            servers: vec!["a:6379".to_string(), "b:6379".to_string()],
            ..Default::default()
        };
        let err = redis_url(&config).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_no_servers() {
        let err = redis_url(&RedisEngineConfig::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EngineUnavailable);
    }
}
