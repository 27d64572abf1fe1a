//! Memcached text protocol client connection.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

/// Failure talking to one server.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket failure; the connection must be discarded.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The server did not answer in time; the connection must be discarded.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The server rejected the command (`ERROR`, `CLIENT_ERROR`, `SERVER_ERROR`).
    #[error("server error: {0}")]
    Server(String),
    /// The reply did not follow the protocol.
    #[error("unexpected reply: {0}")]
    Unexpected(String),
}

impl ProtocolError {
    /// Whether the connection that produced this error can be reused.
    pub fn keeps_connection(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    /// Whether the server refused to do arithmetic on a non-numeric value.
    pub fn is_non_numeric(&self) -> bool {
        matches!(self, Self::Server(msg) if msg.contains("non-numeric"))
    }
}

/// Storage verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerb {
    /// Store unconditionally.
    Set,
    /// Store only if the key is absent.
    Add,
}

/// Arithmetic verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithVerb {
    /// `incr`
    Incr,
    /// `decr` (clamps at zero server-side)
    Decr,
}

/// A request sent to one server.
#[derive(Debug, Clone, Copy)]
pub enum Command<'a> {
    /// `get <key>`
    Get(&'a str),
    /// `set|add <key> <flags> <exptime> <bytes>`
    Store {
        /// Verb.
        verb: StoreVerb,
        /// Wire key.
        key: &'a str,
        /// Opaque flags stored with the item.
        flags: u32,
        /// Relative seconds, absolute unix time, or 0 for no expiry.
        exptime: u64,
        /// Item data.
        data: &'a [u8],
    },
    /// `delete <key>`
    Delete(&'a str),
    /// `incr|decr <key> <amount>`
    Arith(ArithVerb, &'a str, u64),
    /// `version`
    Version,
}

/// A parsed server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Item flags and data, or a miss.
    Value(Option<(u32, Vec<u8>)>),
    /// `STORED` (`true`) or `NOT_STORED` (`false`).
    Stored(bool),
    /// `DELETED` (`true`) or `NOT_FOUND` (`false`).
    Deleted(bool),
    /// New counter value, or `None` for `NOT_FOUND`.
    Counter(Option<u64>),
    /// Server version string.
    Version(String),
}

/// One buffered TCP connection to a server.
#[derive(Debug)]
pub struct Connection {
    stream: BufStream<TcpStream>,
}

impl Connection {
    /// Open a connection to `address` (`host:port`).
    pub async fn connect(address: &str) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: BufStream::new(stream),
        })
    }

    /// Send `command` and read its reply.
    pub async fn execute(&mut self, command: &Command<'_>) -> Result<Reply, ProtocolError> {
        match *command {
            Command::Get(key) => {
                self.send(format!("get {key}\r\n").as_bytes(), None).await?;
                self.read_value(key).await
            }
            Command::Store {
                verb,
                key,
                flags,
                exptime,
                data,
            } => {
                let name = match verb {
                    StoreVerb::Set => "set",
                    StoreVerb::Add => "add",
                };
                let header = format!("{name} {key} {flags} {exptime} {}\r\n", data.len());
                self.send(header.as_bytes(), Some(data)).await?;
                match self.read_line().await?.as_str() {
                    "STORED" => Ok(Reply::Stored(true)),
                    "NOT_STORED" | "EXISTS" | "NOT_FOUND" => Ok(Reply::Stored(false)),
                    other => Err(classify(other)),
                }
            }
            Command::Delete(key) => {
                self.send(format!("delete {key}\r\n").as_bytes(), None).await?;
                match self.read_line().await?.as_str() {
                    "DELETED" => Ok(Reply::Deleted(true)),
                    "NOT_FOUND" => Ok(Reply::Deleted(false)),
                    other => Err(classify(other)),
                }
            }
            Command::Arith(verb, key, amount) => {
                let name = match verb {
                    ArithVerb::Incr => "incr",
                    ArithVerb::Decr => "decr",
                };
                self.send(format!("{name} {key} {amount}\r\n").as_bytes(), None).await?;
                let line = self.read_line().await?;
                if line == "NOT_FOUND" {
                    return Ok(Reply::Counter(None));
                }
                match line.parse::<u64>() {
                    Ok(value) => Ok(Reply::Counter(Some(value))),
                    Err(_) => Err(classify(&line)),
                }
            }
            Command::Version => {
                self.send(b"version\r\n", None).await?;
                let line = self.read_line().await?;
                match line.strip_prefix("VERSION ") {
                    Some(version) => Ok(Reply::Version(version.to_string())),
                    None => Err(classify(&line)),
                }
            }
        }
    }

    async fn send(&mut self, header: &[u8], data: Option<&[u8]>) -> Result<(), ProtocolError> {
        self.stream.write_all(header).await?;
        if let Some(data) = data {
            self.stream.write_all(data).await?;
            self.stream.write_all(b"\r\n").await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Read one `\r\n`-terminated line without the terminator.
    async fn read_line(&mut self) -> Result<String, ProtocolError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        String::from_utf8(buf).map_err(|e| ProtocolError::Unexpected(format!("non UTF-8 reply line: {e}")))
    }

    /// Read a `get` reply: zero or one `VALUE` block followed by `END`.
    async fn read_value(&mut self, key: &str) -> Result<Reply, ProtocolError> {
        let line = self.read_line().await?;
        if line == "END" {
            return Ok(Reply::Value(None));
        }

        let mut parts = line.split(' ');
        let (Some("VALUE"), Some(reply_key), Some(flags), Some(len)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(classify(&line));
        };
        if reply_key != key {
            return Err(ProtocolError::Unexpected(format!("value for '{reply_key}', asked for '{key}'")));
        }
        let flags: u32 = flags
            .parse()
            .map_err(|_| ProtocolError::Unexpected(format!("bad flags in '{line}'")))?;
        let len: usize = len
            .parse()
            .map_err(|_| ProtocolError::Unexpected(format!("bad length in '{line}'")))?;

        let mut data = vec![0u8; len + 2];
        self.stream.read_exact(&mut data).await?;
        if !data.ends_with(b"\r\n") {
            return Err(ProtocolError::Unexpected("data block not terminated".to_string()));
        }
        data.truncate(len);

        match self.read_line().await?.as_str() {
            "END" => Ok(Reply::Value(Some((flags, data)))),
            other => Err(ProtocolError::Unexpected(format!("expected END, got '{other}'"))),
        }
    }
}

fn classify(line: &str) -> ProtocolError {
    if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") {
        ProtocolError::Server(line.to_string())
    } else {
        ProtocolError::Unexpected(line.to_string())
    }
}
