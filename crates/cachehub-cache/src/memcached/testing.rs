//! In-process Memcached stand-in for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct State {
    items: HashMap<String, (u32, Vec<u8>)>,
    last_exptime: Option<u64>,
    closed: bool,
}

/// Speaks the subset of the text protocol the engine uses. Expiry is
/// recorded but not enforced.
#[derive(Debug)]
pub struct FakeMemcached {
    address: String,
    state: Arc<Mutex<State>>,
    task: JoinHandle<()>,
}

impl FakeMemcached {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let state = Arc::new(Mutex::new(State::default()));

        let shared = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, shared.clone()));
            }
        });

        Self { address, state, task }
    }

    pub fn address(&self) -> String {
        self.address.clone()
    }

    pub fn last_exptime(&self) -> Option<u64> {
        self.state.lock().unwrap().last_exptime
    }

    /// Stop listening; open connections are closed on their next command.
    pub fn shutdown(&self) {
        self.task.abort();
        self.state.lock().unwrap().closed = true;
    }
}

impl Drop for FakeMemcached {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve(socket: TcpStream, state: Arc<Mutex<State>>) {
    let mut stream = BufStream::new(socket);
    loop {
        let mut line = String::new();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let parts: Vec<String> = line.split_whitespace().map(str::to_string).collect();

        let mut data = None;
        if let [verb, _, _, _, len] = parts.as_slice() {
            if verb == "set" || verb == "add" {
                let len: usize = len.parse().unwrap_or(0);
                let mut block = vec![0u8; len + 2];
                if stream.read_exact(&mut block).await.is_err() {
                    return;
                }
                block.truncate(len);
                data = Some(block);
            }
        }

        let Some(reply) = respond(&state, &parts, data) else {
            return;
        };
        if stream.write_all(&reply).await.is_err() || stream.flush().await.is_err() {
            return;
        }
    }
}

/// Apply one command; `None` means the server is gone.
fn respond(state: &Mutex<State>, parts: &[String], data: Option<Vec<u8>>) -> Option<Vec<u8>> {
    let mut state = state.lock().unwrap();
    if state.closed {
        return None;
    }
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();

    let reply = match parts.as_slice() {
        ["version"] => b"VERSION 1.6.0-fake\r\n".to_vec(),
        ["get", key] => match state.items.get(*key) {
            Some((flags, value)) => {
                let mut reply = format!("VALUE {key} {flags} {}\r\n", value.len()).into_bytes();
                reply.extend_from_slice(value);
                reply.extend_from_slice(b"\r\nEND\r\n");
                reply
            }
            None => b"END\r\n".to_vec(),
        },
        [verb @ ("set" | "add"), key, flags, exptime, _] => {
            state.last_exptime = exptime.parse().ok();
            if *verb == "add" && state.items.contains_key(*key) {
                b"NOT_STORED\r\n".to_vec()
            } else {
                let flags = flags.parse().unwrap_or(0);
                state
                    .items
                    .insert(key.to_string(), (flags, data.unwrap_or_default()));
                b"STORED\r\n".to_vec()
            }
        }
        ["delete", key] => match state.items.remove(*key) {
            Some(_) => b"DELETED\r\n".to_vec(),
            None => b"NOT_FOUND\r\n".to_vec(),
        },
        [verb @ ("incr" | "decr"), key, amount] => {
            let amount: u64 = amount.parse().unwrap_or(0);
            match state.items.get_mut(*key) {
                None => b"NOT_FOUND\r\n".to_vec(),
                Some((_, value)) => {
                    let current = std::str::from_utf8(value)
                        .ok()
                        .and_then(|s| s.parse::<u64>().ok());
                    match current {
                        None => b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n".to_vec(),
                        Some(current) => {
                            let next = if *verb == "incr" {
                                current.wrapping_add(amount)
                            } else {
                                current.saturating_sub(amount)
                            };
                            *value = next.to_string().into_bytes();
                            format!("{next}\r\n").into_bytes()
                        }
                    }
                }
            }
        }
        _ => b"ERROR\r\n".to_vec(),
    };
    Some(reply)
}
