//! Loopback HTTP server for tests.
//!
//! Serves canned replies per path over a real TCP socket so the whole
//! client stack (retry, streaming, HEAD handling) is exercised. Each path
//! owns a list of replies; the n-th request gets the n-th reply and the last
//! reply repeats. Unknown paths answer 404.

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One canned response.
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
}

impl Reply {
    /// `200 OK` with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// Empty response with `status`.
    #[must_use]
    pub const fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Adds a response header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Default)]
struct State {
    routes: Mutex<HashMap<String, Vec<Reply>>>,
    hits: Mutex<HashMap<String, usize>>,
}

/// A running loopback server. Stops when dropped.
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<State>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Binds to an ephemeral port with no routes.
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");
        let state = Arc::new(State::default());

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(handle(socket, Arc::clone(&accept_state)));
            }
        });

        Self { addr, state, task }
    }

    /// Binds and registers `routes`.
    pub async fn start(routes: Vec<(String, Vec<Reply>)>) -> Self {
        let server = Self::bind().await;
        for (path, replies) in routes {
            server.route(&path, replies);
        }
        server
    }

    /// Registers (or replaces) the replies for `path`.
    pub fn route(&self, path: &str, replies: Vec<Reply>) {
        self.state
            .routes
            .lock()
            .expect("routes lock")
            .insert(path.to_string(), replies);
    }

    /// Absolute URL of `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Number of requests received for `path`.
    #[must_use]
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .expect("hits lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(mut socket: TcpStream, state: Arc<State>) {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let hit = {
        let mut hits = state.hits.lock().expect("hits lock");
        let count = hits.entry(path.clone()).or_insert(0);
        *count += 1;
        *count
    };

    let reply = state
        .routes
        .lock()
        .expect("routes lock")
        .get(&path)
        .and_then(|replies| replies.get((hit - 1).min(replies.len().saturating_sub(1))).cloned())
        .unwrap_or_else(|| Reply::status(404));

    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reason(reply.status),
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");

    let mut bytes = response.into_bytes();
    if method != "HEAD" {
        bytes.extend_from_slice(&reply.body);
    }

    let _ = socket.write_all(&bytes).await;
    let _ = socket.shutdown().await;
}

const fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
