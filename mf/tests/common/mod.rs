//! Local HTTP server for integration tests
//!
//! Runs on its own thread and runtime so both async and blocking tests can
//! use it. Routes:
//! - `/delay/{ms}` sleeps before answering (tracked for peak concurrency)
//! - `/echo` answers with the request body
//! - `/dup` sends the `x-dup` header twice
//! - anything else answers with the path

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct TestServer {
    pub addr: SocketAddr,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    served: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn start() -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
        listener.set_nonblocking(true).expect("Failed to set nonblocking");
        let addr = listener.local_addr().expect("Failed to read local addr");

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let served = Arc::new(AtomicUsize::new(0));
        let counters = (active.clone(), peak.clone(), served.clone());

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("Failed to build server runtime");
            runtime.block_on(async move {
                let listener = TcpListener::from_std(listener).expect("Failed to adopt listener");
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        continue;
                    };
                    let (active, peak, served) = counters.clone();
                    tokio::spawn(async move {
                        let _ = handle(stream, &active, &peak).await;
                        served.fetch_add(1, Ordering::SeqCst);
                    });
                }
            });
        });

        Self {
            addr,
            active,
            peak,
            served,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Most requests the server handled at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

/// An address nothing listens on
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read local addr");
    drop(listener);
    format!("http://{}/", addr)
}

async fn handle(mut stream: TcpStream, active: &AtomicUsize, peak: &AtomicUsize) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or("/").to_string();
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let mut extra = String::new();
    let payload = if let Some(ms) = path.strip_prefix("/delay/") {
        let ms: u64 = ms.parse().unwrap_or(0);
        // Counted only while sleeping, so the count drops before the reply is sent
        let current = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        active.fetch_sub(1, Ordering::SeqCst);
        format!("slept {}", ms).into_bytes()
    } else if path == "/echo" {
        extra.push_str(&format!("X-Method: {}\r\n", method));
        body
    } else if path == "/dup" {
        extra.push_str("X-Dup: 1\r\nX-Dup: 2\r\n");
        b"dup".to_vec()
    } else {
        path.clone().into_bytes()
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n",
        payload.len(),
        extra
    );
    stream.write_all(response.as_bytes()).await?;
    stream.write_all(&payload).await?;
    stream.shutdown().await?;
    Ok(())
}
