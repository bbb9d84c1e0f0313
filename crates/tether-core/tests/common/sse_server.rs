//! Minimal HTTP/1.1 server for integration tests of stream connections.
//!
//! Answers each connection with the next scripted reply (status and
//! Content-Type), then repeats a fallback reply. Successful event-stream
//! replies carry one event before the server closes the socket. Request
//! headers of every connection are recorded.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Reply {
    pub status: u16,
    pub content_type: Option<&'static str>,
}

impl Reply {
    pub const fn event_stream() -> Self {
        Self {
            status: 200,
            content_type: Some("text/event-stream; charset=utf-8"),
        }
    }

    pub const fn status(status: u16) -> Self {
        Self {
            status,
            content_type: Some("text/plain"),
        }
    }

    pub const fn with_type(status: u16, content_type: &'static str) -> Self {
        Self {
            status,
            content_type: Some(content_type),
        }
    }
}

type Headers = Vec<(String, String)>;

struct Shared {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    requests: Mutex<Vec<Headers>>,
}

pub struct SseServer {
    pub url: String,
    shared: Arc<Shared>,
}

impl SseServer {
    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.shared.requests.lock().unwrap().len()
    }

    /// Value of header `name` (case-insensitive) on the `index`-th request.
    pub fn header(&self, index: usize, name: &str) -> Option<String> {
        let requests = self.shared.requests.lock().unwrap();
        requests
            .get(index)?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

/// Serve `fallback` for every request.
pub fn start(fallback: Reply) -> SseServer {
    start_scripted(Vec::new(), fallback)
}

/// Serve `script` in order, then `fallback`. The server runs until the process exits.
pub fn start_scripted(script: Vec<Reply>, fallback: Reply) -> SseServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let shared = Arc::new(Shared {
        script: Mutex::new(script.into()),
        fallback,
        requests: Mutex::new(Vec::new()),
    });
    let server_side = Arc::clone(&shared);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let shared = Arc::clone(&server_side);
            thread::spawn(move || handle(stream, &shared));
        }
    });
    SseServer {
        url: format!("http://127.0.0.1:{}/events", port),
        shared,
    }
}

/// A URL on which nothing listens (connection refused).
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/events", port)
}

/// A server that accepts connections and never answers.
pub fn start_silent() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    format!("http://127.0.0.1:{}/events", port)
}

fn handle(mut stream: TcpStream, shared: &Shared) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(request) = read_head(&mut stream) else {
        return;
    };
    shared.requests.lock().unwrap().push(parse_headers(&request));

    let reply = shared
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(shared.fallback);
    let content_type = reply
        .content_type
        .map(|ct| format!("Content-Type: {}\r\n", ct))
        .unwrap_or_default();
    let body: &[u8] = if reply.status == 200 {
        b"id: 1\ndata: hello\n\n"
    } else {
        b""
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\n{}Cache-Control: no-cache\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reason(reply.status),
        content_type,
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body);
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while !data.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
        if data.len() > 64 * 1024 {
            return None;
        }
    }
    String::from_utf8(data).ok()
}

fn parse_headers(request: &str) -> Headers {
    request
        .lines()
        .skip(1)
        .take_while(|line| !line.trim().is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
