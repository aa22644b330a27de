//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed map of path → (status, body) for GET, ignoring the query
//! string. Unknown paths get 404.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Default)]
pub struct Routes {
    map: HashMap<String, (u16, Vec<u8>)>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, path: &str, body: impl Into<Vec<u8>>) -> Self {
        self.map.insert(path.to_string(), (200, body.into()));
        self
    }

    pub fn status(mut self, path: &str, status: u16) -> Self {
        self.map.insert(path.to_string(), (status, Vec::new()));
        self
    }
}

/// Starts the server in a background thread. Returns the base URL without a
/// trailing slash (e.g. "http://127.0.0.1:12345"). Runs until the process exits.
pub fn start(routes: Routes) -> String {
    start_with(|_| routes)
}

/// Like `start`, but builds the routes from the base URL so bodies can carry
/// absolute links back to the server.
pub fn start_with(build: impl FnOnce(&str) -> Routes) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let base = format!("http://127.0.0.1:{}", port);
    let routes = Arc::new(build(&base));
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            thread::spawn(move || handle(stream, &routes));
        }
    });
    base
}

fn handle(mut stream: std::net::TcpStream, routes: &Routes) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let path = request
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/");
    let path = path.split('?').next().unwrap_or(path);
    let (status, body): (u16, &[u8]) = match routes.map.get(path) {
        Some((status, body)) => (*status, body),
        None => (404, b"not found"),
    };
    let reason = match status {
        200 => "OK",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Error",
    };
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}
