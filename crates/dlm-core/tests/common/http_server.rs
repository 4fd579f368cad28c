//! Minimal HTTP/1.1 server for engine tests.
//!
//! Serves one static body for every path. GET honours `Range: bytes=X-` (and
//! `X-Y`) when ranges are enabled, validates `If-Range` against the ETag, can
//! trickle the body slowly so a test can suspend mid-transfer, and can fail
//! the first N requests with a fixed status. Every request is recorded.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    pub etag: Option<String>,
    pub content_disposition: Option<String>,
    /// Body is written in `chunk_size` pieces with this pause between them.
    pub chunk_delay: Option<Duration>,
    pub chunk_size: usize,
    /// Answer the first `fail_first` requests with `fail_status`.
    pub fail_first: usize,
    pub fail_status: u16,
    /// Leave out Content-Length; the body then ends when the connection closes.
    pub omit_content_length: bool,
    /// Keep the connection open this long after the body before closing.
    pub linger: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            etag: Some("\"v1\"".to_string()),
            content_disposition: None,
            chunk_delay: None,
            chunk_size: 4096,
            fail_first: 0,
            fail_status: 503,
            omit_content_length: false,
            linger: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Start offset of a `Range: bytes=X-...` header.
    pub range_start: Option<u64>,
    pub if_range: Option<String>,
    pub user_agent: Option<String>,
    pub headers: Vec<(String, String)>,
}

pub struct TestServer {
    /// Base URL, e.g. `http://127.0.0.1:12345/`.
    pub base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Starts a server in a background thread serving `body`. Runs until the process exits.
pub fn start(body: Vec<u8>) -> TestServer {
    start_with_options(body, ServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            let recorded = Arc::clone(&recorded);
            thread::spawn(move || handle(stream, &body, &opts, &recorded));
        }
    });
    TestServer {
        base: format!("http://127.0.0.1:{}/", port),
        requests,
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: &ServerOptions,
    recorded: &Mutex<Vec<RecordedRequest>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(raw) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let request = parse_request(raw);
    let seen = {
        let mut all = recorded.lock().unwrap();
        all.push(request.clone());
        all.len()
    };

    if seen <= opts.fail_first {
        let response = format!(
            "HTTP/1.1 {} Test Failure\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope",
            opts.fail_status
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !request.method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let total = body.len() as u64;
    let validator_ok = match (&request.if_range, &opts.etag) {
        (None, _) => true,
        (Some(given), Some(etag)) => given == etag,
        (Some(_), None) => false,
    };
    let start = request
        .range_start
        .filter(|_| opts.support_ranges && validator_ok);

    let mut head = String::new();
    let slice = match start {
        Some(start) if start >= total => {
            head.push_str("HTTP/1.1 416 Range Not Satisfiable\r\n");
            head.push_str(&format!("Content-Range: bytes */{}\r\n", total));
            &body[0..0]
        }
        Some(start) => {
            head.push_str("HTTP/1.1 206 Partial Content\r\n");
            head.push_str(&format!(
                "Content-Range: bytes {}-{}/{}\r\n",
                start,
                total - 1,
                total
            ));
            &body[start as usize..]
        }
        None => {
            head.push_str("HTTP/1.1 200 OK\r\n");
            body
        }
    };
    if !opts.omit_content_length {
        head.push_str(&format!("Content-Length: {}\r\n", slice.len()));
    }
    if opts.support_ranges {
        head.push_str("Accept-Ranges: bytes\r\n");
    }
    if let Some(etag) = &opts.etag {
        head.push_str(&format!("ETag: {}\r\n", etag));
    }
    if let Some(cd) = &opts.content_disposition {
        head.push_str(&format!("Content-Disposition: {}\r\n", cd));
    }
    head.push_str("Connection: close\r\n\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }
    for chunk in slice.chunks(opts.chunk_size.max(1)) {
        if stream.write_all(chunk).is_err() {
            return;
        }
        if let Some(delay) = opts.chunk_delay {
            let _ = stream.flush();
            thread::sleep(delay);
        }
    }
    if let Some(linger) = opts.linger.filter(|_| !slice.is_empty()) {
        let _ = stream.flush();
        thread::sleep(linger);
    }
}

fn parse_request(raw: &str) -> RecordedRequest {
    let mut request = RecordedRequest {
        method: String::new(),
        path: String::new(),
        range_start: None,
        if_range: None,
        user_agent: None,
        headers: Vec::new(),
    };
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if request.method.is_empty() {
            let mut parts = line.split_whitespace();
            request.method = parts.next().unwrap_or("").to_string();
            request.path = parts.next().unwrap_or("/").to_string();
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("range") {
            request.range_start = value
                .strip_prefix("bytes=")
                .and_then(|r| r.split('-').next())
                .and_then(|s| s.trim().parse().ok());
        } else if name.eq_ignore_ascii_case("if-range") {
            request.if_range = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("user-agent") {
            request.user_agent = Some(value.to_string());
        }
        request.headers.push((name.to_string(), value.to_string()));
    }
    request
}
