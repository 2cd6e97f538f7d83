#![allow(dead_code)]
use capfeed_core::{FeedBackend, FeedOrder, FetchError, ImageRef, PageResponse};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

pub fn refs(v: &[&str]) -> Vec<ImageRef> {
    v.iter().map(|s| s.to_string()).collect()
}

/// In-memory backend that slices fixed listings into pages.
pub struct MockBackend {
    paging: bool,
    arrival: Vec<ImageRef>,
    capture: Vec<ImageRef>,
    fail_once: Mutex<HashSet<u32>>,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn paged(arrival: &[&str], capture: &[&str]) -> Self {
        Self {
            paging: true,
            arrival: refs(arrival),
            capture: refs(capture),
            fail_once: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Backend without `/images`; only the full listing exists.
    pub fn unpaged(all: &[&str]) -> Self {
        Self {
            paging: false,
            ..Self::paged(all, all)
        }
    }

    pub fn fail_page_once(self, page: u32) -> Self {
        self.fail_once.lock().unwrap().insert(page);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl FeedBackend for MockBackend {
    fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        order: FeedOrder,
    ) -> Result<PageResponse, FetchError> {
        self.calls.lock().unwrap().push(format!("page:{page}:{order}"));
        if !self.paging {
            return Err(FetchError::NotFound);
        }
        if self.fail_once.lock().unwrap().remove(&page) {
            return Err(FetchError::Status(503));
        }
        let src = match order {
            FeedOrder::Arrival => &self.arrival,
            FeedOrder::Capture => &self.capture,
        };
        let start = ((page - 1) * per_page) as usize;
        let end = (start + per_page as usize).min(src.len());
        let images = if start < src.len() {
            src[start..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(PageResponse {
            images,
            page,
            per_page,
            total: Some(src.len() as u64),
            has_more: end < src.len(),
        })
    }

    fn fetch_all(&self) -> Result<Vec<ImageRef>, FetchError> {
        self.calls.lock().unwrap().push("all".into());
        Ok(self.arrival.clone())
    }

    fn fetch_latest(&self) -> Result<Option<ImageRef>, FetchError> {
        Ok(self.arrival.first().cloned())
    }

    fn fetch_image(&self, _image: &str) -> Result<Vec<u8>, FetchError> {
        Ok(Vec::new())
    }
}

/// Minimal HTTP/1.1 responder: exact path match, query ignored, one
/// connection at a time.
pub struct StubServer {
    pub base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub fn start(routes: Vec<(&str, u16, String)>) -> Self {
        let routes: Vec<(String, u16, String)> = routes
            .into_iter()
            .map(|(p, s, b)| (p.to_string(), s, b))
            .collect();
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let addr = listener.local_addr().expect("stub addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let _ = respond(stream, &routes, &log);
            }
        });
        Self {
            base: format!("http://{addr}"),
            requests,
        }
    }

    /// Request targets (path and query) in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn respond(
    mut stream: TcpStream,
    routes: &[(String, u16, String)],
    log: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 || line == "\r\n" {
            break;
        }
    }
    let target = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    log.lock().unwrap().push(target.clone());
    let path = target.split('?').next().unwrap_or("/");
    let (status, body) = routes
        .iter()
        .find(|(p, _, _)| p == path)
        .map(|(_, s, b)| (*s, b.clone()))
        .unwrap_or((404, r#"{"detail":"Not Found"}"#.to_string()));
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Error",
    };
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )?;
    stream.flush()
}
