use anyhow::{anyhow, Result};
use rand::RngCore;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::host::{lock, SharedScheduler};

const MAX_REQUEST_BYTES: u64 = 8192;
const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub token_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8791".to_string(),
            token_path: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    pub token: String,
    pub token_path: Option<PathBuf>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct CameraListing {
    unique_id: String,
    name: String,
    available: bool,
    refresh_interval: u64,
}

pub struct ApiServer {
    cfg: ApiConfig,
    scheduler: SharedScheduler,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, scheduler: SharedScheduler) -> Self {
        Self { cfg, scheduler }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let token = generate_token();
        if let Some(path) = &self.cfg.token_path {
            write_token_file(path, &token)?;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let scheduler = self.scheduler;
        let thread_token = token.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, scheduler, &thread_token, shutdown_thread) {
                log::error!("snapshot api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            token,
            token_path: self.cfg.token_path,
            shutdown,
            join: Some(join),
        })
    }
}

fn generate_token() -> String {
    let mut token = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut token);
    hex::encode(token)
}

fn run_api(
    listener: TcpListener,
    scheduler: SharedScheduler,
    token: &str,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &scheduler, token) {
                    log::warn!("snapshot api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, scheduler: &SharedScheduler, token: &str) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        return respond_json(&mut stream, 403, r#"{"error":"forbidden"}"#);
    }

    let request = RequestHead::read(&stream)?;
    if request.method != "GET" {
        return respond_json(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }
    if request.path == "/health" {
        return respond_json(&mut stream, 200, r#"{"status":"ok"}"#);
    }
    let Some(route) = Route::parse(&request.path) else {
        return respond_json(&mut stream, 404, r#"{"error":"not_found"}"#);
    };
    if request.has_query_token() {
        return respond_json(&mut stream, 400, r#"{"error":"token_query_param_not_allowed"}"#);
    }
    match request.bearer_token() {
        None => return respond_json(&mut stream, 401, r#"{"error":"missing_token"}"#),
        Some(presented) if presented != token => {
            respond_json(&mut stream, 401, r#"{"error":"invalid_token"}"#)?;
            return Err(anyhow!("capability token invalid"));
        }
        Some(_) => {}
    }

    // The scheduler lock is only held for lookups; file reads and socket
    // writes happen without it so a slow client cannot stall polling.
    match route {
        Route::List => {
            let listing: Vec<CameraListing> = lock(scheduler)?
                .status()
                .into_iter()
                .map(|status| CameraListing {
                    unique_id: status.handle.to_string(),
                    name: status.name,
                    available: status.available,
                    refresh_interval: status.interval.as_secs(),
                })
                .collect();
            respond(&mut stream, 200, "application/json", &serde_json::to_vec(&listing)?)
        }
        Route::Image(identifier) => {
            let found = {
                let polls = lock(scheduler)?;
                polls
                    .find(identifier)
                    .and_then(|handle| polls.reader(&handle).map(|source| (handle, source)))
            };
            let Some((handle, mut source)) = found else {
                return respond_json(&mut stream, 404, r#"{"error":"unknown_camera"}"#);
            };
            let image = source.current_bytes();
            lock(scheduler)?.record_read(&handle, image.is_some());
            match image {
                Some(bytes) => respond(&mut stream, 200, source.content_type(), &bytes),
                None => respond_json(&mut stream, 503, r#"{"error":"unavailable"}"#),
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    List,
    Image(&'a str),
}

impl<'a> Route<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        if path == "/cameras" {
            return Some(Route::List);
        }
        let identifier = path.strip_prefix("/cameras/")?.strip_suffix("/image")?;
        if identifier.is_empty() || identifier.contains('/') {
            return None;
        }
        Some(Route::Image(identifier))
    }
}

/// Request line plus the one header the api cares about.
#[derive(Debug, Default)]
struct RequestHead {
    method: String,
    path: String,
    query: Option<String>,
    authorization: Option<String>,
}

impl RequestHead {
    fn read(stream: &TcpStream) -> Result<Self> {
        Self::parse(BufReader::new(stream.take(MAX_REQUEST_BYTES)))
    }

    fn parse<R: BufRead>(mut reader: R) -> Result<Self> {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let mut parts = line.split_whitespace();
        let method = parts.next().ok_or_else(|| anyhow!("empty request"))?;
        let target = parts.next().ok_or_else(|| anyhow!("missing path"))?;
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        let mut head = Self {
            method: method.to_string(),
            path: path.to_string(),
            query,
            authorization: None,
        };

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let header = line.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.trim().eq_ignore_ascii_case("authorization") {
                    head.authorization = Some(value.trim().to_string());
                }
            }
        }
        Ok(head)
    }

    fn bearer_token(&self) -> Option<&str> {
        let (scheme, token) = self.authorization.as_deref()?.split_once(' ')?;
        scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
    }

    fn has_query_token(&self) -> bool {
        self.query.as_deref().is_some_and(|query| {
            query
                .split('&')
                .any(|pair| pair.split('=').next() == Some("token"))
        })
    }
}

fn respond_json(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    respond(stream, status, "application/json", body.as_bytes())
}

fn respond(stream: &mut TcpStream, status: u16, content_type: &str, body: &[u8]) -> Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    };
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(body)?;
    Ok(())
}

fn write_token_file(path: &Path, token: &str) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // `mode` only applies on creation; narrow a pre-existing file too.
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    writeln!(file, "{token}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_parse() {
        assert_eq!(Route::parse("/cameras"), Some(Route::List));
        assert_eq!(
            Route::parse("/cameras/0123456789abcdef/image"),
            Some(Route::Image("0123456789abcdef"))
        );
        assert_eq!(Route::parse("/cameras//image"), None);
        assert_eq!(Route::parse("/cameras/a/b/image"), None);
        assert_eq!(Route::parse("/events"), None);
    }

    #[test]
    fn request_head_keeps_path_query_and_bearer() {
        let raw = b"GET /cameras?x=1&token HTTP/1.1\r\nHost: localhost\r\nauthorization:  Bearer  abc123 \r\n\r\nignored";
        let head = RequestHead::parse(&raw[..]).expect("parse");
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/cameras");
        assert_eq!(head.query.as_deref(), Some("x=1&token"));
        assert_eq!(head.bearer_token(), Some("abc123"));
        assert!(head.has_query_token());
    }

    #[test]
    fn request_head_without_credentials() {
        let head = RequestHead::parse(&b"GET /health HTTP/1.1\r\n\r\n"[..]).expect("parse");
        assert_eq!(head.bearer_token(), None);
        assert!(!head.has_query_token());

        let basic = RequestHead::parse(&b"GET / HTTP/1.1\r\nAuthorization: Basic Zm9v\r\n\r\n"[..])
            .expect("parse");
        assert_eq!(basic.bearer_token(), None);

        let tokenish = RequestHead::parse(&b"GET /cameras?tokens=1 HTTP/1.1\r\n\r\n"[..])
            .expect("parse");
        assert!(!tokenish.has_query_token());
        assert!(RequestHead::parse(&b""[..]).is_err());
    }

    #[test]
    fn tokens_are_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
