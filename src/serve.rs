//! Development HTTP server with live reload.
//!
//! Serves the scratch, source and public directories as a layered document
//! root (first match wins, in that order) plus a fixed route for vendored
//! dependency assets. Served HTML documents get a small polling script
//! injected that reloads the page whenever the reload generation changes;
//! the watch loop bumps the generation after handling a change batch.
//!
//! The server runs until the process is terminated; there is no graceful
//! shutdown beyond that.

use crate::config::BuildConfig;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tiny_http::{Header, Request, Response, Server};

/// Number of threads answering requests. Long-polling reload clients hold
/// a thread each, so one is not enough.
const WORKERS: usize = 8;

/// Long-poll timeout before answering with an unchanged generation.
const POLL_TIMEOUT: Duration = Duration::from_secs(25);

/// Route answering reload long-polls.
pub const RELOAD_ROUTE: &str = "/__pages/events";

/// Error starting or running the dev server.
#[derive(Debug)]
pub enum ServeError {
    /// Failed to bind the HTTP server
    Bind(String),
    /// Failed to initialize the file watcher
    WatcherInit(notify::Error),
    /// Failed to add a watch path
    WatchPath(notify::Error),
    /// Watch channel closed
    Channel(String),
}

impl std::fmt::Display for ServeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServeError::Bind(e) => write!(f, "Failed to bind dev server: {}", e),
            ServeError::WatcherInit(e) => write!(f, "Failed to initialize file watcher: {}", e),
            ServeError::WatchPath(e) => write!(f, "Failed to watch path: {}", e),
            ServeError::Channel(e) => write!(f, "Watch channel error: {}", e),
        }
    }
}

impl std::error::Error for ServeError {}

/// Monotonic reload generation shared between the watch loop and the
/// long-poll handlers.
#[derive(Debug, Default)]
pub struct ReloadState {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl ReloadState {
    /// Create state at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation.
    pub fn current(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Bump the generation and wake all waiting pollers.
    pub fn notify(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        self.changed.notify_all();
    }

    /// Block until the generation exceeds `since` or the timeout elapses;
    /// returns the generation at wake-up either way.
    pub fn wait_newer(&self, since: u64, timeout: Duration) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        let deadline = std::time::Instant::now() + timeout;
        while *generation <= since {
            let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => break,
            };
            let (guard, _) = self
                .changed
                .wait_timeout(generation, remaining)
                .unwrap_or_else(|e| e.into_inner());
            generation = guard;
        }
        *generation
    }
}

/// Script injected into served HTML documents.
const RELOAD_SCRIPT: &str = r#"<script>
(function poll(g) {
  fetch('/__pages/events?since=' + g)
    .then(function (r) { return r.json(); })
    .then(function (b) {
      if (g >= 0 && b.generation > g) { location.reload(); }
      poll(b.generation);
    })
    .catch(function () { setTimeout(function () { poll(g); }, 1000); });
})(-1);
</script>"#;

/// The dev server: layered static roots plus the reload endpoint.
pub struct DevServer {
    roots: Vec<PathBuf>,
    vendor_route: String,
    vendor_dir: PathBuf,
    state: Arc<ReloadState>,
}

impl DevServer {
    /// Create a server for a project.
    pub fn new(config: &BuildConfig, root: &Path, state: Arc<ReloadState>) -> Self {
        Self {
            roots: vec![
                config.temp_dir(root),
                config.src_dir(root),
                config.public_dir(root),
            ],
            vendor_route: config.serve.vendor_route.clone(),
            vendor_dir: root.join(&config.serve.vendor_dir),
            state,
        }
    }

    /// Bind the listener and spawn the worker threads.
    ///
    /// Returns once the workers are running; they live until the process
    /// exits.
    pub fn start(self, port: u16) -> Result<(), ServeError> {
        let server = Server::http(("0.0.0.0", port)).map_err(|e| ServeError::Bind(e.to_string()))?;
        let server = Arc::new(server);
        let shared = Arc::new(self);

        for _ in 0..WORKERS {
            let server = Arc::clone(&server);
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || loop {
                match server.recv() {
                    Ok(request) => shared.handle(request),
                    Err(_) => break,
                }
            });
        }
        Ok(())
    }

    fn handle(&self, request: Request) {
        let url = request.url().to_string();
        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p, q),
            None => (url.as_str(), ""),
        };

        if path == RELOAD_ROUTE {
            let since = query
                .split('&')
                .find_map(|kv| kv.strip_prefix("since="))
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(-1);
            let generation = if since < 0 {
                self.state.current()
            } else {
                self.state.wait_newer(since as u64, POLL_TIMEOUT)
            };
            let body = format!("{{\"generation\":{}}}", generation);
            let response = Response::from_string(body)
                .with_header(content_type_header("application/json"));
            let _ = request.respond(response);
            return;
        }

        match self.lookup(path) {
            Some(file) => {
                let mime = content_type(&file);
                match std::fs::read(&file) {
                    Ok(mut bytes) => {
                        if mime == "text/html" {
                            bytes = inject_reload_script(bytes);
                        }
                        let response =
                            Response::from_data(bytes).with_header(content_type_header(mime));
                        let _ = request.respond(response);
                    }
                    Err(_) => respond_not_found(request),
                }
            }
            None => respond_not_found(request),
        }
    }

    /// Resolve a URL path against the vendor route and the layered roots.
    fn lookup(&self, url_path: &str) -> Option<PathBuf> {
        let relative = sanitize(url_path)?;

        if let Some(rest) = strip_route(url_path, &self.vendor_route) {
            let relative = sanitize(rest)?;
            let candidate = self.vendor_dir.join(relative);
            return candidate.is_file().then_some(candidate);
        }

        for root in &self.roots {
            let mut candidate = root.join(&relative);
            if candidate.is_dir() || url_path.ends_with('/') || url_path == "/" {
                candidate = candidate.join("index.html");
            }
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

/// Strip a route prefix, keeping the remainder path.
fn strip_route<'a>(url_path: &'a str, route: &str) -> Option<&'a str> {
    url_path.strip_prefix(route).filter(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Turn a URL path into a safe relative filesystem path.
///
/// Rejects parent-directory traversal outright.
fn sanitize(url_path: &str) -> Option<PathBuf> {
    let trimmed = url_path.trim_start_matches('/');
    let path = Path::new(trimmed);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path.to_path_buf())
}

/// Insert the reload script before `</body>`, or append when absent.
fn inject_reload_script(bytes: Vec<u8>) -> Vec<u8> {
    let mut html = match String::from_utf8(bytes) {
        Ok(html) => html,
        Err(e) => return e.into_bytes(),
    };
    match html.rfind("</body>") {
        Some(idx) => html.insert_str(idx, RELOAD_SCRIPT),
        None => html.push_str(RELOAD_SCRIPT),
    }
    html.into_bytes()
}

fn respond_not_found(request: Request) {
    let response = Response::from_string("404 Not Found")
        .with_status_code(404)
        .with_header(content_type_header("text/plain"));
    let _ = request.respond(response);
}

fn content_type_header(mime: &str) -> Header {
    Header::from_bytes(&b"Content-Type"[..], mime.as_bytes())
        .unwrap_or_else(|_| unreachable!("static header is valid"))
}

/// Content type by file extension.
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
