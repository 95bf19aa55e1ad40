use std::borrow::Cow;
use std::fmt::Write as _;
use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use jiff::Zoned;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::ServeConfig;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpStatus};
use crate::logger::RequestLog;
use crate::resolver::{SERVE_PREFIX, ServeRequest, StaticFileResolver};

pub const LOGS_PATH: &str = "/api/logs";
pub const METRICS_PATH: &str = "/api/metrics";

const DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub struct HttpFileServer<L: RequestLog> {
    listener: TcpListener,
    resolver: StaticFileResolver<L>,
    logger: Arc<L>,
    max_body_bytes: usize,
    read_timeout: Option<Duration>,
}

impl<L: RequestLog> HttpFileServer<L> {
    pub fn new(config: &ServeConfig, logger: Arc<L>) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(config.bind_addr())?,
            resolver: StaticFileResolver::new(config.root_dir.clone(), Arc::clone(&logger)),
            logger,
            max_body_bytes: config.max_body_bytes,
            read_timeout: config.read_timeout(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, one thread per connection.
    ///
    /// A connection thread lives at most as long as the peer keeps sending
    /// within the read timeout.
    pub fn run(&self) {
        thread::scope(|scope| {
            for stream in self.listener.incoming() {
                match stream {
                    Ok(stream) => {
                        scope.spawn(move || self.handle_connection(&stream));
                    }
                    Err(err) => warn!(error = %err, "failed to accept connection"),
                }
            }
        });
    }

    fn handle_connection(&self, stream: &TcpStream) {
        let peer_addr = stream
            .peer_addr()
            .map_or("unknown".to_string(), |addr| addr.to_string());

        if let Err(e) = stream.set_read_timeout(self.read_timeout) {
            warn!(peer = %peer_addr, error = %e, "failed to set read timeout");
        }

        let mut reader = BufReader::new(stream);
        let request = match HttpRequest::from_reader(&mut reader, self.max_body_bytes) {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) if e.is_timeout() => {
                debug!(peer = %peer_addr, "closing idle connection");
                return;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "rejected malformed request");
                let response = HttpResponse::error(HttpStatus::from(&e), &e.public_message());
                Self::send_response(stream, &response);
                return;
            }
        };

        let response = self.route(&request);
        Self::send_response(stream, &response);

        info!(
            target: "pocket_serve::access",
            "{}",
            LogFormat::Combined.format(&AccessRecord::new(&request, &response, &peer_addr))
        );
    }

    pub fn route(&self, request: &HttpRequest) -> HttpResponse {
        let path = request.path();

        if let Some(segment) = serve_segment(path) {
            let serve_request = ServeRequest {
                method: request.method,
                path: segment,
                headers: request.headers.clone(),
                body: request.body.clone(),
            };
            return self.resolver.resolve(&serve_request).into();
        }

        match (path, request.method) {
            ("/", HttpMethod::Get) => {
                HttpResponse::new(HttpStatus::Ok, "text/html", DASHBOARD_HTML.as_bytes().to_vec())
            }
            (LOGS_PATH, HttpMethod::Get) => self.logs(),
            (LOGS_PATH, HttpMethod::Delete) => {
                self.logger.clear();
                info!("request log cleared");
                json_response(HttpStatus::Ok, &json!({ "message": "Logs cleared" }))
            }
            (METRICS_PATH, HttpMethod::Get) => HttpResponse::new(
                HttpStatus::Ok,
                METRICS_CONTENT_TYPE,
                self.metrics().into_bytes(),
            ),
            ("/" | LOGS_PATH | METRICS_PATH, _) => {
                HttpResponse::error(HttpStatus::MethodNotAllowed, "Method Not Allowed")
            }
            _ => HttpResponse::error(HttpStatus::NotFound, "Not Found"),
        }
    }

    fn logs(&self) -> HttpResponse {
        match serde_json::to_vec(&self.logger.snapshot()) {
            Ok(body) => HttpResponse::new(HttpStatus::Ok, "application/json", body),
            Err(err) => {
                error!(error = %err, "failed to serialize request log");
                HttpResponse::error(HttpStatus::InternalServerError, "Failed to fetch logs")
            }
        }
    }

    fn metrics(&self) -> String {
        let mut out = String::new();
        let gauges = [
            (
                "pocket_log_entries",
                "Request log entries currently held in memory.",
                self.logger.len(),
            ),
            (
                "pocket_log_capacity",
                "Maximum number of request log entries kept.",
                self.logger.capacity(),
            ),
        ];
        for (name, help, value) in gauges {
            let _ = writeln!(out, "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}");
        }
        out
    }

    fn send_response(stream: &TcpStream, response: &HttpResponse) {
        let mut stream = stream;

        if let Err(e) = response.write_to(&mut stream) {
            warn!(error = %e, "failed to write response");
        }
    }
}

/// Wildcard segment of a `/api/serve` request, percent-decoded.
///
/// `Some(None)` is the bare mount point, `None` means the path is outside it.
fn serve_segment(path: &str) -> Option<Option<String>> {
    if path == SERVE_PREFIX {
        return Some(None);
    }

    let raw = path.strip_prefix(SERVE_PREFIX)?.strip_prefix('/')?;
    let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), Cow::into_owned);
    Some(Some(decoded))
}

fn json_response(status: HttpStatus, value: &serde_json::Value) -> HttpResponse {
    HttpResponse::new(status, "application/json", value.to_string().into_bytes())
}

struct AccessRecord<'a> {
    remote_addr: &'a str,
    time_local: String,
    request_line: String,
    status: u16,
    body_bytes_sent: usize,
    referer: &'a str,
    user_agent: &'a str,
}

impl<'a> AccessRecord<'a> {
    fn new(request: &'a HttpRequest, response: &HttpResponse, remote_addr: &'a str) -> Self {
        Self {
            remote_addr,
            time_local: Zoned::now().strftime("%d/%b/%Y:%H:%M:%S %z").to_string(),
            request_line: format!("{} {} {}", request.method, request.uri, request.version),
            status: response.status.code(),
            body_bytes_sent: response.body.len(),
            referer: request.header("Referer").unwrap_or("-"),
            user_agent: request.header("User-Agent").unwrap_or("-"),
        }
    }
}

enum LogFormat {
    Combined,
}

impl LogFormat {
    // same layout as nginx's standard combined log
    fn format(&self, record: &AccessRecord<'_>) -> String {
        match self {
            Self::Combined => format!(
                "{} - - [{}] \"{}\" {} {} \"{}\" \"{}\"",
                record.remote_addr,
                record.time_local,
                record.request_line,
                record.status,
                record.body_bytes_sent,
                record.referer,
                record.user_agent,
            ),
        }
    }
}
