//! Static file resolution for the `/api/serve` namespace.
//!
//! Every request handled here ends in exactly one terminal outcome, and every
//! outcome is appended to the request log before the response is handed back.
//! The only exception is a true miss with a root `index.html` present, which
//! records both the miss and the fallback.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error};

use crate::body::parse_body;
use crate::error::ResolveError;
use crate::http::{HttpHeaders, HttpMethod, HttpResponse, HttpStatus, header};
use crate::logger::{LogEntryInput, LoggedHeaders, RequestLog};
use crate::mime::Mime;

/// Mount point of the resolver, used to build the logged request path.
pub const SERVE_PREFIX: &str = "/api/serve";
pub const INDEX_FILE: &str = "index.html";

const LOGGED_HEADERS: [&str; 5] = ["host", "user-agent", "content-type", "accept", "referer"];

/// Framework independent description of a request into the static namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeRequest {
    pub method: HttpMethod,
    /// Decoded wildcard segment after [`SERVE_PREFIX`], if any.
    pub path: Option<String>,
    pub headers: HttpHeaders,
    pub body: Option<Vec<u8>>,
}

impl ServeRequest {
    pub fn new(method: HttpMethod, path: Option<&str>) -> Self {
        Self {
            method,
            path: path.map(str::to_string),
            headers: HttpHeaders::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Relative file path to look up, `index.html` when no segment was given.
    pub fn requested_path(&self) -> &str {
        match self.path.as_deref() {
            Some(path) if !path.is_empty() => path,
            _ => INDEX_FILE,
        }
    }

    /// Path as it appears in the log feed.
    pub fn logical_path(&self) -> String {
        format!("{SERVE_PREFIX}/{}", self.path.as_deref().unwrap_or_default())
    }

    pub fn content_type(&self) -> Option<&str> {
        header(&self.headers, "Content-Type")
    }
}

/// What the HTTP layer should write back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDescriptor {
    pub status: HttpStatus,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl ResponseDescriptor {
    pub fn new(status: HttpStatus, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            body,
        }
    }

    pub fn json(status: HttpStatus, value: &serde_json::Value) -> Self {
        Self::new(status, "application/json", value.to_string().into_bytes())
    }

    fn from_error(err: &ResolveError) -> Self {
        let value = match err {
            ResolveError::BodyParse(detail) => {
                json!({ "error": err.public_message(), "detail": detail.to_string() })
            }
            _ => json!({ "error": err.public_message() }),
        };
        Self::json(err.status(), &value)
    }

    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

impl From<ResponseDescriptor> for HttpResponse {
    fn from(descriptor: ResponseDescriptor) -> Self {
        Self::new(descriptor.status, &descriptor.content_type, descriptor.body)
    }
}

/// Per-request values shared by every log entry the request produces.
struct LogContext {
    method: String,
    path: String,
    headers: Option<LoggedHeaders>,
}

impl LogContext {
    fn entry(&self, status: HttpStatus, message: impl Into<String>) -> LogEntryInput {
        LogEntryInput::new(self.method.clone(), self.path.clone(), status.code(), message)
            .with_headers(self.headers.clone())
    }
}

/// Projects the allow-listed headers, keyed by their lowercase name.
pub fn loggable_headers(headers: &HttpHeaders) -> Option<LoggedHeaders> {
    let projected: LoggedHeaders = LOGGED_HEADERS
        .iter()
        .filter_map(|name| {
            header(headers, name).map(|value| ((*name).to_string(), value.to_string()))
        })
        .collect();

    (!projected.is_empty()).then_some(projected)
}

pub struct StaticFileResolver<L: RequestLog> {
    root: PathBuf,
    logger: Arc<L>,
}

impl<L: RequestLog> StaticFileResolver<L> {
    pub fn new(root: impl Into<PathBuf>, logger: Arc<L>) -> Self {
        Self {
            root: root.into(),
            logger,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, request: &ServeRequest) -> ResponseDescriptor {
        let ctx = LogContext {
            method: request.method.to_string(),
            path: request.logical_path(),
            headers: loggable_headers(&request.headers),
        };

        match request.method {
            HttpMethod::Get => self.serve(request.requested_path(), &ctx),
            HttpMethod::Post | HttpMethod::Put => self.receive(request, &ctx),
            HttpMethod::Head | HttpMethod::Delete | HttpMethod::Patch | HttpMethod::Options => {
                self.fail(&ctx, ResolveError::MethodNotAllowed)
            }
        }
    }

    fn serve(&self, requested: &str, ctx: &LogContext) -> ResponseDescriptor {
        let target = match self.locate(requested) {
            Ok(target) => target,
            Err(ResolveError::NotFound(_)) => return self.fallback(requested, ctx),
            Err(err) => return self.fail(ctx, err),
        };

        // the file may have vanished since the metadata lookup; that is an internal error now
        match fs::read(&target) {
            Ok(contents) => {
                self.logger
                    .append(ctx.entry(HttpStatus::Ok, format!("Served: {requested}")));
                ResponseDescriptor::new(HttpStatus::Ok, Mime::from_path(&target).as_str(), contents)
            }
            Err(err) => self.fail(ctx, ResolveError::Internal(err)),
        }
    }

    /// Maps a requested path to the file that should be served.
    fn locate(&self, requested: &str) -> Result<PathBuf, ResolveError> {
        if requested.contains("..") {
            return Err(ResolveError::InvalidPath);
        }

        let candidate = self.compose(requested)?;
        let metadata = match fs::metadata(&candidate) {
            Ok(metadata) => metadata,
            Err(err) if is_missing(&err) => {
                return Err(ResolveError::NotFound(requested.to_string()));
            }
            Err(err) => return Err(ResolveError::Internal(err)),
        };
        self.ensure_contained(&candidate)?;

        if !metadata.is_dir() {
            return Ok(candidate);
        }

        let index = candidate.join(INDEX_FILE);
        match fs::metadata(&index) {
            Ok(metadata) if metadata.is_file() => {
                self.ensure_contained(&index)?;
                Ok(index)
            }
            _ => Err(ResolveError::DirectoryListingDenied),
        }
    }

    /// Joins `requested` onto the root, accepting only plain relative paths.
    fn compose(&self, requested: &str) -> Result<PathBuf, ResolveError> {
        let relative = Path::new(requested);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !plain {
            return Err(ResolveError::InvalidPath);
        }

        let candidate = self.root.join(relative);
        if candidate.starts_with(&self.root) {
            Ok(candidate)
        } else {
            Err(ResolveError::InvalidPath)
        }
    }

    /// Rejects candidates that leave the root through a symlink.
    fn ensure_contained(&self, candidate: &Path) -> Result<(), ResolveError> {
        let canonical_root = self.root.canonicalize().map_err(ResolveError::Internal)?;
        let canonical = candidate.canonicalize().map_err(ResolveError::Internal)?;

        if canonical.starts_with(&canonical_root) {
            Ok(())
        } else {
            Err(ResolveError::InvalidPath)
        }
    }

    fn fallback(&self, requested: &str, ctx: &LogContext) -> ResponseDescriptor {
        let miss = ResolveError::NotFound(requested.to_string());
        self.logger.append(ctx.entry(miss.status(), miss.to_string()));

        match fs::read(self.root.join(INDEX_FILE)) {
            Ok(contents) => {
                self.logger
                    .append(ctx.entry(HttpStatus::Ok, format!("Served fallback: {INDEX_FILE}")));
                ResponseDescriptor::new(HttpStatus::Ok, Mime::Html.as_str(), contents)
            }
            Err(err) => {
                debug!(path = %ctx.path, error = %err, "root index unavailable for fallback");
                ResponseDescriptor::from_error(&miss)
            }
        }
    }

    fn receive(&self, request: &ServeRequest, ctx: &LogContext) -> ResponseDescriptor {
        let verb = &ctx.method;

        match parse_body(request.content_type(), request.body.as_deref()) {
            Ok(body) => {
                let message = format!("Received {verb} request. Body logged (truncated if large).");
                self.logger
                    .append(ctx.entry(HttpStatus::Ok, message).with_body(Some(body.clone())));
                ResponseDescriptor::json(
                    HttpStatus::Ok,
                    &json!({ "message": format!("{verb} request received"), "data": body }),
                )
            }
            Err(err) => {
                let message = format!("Received {verb} request. Body parsing error: {err}");
                self.logger.append(ctx.entry(HttpStatus::BadRequest, message));
                ResponseDescriptor::from_error(&ResolveError::BodyParse(err))
            }
        }
    }

    fn fail(&self, ctx: &LogContext, err: ResolveError) -> ResponseDescriptor {
        if let ResolveError::Internal(source) = &err {
            error!(
                method = %ctx.method,
                path = %ctx.path,
                error = %source,
                "failed to serve static file"
            );
        }
        self.logger.append(ctx.entry(err.status(), err.to_string()));
        ResponseDescriptor::from_error(&err)
    }
}

fn is_missing(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::LoggedBody;
    use crate::logger::RequestLogger;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<RequestLogger>, StaticFileResolver<RequestLogger>) {
        let root = tempfile::tempdir().unwrap();
        let logger = Arc::new(RequestLogger::default());
        let resolver = StaticFileResolver::new(root.path(), Arc::clone(&logger));
        (root, logger, resolver)
    }

    fn get(path: &str) -> ServeRequest {
        ServeRequest::new(HttpMethod::Get, Some(path))
    }

    #[test]
    fn serves_existing_file_with_inferred_type() {
        let (root, logger, resolver) = setup();
        fs::write(root.path().join("style.css"), "body {}").unwrap();

        let response = resolver.resolve(&get("style.css"));

        assert_eq!(response.status, HttpStatus::Ok);
        assert_eq!(response.content_type, "text/css");
        assert_eq!(response.body, b"body {}");
        let entries = logger.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Served: style.css");
        assert_eq!(entries[0].path, "/api/serve/style.css");
    }

    #[test]
    fn absent_segment_defaults_to_index() {
        let (root, logger, resolver) = setup();
        fs::write(root.path().join("index.html"), "<h1>home</h1>").unwrap();

        let response = resolver.resolve(&ServeRequest::new(HttpMethod::Get, None));

        assert_eq!(response.status, HttpStatus::Ok);
        assert_eq!(response.content_type, "text/html");
        assert_eq!(logger.snapshot()[0].path, "/api/serve/");
        assert_eq!(logger.snapshot()[0].message, "Served: index.html");
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        let (root, _logger, resolver) = setup();
        fs::write(root.path().join("blob.weird"), [0u8, 1, 2]).unwrap();

        let response = resolver.resolve(&get("blob.weird"));
        assert_eq!(response.content_type, "application/octet-stream");
        assert_eq!(response.body, [0u8, 1, 2]);
    }

    #[test]
    fn parent_references_are_rejected_without_touching_the_filesystem() {
        let logger = Arc::new(RequestLogger::default());
        let resolver = StaticFileResolver::new("/nonexistent/pocket-root", Arc::clone(&logger));

        for path in ["../etc/passwd", "a/../../b", "..", "foo..bar"] {
            let response = resolver.resolve(&get(path));
            assert_eq!(response.status, HttpStatus::BadRequest, "{path}");
            assert_eq!(response.body_json().unwrap(), json!({ "error": "Invalid path" }));
        }

        let entries = logger.snapshot();
        assert_eq!(entries.len(), 4);
        assert!(
            entries
                .iter()
                .all(|e| e.status == 400 && e.message == "Bad Request: Invalid path")
        );
    }

    #[test]
    fn absolute_segment_cannot_escape_the_root() {
        let (_root, logger, resolver) = setup();

        let response = resolver.resolve(&get("/etc/passwd"));

        assert_eq!(response.status, HttpStatus::BadRequest);
        assert_eq!(logger.snapshot()[0].status, 400);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_the_root_is_rejected() {
        let (root, _logger, resolver) = setup();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        let link = root.path().join("link.txt");
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), link).unwrap();

        let response = resolver.resolve(&get("link.txt"));

        assert_eq!(response.status, HttpStatus::BadRequest);
        assert!(!String::from_utf8_lossy(&response.body).contains("secret"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_index_out_of_the_root_is_rejected() {
        let (root, logger, resolver) = setup();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "TOP-SECRET").unwrap();
        fs::create_dir(root.path().join("docs")).unwrap();
        let index = root.path().join("docs/index.html");
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), index).unwrap();

        let response = resolver.resolve(&get("docs"));

        assert_eq!(response.status, HttpStatus::BadRequest);
        assert_eq!(response.body_json().unwrap(), json!({ "error": "Invalid path" }));
        let entries = logger.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Bad Request: Invalid path");
    }

    #[test]
    fn unexpected_io_error_is_a_generic_internal_error() {
        let (_root, logger, resolver) = setup();

        // a NUL byte makes the metadata lookup fail with InvalidInput
        let response = resolver.resolve(&get("bad\0name.html"));

        assert_eq!(response.status, HttpStatus::InternalServerError);
        assert_eq!(response.body_json().unwrap(), json!({ "error": "Internal Server Error" }));
        let entries = logger.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, 500);
        assert_eq!(entries[0].message, "Internal Server Error");
    }

    #[test]
    fn directory_with_index_serves_the_index() {
        let (root, logger, resolver) = setup();
        fs::create_dir(root.path().join("docs")).unwrap();
        fs::write(root.path().join("docs/index.html"), "<p>docs</p>").unwrap();

        let response = resolver.resolve(&get("docs"));

        assert_eq!(response.status, HttpStatus::Ok);
        assert_eq!(response.content_type, "text/html");
        assert_eq!(response.body, b"<p>docs</p>");
        assert_eq!(logger.snapshot()[0].message, "Served: docs");
    }

    #[test]
    fn directory_without_index_is_forbidden() {
        let (root, logger, resolver) = setup();
        fs::create_dir(root.path().join("private")).unwrap();
        fs::write(root.path().join("private/notes.txt"), "hidden").unwrap();

        let response = resolver.resolve(&get("private/"));

        assert_eq!(response.status, HttpStatus::Forbidden);
        assert_eq!(
            response.body_json().unwrap(),
            json!({ "error": "Directory listing not allowed" })
        );
        let entries = logger.snapshot();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, 403);
        assert_eq!(entries[0].message, "Forbidden: Directory listing not allowed");
    }

    #[test]
    fn miss_falls_back_to_root_index_and_logs_both_outcomes() {
        let (root, logger, resolver) = setup();
        fs::write(root.path().join("index.html"), "<h1>home</h1>").unwrap();

        let response = resolver.resolve(&get("missing.html"));

        assert_eq!(response.status, HttpStatus::Ok);
        assert_eq!(response.content_type, "text/html");
        assert_eq!(response.body, b"<h1>home</h1>");

        let entries = logger.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, 200);
        assert_eq!(entries[0].message, "Served fallback: index.html");
        assert_eq!(entries[1].status, 404);
        assert_eq!(entries[1].message, "Not Found: missing.html");
    }

    #[test]
    fn miss_without_root_index_is_not_found() {
        let (root, logger, resolver) = setup();
        fs::write(root.path().join("page.txt"), "text").unwrap();

        // a file used as a directory is a miss as well
        for path in ["missing.html", "page.txt/child"] {
            let response = resolver.resolve(&get(path));
            assert_eq!(response.status, HttpStatus::NotFound, "{path}");
            assert_eq!(response.body_json().unwrap(), json!({ "error": "File not found" }));
        }

        let entries = logger.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, "Not Found: missing.html");
        assert_eq!(entries[0].message, "Not Found: page.txt/child");
    }

    #[test]
    fn json_post_is_logged_as_parsed_value() {
        let (_root, logger, resolver) = setup();
        let request = ServeRequest::new(HttpMethod::Post, Some("submit"))
            .with_header("Content-Type", "application/json")
            .with_header("X-Secret", "nope")
            .with_body(br#"{"name":"pocket","n":3}"#.to_vec());

        let response = resolver.resolve(&request);

        assert_eq!(response.status, HttpStatus::Ok);
        assert_eq!(
            response.body_json().unwrap(),
            json!({ "message": "POST request received", "data": { "name": "pocket", "n": 3 } })
        );
        let entry = &logger.snapshot()[0];
        assert_eq!(entry.message, "Received POST request. Body logged (truncated if large).");
        assert_eq!(entry.request_body, Some(LoggedBody::Json(json!({ "name": "pocket", "n": 3 }))));
        let headers = entry.headers.as_ref().unwrap();
        assert_eq!(headers.get("content-type").map(String::as_str), Some("application/json"));
        assert!(!headers.contains_key("x-secret"));
    }

    #[test]
    fn long_text_put_is_logged_truncated() {
        let (_root, logger, resolver) = setup();
        let text = "a".repeat(300);
        let request = ServeRequest::new(HttpMethod::Put, Some("notes"))
            .with_header("content-type", "text/plain")
            .with_body(text.clone());

        let response = resolver.resolve(&request);

        assert_eq!(response.status, HttpStatus::Ok);
        let Some(LoggedBody::Text(logged)) = logger.snapshot()[0].request_body.clone() else {
            panic!("expected a text body");
        };
        assert_eq!(logged, format!("{}...", &text[..200]));
        assert_eq!(logger.snapshot()[0].method, "PUT");
    }

    #[test]
    fn malformed_json_is_a_bad_request_with_detail() {
        let (_root, logger, resolver) = setup();
        let request = ServeRequest::new(HttpMethod::Post, Some("submit"))
            .with_header("Content-Type", "application/json")
            .with_body(b"{not json".to_vec());

        let response = resolver.resolve(&request);

        assert_eq!(response.status, HttpStatus::BadRequest);
        let body = response.body_json().unwrap();
        assert_eq!(body["error"], "Bad Request");
        assert!(body["detail"].as_str().unwrap().starts_with("Failed to parse body: "));

        let entry = &logger.snapshot()[0];
        assert_eq!(entry.status, 400);
        assert!(entry.message.starts_with("Received POST request. Body parsing error: "));
        assert_eq!(entry.request_body, None);
    }

    #[test]
    fn post_without_body_records_the_marker() {
        let (_root, logger, resolver) = setup();

        resolver.resolve(&ServeRequest::new(HttpMethod::Post, None));

        assert_eq!(logger.snapshot()[0].request_body, Some(LoggedBody::Empty));
        assert_eq!(logger.snapshot()[0].headers, None);
    }

    #[test]
    fn other_methods_are_not_allowed_regardless_of_path() {
        let logger = Arc::new(RequestLogger::default());
        let resolver = StaticFileResolver::new("/nonexistent/pocket-root", Arc::clone(&logger));

        let methods = [
            HttpMethod::Delete,
            HttpMethod::Patch,
            HttpMethod::Head,
            HttpMethod::Options,
        ];
        for method in methods {
            for path in ["index.html", "../x", "missing"] {
                let response = resolver.resolve(&ServeRequest::new(method, Some(path)));
                assert_eq!(response.status, HttpStatus::MethodNotAllowed);
                assert_eq!(response.body_json().unwrap(), json!({ "error": "Method Not Allowed" }));
            }
        }

        let entries = logger.snapshot();
        assert_eq!(entries.len(), 12);
        assert!(entries.iter().all(|e| e.status == 405 && e.message == "Method Not Allowed"));
    }

    #[test]
    fn header_projection_is_case_insensitive_allow_list() {
        let mut headers = HttpHeaders::new();
        headers.insert("Host".into(), "localhost:3000".into());
        headers.insert("User-Agent".into(), "curl/8".into());
        headers.insert("Authorization".into(), "Bearer x".into());
        headers.insert("Cookie".into(), "a=b".into());

        let projected = loggable_headers(&headers).unwrap();

        assert_eq!(projected.len(), 2);
        assert_eq!(projected["host"], "localhost:3000");
        assert_eq!(projected["user-agent"], "curl/8");
        assert!(loggable_headers(&HttpHeaders::new()).is_none());
    }
}
