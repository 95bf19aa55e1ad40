use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};

use jiff::Timestamp;
use serde::Serialize;
use tracing::info;

use crate::body::{LoggedBody, MAX_LOGGED_BODY_CHARS, truncate_chars};

/// Default number of entries kept in memory.
pub const MAX_LOGS: usize = 100;

/// Allow-listed request headers, projected into log entries.
pub type LoggedHeaders = BTreeMap<String, String>;

/// One request outcome. Never mutated after the logger created it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: Timestamp,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<LoggedHeaders>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<LoggedBody>,
}

/// Everything in a [`LogEntry`] except the timestamp, which the logger sets.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntryInput {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub message: String,
    pub headers: Option<LoggedHeaders>,
    pub request_body: Option<LoggedBody>,
}

impl LogEntryInput {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status,
            message: message.into(),
            headers: None,
            request_body: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Option<LoggedHeaders>) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Option<LoggedBody>) -> Self {
        self.request_body = body;
        self
    }
}

pub trait RequestLog: Send + Sync {
    fn append(&self, entry: LogEntryInput);
    /// Newest entry first.
    fn snapshot(&self) -> Vec<LogEntry>;
    fn clear(&self);
    fn len(&self) -> usize;
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded in-memory request log, newest entry at the front.
#[derive(Debug)]
pub struct RequestLogger {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl Default for RequestLogger {
    fn default() -> Self {
        Self::new(MAX_LOGS)
    }
}

impl RequestLogger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
        }
    }

    // a panic while holding the lock cannot leave the deque half-updated
    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RequestLog for RequestLogger {
    fn append(&self, input: LogEntryInput) {
        let entry = LogEntry {
            timestamp: Timestamp::now(),
            method: input.method,
            path: input.path,
            status: input.status,
            message: input.message,
            headers: input.headers,
            request_body: input.request_body,
        };

        info!(target: "pocket_serve::requests", "{}", render_trace(&entry));

        let mut entries = self.lock();
        entries.push_front(entry);
        if entries.len() > self.capacity {
            entries.pop_back();
        }
    }

    fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Operator-facing rendering of an entry.
fn render_trace(entry: &LogEntry) -> String {
    let mut trace = format!(
        "[{}] {} {} - {} {}",
        entry.timestamp, entry.method, entry.path, entry.status, entry.message
    );

    if let Some(headers) = &entry.headers {
        let headers = serde_json::to_string(headers).unwrap_or_default();
        let _ = write!(trace, "\n  Headers: {headers}");
    }

    if let Some(body) = &entry.request_body {
        let body = truncate_chars(&body.render(), MAX_LOGGED_BODY_CHARS);
        let _ = write!(trace, "\n  Body: {body}");
    }

    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(i: usize) -> LogEntryInput {
        LogEntryInput::new("GET", format!("/api/serve/{i}.html"), 200, format!("Served: {i}.html"))
    }

    #[test]
    fn snapshot_is_newest_first() {
        let logger = RequestLogger::default();
        for i in 0..3 {
            logger.append(input(i));
        }

        let paths: Vec<_> = logger.snapshot().into_iter().map(|e| e.path).collect();
        assert_eq!(paths, ["/api/serve/2.html", "/api/serve/1.html", "/api/serve/0.html"]);
    }

    #[test]
    fn appending_past_capacity_evicts_exactly_the_oldest() {
        let logger = RequestLogger::default();
        for i in 0..MAX_LOGS {
            logger.append(input(i));
        }
        assert_eq!(logger.len(), MAX_LOGS);

        logger.append(input(MAX_LOGS));
        let snapshot = logger.snapshot();

        assert_eq!(snapshot.len(), MAX_LOGS);
        assert_eq!(snapshot[0].path, format!("/api/serve/{MAX_LOGS}.html"));
        assert_eq!(snapshot[MAX_LOGS - 1].path, "/api/serve/1.html");
        assert!(snapshot.iter().all(|e| e.path != "/api/serve/0.html"));
    }

    #[test]
    fn round_trip_preserves_fields_and_orders_timestamps() {
        let logger = RequestLogger::default();
        let mut headers = LoggedHeaders::new();
        headers.insert("host".into(), "localhost".into());

        let inputs: Vec<_> = (0..10)
            .map(|i| {
                input(i)
                    .with_headers(Some(headers.clone()))
                    .with_body(Some(LoggedBody::Json(json!({ "n": i }))))
            })
            .collect();
        for entry in &inputs {
            logger.append(entry.clone());
        }

        let snapshot = logger.snapshot();
        assert_eq!(snapshot.len(), inputs.len());
        for (entry, input) in snapshot.iter().rev().zip(&inputs) {
            assert_eq!(entry.method, input.method);
            assert_eq!(entry.path, input.path);
            assert_eq!(entry.status, input.status);
            assert_eq!(entry.message, input.message);
            assert_eq!(entry.headers, input.headers);
            assert_eq!(entry.request_body, input.request_body);
        }
        assert!(snapshot.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn snapshot_is_a_detached_copy() {
        let logger = RequestLogger::default();
        logger.append(input(0));

        let mut snapshot = logger.snapshot();
        snapshot.clear();
        assert_eq!(logger.len(), 1);
    }

    #[test]
    fn clear_empties_the_store() {
        let logger = RequestLogger::new(5);
        logger.append(input(0));
        logger.clear();
        assert!(logger.is_empty());
        assert!(logger.snapshot().is_empty());
    }

    #[test]
    fn serializes_with_camel_case_and_skips_absent_fields() {
        let logger = RequestLogger::default();
        logger.append(input(1).with_body(Some(LoggedBody::Empty)));
        logger.append(input(2));

        let value = serde_json::to_value(logger.snapshot()).unwrap();
        assert!(value[0].get("headers").is_none());
        assert!(value[0].get("requestBody").is_none());
        assert_eq!(value[1]["requestBody"], json!("(No Body)"));
        assert!(value[1]["timestamp"].is_string());
    }

    #[test]
    fn trace_contains_headers_and_truncated_body() {
        let mut headers = LoggedHeaders::new();
        headers.insert("accept".into(), "*/*".into());
        let entry = LogEntry {
            timestamp: Timestamp::UNIX_EPOCH,
            method: "POST".into(),
            path: "/api/serve/form".into(),
            status: 200,
            message: "ok".into(),
            headers: Some(headers),
            request_body: Some(LoggedBody::Text("y".repeat(250))),
        };

        let trace = render_trace(&entry);
        let mut lines = trace.lines();
        assert_eq!(lines.next(), Some("[1970-01-01T00:00:00Z] POST /api/serve/form - 200 ok"));
        assert_eq!(lines.next(), Some(r#"  Headers: {"accept":"*/*"}"#));
        assert_eq!(lines.next(), Some(format!("  Body: {}...", "y".repeat(200)).as_str()));
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let logger = RequestLogger::new(1_000);
        std::thread::scope(|s| {
            for t in 0..8 {
                let logger = &logger;
                s.spawn(move || {
                    for i in 0..50 {
                        logger.append(input(t * 100 + i));
                    }
                });
            }
        });
        assert_eq!(logger.len(), 400);
    }
}
