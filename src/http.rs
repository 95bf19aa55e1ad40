use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::str::FromStr;

use thiserror::Error;

/// HTTP headers defined as a type alias to `HashMap<String, String>`
pub type HttpHeaders = HashMap<String, String>;

/// Longest request line or header line accepted, terminator included.
pub const MAX_LINE_BYTES: usize = 8 * 1024;
/// Most header fields accepted in one request.
pub const MAX_HEADERS: usize = 100;

/// Case-insensitive header lookup.
pub fn header<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(field_name, _)| field_name.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    HTTP1_0,
    HTTP1_1,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = match self {
            Self::HTTP1_0 => "HTTP/1.0",
            Self::HTTP1_1 => "HTTP/1.1",
        };
        write!(f, "{version}")
    }
}

impl FromStr for HttpVersion {
    type Err = ParseRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(Self::HTTP1_0),
            "HTTP/1.1" => Ok(Self::HTTP1_1),
            _ => Err(ParseRequestError::UnsupportedHttpVersion),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        };
        write!(f, "{method}")
    }
}

impl FromStr for HttpMethod {
    type Err = ParseRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(ParseRequestError::InvalidMethod),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    RequestHeaderFieldsTooLarge,
    InternalServerError,
    HttpVersionNotSupported,
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status_text = match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            Self::InternalServerError => "Internal Server Error",
            Self::HttpVersionNotSupported => "HTTP Version Not Supported",
        };
        write!(f, "{status_text}")
    }
}

impl HttpStatus {
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::PayloadTooLarge => 413,
            Self::RequestHeaderFieldsTooLarge => 431,
            Self::InternalServerError => 500,
            Self::HttpVersionNotSupported => 505,
        }
    }
}

impl From<&ParseRequestError> for HttpStatus {
    fn from(error: &ParseRequestError) -> Self {
        match error {
            ParseRequestError::UnsupportedHttpVersion => Self::HttpVersionNotSupported,
            ParseRequestError::BodyTooLarge { .. } => Self::PayloadTooLarge,
            ParseRequestError::LineTooLong | ParseRequestError::TooManyHeaders => {
                Self::RequestHeaderFieldsTooLarge
            }
            ParseRequestError::MalformedRequest(_) | ParseRequestError::InvalidMethod => {
                Self::BadRequest
            }
            ParseRequestError::Io(_) => Self::InternalServerError,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseRequestError {
    #[error("Unsupported HTTP version")]
    UnsupportedHttpVersion,
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Invalid method")]
    InvalidMethod,
    #[error("Request body of {length} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { length: usize, limit: usize },
    #[error("Request line or header exceeds {MAX_LINE_BYTES} bytes")]
    LineTooLong,
    #[error("More than {MAX_HEADERS} header fields")]
    TooManyHeaders,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ParseRequestError {
    /// Message returned to the client. I/O failures are not described.
    pub fn public_message(&self) -> String {
        match self {
            Self::Io(_) => HttpStatus::InternalServerError.to_string(),
            other => other.to_string(),
        }
    }

    /// The peer went quiet past the read timeout.
    pub fn is_timeout(&self) -> bool {
        let Self::Io(err) = self else {
            return false;
        };
        matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub uri: String,
    pub version: HttpVersion,
    pub headers: HttpHeaders,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Reads one request off `reader`.
    ///
    /// Returns `Ok(None)` when the peer closed the connection before sending
    /// a request line. Bodies are only read when a `Content-Length` header
    /// is present and are capped at `max_body_bytes`.
    pub fn from_reader<R: BufRead>(
        reader: &mut R,
        max_body_bytes: usize,
    ) -> Result<Option<Self>, ParseRequestError> {
        let Some(request_line) = read_line(reader)? else {
            return Ok(None);
        };

        let [method_str, target, version_str] = request_line
            .split_whitespace()
            .collect::<Vec<&str>>()
            .try_into()
            .map_err(|_| {
                ParseRequestError::MalformedRequest(format!(
                    "Malformed request line: {request_line}"
                ))
            })?;

        let method = method_str.parse()?;
        let version = version_str.parse()?;
        let headers = Self::parse_headers(reader)?;
        let body = Self::read_body(reader, &headers, max_body_bytes)?;

        Ok(Some(Self {
            method,
            uri: target.to_string(),
            version,
            headers,
            body,
        }))
    }

    fn parse_headers<R: BufRead>(reader: &mut R) -> Result<HttpHeaders, ParseRequestError> {
        let mut headers = HttpHeaders::new();

        while let Some(line) = read_line(reader)? {
            // end of headers
            if line.is_empty() {
                break;
            }
            if headers.len() == MAX_HEADERS {
                return Err(ParseRequestError::TooManyHeaders);
            }

            let (field_name, field_value) = line
                .split_once(':')
                .map(|(f1, f2)| (f1.trim(), f2.trim()))
                .ok_or_else(|| {
                    ParseRequestError::MalformedRequest(format!("Malformed header: {line}"))
                })?;

            // TODO: repeated fields overwrite each other instead of being combined.
            // See: https://www.rfc-editor.org/rfc/rfc9110.html#name-field-order
            headers.insert(field_name.to_owned(), field_value.to_owned());
        }

        Ok(headers)
    }

    fn read_body<R: BufRead>(
        reader: &mut R,
        headers: &HttpHeaders,
        max_body_bytes: usize,
    ) -> Result<Option<Vec<u8>>, ParseRequestError> {
        let Some(length) = header(headers, "Content-Length") else {
            return Ok(None);
        };
        let length: usize = length.parse().map_err(|_| {
            ParseRequestError::MalformedRequest(format!("Invalid Content-Length: {length}"))
        })?;

        if length > max_body_bytes {
            return Err(ParseRequestError::BodyTooLarge {
                length,
                limit: max_body_bytes,
            });
        }
        if length == 0 {
            return Ok(None);
        }

        let mut body = vec![0; length];
        reader.read_exact(&mut body)?;
        Ok(Some(body))
    }

    /// Request target without the query string.
    pub fn path(&self) -> &str {
        self.uri
            .split_once('?')
            .map_or(self.uri.as_str(), |(path, _)| path)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}

/// Reads a single CRLF (or bare LF) terminated line without the terminator.
///
/// At most [`MAX_LINE_BYTES`] are buffered; a longer line is rejected.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, ParseRequestError> {
    let mut line = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', &mut line)?;
    if read == 0 {
        return Ok(None);
    }
    if read == MAX_LINE_BYTES && line.last() != Some(&b'\n') {
        return Err(ParseRequestError::LineTooLong);
    }

    let trimmed = line.trim_ascii_end().len();
    line.truncate(trimmed);
    String::from_utf8(line)
        .map(Some)
        .map_err(|_| ParseRequestError::MalformedRequest("Line is not valid UTF-8".into()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: HttpVersion,
    pub status: HttpStatus,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: HttpStatus, content_type: &str, body: Vec<u8>) -> Self {
        let mut headers = HttpHeaders::new();

        headers.insert("Content-Type".to_string(), content_type.to_string());
        headers.insert("Content-Length".to_string(), body.len().to_string());
        headers.insert("Connection".to_string(), "close".to_string());

        Self {
            version: HttpVersion::HTTP1_1,
            status,
            headers,
            body,
        }
    }

    /// JSON response carrying `{"error": message}`.
    pub fn error(status: HttpStatus, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::new(status, "application/json", body.into_bytes())
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        // status line
        write!(writer, "{} {} {}\r\n", self.version, self.status.code(), self.status)?;

        for (field_name, field_value) in &self.headers {
            write!(writer, "{field_name}: {field_value}\r\n")?;
        }

        // empty line
        writer.write_all(b"\r\n")?;
        writer.write_all(&self.body)?;
        writer.flush()
    }
}
