use std::path::Path;
use std::str::FromStr;

/// taken from <https://developer.mozilla.org/en-US/docs/Web/HTTP/Guides/MIME_types/Common_types/>
/// NOTE: This list is not exhaustive. Anything unknown is served as
/// `application/octet-stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mime {
    GZip,
    Json,
    JsonLd,
    Binary,
    Pdf,
    Wasm,
    Xml,
    Zip,
    Gif,
    Icon,
    Jpeg,
    Png,
    Svg,
    Webp,
    Woff,
    Woff2,
    ICalendar,
    Css,
    Csv,
    Html,
    JavaScriptModule,
    JavaScript,
    Markdown,
    PlainText,
}

impl Mime {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GZip => "application/gzip",
            Self::Json => "application/json",
            Self::JsonLd => "application/ld+json",
            Self::Binary => "application/octet-stream",
            Self::Pdf => "application/pdf",
            Self::Wasm => "application/wasm",
            Self::Xml => "application/xml",
            Self::Zip => "application/zip",
            Self::Gif => "image/gif",
            Self::Icon => "image/vnd.microsoft.icon",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Svg => "image/svg+xml",
            Self::Webp => "image/webp",
            Self::Woff => "font/woff",
            Self::Woff2 => "font/woff2",
            Self::ICalendar => "text/calendar",
            Self::Css => "text/css",
            Self::Csv => "text/csv",
            Self::Html => "text/html",
            Self::JavaScriptModule | Self::JavaScript => "text/javascript",
            Self::Markdown => "text/markdown",
            Self::PlainText => "text/plain",
        }
    }

    /// Infers the content type from the extension of `path`.
    ///
    /// Missing extensions, non UTF-8 extensions and unknown extensions all
    /// fall back to [`Mime::Binary`].
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or(Self::Binary)
    }
}

impl FromStr for Mime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gz" => Ok(Self::GZip),
            "json" => Ok(Self::Json),
            "jsonld" => Ok(Self::JsonLd),
            "bin" => Ok(Self::Binary),
            "pdf" => Ok(Self::Pdf),
            "wasm" => Ok(Self::Wasm),
            "xml" => Ok(Self::Xml),
            "zip" => Ok(Self::Zip),
            "gif" => Ok(Self::Gif),
            "ico" => Ok(Self::Icon),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            "webp" => Ok(Self::Webp),
            "woff" => Ok(Self::Woff),
            "woff2" => Ok(Self::Woff2),
            "ics" => Ok(Self::ICalendar),
            "css" => Ok(Self::Css),
            "csv" => Ok(Self::Csv),
            "html" | "htm" => Ok(Self::Html),
            "mjs" => Ok(Self::JavaScriptModule),
            "js" => Ok(Self::JavaScript),
            "md" => Ok(Self::Markdown),
            "txt" => Ok(Self::PlainText),
            other => Err(format!("Unknown file extension: {other}")),
        }
    }
}
