#![allow(clippy::missing_errors_doc)]

pub mod body;
pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod mime;
pub mod provision;
pub mod resolver;
pub mod server;

pub use body::LoggedBody;
pub use config::ServeConfig;
pub use error::ResolveError;
pub use logger::{LogEntry, LogEntryInput, RequestLog, RequestLogger};
pub use resolver::{ResponseDescriptor, ServeRequest, StaticFileResolver};
pub use server::HttpFileServer;
