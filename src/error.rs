use std::io;

use thiserror::Error;

use crate::body::BodyError;
use crate::http::HttpStatus;

/// Terminal failures of a static-serving request.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Bad Request: Invalid path")]
    InvalidPath,

    #[error(transparent)]
    BodyParse(#[from] BodyError),

    #[error("Forbidden: Directory listing not allowed")]
    DirectoryListingDenied,

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Internal Server Error")]
    Internal(#[source] io::Error),
}

impl ResolveError {
    pub const fn status(&self) -> HttpStatus {
        match self {
            Self::InvalidPath | Self::BodyParse(_) => HttpStatus::BadRequest,
            Self::DirectoryListingDenied => HttpStatus::Forbidden,
            Self::NotFound(_) => HttpStatus::NotFound,
            Self::MethodNotAllowed => HttpStatus::MethodNotAllowed,
            Self::Internal(_) => HttpStatus::InternalServerError,
        }
    }

    /// Message returned to the client. Never carries filesystem detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidPath => "Invalid path",
            Self::BodyParse(_) => "Bad Request",
            Self::DirectoryListingDenied => "Directory listing not allowed",
            Self::NotFound(_) => "File not found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::Internal(_) => "Internal Server Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(ResolveError::InvalidPath.status().code(), 400);
        assert_eq!(ResolveError::DirectoryListingDenied.status().code(), 403);
        assert_eq!(ResolveError::NotFound("x".into()).status().code(), 404);
        assert_eq!(ResolveError::MethodNotAllowed.status().code(), 405);
        let internal = ResolveError::Internal(io::Error::other("disk on fire"));
        assert_eq!(internal.status().code(), 500);
        assert_eq!(internal.to_string(), "Internal Server Error");
        assert!(!internal.public_message().contains("disk"));
    }
}
