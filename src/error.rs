//! Failure taxonomy of a site crawl.
//!
//! Page-level transport problems never reach this type: the crawler logs
//! them and abandons the branch. What is left is what ends a site's crawl,
//! and each variant maps onto one [`ErrorKind`] that selects the message
//! stored on the site row.

use thiserror::Error;

use crate::config::MessagesConfig;
use crate::fetch::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Cancelled,
    CertificateTrust,
    Unknown,
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("crawl cancelled")]
    Cancelled,
    #[error("certificate not trusted: {0}")]
    Certificate(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
    #[error("{0}")]
    Unknown(String),
}

impl CrawlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::Cancelled => ErrorKind::Cancelled,
            CrawlError::Certificate(_) => ErrorKind::CertificateTrust,
            CrawlError::Storage(_) | CrawlError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Text stored as the site's last error.
    pub fn message(&self, messages: &MessagesConfig) -> String {
        match self.kind() {
            ErrorKind::Cancelled => messages.interrupted.clone(),
            ErrorKind::CertificateTrust => messages.certificate.clone(),
            ErrorKind::Unknown => format!("{} ({:#})", messages.unknown, self),
        }
    }
}

impl From<FetchError> for CrawlError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Certificate { .. } => CrawlError::Certificate(err.to_string()),
            other => CrawlError::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(CrawlError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            CrawlError::Certificate("x".into()).kind(),
            ErrorKind::CertificateTrust
        );
        assert_eq!(
            CrawlError::Storage(anyhow::anyhow!("disk full")).kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_messages() {
        let messages = MessagesConfig::default();
        assert_eq!(
            CrawlError::Cancelled.message(&messages),
            "Indexing stopped by user"
        );
        assert_eq!(
            CrawlError::Certificate("bad chain".into()).message(&messages),
            "Site certificate is not trusted"
        );
        assert_eq!(
            CrawlError::Unknown("boom".into()).message(&messages),
            "Unknown error (boom)"
        );
    }

    #[test]
    fn test_from_fetch_error() {
        let err: CrawlError = FetchError::Certificate {
            url: "https://lenta.ru/".into(),
            message: "UnknownIssuer".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::CertificateTrust);

        let err: CrawlError = FetchError::Transport {
            url: "https://lenta.ru/".into(),
            message: "connection refused".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }
}
