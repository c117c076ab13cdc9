use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request for {url} failed: {detail}")]
    Transport {
        url: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("failed to decode response from {url}: {detail}")]
    Decode { url: String, detail: String },

    #[error("page views unavailable for page {page_id}: {reason}")]
    AnalyticsUnavailable { page_id: String, reason: String },
}

impl CrawlError {
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        let url = url.into();
        if status == 401 || status == 403 {
            return Self::Auth(format!("{url} answered HTTP {status}"));
        }
        Self::Transport {
            url,
            status: Some(status),
            detail: format!("status {status}"),
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
