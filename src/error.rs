use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a failed call to a downstream sink.
///
/// Only `RateLimited` is retried by the dispatch queue; every other kind is
/// logged and the task dropped.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("rate limited by {sink}")]
    RateLimited {
        sink: &'static str,
        retry_after: Option<Duration>,
    },
    #[error("{sink} error {status}: {body}")]
    Status {
        sink: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("failed to reach {sink}: {source}")]
    Transport {
        sink: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid {sink} response: {message}")]
    Decode {
        sink: &'static str,
        message: String,
    },
}

impl DeliveryError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DeliveryError::RateLimited { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DeliveryError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Map a finished response into `Ok` or the matching `DeliveryError` kind.
pub async fn check_response(
    sink: &'static str,
    res: reqwest::Response,
) -> Result<reqwest::Response, DeliveryError> {
    let status = res.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parse_retry_after(res.headers());
        return Err(DeliveryError::RateLimited { sink, retry_after });
    }
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(DeliveryError::Status { sink, status, body });
    }
    Ok(res)
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
