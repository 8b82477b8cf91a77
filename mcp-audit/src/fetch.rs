//! Timeout-bounded HTTP access used by OAuth discovery and the reachability
//! check.

use std::time::Duration;

use crate::BoxFuture;
use crate::error::FetchError;

/// Response to a single `GET` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Response body as text.
    pub body: String,
}

impl FetchResponse {
    /// Returns `true` for `2xx` statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns `true` if the content type names `application/json`.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"))
    }
}

/// Performs single HTTP attempts on behalf of the engines.
///
/// Implementations must bound every attempt by `timeout` and must not retry.
pub trait NetworkFetcher: Send + Sync {
    /// Sends `GET url` with `Accept: application/json`.
    fn get<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<FetchResponse, FetchError>>;

    /// Sends `HEAD url` and returns the status code.
    fn head<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, Result<u16, FetchError>>;
}
