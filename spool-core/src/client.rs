use std::time::Duration;

use reqwest::{Body, Client, RequestBuilder, StatusCode, header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Result of a conditional `put`. A rejected precondition is not an error:
/// the caller decides what an existing object means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyExists,
}

#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl StoreClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, StoreError> {
        Self::with_connect_timeout(base_url, token, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(
        base_url: &str,
        token: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http = Client::builder().connect_timeout(connect_timeout).build()?;
        let mut base_url = Url::parse(base_url)?;
        // Endpoints are joined relative to the base, which needs a trailing
        // slash to keep its last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Verifies that the store is reachable and accepts our credentials.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let url = self.endpoint("v1/status")?;
        let response = self.authorize(self.http.get(url)).send().await?;
        Self::check_status(response).await.map(|_| ())
    }

    /// Uploads `body` to `remote_name`.
    ///
    /// With `only_if_absent` the request carries `If-None-Match: *`, and a
    /// `412 Precondition Failed` answer maps to [`PutOutcome::AlreadyExists`].
    pub async fn put(
        &self,
        remote_name: &str,
        body: impl Into<Body>,
        only_if_absent: bool,
    ) -> Result<PutOutcome, StoreError> {
        let mut url = self.endpoint("v1/objects/content")?;
        url.query_pairs_mut().append_pair("path", remote_name);
        let mut request = self.authorize(self.http.put(url)).body(body);
        if only_if_absent {
            request = request.header(header::IF_NONE_MATCH, "*");
        }
        let response = request.send().await?;
        if only_if_absent && response.status() == StatusCode::PRECONDITION_FAILED {
            return Ok(PutOutcome::AlreadyExists);
        }
        Self::check_status(response).await?;
        Ok(PutOutcome::Created)
    }

    pub async fn info(&self, remote_name: &str) -> Result<ObjectInfo, StoreError> {
        let mut url = self.endpoint("v1/objects")?;
        url.query_pairs_mut().append_pair("path", remote_name);
        let response = self.authorize(self.http.get(url)).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<ObjectInfo>().await?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        Ok(self.base_url.join(path)?)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Api { status, body })
        }
    }
}

impl StoreError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            StoreError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    /// Credentials were refused. Retrying the same request cannot succeed,
    /// so callers treat this as a connection-level failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self.classification(), Some(ApiErrorClass::Auth))
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectInfo {
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_statuses_as_fatal() {
        let err = StoreError::Api {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        };
        assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
        assert!(err.is_fatal());
    }

    #[test]
    fn server_errors_are_transient_and_not_fatal() {
        let err = StoreError::Api {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream".into(),
        };
        assert_eq!(err.classification(), Some(ApiErrorClass::Transient));
        assert!(!err.is_fatal());
    }

    #[test]
    fn rate_limit_is_its_own_class() {
        assert_eq!(
            classify_api_status(StatusCode::TOO_MANY_REQUESTS),
            ApiErrorClass::RateLimit
        );
        assert_eq!(
            classify_api_status(StatusCode::NOT_FOUND),
            ApiErrorClass::Permanent
        );
    }

    #[test]
    fn endpoints_keep_base_path() {
        let client = StoreClient::new("http://127.0.0.1:1/store", None).unwrap();
        assert_eq!(
            client.endpoint("v1/status").unwrap().as_str(),
            "http://127.0.0.1:1/store/v1/status"
        );

        let client = StoreClient::new("http://127.0.0.1:1", None).unwrap();
        assert_eq!(
            client.endpoint("v1/objects").unwrap().as_str(),
            "http://127.0.0.1:1/v1/objects"
        );
    }

    #[test]
    fn empty_token_is_dropped() {
        let client = StoreClient::new("http://127.0.0.1:1", Some(String::new())).unwrap();
        assert!(client.token.is_none());
    }
}
