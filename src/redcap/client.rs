//! REDCap HTTP client.
//!
//! Every call is a form-encoded POST to the instance's `/api/` endpoint.
//! REDCap answers with `Content-Length` on every export; comparing it with
//! the bytes actually received is the only way to notice a transfer that was
//! cut short, since the status line already said 200.

use std::time::Duration;

use reqwest::header::CONTENT_LENGTH;
use tracing::{debug, warn};

use crate::config::RedcapSettings;
use crate::error::{Error, Result};

/// Form fields of one API request.
pub type Query = Vec<(&'static str, String)>;

/// Build a `content=record` query for a single record.
#[must_use]
pub fn record_query(api_key: &str, record_id: &str) -> Query {
    vec![
        ("token", api_key.to_string()),
        ("content", "record".to_string()),
        ("format", "json".to_string()),
        ("records", record_id.to_string()),
    ]
}

/// Build a `content=metadata` (data dictionary) query.
#[must_use]
pub fn metadata_query(api_key: &str) -> Query {
    vec![
        ("token", api_key.to_string()),
        ("content", "metadata".to_string()),
        ("format", "json".to_string()),
    ]
}

/// Integrity-checked REDCap API client.
#[derive(Debug, Clone)]
pub struct RedcapClient {
    client: reqwest::Client,
}

impl RedcapClient {
    /// Build a client from the `redcap` config section.
    ///
    /// # Errors
    ///
    /// Returns a config error if the TLS backend cannot be initialised.
    pub fn new(settings: &RedcapSettings) -> Result<Self> {
        Self::with_options(settings.verify_tls, settings.timeout())
    }

    /// Build a client with explicit TLS and timeout settings.
    ///
    /// # Errors
    ///
    /// Returns a config error if the TLS backend cannot be initialised.
    pub fn with_options(verify_tls: bool, timeout: Duration) -> Result<Self> {
        if !verify_tls {
            warn!("TLS certificate verification is disabled for REDCap requests");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// POST `query` to `api_url` and return the raw response body.
    ///
    /// `context` identifies the request in log lines and errors.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] if the request or body read fails
    /// - [`Error::Status`] on any non-success status
    /// - [`Error::LengthMismatch`] / [`Error::BadContentLength`] if the body
    ///   does not match the declared `Content-Length`
    pub async fn post(&self, api_url: &str, query: &Query, context: &str) -> Result<Vec<u8>> {
        debug!(url = api_url, context, "posting to redcap");

        let response = self
            .client
            .post(api_url)
            .form(query)
            .send()
            .await
            .map_err(|source| Error::Transport {
                url: api_url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

        // Raw bytes, before any text decoding
        let body = response.bytes().await.map_err(|source| Error::Transport {
            url: api_url.to_string(),
            source,
        })?;

        verify_content_length(declared.as_deref(), body.len() as u64, context)?;
        Ok(body.to_vec())
    }
}

/// Compare a declared `Content-Length` against the bytes received.
///
/// A missing header passes with a warning, since integrity cannot be checked.
///
/// # Errors
///
/// Returns an integrity error if the header is unparseable or disagrees with
/// `actual`.
pub fn verify_content_length(declared: Option<&str>, actual: u64, context: &str) -> Result<()> {
    let Some(value) = declared else {
        warn!(
            "server did not return a content-length header, \
             can't verify response integrity for {context}"
        );
        return Ok(());
    };

    let expected: u64 = value.trim().parse().map_err(|_| Error::BadContentLength {
        value: value.to_string(),
        context: context.to_string(),
    })?;

    if actual != expected {
        return Err(Error::LengthMismatch {
            actual,
            expected,
            context: context.to_string(),
        });
    }
    Ok(())
}
