//! Retrieval of the module snapshot and its evaluation reports from the SARA backend.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::try_join_all;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;

use crate::model::{EvaluationReport, ExportInput, ModuleSnapshot};

/// Maximum accepted size of a single backend response.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

/// Characters of an error response body kept in [`FetchError::Status`].
const ERROR_BODY_EXCERPT_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned HTTP {status}: {body}")]
    Status { path: String, status: u16, body: String },
    #[error("invalid JSON from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response body too large for {path} (limit {limit} bytes, received {size} bytes)")]
    BodyTooLarge { path: String, limit: usize, size: u64 },
}

/// Read a response body into memory, failing once it exceeds `limit_bytes`.
///
/// An advertised `Content-Length` above the limit fails before any byte is read; otherwise the body
/// is streamed and reading stops at `limit_bytes + 1`.
pub async fn read_response_body_with_limit(
    response: &mut reqwest::Response,
    limit_bytes: usize,
    path: &str,
) -> Result<Vec<u8>, FetchError> {
    if let Some(content_length) = response.content_length() {
        if content_length > limit_bytes as u64 {
            return Err(FetchError::BodyTooLarge {
                path: path.to_string(),
                limit: limit_bytes,
                size: content_length,
            });
        }
    }

    let url = response.url().to_string();
    let max_bytes = limit_bytes.saturating_add(1);
    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| FetchError::Connect { url: url.clone(), source })?
    {
        if out.len().saturating_add(chunk.len()) >= max_bytes {
            return Err(FetchError::BodyTooLarge {
                path: path.to_string(),
                limit: limit_bytes,
                size: max_bytes as u64,
            });
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// HTTP client for the backend's module endpoints. Requests are not retried.
#[derive(Clone, Debug)]
pub struct SaraClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    max_body_bytes: usize,
}

impl SaraClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            max_body_bytes: MAX_RESPONSE_BYTES,
        })
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{path}", self.base_url);
        log::debug!("GET {url}");
        let mut response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| FetchError::Connect { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            let body = read_response_body_with_limit(&mut response, self.max_body_bytes, path)
                .await
                .map(|bytes| {
                    String::from_utf8_lossy(&bytes)
                        .chars()
                        .take(ERROR_BODY_EXCERPT_CHARS)
                        .collect::<String>()
                })
                .unwrap_or_default();
            return Err(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let bytes = read_response_body_with_limit(&mut response, self.max_body_bytes, path).await?;
        serde_json::from_slice(&bytes).map_err(|source| FetchError::Decode {
            path: path.to_string(),
            source,
        })
    }

    pub async fn module_preview(&self, module_id: i64) -> Result<ModuleSnapshot, FetchError> {
        self.get_json(&format!("/modules/{module_id}/preview")).await
    }

    pub async fn evaluation_report(&self, module_id: i64, period: u32) -> Result<EvaluationReport, FetchError> {
        self.get_json(&format!("/modules/{module_id}/reports/evaluation/{period}"))
            .await
    }

    /// The module snapshot, then one report per evaluation period fetched concurrently.
    pub async fn fetch_export_input(&self, module_id: i64) -> Result<ExportInput, FetchError> {
        let snapshot = self.module_preview(module_id).await?;
        let periods = snapshot.evaluation_periods();
        log::info!(
            "module {module_id}: {} RAs, {} UTs, {} instruments, {} students, periods {periods:?}",
            snapshot.ras.len(),
            snapshot.uts.len(),
            snapshot.instruments.len(),
            snapshot.students.len()
        );

        let reports = try_join_all(periods.iter().map(|&period| async move {
            self.evaluation_report(module_id, period)
                .await
                .map(|report| (period, report))
        }))
        .await?;

        Ok(ExportInput {
            snapshot,
            reports: reports.into_iter().collect::<BTreeMap<_, _>>(),
        })
    }
}
