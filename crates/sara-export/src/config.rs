use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Args;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the backend token is empty")]
    EmptyToken,
    #[error("module id must be positive, got {0}")]
    InvalidModuleId(i64),
    #[error("timeout must be at least one second")]
    ZeroTimeout,
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Validated settings of one export run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportConfig {
    /// Backend root without a trailing slash.
    pub base_url: String,
    /// Bearer token without the `Bearer ` prefix.
    pub token: String,
    pub module_id: i64,
    pub template: PathBuf,
    pub output: PathBuf,
    /// Earlier export to reuse when still compatible.
    pub snapshot: Option<PathBuf>,
    pub timeout: Duration,
}

/// Strip an optional, case-insensitive `Bearer ` prefix.
pub fn normalize_token(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer") => {
            let rest = &raw[6..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest.trim_start()
            } else {
                raw
            }
        }
        _ => raw,
    }
}

fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = reqwest::Url::parse(trimmed).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    Ok(trimmed.to_string())
}

impl ExportConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let token = normalize_token(&args.token);
        if token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        if args.module_id <= 0 {
            return Err(ConfigError::InvalidModuleId(args.module_id));
        }
        if args.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self {
            base_url: validate_base_url(&args.base_url)?,
            token: token.to_string(),
            module_id: args.module_id,
            template: args.template.clone(),
            output: args.output.clone(),
            snapshot: args.snapshot.clone(),
            timeout: Duration::from_secs(args.timeout),
        })
    }
}
