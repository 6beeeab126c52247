//! External collaborators consumed by the rowpipe pipeline.
//!
//! This crate provides:
//! - [`ObjectSource`]: batch object reads ([`LocalObjectSource`], [`HttpObjectSource`])
//! - [`Notifier`]: best-effort outcome events ([`LogNotifier`], [`WebhookNotifier`])
//!
//! Adapters are built once from configuration via [`object_source_from_config`]
//! and [`notifier_from_config`].

mod notify;
mod source;

use std::sync::Arc;

use rowpipe_shared::{NotifierConfig, ObjectSourceConfig, Result, RowpipeError};
use tracing::info;
use url::Url;

pub use notify::{LogNotifier, Notification, Notifier, WebhookNotifier};
pub use source::{HttpObjectSource, LocalObjectSource, ObjectSource};

/// User-Agent string for outbound HTTP requests.
const USER_AGENT: &str = concat!("rowpipe/", env!("CARGO_PKG_VERSION"));

/// Build the object source described by `config`.
pub fn object_source_from_config(config: &ObjectSourceConfig) -> Result<Arc<dyn ObjectSource>> {
    match &config.endpoint {
        Some(endpoint) => {
            let url = parse_endpoint(endpoint, "object_source")?;
            let token = config.credentials.resolve_token()?;
            info!(endpoint = %url, region = %config.region, "using HTTP object source");
            Ok(Arc::new(HttpObjectSource::new(
                url,
                token,
                config.timeout_secs,
            )?))
        }
        None => {
            info!(root = %config.root, "using local object source");
            Ok(Arc::new(LocalObjectSource::new(&config.root)))
        }
    }
}

/// Build the notifier described by `config`.
pub fn notifier_from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
    match &config.endpoint {
        Some(endpoint) => {
            let url = parse_endpoint(endpoint, "notifier")?;
            let token = config.credentials.resolve_token()?;
            info!(endpoint = %url, region = %config.region, "using webhook notifier");
            Ok(Arc::new(WebhookNotifier::new(
                url,
                token,
                config.subject_prefix.clone(),
                config.timeout_secs,
            )?))
        }
        None => Ok(Arc::new(LogNotifier::new(config.subject_prefix.clone()))),
    }
}

fn parse_endpoint(endpoint: &str, section: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| RowpipeError::config(format!("[{section}] endpoint '{endpoint}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RowpipeError::config(format!(
            "[{section}] endpoint scheme '{other}' is not supported (expected http or https)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_must_be_http() {
        assert!(parse_endpoint("https://hooks.example.com/x", "notifier").is_ok());
        let err = parse_endpoint("ftp://files.example.com", "object_source").unwrap_err();
        assert!(err.to_string().contains("not supported"));
        assert!(parse_endpoint("not a url", "notifier").is_err());
    }

    #[test]
    fn defaults_build_local_adapters() {
        assert!(object_source_from_config(&ObjectSourceConfig::default()).is_ok());
        assert!(notifier_from_config(&NotifierConfig::default()).is_ok());
    }
}
