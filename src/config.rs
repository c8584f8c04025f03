use crate::error::{FelError, Result};
use std::time::Duration;
use url::Url;

pub const DEFAULT_CERTIFIER: &str = "digifact";

/// Timing and budget of one FEL processing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingConfig {
    /// Delay between two status checks.
    pub poll_interval: Duration,
    /// Status checks allowed before the client declares a timeout.
    pub max_attempts: u32,
    /// Wall-clock budget shown as progress; does not end the session.
    pub display_timeout: Duration,
    pub default_certifier: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_attempts: 20,
            display_timeout: Duration::from_secs(60),
            default_certifier: DEFAULT_CERTIFIER.to_string(),
        }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(FelError::Config("poll interval must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(FelError::Config("max attempts must be at least 1".into()));
        }
        if self.display_timeout.is_zero() {
            return Err(FelError::Config("timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Where and how to reach the invoicing API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL; always ends with `/` so relative joins keep the path prefix.
    pub base_url: Url,
    pub request_timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(30),
        })
    }
}
