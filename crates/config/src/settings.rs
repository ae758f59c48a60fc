use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use figpack_archive::ArchiveSettings;
use figpack_download::DownloadSettings;
use figpack_remote::{Backoff, FetchSettings, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

fn non_zero(value: usize, key: &str) -> Result<NonZeroUsize> {
    NonZeroUsize::new(value).ok_or_raise(|| ErrorKind::Invalid(format!("{key} must be greater than zero")))
}

/// The complete configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiConfig,
    pub rate_limit: RateLimitConfig,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub download: DownloadConfig,
    pub archive: ArchiveConfig,
    pub jobs: JobsConfig,
}

impl Settings {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(exn::Exn::from(ErrorKind::Invalid(message.to_string())));
        if self.api.base_url.trim().is_empty() {
            return invalid("api.base_url must not be empty");
        }
        if !self.rate_limit.requests_per_second.is_finite() || self.rate_limit.requests_per_second <= 0.0 {
            return invalid("rate_limit.requests_per_second must be a positive number");
        }
        if self.rate_limit.burst == 0 {
            return invalid("rate_limit.burst must be greater than zero");
        }
        if self.fetch.batch_size == 0 {
            return invalid("fetch.batch_size must be greater than zero");
        }
        if self.fetch.deep_depth == 0 {
            return invalid("fetch.deep_depth must be greater than zero");
        }
        if self.fetch.min_backoff_ms > self.fetch.max_backoff_ms {
            return invalid("fetch.min_backoff_ms must not exceed fetch.max_backoff_ms");
        }
        if self.cache.capacity == 0 {
            return invalid("cache.capacity must be greater than zero");
        }
        if self.download.max_concurrent == 0 {
            return invalid("download.max_concurrent must be greater than zero");
        }
        if self.download.max_attempts == 0 {
            return invalid("download.max_attempts must be greater than zero");
        }
        if self.download.max_image_size_mb == 0 {
            return invalid("download.max_image_size_mb must be greater than zero");
        }
        if self.archive.metadata_file.trim().is_empty() {
            return invalid("archive.metadata_file must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Personal access token. Usually supplied through `FIGPACK_API__TOKEN`.
    pub token: Option<String>,
    pub timeout_secs: u64,
}
impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: "https://api.figma.com/v1".to_string(), token: None, timeout_secs: 60 }
    }
}

/// One gate shared by document fetches and asset downloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    pub burst: u32,
}
impl RateLimitConfig {
    pub fn limiter(&self) -> Result<RateLimiter> {
        RateLimiter::new(self.requests_per_second, self.burst)
            .or_raise(|| ErrorKind::Invalid("rate_limit".to_string()))
    }
}
impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests_per_second: 3.0, burst: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub batch_size: usize,
    pub deep_depth: u32,
    pub batch_delay_ms: u64,
    pub max_retries: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}
impl FetchConfig {
    pub fn settings(&self) -> Result<FetchSettings> {
        Ok(FetchSettings {
            batch_size: non_zero(self.batch_size, "fetch.batch_size")?,
            deep_depth: self.deep_depth,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            backoff: Backoff {
                min: Duration::from_millis(self.min_backoff_ms),
                max: Duration::from_millis(self.max_backoff_ms),
                max_retries: self.max_retries,
            },
        })
    }
}
impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            deep_depth: 10,
            batch_delay_ms: 2_000,
            max_retries: 6,
            min_backoff_ms: 5_000,
            max_backoff_ms: 120_000,
        }
    }
}

/// Fetched documents, keyed by file key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
}
impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn capacity(&self) -> Result<NonZeroUsize> {
        non_zero(self.capacity, "cache.capacity")
    }
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 600, capacity: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub max_concurrent: usize,
    pub max_attempts: u32,
    pub backoff_unit_ms: u64,
    pub max_image_size_mb: u64,
    pub timeout_secs: u64,
    pub start_delay_ms: u64,
}
impl DownloadConfig {
    pub fn settings(&self) -> Result<DownloadSettings> {
        Ok(DownloadSettings {
            max_concurrent: non_zero(self.max_concurrent, "download.max_concurrent")?,
            max_attempts: self.max_attempts,
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
            max_bytes: self.max_image_size_mb.saturating_mul(MIB),
            start_delay: Duration::from_millis(self.start_delay_ms),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            max_attempts: 3,
            backoff_unit_ms: 1_000,
            max_image_size_mb: 50,
            timeout_secs: 30,
            start_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub max_images: usize,
    pub include_index: bool,
    pub index_formats: Vec<String>,
    pub metadata_file: String,
}
impl ArchiveConfig {
    pub fn settings(&self) -> ArchiveSettings {
        ArchiveSettings {
            max_images: self.max_images,
            include_index: self.include_index,
            index_formats: self.index_formats.clone(),
            metadata_file: self.metadata_file.clone(),
        }
    }
}
impl Default for ArchiveConfig {
    fn default() -> Self {
        let defaults = ArchiveSettings::default();
        Self {
            max_images: defaults.max_images,
            include_index: defaults.include_index,
            index_formats: defaults.index_formats,
            metadata_file: defaults.metadata_file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// How long finished tasks stay visible.
    pub removal_grace_secs: u64,
}
impl JobsConfig {
    pub fn removal_grace(&self) -> Duration {
        Duration::from_secs(self.removal_grace_secs)
    }
}
impl Default for JobsConfig {
    fn default() -> Self {
        Self { removal_grace_secs: 300 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid_and_match_components() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.fetch.settings().unwrap(), FetchSettings::default());
        assert_eq!(settings.download.settings().unwrap(), DownloadSettings::default());
        assert_eq!(settings.archive.settings(), ArchiveSettings::default());
        assert_eq!(settings.rate_limit.limiter().unwrap().per_second(), 3.0);
    }

    #[rstest]
    #[case::zero_rate(|s: &mut Settings| s.rate_limit.requests_per_second = 0.0, "requests_per_second")]
    #[case::negative_rate(|s: &mut Settings| s.rate_limit.requests_per_second = -1.0, "requests_per_second")]
    #[case::nan_rate(|s: &mut Settings| s.rate_limit.requests_per_second = f64::NAN, "requests_per_second")]
    #[case::zero_burst(|s: &mut Settings| s.rate_limit.burst = 0, "burst")]
    #[case::zero_batch(|s: &mut Settings| s.fetch.batch_size = 0, "batch_size")]
    #[case::zero_depth(|s: &mut Settings| s.fetch.deep_depth = 0, "deep_depth")]
    #[case::inverted_backoff(|s: &mut Settings| s.fetch.min_backoff_ms = 200_000, "min_backoff_ms")]
    #[case::zero_capacity(|s: &mut Settings| s.cache.capacity = 0, "capacity")]
    #[case::zero_concurrency(|s: &mut Settings| s.download.max_concurrent = 0, "max_concurrent")]
    #[case::zero_attempts(|s: &mut Settings| s.download.max_attempts = 0, "max_attempts")]
    #[case::blank_metadata(|s: &mut Settings| s.archive.metadata_file = " ".to_string(), "metadata_file")]
    fn test_validate_rejects(#[case] change: fn(&mut Settings), #[case] key: &str) {
        let mut settings = Settings::default();
        change(&mut settings);
        let err = settings.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(message) if message.contains(key)), "{err:?}");
    }

    #[test]
    fn test_image_size_is_converted_to_bytes() {
        let download = DownloadConfig { max_image_size_mb: 2, ..DownloadConfig::default() };
        assert_eq!(download.settings().unwrap().max_bytes, 2 * 1024 * 1024);
    }
}
