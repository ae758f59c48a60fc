//! Layered configuration for figpack.
//!
//! [`Settings`] are assembled by `figment` from, in increasing precedence:
//!
//! 1. built-in defaults,
//! 2. a configuration file (TOML, YAML or JSON, chosen by extension),
//! 3. `FIGPACK_`-prefixed environment variables, with `__` separating nested
//!    keys (`FIGPACK_RATE_LIMIT__REQUESTS_PER_SECOND=1.5`).
//!
//! Without an explicit path the file is looked up in the platform
//! configuration directory (`~/.config/figpack/config.toml` on Linux) and
//! silently skipped when absent.

pub mod error;
mod loader;
mod settings;

pub use crate::loader::{ENV_PREFIX, default_path, figment};
pub use crate::settings::{
    ApiConfig, ArchiveConfig, CacheConfig, DownloadConfig, FetchConfig, JobsConfig, RateLimitConfig, Settings,
};
