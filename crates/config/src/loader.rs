use crate::error::{ErrorKind, Result};
use crate::settings::Settings;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "FIGPACK_";

/// `config.toml` in the platform configuration directory, if the platform has one.
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "figpack").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn file_provider(figment: Figment, path: &Path) -> Figment {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => figment.merge(Toml::file_exact(path)),
    }
}

/// Defaults, then the configuration file, then the environment.
///
/// The default location is only read when a file exists there.
pub fn figment(path: Option<&Path>) -> Figment {
    let figment = Figment::from(Serialized::defaults(Settings::default()));
    let figment = match path.map(Path::to_path_buf).or_else(|| default_path().filter(|default| default.is_file())) {
        Some(path) => file_provider(figment, &path),
        None => figment,
    };
    figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
}

impl Settings {
    /// Load and validate the configuration. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if path.is_some_and(|path| !path.is_file()) {
            tracing::error!(?path, "Configuration file not found");
            exn::bail!(ErrorKind::Load);
        }
        let settings: Settings = figment(path).extract().or_raise(|| ErrorKind::Load)?;
        settings.validate()?;
        tracing::debug!(?path, "Loaded configuration");
        Ok(settings)
    }
}
