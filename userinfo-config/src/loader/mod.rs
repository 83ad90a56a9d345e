pub mod error;

use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::constants::{DEFAULT_CONFIG_FILE, MAX_THUMBNAIL_SIZE};
use crate::models::sources::{EnvConfig, FileConfig};
use crate::models::{
    BackgroundColor, Config, ConfigMetadata, SentinelConfig, ServerConfig,
    ThumbnailConfig, ThumbnailEncoding, TimeoutConfig,
};
use crate::util::{parse_duration, parse_size_list};

use self::error::ConfigLoadError;

/// Composes defaults, an optional TOML file and environment overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
    server_url: Option<String>,
    skip_dotenv: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit config file; wins over `USERINFO_CONFIG`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Explicit `.env` file instead of the one found by walking up from the
    /// working directory.
    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Server URL that wins over every other source.
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn without_dotenv(mut self) -> Self {
        self.skip_dotenv = true;
        self
    }

    /// Load using the process environment.
    pub fn load(&self) -> Result<Config, ConfigLoadError> {
        let env_file = self.load_dotenv()?;
        let mut config = self.load_with_env(&EnvConfig::gather())?;
        config.metadata.env_file = env_file;
        Ok(config)
    }

    /// Load with an already gathered environment. Never touches `.env`.
    pub fn load_with_env(
        &self,
        env: &EnvConfig,
    ) -> Result<Config, ConfigLoadError> {
        let path = self.resolve_config_path(env);
        let file = match path.as_deref() {
            Some(path) => read_file_config(path)?,
            None => FileConfig::default(),
        };

        let mut config = match &self.server_url {
            Some(url) => {
                let mut env = env.clone();
                env.server_url = Some(url.clone());
                compose(&file, &env)?
            }
            None => compose(&file, env)?,
        };
        config.metadata = ConfigMetadata {
            config_path: path,
            env_file: None,
        };
        Ok(config)
    }

    fn resolve_config_path(&self, env: &EnvConfig) -> Option<PathBuf> {
        if let Some(path) = self.config_path.clone() {
            return Some(path);
        }
        if let Some(path) = env.config_path.clone() {
            return Some(path);
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.is_file().then_some(local)
    }

    fn load_dotenv(&self) -> Result<Option<PathBuf>, ConfigLoadError> {
        if self.skip_dotenv {
            return Ok(None);
        }

        if let Some(path) = &self.env_file {
            dotenvy::from_path(path)
                .map_err(|source| ConfigLoadError::EnvFile { source })?;
            return Ok(Some(path.clone()));
        }

        match dotenvy::dotenv() {
            Ok(path) => {
                log::debug!("Loaded environment from {}", path.display());
                Ok(Some(path))
            }
            Err(err) if err.not_found() => Ok(None),
            Err(source) => Err(ConfigLoadError::EnvFile { source }),
        }
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let raw = read_to_string(path).map_err(|source| ConfigLoadError::FileIo {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigLoadError::FileParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge file values over defaults and environment values over both, then
/// validate the result.
pub fn compose(
    file: &FileConfig,
    env: &EnvConfig,
) -> Result<Config, ConfigLoadError> {
    let defaults = Config::default();

    let server = match env.server_url.as_ref().or(file.server.url.as_ref()) {
        Some(raw) => ServerConfig {
            url: parse_server_url(raw)?,
        },
        None => defaults.server,
    };

    let timeouts = TimeoutConfig {
        fetch: pick_duration(
            "timeouts.fetch",
            env.fetch_timeout.as_deref(),
            file.timeouts.fetch.as_deref(),
            defaults.timeouts.fetch,
        )?,
        image: pick_duration(
            "timeouts.image",
            env.image_timeout.as_deref(),
            file.timeouts.image.as_deref(),
            defaults.timeouts.image,
        )?,
    };

    let sizes = match (&env.thumbnail_sizes, &file.thumbnails.sizes) {
        (Some(raw), _) => parse_size_list("thumbnails.sizes", raw)?,
        (None, Some(sizes)) => sizes.clone(),
        (None, None) => defaults.thumbnails.sizes,
    };

    let background = match env
        .thumbnail_background
        .as_ref()
        .or(file.thumbnails.background.as_ref())
    {
        Some(raw) => raw.parse::<BackgroundColor>().map_err(|reason| {
            ConfigLoadError::InvalidValue {
                field: "thumbnails.background",
                value: raw.clone(),
                reason,
            }
        })?,
        None => defaults.thumbnails.background,
    };

    let encoding = match env
        .thumbnail_encoding
        .as_ref()
        .or(file.thumbnails.encoding.as_ref())
    {
        Some(raw) => raw.parse::<ThumbnailEncoding>().map_err(|reason| {
            ConfigLoadError::InvalidValue {
                field: "thumbnails.encoding",
                value: raw.clone(),
                reason,
            }
        })?,
        None => defaults.thumbnails.encoding,
    };

    let sentinel = SentinelConfig {
        name: env
            .sentinel_name
            .clone()
            .or_else(|| file.sentinel.name.clone())
            .unwrap_or(defaults.sentinel.name),
        picture: env
            .sentinel_picture
            .clone()
            .or_else(|| file.sentinel.picture.clone())
            .unwrap_or(defaults.sentinel.picture),
    };

    Ok(Config {
        server,
        timeouts,
        thumbnails: ThumbnailConfig {
            sizes: validate_sizes(sizes)?,
            background,
            encoding,
        },
        sentinel,
        metadata: ConfigMetadata::default(),
    })
}

fn parse_server_url(raw: &str) -> Result<Url, ConfigLoadError> {
    let url = Url::parse(raw.trim()).map_err(|source| {
        ConfigLoadError::InvalidServerUrl {
            value: raw.to_string(),
            source,
        }
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigLoadError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

fn pick_duration(
    field: &'static str,
    env: Option<&str>,
    file: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    let Some(raw) = env.or(file) else {
        return Ok(default);
    };
    let duration = parse_duration(field, raw)?;
    if duration.is_zero() {
        return Err(ConfigLoadError::InvalidValue {
            field,
            value: raw.to_string(),
            reason: "timeout must be greater than zero".to_string(),
        });
    }
    Ok(duration)
}

fn validate_sizes(mut sizes: Vec<u32>) -> Result<Vec<u32>, ConfigLoadError> {
    if sizes.is_empty() {
        return Err(ConfigLoadError::InvalidValue {
            field: "thumbnails.sizes",
            value: String::new(),
            reason: "at least one thumbnail size is required".to_string(),
        });
    }
    if let Some(bad) = sizes
        .iter()
        .find(|size| **size == 0 || **size > MAX_THUMBNAIL_SIZE)
    {
        return Err(ConfigLoadError::InvalidValue {
            field: "thumbnails.sizes",
            value: bad.to_string(),
            reason: format!("sizes must be within 1..={MAX_THUMBNAIL_SIZE}"),
        });
    }
    sizes.sort_unstable();
    sizes.dedup();
    Ok(sizes)
}
