use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::env;
use crate::util::non_blank;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub timeouts: FileTimeoutConfig,
    #[serde(default)]
    pub thumbnails: FileThumbnailConfig,
    #[serde(default)]
    pub sentinel: FileSentinelConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileTimeoutConfig {
    /// Humantime string, e.g. `"10s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileThumbnailConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSentinelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_url: Option<String>,
    pub fetch_timeout: Option<String>,
    pub image_timeout: Option<String>,
    pub thumbnail_sizes: Option<String>,
    pub thumbnail_background: Option<String>,
    pub thumbnail_encoding: Option<String>,
    pub sentinel_name: Option<String>,
    pub sentinel_picture: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset,
    /// except for the sentinel picture where empty is meaningful.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            config_path: non_blank(lookup(env::CONFIG_PATH))
                .map(PathBuf::from),
            server_url: non_blank(lookup(env::SERVER_URL)),
            fetch_timeout: non_blank(lookup(env::FETCH_TIMEOUT)),
            image_timeout: non_blank(lookup(env::IMAGE_TIMEOUT)),
            thumbnail_sizes: non_blank(lookup(env::THUMBNAIL_SIZES)),
            thumbnail_background: non_blank(lookup(
                env::THUMBNAIL_BACKGROUND,
            )),
            thumbnail_encoding: non_blank(lookup(env::THUMBNAIL_ENCODING)),
            sentinel_name: non_blank(lookup(env::SENTINEL_NAME)),
            sentinel_picture: lookup(env::SENTINEL_PICTURE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_treats_blank_values_as_unset() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (env::SERVER_URL, "  "),
            (env::THUMBNAIL_SIZES, "32,48"),
            (env::SENTINEL_PICTURE, ""),
        ]);
        let env = EnvConfig::from_lookup(|name| {
            vars.get(name).map(|value| value.to_string())
        });

        assert!(env.server_url.is_none());
        assert_eq!(env.thumbnail_sizes.as_deref(), Some("32,48"));
        assert_eq!(env.sentinel_picture.as_deref(), Some(""));
        assert!(env.config_path.is_none());
    }

    #[test]
    fn file_config_sections_are_optional() {
        let parsed: FileConfig = toml::from_str(
            r#"
            [thumbnails]
            sizes = [48, 32]
            "#,
        )
        .unwrap();

        assert!(parsed.server.url.is_none());
        assert_eq!(parsed.thumbnails.sizes, Some(vec![48, 32]));
        assert!(parsed.timeouts.fetch.is_none());
    }
}
