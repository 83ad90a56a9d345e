pub mod sources;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_IMAGE_TIMEOUT, DEFAULT_SENTINEL_NAME,
    DEFAULT_SERVER_URL, DEFAULT_THUMBNAIL_SIZES,
};

/// Fully resolved and validated configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub timeouts: TimeoutConfig,
    pub thumbnails: ThumbnailConfig,
    pub sentinel: SentinelConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL for `/api/user/{id}` and relative avatar URLs.
    pub url: Url,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_SERVER_URL)
                .expect("default server url is valid"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub fetch: Duration,
    pub image: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch: DEFAULT_FETCH_TIMEOUT,
            image: DEFAULT_IMAGE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    /// Sorted, de-duplicated square edge lengths.
    pub sizes: Vec<u32>,
    pub background: BackgroundColor,
    pub encoding: ThumbnailEncoding,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            sizes: DEFAULT_THUMBNAIL_SIZES.to_vec(),
            background: BackgroundColor::default(),
            encoding: ThumbnailEncoding::default(),
        }
    }
}

/// Profile shown for the reserved "deleted user" id.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub name: String,
    pub picture: String,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SENTINEL_NAME.to_string(),
            picture: String::new(),
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// How composited thumbnails are handed to the UI.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ThumbnailEncoding {
    /// Self-contained `data:image/png;base64,...` strings.
    #[default]
    DataUrl,
    /// `blob:` URLs backed by an object store; must be revoked when replaced.
    ObjectUrl,
}

impl FromStr for ThumbnailEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data-url" | "data_url" | "data" => Ok(Self::DataUrl),
            "object-url" | "object_url" | "blob" => Ok(Self::ObjectUrl),
            other => Err(format!(
                "unknown thumbnail encoding '{other}', expected 'data-url' or 'object-url'"
            )),
        }
    }
}

impl fmt::Display for ThumbnailEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataUrl => f.write_str("data-url"),
            Self::ObjectUrl => f.write_str("object-url"),
        }
    }
}

/// Opaque RGB fill drawn behind transparent avatars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackgroundColor(pub [u8; 3]);

impl BackgroundColor {
    pub fn rgb(self) -> [u8; 3] {
        self.0
    }

    pub fn rgba(self) -> [u8; 4] {
        let [r, g, b] = self.0;
        [r, g, b, 0xff]
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        // $user-picture-back
        Self([0xe9, 0xec, 0xef])
    }
}

impl FromStr for BackgroundColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(format!("invalid color '{s}', not hexadecimal"));
        }
        let expanded = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
            6 => hex.to_string(),
            _ => {
                return Err(format!(
                    "invalid color '{s}', expected #rgb or #rrggbb"
                ));
            }
        };

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&expanded[range], 16)
                .map_err(|_| format!("invalid color '{s}', not hexadecimal"))
        };

        Ok(Self([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
    }
}

impl TryFrom<String> for BackgroundColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackgroundColor> for String {
    fn from(value: BackgroundColor) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}
