//! Shared configuration library for the user-info cache.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `USERINFO_*` environment variables (a `.env` file is honoured when
//! present). The resulting [`Config`] is validated before it is handed out,
//! so consumers can rely on a parseable server URL, non-zero timeouts and a
//! sorted, de-duplicated thumbnail size list.
#![allow(missing_docs)]

pub mod constants;
pub mod loader;
pub mod models;
pub mod util;

pub use loader::{ConfigLoader, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    BackgroundColor, Config, ConfigMetadata, SentinelConfig, ServerConfig,
    ThumbnailConfig, ThumbnailEncoding, TimeoutConfig,
};
