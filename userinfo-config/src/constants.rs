//! Default values and environment variable names.

use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3030";

/// Upper bound for a single user profile request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for loading a single avatar source image.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Group list, member list and message gutter avatars.
pub const DEFAULT_THUMBNAIL_SIZES: [u32; 3] = [32, 48, 64];

pub const DEFAULT_THUMBNAIL_BACKGROUND: &str = "#e9ecef";

pub const DEFAULT_SENTINEL_NAME: &str = "Deleted User";

pub const MAX_THUMBNAIL_SIZE: u32 = 1024;

pub const DEFAULT_CONFIG_FILE: &str = "userinfo.toml";

pub mod env {
    pub const CONFIG_PATH: &str = "USERINFO_CONFIG";
    pub const SERVER_URL: &str = "USERINFO_SERVER_URL";
    pub const FETCH_TIMEOUT: &str = "USERINFO_FETCH_TIMEOUT";
    pub const IMAGE_TIMEOUT: &str = "USERINFO_IMAGE_TIMEOUT";
    pub const THUMBNAIL_SIZES: &str = "USERINFO_THUMBNAIL_SIZES";
    pub const THUMBNAIL_BACKGROUND: &str = "USERINFO_THUMBNAIL_BACKGROUND";
    pub const THUMBNAIL_ENCODING: &str = "USERINFO_THUMBNAIL_ENCODING";
    pub const SENTINEL_NAME: &str = "USERINFO_SENTINEL_NAME";
    pub const SENTINEL_PICTURE: &str = "USERINFO_SENTINEL_PICTURE";
}
