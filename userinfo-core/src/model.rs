//! Identifiers and wire types shared across the cache.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable user identifier as assigned by the chat server.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i32);

impl UserId {
    /// Reserved id of the "deleted user" sentinel record.
    pub const DELETED: UserId = UserId(0);

    /// Whether this is [`UserId::DELETED`].
    pub fn is_sentinel(self) -> bool {
        self == Self::DELETED
    }

    /// Raw wire value.
    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl From<i32> for UserId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Body of `GET /api/user/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name; empty if the server omits it.
    #[serde(default)]
    pub name: String,
    /// Avatar URL, absolute, relative or `data:`; empty for none.
    #[serde(default)]
    pub picture: String,
}

impl UserProfile {
    /// Profile with the given fields.
    pub fn new(name: impl Into<String>, picture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            picture: picture.into(),
        }
    }
}

/// Square thumbnail edge length in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThumbnailSize(NonZeroU32);

impl ThumbnailSize {
    /// `None` for zero.
    pub fn new(pixels: u32) -> Option<Self> {
        NonZeroU32::new(pixels).map(Self)
    }

    /// Edge length in pixels.
    pub fn pixels(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}px", self.0)
    }
}
