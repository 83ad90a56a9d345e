//! Client-side cache of chat user profiles.
//!
//! [`UserInfoCache::get_user_info`] hands out a shared [`UserRecord`] right
//! away and fills it in from `GET /api/user/{id}` in the background. Every
//! record with a picture also carries square avatar thumbnails, one per
//! configured size, recomposited whenever the picture changes.
//!
//! ```no_run
//! # async fn run() -> userinfo_core::Result<()> {
//! use userinfo_core::{UserId, UserInfoCache};
//!
//! let config = userinfo_config::Config::default();
//! let cache = UserInfoCache::from_config(&config)?;
//! let record = cache.get_user_info(UserId(42));
//! let mut changes = record.subscribe();
//! let _ = changes.changed().await;
//! println!("{}", record.name());
//! # Ok(())
//! # }
//! ```

mod bootstrap;
pub mod cache;
pub mod compositor;
pub mod directory;
pub mod error;
pub mod link;
pub mod loader;
pub mod model;
pub mod raster;
pub mod record;
pub mod resource;
pub mod testing;

pub use cache::{CacheBuilder, CacheStats, UserInfoCache};
pub use compositor::{Compositor, CompositorBank, CompositorContext};
pub use directory::{HttpUserDirectory, UserDirectory};
pub use error::{Result, UserInfoError};
pub use link::RecompositionLink;
pub use loader::{HttpImageLoader, ImageLoader};
pub use model::{ThumbnailSize, UserId, UserProfile};
pub use raster::{ImageCrateDecoder, ImageDecoder, PixelSurface, RasterSurface};
pub use record::{
    RecordChange, RecordListener, StoreOutcome, UserRecord, UserSnapshot,
};
pub use resource::{
    DerivedImage, ObjectUrlStore, ThumbnailOutput, ThumbnailResource,
};
