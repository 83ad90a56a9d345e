//! Wiring a cache against a real chat server from [`Config`].

use std::sync::Arc;

use userinfo_config::Config;

use crate::cache::UserInfoCache;
use crate::compositor::{CompositorBank, CompositorContext};
use crate::directory::HttpUserDirectory;
use crate::error::Result;
use crate::loader::HttpImageLoader;
use crate::model::UserProfile;
use crate::raster::ImageCrateDecoder;
use crate::resource::{ObjectUrlStore, ThumbnailOutput};

impl UserInfoCache {
    /// HTTP directory, HTTP image loader and CPU compositors for every
    /// configured size. Must be called from within a tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self> {
        let server = config.server.url.clone();
        let directory =
            HttpUserDirectory::new(server.clone(), config.timeouts.fetch)?;
        let loader = HttpImageLoader::new(Some(server), config.timeouts.image)?;

        let object_urls = ObjectUrlStore::new();
        let context = CompositorContext {
            loader: Arc::new(loader),
            decoder: Arc::new(ImageCrateDecoder),
            output: ThumbnailOutput::new(
                config.thumbnails.encoding,
                object_urls.clone(),
            ),
            load_timeout: config.timeouts.image,
        };
        let bank = CompositorBank::new(
            &config.thumbnails.sizes,
            config.thumbnails.background,
            context,
        )?;

        log::info!(
            "User info cache for {} with thumbnails {:?} as {}",
            config.server.url,
            config.thumbnails.sizes,
            config.thumbnails.encoding
        );

        UserInfoCache::builder()
            .directory(Arc::new(directory))
            .compositors(bank)
            .object_urls(object_urls)
            .sentinel(UserProfile::new(
                config.sentinel.name.clone(),
                config.sentinel.picture.clone(),
            ))
            .fetch_timeout(config.timeouts.fetch)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;

    #[tokio::test]
    async fn default_config_maintains_default_sizes() {
        let cache = UserInfoCache::from_config(&Config::default()).unwrap();

        let sizes: Vec<u32> =
            cache.thumbnail_sizes().iter().map(|s| s.pixels()).collect();
        assert_eq!(sizes, vec![32, 48, 64]);
        assert_eq!(cache.get_user_info(UserId::DELETED).name(), "Deleted User");
        assert!(cache.sentinel().derived_images().is_empty());
    }
}
