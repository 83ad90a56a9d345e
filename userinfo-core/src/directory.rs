//! Source of user profiles: the chat server's user endpoint.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::{Result, UserInfoError};
use crate::model::{UserId, UserProfile};

/// Looks up the profile of a single user.
#[async_trait]
pub trait UserDirectory: Send + Sync + Debug {
    /// Non-success responses surface as [`UserInfoError::Status`].
    ///
    /// [`UserInfoError::Status`]: crate::UserInfoError::Status
    async fn fetch_user(&self, id: UserId) -> Result<UserProfile>;
}

/// `GET {base}/api/user/{id}` returning `{ "name": ..., "picture": ... }`.
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    client: Client,
    base_url: Url,
}

impl HttpUserDirectory {
    /// Directory with its own client bounded by `timeout` per request.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UserInfoError::Network(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Directory sharing an existing client.
    pub fn with_client(client: Client, mut base_url: Url) -> Self {
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { client, base_url }
    }

    /// Endpoint queried for `id`.
    pub fn user_url(&self, id: UserId) -> Result<Url> {
        self.base_url
            .join(&format!("api/user/{id}"))
            .map_err(|e| UserInfoError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn fetch_user(&self, id: UserId) -> Result<UserProfile> {
        let url = self.user_url(id)?;
        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(UserInfoError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }

        Ok(response.json::<UserProfile>().await?)
    }
}
