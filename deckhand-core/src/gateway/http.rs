use super::types::{ApiItem, ItemsPage, SessionInfo, VirtualFolder};
use super::{GatewayError, MediaServerApi};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use deckhand_model::Instance;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Item fields the planner needs on every listing request.
const ITEM_FIELDS: &str = "Path,MediaSources,SeriesId,SeasonId,ParentIndexNumber,IndexNumber,Type,UserData";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Reqwest-backed gateway for one Emby-compatible instance.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    name: String,
    base: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(instance: &Instance) -> Result<Self, GatewayError> {
        Url::parse(&instance.url)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            name: instance.name.clone(),
            base: instance.url.trim_end_matches('/').to_string(),
            api_key: instance.api_key.clone(),
            client,
        })
    }

    /// Cheap reachability probe against the unauthenticated info endpoint.
    pub async fn ping(&self) -> Result<(), GatewayError> {
        let endpoint = "/System/Info/Public";
        let response = self
            .client
            .get(format!("{}{}", self.base, endpoint))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::Status {
                status: response.status().as_u16(),
                endpoint: endpoint.to_string(),
            });
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        debug!(instance = %self.name, endpoint, "gateway request");
        let response = self
            .client
            .get(format!("{}{}", self.base, endpoint))
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::Status {
                status: response.status().as_u16(),
                endpoint: endpoint.to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MediaServerApi for HttpGateway {
    fn instance_name(&self) -> &str {
        &self.name
    }

    async fn continue_watching(
        &self,
        user_id: &str,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiItem>, GatewayError> {
        let mut params = vec![
            ("Recursive", "true".to_string()),
            ("MediaTypes", "Video".to_string()),
            ("Limit", limit.to_string()),
            ("Fields", ITEM_FIELDS.to_string()),
        ];
        if let Some(cutoff) = since {
            params.push((
                "MinDateLastPlayed",
                cutoff.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        let page: ItemsPage = self
            .get_json(&format!("/Users/{user_id}/Items/Resume"), &params)
            .await?;
        Ok(page.items)
    }

    async fn series_episodes(
        &self,
        user_id: &str,
        series_id: &str,
    ) -> Result<Vec<ApiItem>, GatewayError> {
        let params = vec![
            ("UserId", user_id.to_string()),
            ("Fields", ITEM_FIELDS.to_string()),
            ("SortBy", "ParentIndexNumber,IndexNumber".to_string()),
        ];
        let page: ItemsPage = self
            .get_json(&format!("/Shows/{series_id}/Episodes"), &params)
            .await?;
        Ok(page.items)
    }

    async fn favorite_series(&self, user_id: &str) -> Result<Vec<ApiItem>, GatewayError> {
        let params = vec![
            ("Recursive", "true".to_string()),
            ("IncludeItemTypes", "Series".to_string()),
            ("Filters", "IsFavorite".to_string()),
            ("Fields", ITEM_FIELDS.to_string()),
        ];
        let page: ItemsPage = self
            .get_json(&format!("/Users/{user_id}/Items"), &params)
            .await?;
        Ok(page.items)
    }

    async fn virtual_folders(&self) -> Result<Vec<VirtualFolder>, GatewayError> {
        self.get_json("/Library/VirtualFolders", &[]).await
    }

    async fn active_sessions(&self) -> Result<Vec<SessionInfo>, GatewayError> {
        self.get_json("/Sessions", &[]).await
    }
}
