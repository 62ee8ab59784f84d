//! Per-instance client for the media-server API.
//!
//! One gateway per configured [`deckhand_model::Instance`], stateless
//! beyond connection parameters. A single instance being unreachable must
//! never abort the whole cycle: callers record a warning and continue,
//! and must never read a failure as "nothing is playing".

mod http;
mod types;

pub use http::HttpGateway;
pub use types::{ApiItem, ItemsPage, MediaSource, SessionInfo, UserData, VirtualFolder};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// The slice of the server API the planner depends on.
#[async_trait]
pub trait MediaServerApi: Send + Sync {
    /// Name of the owning instance, for logs and warnings.
    fn instance_name(&self) -> &str;

    /// Resumable items for a user, most-recently-resumed first,
    /// optionally restricted to items played since `since`.
    async fn continue_watching(
        &self,
        user_id: &str,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ApiItem>, GatewayError>;

    /// Every episode of a series the user can see, with whatever
    /// season/episode metadata the server knows. Order is not trusted;
    /// callers re-sort by ordering key.
    async fn series_episodes(
        &self,
        user_id: &str,
        series_id: &str,
    ) -> Result<Vec<ApiItem>, GatewayError>;

    /// Series the user marked as favorites.
    async fn favorite_series(&self, user_id: &str) -> Result<Vec<ApiItem>, GatewayError>;

    /// Server-side libraries with their collection types; advisory input
    /// for library-kind cross-checks.
    async fn virtual_folders(&self) -> Result<Vec<VirtualFolder>, GatewayError>;

    /// Currently-playing sessions across all users of the instance.
    async fn active_sessions(&self) -> Result<Vec<SessionInfo>, GatewayError>;
}
