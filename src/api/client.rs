//! HTTP client for the feed backend

use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::models::{EngagementKind, FeedType, Item, Profile};
use crate::session::Session;

use super::wire::{
    decode_follow, decode_page, decode_profile, decode_single, decode_toggle, error_message,
};
use super::{FeedApi, FollowOutcome, Page, ToggleOutcome};

/// HTTP API client.
///
/// Every request carries the session's bearer token when one is open. A 401
/// invalidates the session and fails the request with
/// [`ApiError::SessionExpired`].
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Session,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateItemRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

impl ApiClient {
    /// Create a new client against a base URL (e.g. `https://host/api`)
    pub fn new(base_url: &str, session: Session) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    /// The session this client authenticates with
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Build API URL
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn viewer(&self) -> Option<String> {
        self.session.user_id()
    }

    async fn get(&self, endpoint: &str) -> ApiResult<Value> {
        let mut request = self.client.get(self.api_url(endpoint));
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!("GET {endpoint} failed: {e}");
            ApiError::from(e)
        })?;
        self.handle_response(response).await
    }

    async fn post<B: Serialize + Sync>(&self, endpoint: &str, body: &B) -> ApiResult<Value> {
        let token = self.session.token().ok_or(ApiError::NotAuthenticated)?;

        let response = self
            .client
            .post(self.api_url(endpoint))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("POST {endpoint} failed: {e}");
                ApiError::from(e)
            })?;
        self.handle_response(response).await
    }

    async fn handle_response(&self, response: Response) -> ApiResult<Value> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate();
            return Err(ApiError::SessionExpired);
        }

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else if status.is_success() {
            serde_json::from_str(&text)?
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(body)
    }

    async fn toggle_kind(&self, id: &str, kind: EngagementKind) -> ApiResult<ToggleOutcome> {
        let endpoint = format!("/items/{}/{}", urlencoding::encode(id), kind.name());
        let body = self.post(&endpoint, &serde_json::json!({})).await?;
        decode_toggle(&body, kind)
    }
}

impl FeedApi for ApiClient {
    async fn feed_page(&self, feed: FeedType, page: u32, limit: u32) -> ApiResult<Page> {
        let endpoint = format!(
            "/items/feed?feedType={}&page={page}&limit={limit}",
            feed.as_query()
        );
        let body = self.get(&endpoint).await?;
        decode_page(body, "items", "tweets", page, self.viewer().as_deref())
    }

    async fn item(&self, id: &str) -> ApiResult<Item> {
        let endpoint = format!("/items/{}", urlencoding::encode(id));
        let body = self.get(&endpoint).await?;
        decode_single(body, self.viewer().as_deref())
    }

    async fn replies(&self, id: &str, page: u32, limit: u32) -> ApiResult<Page> {
        let endpoint = format!(
            "/items/{}/replies?page={page}&limit={limit}",
            urlencoding::encode(id)
        );
        let body = self.get(&endpoint).await?;
        decode_page(body, "replies", "replies", page, self.viewer().as_deref())
    }

    async fn create_item(&self, text: &str, reply_to: Option<&str>) -> ApiResult<Item> {
        let request = CreateItemRequest { text, reply_to };
        let body = self.post("/items", &request).await?;
        decode_single(body, self.viewer().as_deref())
    }

    async fn toggle_favorite(&self, id: &str) -> ApiResult<ToggleOutcome> {
        self.toggle_kind(id, EngagementKind::Favorite).await
    }

    async fn toggle_repost(&self, id: &str) -> ApiResult<ToggleOutcome> {
        self.toggle_kind(id, EngagementKind::Repost).await
    }

    async fn profile(&self, user_id: &str) -> ApiResult<Profile> {
        let endpoint = format!("/users/profile/{}", urlencoding::encode(user_id));
        let body = self.get(&endpoint).await?;
        decode_profile(body)
    }

    async fn toggle_follow(&self, user_id: &str) -> ApiResult<FollowOutcome> {
        let endpoint = format!("/users/{}/follow", urlencoding::encode(user_id));
        let body = self.post(&endpoint, &serde_json::json!({})).await?;
        decode_follow(&body)
    }

    async fn logout(&self) -> ApiResult<()> {
        self.post("/auth/logout", &serde_json::json!({})).await?;
        Ok(())
    }
}
