//! REST client implementing [`CollectionClient`].

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use url::Url;

use super::convert::{
    FIRST_CURSOR, RateLimitStatus, to_caller, to_collection_page, to_collection_ref,
    to_rate_limits, to_resolved_user, to_user_page,
};
use super::error::{DEFAULT_RATE_LIMIT_RESET_MINUTES, RestError};
use super::types::{
    CursoredLists, ErrorEnvelope, FriendshipShow, RateLimitResponse, WireList, WireUser,
};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::remote::{
    self, Caller, CollectionClient, CollectionRef, FollowKind, MAX_ADD_IDS, MAX_LOOKUP_IDS, Page,
    Relationship, ResolvedUser, UserRef,
};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com/1.1";

/// Request timeout of the default transport.
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Page sizes accepted by the cursored endpoints.
const LIST_PAGE_SIZE: u32 = 1000;
const MEMBER_PAGE_SIZE: u32 = 5000;
const FOLLOW_PAGE_SIZE: u32 = 200;

type Query<'a> = [(&'a str, String)];

/// REST API client.
///
/// Authenticates with a bearer token. Request signing is left to whatever
/// issued the token.
#[derive(Clone)]
pub struct RestClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    token: String,
}

impl RestClient {
    /// Create a client using the reqwest transport.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use listsync::rest::{DEFAULT_BASE_URL, RestClient};
    ///
    /// let client = RestClient::new(DEFAULT_BASE_URL, &token)?;
    /// let caller = client.verify_caller().await?;
    /// ```
    pub fn new(base_url: &str, token: &str) -> Result<Self, RestError> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)
            .map_err(|e| RestError::Config(e.to_string()))?;
        Self::new_with_transport(base_url, token, Arc::new(transport))
    }

    pub fn new_with_transport(
        base_url: &str,
        token: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, RestError> {
        if token.trim().is_empty() {
            return Err(RestError::Config("API token is empty".to_string()));
        }
        // Url::join drops the last segment unless the base ends with '/'.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| RestError::Config(format!("invalid base URL '{}': {}", base_url, e)))?;

        Ok(Self {
            transport,
            base_url,
            token: token.to_string(),
        })
    }

    /// The API root requests are resolved against.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn url(&self, path: &str, query: &Query<'_>) -> Result<String, RestError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| RestError::Config(format!("invalid path '{}': {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url.into())
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RestError> {
        let request = request
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", self.token));
        let method = request.method.as_str();
        let url = request.url.clone();

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RestError::Http(e.to_string()))?;

        tracing::debug!(method, %url, status = response.status, "API response");

        if response.is_success() {
            return Ok(response);
        }

        if response.status == 429 {
            let reset_at = response
                .header("x-rate-limit-reset")
                .and_then(|v| v.trim().parse::<i64>().ok())
                .and_then(|epoch| chrono::DateTime::from_timestamp(epoch, 0))
                .unwrap_or_else(|| {
                    Utc::now() + chrono::Duration::minutes(DEFAULT_RATE_LIMIT_RESET_MINUTES)
                });
            return Err(RestError::RateLimited { reset_at });
        }

        Err(RestError::Api {
            status: response.status,
            message: error_message(&response.body),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &Query<'_>) -> Result<T, RestError> {
        let response = self.send(HttpRequest::get(self.url(path, query)?)).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, form: &Query<'_>) -> Result<T, RestError> {
        let request = HttpRequest::post_form(self.url(path, &[])?, form);
        let response = self.send(request).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn verify_caller_internal(&self) -> Result<Caller, RestError> {
        let url = self.url(
            "account/verify_credentials.json",
            &[
                ("skip_status", "true".to_string()),
                ("include_entities", "false".to_string()),
            ],
        )?;
        let response = self.send(HttpRequest::get(url)).await?;
        let user: WireUser = serde_json::from_slice(&response.body)?;
        to_caller(user, response.header("x-access-level"))
    }

    async fn find_collection_internal(&self, name: &str) -> Result<Option<CollectionRef>, RestError> {
        let mut cursor = None;
        loop {
            let page = self.collection_page(cursor).await?;
            if let Some(list) = page.items.into_iter().find(|list| list.name == name) {
                return Ok(Some(list));
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(None),
            }
        }
    }

    async fn collection_page(&self, cursor: Option<String>) -> Result<Page<CollectionRef>, RestError> {
        let page: CursoredLists = self
            .get(
                "lists/ownerships.json",
                &[
                    ("count", LIST_PAGE_SIZE.to_string()),
                    ("cursor", cursor.unwrap_or_else(|| FIRST_CURSOR.to_string())),
                ],
            )
            .await?;
        to_collection_page(page)
    }

    /// Current rate-limit status, optionally restricted to some resource
    /// families (`lists`, `friends`, ...).
    ///
    /// This is a REST-only diagnostic and not part of [`CollectionClient`].
    pub async fn rate_limit_status(
        &self,
        resources: &[String],
    ) -> Result<Vec<RateLimitStatus>, RestError> {
        let mut query = Vec::new();
        if !resources.is_empty() {
            query.push(("resources", resources.join(",")));
        }
        let response: RateLimitResponse = self
            .get("application/rate_limit_status.json", &query)
            .await?;
        to_rate_limits(response)
    }

    async fn user_page(
        &self,
        path: &str,
        mut query: Vec<(&str, String)>,
        cursor: Option<String>,
    ) -> Result<Page<UserRef>, RestError> {
        query.push(("cursor", cursor.unwrap_or_else(|| FIRST_CURSOR.to_string())));
        query.push(("skip_status", "true".to_string()));
        query.push(("include_user_entities", "false".to_string()));
        to_user_page(self.get(path, &query).await?)
    }

    async fn bulk_lookup_internal(&self, user_ids: &[String]) -> Result<Vec<ResolvedUser>, RestError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        if user_ids.len() > MAX_LOOKUP_IDS {
            return Err(RestError::Config(format!(
                "lookup of {} users exceeds the maximum of {}",
                user_ids.len(),
                MAX_LOOKUP_IDS
            )));
        }

        let result: Result<Vec<WireUser>, RestError> = self
            .post(
                "users/lookup.json",
                &[
                    ("user_id", user_ids.join(",")),
                    ("include_entities", "false".to_string()),
                ],
            )
            .await;

        match result {
            // The API answers 404 when none of the ids resolve.
            Err(RestError::Api { status: 404, .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
            Ok(users) => users.into_iter().map(to_resolved_user).collect(),
        }
    }

    async fn add_members_internal(
        &self,
        collection: &CollectionRef,
        user_ids: &[String],
    ) -> Result<CollectionRef, RestError> {
        if user_ids.len() > MAX_ADD_IDS {
            return Err(RestError::Config(format!(
                "batch of {} users exceeds the maximum of {}",
                user_ids.len(),
                MAX_ADD_IDS
            )));
        }
        let list: WireList = self
            .post(
                "lists/members/create_all.json",
                &[
                    ("list_id", collection.id.clone()),
                    ("user_id", user_ids.join(",")),
                ],
            )
            .await?;
        to_collection_ref(list)
    }
}

#[async_trait]
impl CollectionClient for RestClient {
    async fn verify_caller(&self) -> remote::Result<Caller> {
        Ok(self.verify_caller_internal().await?)
    }

    async fn find_collection(&self, name: &str) -> remote::Result<Option<CollectionRef>> {
        Ok(self.find_collection_internal(name).await?)
    }

    async fn owned_collections(&self, cursor: Option<String>) -> remote::Result<Page<CollectionRef>> {
        Ok(self.collection_page(cursor).await?)
    }

    async fn list_members(
        &self,
        collection: &CollectionRef,
        cursor: Option<String>,
    ) -> remote::Result<Page<UserRef>> {
        let query = vec![
            ("list_id", collection.id.clone()),
            ("count", MEMBER_PAGE_SIZE.to_string()),
        ];
        Ok(self.user_page("lists/members.json", query, cursor).await?)
    }

    async fn bulk_lookup(&self, user_ids: &[String]) -> remote::Result<Vec<ResolvedUser>> {
        Ok(self.bulk_lookup_internal(user_ids).await?)
    }

    async fn relationship(&self, source_id: &str, target_id: &str) -> remote::Result<Relationship> {
        let show: FriendshipShow = self
            .get(
                "friendships/show.json",
                &[
                    ("source_id", source_id.to_string()),
                    ("target_id", target_id.to_string()),
                ],
            )
            .await?;
        let source = show.relationship.source;
        Ok(Relationship {
            blocking: source.blocking,
            blocked_by: source.blocked_by,
        })
    }

    async fn blocked_users(&self, cursor: Option<String>) -> remote::Result<Page<UserRef>> {
        Ok(self.user_page("blocks/list.json", Vec::new(), cursor).await?)
    }

    async fn follow_graph(
        &self,
        user_id: &str,
        kind: FollowKind,
        cursor: Option<String>,
    ) -> remote::Result<Page<UserRef>> {
        let path = match kind {
            FollowKind::Followees => "friends/list.json",
            FollowKind::Followers => "followers/list.json",
        };
        let query = vec![
            ("user_id", user_id.to_string()),
            ("count", FOLLOW_PAGE_SIZE.to_string()),
        ];
        Ok(self.user_page(path, query, cursor).await?)
    }

    async fn create_collection(&self, name: &str) -> remote::Result<CollectionRef> {
        let list: WireList = self
            .post(
                "lists/create.json",
                &[("name", name.to_string()), ("mode", "private".to_string())],
            )
            .await?;
        Ok(to_collection_ref(list)?)
    }

    async fn destroy_collection(&self, collection: &CollectionRef) -> remote::Result<()> {
        let _: WireList = self
            .post("lists/destroy.json", &[("list_id", collection.id.clone())])
            .await?;
        Ok(())
    }

    async fn add_members(
        &self,
        collection: &CollectionRef,
        user_ids: &[String],
    ) -> remote::Result<CollectionRef> {
        Ok(self.add_members_internal(collection, user_ids).await?)
    }
}

/// Pull a readable message out of an error body.
fn error_message(body: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body)
        && let Some(detail) = envelope.errors.into_iter().next()
    {
        return match detail.code {
            Some(code) => format!("{} (code {})", detail.message, code),
            None => detail.message,
        };
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() > 200 {
        let truncated: String = text.chars().take(197).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}
