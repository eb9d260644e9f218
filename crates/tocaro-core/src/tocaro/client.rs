//! Tocaro REST client for groups and messages.
//!
//! All endpoints live under `/api/v3` and authenticate with the bearer token
//! scraped during sign-in. Every request also carries `t=<epoch millis>`,
//! captured once per session, as the web client does.

use serde::de::DeserializeOwned;

use crate::tocaro::auth::{AuthSession, SessionConfig};
use crate::tocaro::models::{Group, GroupType, Message};
use crate::tocaro::pagination::{self, PageSource, PaginationOptions};
use crate::CoreError;

/// Groups listing endpoint.
const GROUPS_PATH: &str = "/api/v3/groups";

/// Tocaro API client.
#[derive(Debug)]
pub struct TocaroClient {
    session: AuthSession,
}

impl TocaroClient {
    /// Create a new, unauthenticated client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        Ok(Self {
            session: AuthSession::new(config)?,
        })
    }

    /// Sign in; see [`AuthSession::sign_in`].
    ///
    /// # Errors
    ///
    /// Propagates every sign-in failure unchanged.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<(), CoreError> {
        self.session.sign_in(email, password).await
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &AuthSession {
        &self.session
    }

    /// List the groups the user has joined.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AuthTokenNotFound`] before sign-in, without any
    /// request, and [`CoreError::Http`] on a non-2xx response.
    pub async fn get_groups(&self, group_type: GroupType) -> Result<Vec<Group>, CoreError> {
        log::info!("fetching {group_type} groups");
        let url = self.session.url(GROUPS_PATH);
        let query = vec![
            ("type", group_type.as_str().to_string()),
            ("t", self.session.epoch_millis().to_string()),
        ];
        let groups: Vec<Group> = self.get_json(&url, &query).await?;
        log::info!("got {} groups", groups.len());
        Ok(groups)
    }

    /// Fetch one page of messages.
    ///
    /// Without a cursor (or with an empty one) the first page is returned;
    /// otherwise the page following the message with that ulid.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AuthTokenNotFound`] before sign-in, without any
    /// request, and [`CoreError::Http`] on a non-2xx response.
    pub async fn get_messages(
        &self,
        group_id: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<Message>, CoreError> {
        let url = self.session.url(&format!(
            "{GROUPS_PATH}/{}/messages",
            urlencoding::encode(group_id)
        ));
        let mut query = vec![("t", self.session.epoch_millis().to_string())];
        if let Some(ulid) = cursor.filter(|c| !c.is_empty()) {
            query.push(("ulid", ulid.to_string()));
        }
        self.get_json(&url, &query).await
    }

    /// Fetch a group's whole history, page by page, until an empty page.
    ///
    /// # Errors
    ///
    /// Propagates the first failing page fetch, and returns
    /// [`CoreError::PageLimitExceeded`] when `options.max_pages` is hit.
    pub async fn get_all_messages(
        &self,
        group_id: &str,
        options: PaginationOptions,
    ) -> Result<Vec<Message>, CoreError> {
        log::info!("fetching all messages of group {group_id}");
        pagination::collect_all(self, group_id, options).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, CoreError> {
        let token = self.session.bearer_token()?;

        let response = self
            .session
            .http()
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| CoreError::Api(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Http { status, url, body });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CoreError::Serialization(format!("parsing response from {url}: {e}")))
    }
}

impl PageSource for TocaroClient {
    async fn fetch_page(
        &self,
        group_id: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<Message>, CoreError> {
        self.get_messages(group_id, cursor).await
    }
}
