//! Form-based sign-in for Tocaro.
//!
//! Tocaro has no token endpoint. A session is obtained the way the browser
//! does it:
//! 1. GET the sign-in page and scrape the CSRF `authenticity_token`
//! 2. POST the credentials form with that token, keeping the session cookie
//! 3. Scrape the bearer token from the `bootData` script of the page served
//!    after the redirect
//!
//! The bearer token is then sent as `authorization: Bearer <token>` on every
//! API call.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::tocaro::extract::{extract_bearer_token, extract_csrf_token};
use crate::CoreError;

/// Per-session connection settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Scheme and host of the service, without trailing slash.
    pub base_url: String,
    /// Value of the `commit` field, i.e. the sign-in button label.
    pub commit_label: String,
    /// Text the sign-in page shows when credentials are rejected.
    pub failure_phrase: String,
    /// Timeout applied to every request.
    pub timeout: Duration,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl SessionConfig {
    /// Default service URL.
    pub const DEFAULT_BASE_URL: &str = "https://tocaro.im";
    /// Default sign-in button label.
    pub const DEFAULT_COMMIT_LABEL: &str = "サインイン";
    /// Default rejected-credentials message.
    pub const DEFAULT_FAILURE_PHRASE: &str = "メールアドレスかパスワードが間違っています。";
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            commit_label: Self::DEFAULT_COMMIT_LABEL.to_string(),
            failure_phrase: Self::DEFAULT_FAILURE_PHRASE.to_string(),
            timeout: Duration::from_secs(60),
            user_agent: format!("tocaro-export/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Cookie-backed session holding the bearer token once signed in.
#[derive(Debug)]
pub struct AuthSession {
    http_client: Client,
    config: SessionConfig,
    bearer_token: Option<String>,
    epoch_millis: i64,
}

impl AuthSession {
    /// Path of the sign-in page and form target.
    pub const SIGN_IN_PATH: &str = "/sign-in";

    /// Create an unauthenticated session.
    ///
    /// The current time is captured here and sent as the `t` query value on
    /// every API call of this session.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(config: SessionConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| CoreError::Other(format!("creating HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            config,
            bearer_token: None,
            epoch_millis: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Sign in with email and password.
    ///
    /// Calling this again repeats the whole flow and replaces the token.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Http`] if the sign-in page itself is served with 4xx/5xx;
    ///   its body is not searched for a CSRF token and no form is posted
    /// - [`CoreError::CsrfTokenNotFound`] if the sign-in page has no CSRF input
    /// - [`CoreError::SignIn`] if the service rejects the credentials
    /// - [`CoreError::Http`] if the form post answers 4xx/5xx without the
    ///   failure phrase
    /// - [`CoreError::AuthTokenNotFound`] if the signed-in page has no token
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<(), CoreError> {
        self.bearer_token = None;
        let url = self.url(Self::SIGN_IN_PATH);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::Api(format!("sign-in page request failed: {e}")))?;
        let status = response.status();
        let page = response
            .text()
            .await
            .map_err(|e| CoreError::Api(format!("reading sign-in page: {e}")))?;
        if is_error_status(status) {
            return Err(CoreError::Http {
                status,
                url,
                body: page,
            });
        }

        let csrf_token = extract_csrf_token(&page)?;
        log::debug!("got csrf token ({} chars)", csrf_token.len());

        let form = [
            ("email", email),
            ("password", password),
            ("sso_failback", ""),
            ("commit", self.config.commit_label.as_str()),
            ("authenticity_token", csrf_token.as_str()),
        ];
        let response = self
            .http_client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CoreError::Api(format!("sign-in request failed: {e}")))?;
        let status = response.status();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::Api(format!("reading sign-in response: {e}")))?;

        if !self.config.failure_phrase.is_empty() && body.contains(&self.config.failure_phrase) {
            return Err(CoreError::SignIn(
                "credentials rejected, check email and password".to_string(),
            ));
        }
        if is_error_status(status) {
            return Err(CoreError::Http {
                status,
                url: final_url,
                body,
            });
        }

        let token = extract_bearer_token(&body)?.ok_or_else(|| {
            CoreError::AuthTokenNotFound(format!("no bootData in page served by {final_url}"))
        })?;
        self.bearer_token = Some(token);
        log::info!("signed in successfully");
        Ok(())
    }

    /// The bearer token obtained by [`Self::sign_in`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AuthTokenNotFound`] before a successful sign-in.
    pub fn bearer_token(&self) -> Result<&str, CoreError> {
        self.bearer_token
            .as_deref()
            .ok_or_else(|| CoreError::AuthTokenNotFound("sign in first".to_string()))
    }

    /// Whether a bearer token is held.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.bearer_token.is_some()
    }

    /// Millisecond timestamp captured when the session was created.
    #[must_use]
    pub const fn epoch_millis(&self) -> i64 {
        self.epoch_millis
    }

    /// Session settings.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Absolute URL for a service path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    pub(crate) const fn http(&self) -> &Client {
        &self.http_client
    }
}

/// 4xx and 5xx are fatal; anything else left after redirects is accepted.
fn is_error_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const SIGN_IN_PAGE: &str = r#"<html><body>
        <form class="submitOnce" action="/sign-in" method="post">
          <input type="hidden" name="authenticity_token" value="csrf-1">
          <input type="email" name="email">
        </form>
        </body></html>"#;

    const HOME_PAGE: &str = "<html>\n<script>\nvar bootData = {\"currentUser\":{\"credentials\":{\"tocaro\":{\"token\":\"bearer-xyz\"}}}}\n</script>\n</html>\n";

    fn session(server: &MockServer) -> AuthSession {
        AuthSession::new(SessionConfig {
            base_url: server.base_url(),
            ..SessionConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn sign_in_stores_bearer_token() {
        let server = MockServer::start_async().await;
        let page = server.mock(|when, then| {
            when.method(GET).path("/sign-in");
            then.status(200)
                .header("set-cookie", "_tocaro_session=abc; Path=/")
                .body(SIGN_IN_PAGE);
        });
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/sign-in")
                .header("cookie", "_tocaro_session=abc")
                .form_urlencoded_tuple("email", "user@example.com")
                .form_urlencoded_tuple("password", "secret")
                .form_urlencoded_tuple("sso_failback", "")
                .form_urlencoded_tuple("commit", "サインイン")
                .form_urlencoded_tuple("authenticity_token", "csrf-1");
            then.status(200).body(HOME_PAGE);
        });

        let mut session = session(&server);
        assert!(!session.is_authenticated());
        session.sign_in("user@example.com", "secret").await.unwrap();

        assert_eq!(session.bearer_token().unwrap(), "bearer-xyz");
        page.assert_calls(1);
        post.assert_calls(1);
    }

    #[tokio::test]
    async fn rejected_credentials_fail_before_status_check() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/sign-in");
            then.status(200).body(SIGN_IN_PAGE);
        });
        server.mock(|when, then| {
            when.method(POST).path("/sign-in");
            then.status(422)
                .body("<p>メールアドレスかパスワードが間違っています。</p>");
        });

        let err = session(&server).sign_in("a@b.c", "wrong").await.unwrap_err();
        assert!(matches!(err, CoreError::SignIn(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn server_error_without_phrase_is_http_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/sign-in");
            then.status(200).body(SIGN_IN_PAGE);
        });
        server.mock(|when, then| {
            when.method(POST).path("/sign-in");
            then.status(503).body("maintenance");
        });

        let err = session(&server).sign_in("a@b.c", "pw").await.unwrap_err();
        match err {
            CoreError::Http { status, body, .. } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sign_in_page_error_stops_before_post() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/sign-in");
            then.status(502).body(SIGN_IN_PAGE);
        });
        let post = server.mock(|when, then| {
            when.method(POST).path("/sign-in");
            then.status(200).body(HOME_PAGE);
        });

        let err = session(&server).sign_in("a@b.c", "pw").await.unwrap_err();
        match err {
            CoreError::Http { status, url, .. } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert!(url.ends_with("/sign-in"), "{url}");
            }
            other => panic!("expected Http error, got {other:?}"),
        }
        post.assert_calls(0);
    }

    #[test]
    fn only_client_and_server_errors_are_fatal() {
        assert!(!is_error_status(StatusCode::OK));
        assert!(!is_error_status(StatusCode::FOUND));
        assert!(is_error_status(StatusCode::NOT_FOUND));
        assert!(is_error_status(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn missing_csrf_input_stops_before_post() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/sign-in");
            then.status(200).body("<html><body>maintenance</body></html>");
        });
        let post = server.mock(|when, then| {
            when.method(POST).path("/sign-in");
            then.status(200).body(HOME_PAGE);
        });

        let err = session(&server).sign_in("a@b.c", "pw").await.unwrap_err();
        assert!(matches!(err, CoreError::CsrfTokenNotFound(_)));
        post.assert_calls(0);
    }

    #[tokio::test]
    async fn page_without_boot_data_is_auth_token_not_found() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/sign-in");
            then.status(200).body(SIGN_IN_PAGE);
        });
        server.mock(|when, then| {
            when.method(POST).path("/sign-in");
            then.status(200).body("<html>welcome</html>");
        });

        let mut session = session(&server);
        let err = session.sign_in("a@b.c", "pw").await.unwrap_err();
        assert!(matches!(err, CoreError::AuthTokenNotFound(_)));
        assert!(!session.is_authenticated());
    }

    #[test]
    fn bearer_token_requires_sign_in() {
        let session = AuthSession::new(SessionConfig::default()).unwrap();
        assert!(matches!(
            session.bearer_token(),
            Err(CoreError::AuthTokenNotFound(_))
        ));
        assert!(session.epoch_millis() > 0);
    }

    #[test]
    fn url_joins_without_double_slash() {
        let session = AuthSession::new(SessionConfig {
            base_url: "http://localhost:3000/".to_string(),
            ..SessionConfig::default()
        })
        .unwrap();
        assert_eq!(session.url("/sign-in"), "http://localhost:3000/sign-in");
    }
}
