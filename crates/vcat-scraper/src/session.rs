//! Session and authentication management.
//!
//! Each job resolves one [`AuthMode`] from its profile configuration before
//! any worker is dispatched. Session state lives in the job's `PageClient`
//! cookie store and is discarded with the job; credential secrets are
//! decoded in memory for the duration of a login attempt and never logged.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use url::Url;

use crate::client::PageClient;
use crate::error::ScrapeError;
use crate::extract::{detect_login_form, LoginForm};

/// Stored credential material, as read from the credential store.
///
/// `secret_enc` is the base64-encoded secret; it is only decoded inside
/// [`Session`] login calls.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub secret_enc: String,
    pub service_url: Option<String>,
}

/// How authentication is performed for a job, decided once from the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Public site, direct fetches.
    None,
    /// Submit credentials against a known login endpoint before crawling.
    PreLogin { service_url: String },
    /// Crawl normally; log in reactively when a login prompt appears.
    Interactive,
}

impl AuthMode {
    /// Resolves the auth mode from profile configuration: a configured
    /// service URL selects pre-login, a credential without one selects
    /// interactive login.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::AuthFailed`] when the profile requires
    /// authentication but no credential is linked.
    pub fn resolve(
        auth_required: bool,
        credentials: Option<&Credentials>,
    ) -> Result<Self, ScrapeError> {
        if !auth_required {
            return Ok(AuthMode::None);
        }

        let Some(creds) = credentials else {
            return Err(ScrapeError::AuthFailed {
                reason: "profile requires authentication but has no linked credential".to_string(),
            });
        };

        Ok(match &creds.service_url {
            Some(service_url) => AuthMode::PreLogin {
                service_url: service_url.clone(),
            },
            None => AuthMode::Interactive,
        })
    }
}

/// A job-scoped authenticated browsing context.
pub struct Session<'a> {
    client: &'a PageClient,
    mode: AuthMode,
    credentials: Option<Credentials>,
    logged_in: bool,
}

impl<'a> Session<'a> {
    #[must_use]
    pub fn new(client: &'a PageClient, mode: AuthMode, credentials: Option<Credentials>) -> Self {
        Self {
            client,
            mode,
            credentials,
            logged_in: false,
        }
    }

    #[must_use]
    pub fn mode(&self) -> &AuthMode {
        &self.mode
    }

    /// Establishes the session up front when the mode calls for it.
    ///
    /// `None` and `Interactive` modes are a no-op here; `PreLogin` loads the
    /// login endpoint, locates its form, and submits the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::AuthFailed`] when no login form is present at
    /// the service URL or the submission does not establish a session.
    pub async fn establish(&mut self) -> Result<(), ScrapeError> {
        let AuthMode::PreLogin { service_url } = self.mode.clone() else {
            return Ok(());
        };

        let html = self.client.fetch_page(&service_url).await.map_err(|e| {
            ScrapeError::AuthFailed {
                reason: format!("login endpoint unreachable: {e}"),
            }
        })?;

        let Some(form) = detect_login_form(&html) else {
            return Err(ScrapeError::AuthFailed {
                reason: format!("no login form found at {service_url}"),
            });
        };

        self.submit_login(&service_url, &form).await
    }

    /// Performs an interactive login against a form detected mid-crawl.
    ///
    /// Idempotent once logged in, so concurrent workers hitting the same
    /// login wall submit at most once.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::LoginDetected`] when the job's auth mode has
    /// no way to log in here, or [`ScrapeError::AuthFailed`] when the
    /// submission fails.
    pub async fn login_interactive(
        &mut self,
        page_url: &str,
        form: &LoginForm,
    ) -> Result<(), ScrapeError> {
        if self.logged_in {
            return Ok(());
        }
        if self.mode != AuthMode::Interactive {
            return Err(ScrapeError::LoginDetected {
                url: page_url.to_string(),
            });
        }

        self.submit_login(page_url, form).await
    }

    async fn submit_login(&mut self, page_url: &str, form: &LoginForm) -> Result<(), ScrapeError> {
        let Some(creds) = &self.credentials else {
            return Err(ScrapeError::AuthFailed {
                reason: "no credential available for login".to_string(),
            });
        };

        // Decoded secret stays on this stack frame only.
        let secret = decode_secret(&creds.secret_enc)?;
        let action_url = resolve_action(page_url, form.action.as_deref())?;

        let fields = vec![
            (form.username_field.clone(), creds.username.clone()),
            (form.password_field.clone(), secret),
        ];

        tracing::debug!(url = %action_url, user = %creds.username, "submitting login form");
        let (status, body) = self.client.post_form(&action_url, &fields).await?;

        if status.is_client_error() || status.is_server_error() {
            return Err(ScrapeError::AuthFailed {
                reason: format!("login endpoint answered HTTP {}", status.as_u16()),
            });
        }

        // A login page echoed back means the credentials were rejected.
        if detect_login_form(&body).is_some() {
            return Err(ScrapeError::AuthFailed {
                reason: "login form rejected the credentials".to_string(),
            });
        }

        self.logged_in = true;
        Ok(())
    }
}

fn decode_secret(secret_enc: &str) -> Result<String, ScrapeError> {
    let bytes = BASE64
        .decode(secret_enc)
        .map_err(|_| ScrapeError::AuthFailed {
            reason: "stored secret is not valid base64".to_string(),
        })?;
    String::from_utf8(bytes).map_err(|_| ScrapeError::AuthFailed {
        reason: "stored secret is not valid UTF-8".to_string(),
    })
}

fn resolve_action(page_url: &str, action: Option<&str>) -> Result<String, ScrapeError> {
    let base = Url::parse(page_url).map_err(|e| ScrapeError::InvalidUrl {
        url: page_url.to_string(),
        reason: e.to_string(),
    })?;

    match action {
        None | Some("") => Ok(page_url.to_string()),
        Some(href) => base
            .join(href)
            .map(Into::into)
            .map_err(|e| ScrapeError::InvalidUrl {
                url: href.to_string(),
                reason: e.to_string(),
            }),
    }
}
