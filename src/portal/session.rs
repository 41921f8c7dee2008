use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::error::{AuthFailure, FetchFailure};
use crate::portal::cookies::CookieJar;
use crate::portal::extract::extract;
use crate::portal::form::{build_login_form, parse_hidden_fields};
use crate::portal::http::PortalTransport;
use crate::portal::PortalUrls;
use crate::types::Snapshot;

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub credentials: Credentials,
    pub token: Option<String>,
    pub authenticated: bool,
}

impl AuthSession {
    fn clear(&mut self) {
        self.token = None;
        self.authenticated = false;
    }
}

/// Owns the portal login. The token has no known expiry; it is dropped only
/// when a fetch is bounced back to the login page or a login attempt fails.
pub struct SessionManager {
    transport: Arc<dyn PortalTransport>,
    urls: PortalUrls,
    session: AuthSession,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn PortalTransport>, urls: PortalUrls, credentials: Credentials) -> Self {
        Self {
            transport,
            urls,
            session: AuthSession {
                credentials,
                token: None,
                authenticated: false,
            },
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.authenticated
    }

    pub fn invalidate(&mut self) {
        self.session.clear();
    }

    pub async fn authenticate(&mut self) -> Result<(), AuthFailure> {
        let result = self.login().await;
        match &result {
            Ok(token) => {
                self.session.token = token.clone();
                self.session.authenticated = true;
                info!("authenticated with portal");
            }
            Err(err) => {
                self.session.clear();
                warn!("portal authentication failed: {err}");
            }
        }
        result.map(|_| ())
    }

    async fn login(&self) -> Result<Option<String>, AuthFailure> {
        let mut jar = CookieJar::default();
        let page = self.transport.get(&self.urls.login, None).await?;
        jar.absorb(&page.set_cookies);
        let hidden = parse_hidden_fields(&page.body)?;
        let form = build_login_form(hidden, &self.session.credentials);

        let response = self
            .transport
            .post_form(&self.urls.login, jar.header().as_deref(), &form)
            .await?;
        jar.absorb(&response.set_cookies);

        let destination = response.destination();
        debug!("login landed on {destination} ({})", response.status);
        if !destination.contains(&self.urls.home_marker) {
            return Err(AuthFailure::RejectedCredentials);
        }
        Ok(jar.header())
    }

    pub async fn fetch_gradebook(&mut self) -> Result<String, FetchFailure> {
        if !self.session.authenticated {
            self.authenticate().await?;
        }
        let response = self
            .transport
            .get(&self.urls.gradebook, self.session.token.as_deref())
            .await?;

        if response.is_server_error() {
            return Err(FetchFailure::ServerError(response.status));
        }
        let bounced = response.is_redirect()
            && response.destination().contains(&self.urls.login_marker);
        // A login page served in place of the gradebook means the same thing.
        let landed_on_login =
            response.is_success() && response.url.contains(&self.urls.login_marker);
        if bounced || landed_on_login {
            self.session.clear();
            return Err(FetchFailure::SessionExpired);
        }
        if !response.is_success() {
            return Err(FetchFailure::UnexpectedStatus(response.status));
        }
        Ok(response.body)
    }

    /// Fetches once, and on failure re-authenticates and fetches exactly once more.
    pub async fn fetch_with_retry(&mut self) -> Result<String, FetchFailure> {
        match self.fetch_gradebook().await {
            Ok(body) => Ok(body),
            Err(first) => {
                warn!("gradebook fetch failed, re-authenticating: {first}");
                self.authenticate().await?;
                self.fetch_gradebook().await
            }
        }
    }

    pub async fn fetch_snapshot(&mut self) -> Result<Snapshot, FetchFailure> {
        let markup = self.fetch_with_retry().await?;
        Ok(extract(&markup))
    }
}
