use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use reqwest::{redirect, Client, RequestBuilder};
use tracing::debug;

use crate::error::TransportError;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 12;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 6;
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default)]
pub struct PortalResponse {
    pub status: u16,
    pub url: String,
    pub location: Option<String>,
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl PortalResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            location: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_cookie(mut self, set_cookie: impl Into<String>) -> Self {
        self.set_cookies.push(set_cookie.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Where the portal sent us: the redirect target if any, else the URL served.
    pub fn destination(&self) -> &str {
        self.location.as_deref().unwrap_or(&self.url)
    }
}

/// HTTP seam between the session manager and the portal. Implementations
/// must not follow redirects or keep cookies on their own.
#[async_trait]
pub trait PortalTransport: Send + Sync {
    async fn get(&self, url: &str, cookie: Option<&str>) -> Result<PortalResponse, TransportError>;

    async fn post_form(
        &self,
        url: &str,
        cookie: Option<&str>,
        form: &[(String, String)],
    ) -> Result<PortalResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        cookie: Option<&str>,
    ) -> Result<PortalResponse, TransportError> {
        let request = match cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response.headers();
        let location = headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let set_cookies = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect::<Vec<_>>();
        let body = response.text().await?;
        debug!("{url} returned {status} ({} bytes)", body.len());
        Ok(PortalResponse {
            status,
            url,
            location,
            set_cookies,
            body,
        })
    }
}

#[async_trait]
impl PortalTransport for ReqwestTransport {
    async fn get(&self, url: &str, cookie: Option<&str>) -> Result<PortalResponse, TransportError> {
        self.execute(self.client.get(url), cookie).await
    }

    async fn post_form(
        &self,
        url: &str,
        cookie: Option<&str>,
        form: &[(String, String)],
    ) -> Result<PortalResponse, TransportError> {
        self.execute(self.client.post(url).form(form), cookie).await
    }
}
