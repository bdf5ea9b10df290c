//! Panel HTTP client
//!
//! Performs the three panel exchanges (login page refresh, balance fetch, earn
//! post) with a fixed browser header profile. Every status code is returned to
//! the caller; only transport failures surface as errors.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::SET_COOKIE;
use reqwest::{Client, RequestBuilder, Response};

use crate::error::Result;
use crate::session::cookies::CookieJar;

/// Default panel origin
pub const DEFAULT_BASE_URL: &str = "https://panel.orihost.com";

/// Default timeout for every panel call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const LOGIN_PATH: &str = "/auth/login";
const CREDITS_PAGE_PATH: &str = "/store/credits";
const BALANCE_PATH: &str = "/api/client/store";
const EARN_PATH: &str = "/api/client/store/earn";

const USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 6.0; Nexus 5 Build/MRA58N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Mobile Safari/537.36";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json";
const ACCEPT_ENCODING: &str = "gzip, deflate, br";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const SEC_CH_UA: &str = r#""Google Chrome";v="141", "Chromium";v="141", "Not?A_Brand";v="8""#;

/// Raw panel response. Callers branch on `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelResponse {
    pub status: u16,
    pub body: String,
    /// Raw `Set-Cookie` header values
    pub set_cookies: Vec<String>,
}

impl PanelResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            set_cookies: Vec::new(),
        }
    }

    pub fn with_set_cookie(mut self, directive: impl Into<String>) -> Self {
        self.set_cookies.push(directive.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of fetching the login page.
#[derive(Debug, Clone)]
pub struct RefreshedSession {
    /// Status of the login page response
    pub status: u16,
    /// Page body, kept for the meta-tag token fallback
    pub html: String,
    /// Input jar with the response cookies merged in
    pub cookies: CookieJar,
}

/// The three panel interactions an earn loop needs.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// GET the login page and merge returned cookies into a copy of `jar`.
    async fn refresh(&self, jar: &CookieJar) -> Result<RefreshedSession>;

    /// GET the balance endpoint.
    async fn fetch_balance(&self, html: &str, jar: &CookieJar) -> Result<PanelResponse>;

    /// POST an empty body to the earn endpoint.
    async fn post_earn(&self, html: &str, jar: &CookieJar) -> Result<PanelResponse>;
}

/// Configuration for the panel client
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel origin without trailing slash
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PanelConfig {
    /// Create a config pointing at another origin
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }
}

/// reqwest-backed [`SessionClient`]
pub struct PanelClient {
    client: Client,
    config: PanelConfig,
}

impl PanelClient {
    pub fn new(config: PanelConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Headers shared by the two XHR endpoints, in browser order.
    ///
    /// An explicit `Accept-Encoding` stops reqwest adding its own; responses
    /// are still decoded by the client's gzip/brotli/deflate features.
    fn xhr(&self, builder: RequestBuilder, html: &str, jar: &CookieJar, with_origin: bool) -> RequestBuilder {
        let token = jar.xsrf_token(html);
        let mut builder = builder
            .header("Accept", ACCEPT_JSON)
            .header("Accept-Encoding", ACCEPT_ENCODING)
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .header("Cookie", jar.header_value());
        if with_origin {
            builder = builder.header("Origin", self.config.base_url.as_str());
        }
        builder
            .header("Referer", self.url(CREDITS_PAGE_PATH))
            .header("User-Agent", USER_AGENT)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-XSRF-TOKEN", token)
    }

    async fn into_panel_response(response: Response) -> Result<PanelResponse> {
        let status = response.status().as_u16();
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = response.text().await?;
        Ok(PanelResponse {
            status,
            body,
            set_cookies,
        })
    }
}

#[async_trait]
impl SessionClient for PanelClient {
    async fn refresh(&self, jar: &CookieJar) -> Result<RefreshedSession> {
        let response = self
            .client
            .get(self.url(LOGIN_PATH))
            .header("Accept", ACCEPT_HTML)
            .header("Accept-Encoding", ACCEPT_ENCODING)
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .header("Cache-Control", "no-cache")
            .header("Cookie", jar.header_value())
            .header("Referer", format!("{}/", self.config.base_url))
            .header("Sec-Ch-Ua", SEC_CH_UA)
            .header("Sec-Ch-Ua-Mobile", "?1")
            .header("Sec-Ch-Ua-Platform", "\"Android\"")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "same-origin")
            .header("Sec-Fetch-User", "?1")
            .header("Upgrade-Insecure-Requests", "1")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let page = Self::into_panel_response(response).await?;
        debug!(
            "login page returned {} with {} cookie directive(s)",
            page.status,
            page.set_cookies.len()
        );

        Ok(RefreshedSession {
            status: page.status,
            cookies: jar.merged_with(&page.set_cookies),
            html: page.body,
        })
    }

    async fn fetch_balance(&self, html: &str, jar: &CookieJar) -> Result<PanelResponse> {
        let builder = self.client.get(self.url(BALANCE_PATH));
        let response = self.xhr(builder, html, jar, false).send().await?;
        Self::into_panel_response(response).await
    }

    async fn post_earn(&self, html: &str, jar: &CookieJar) -> Result<PanelResponse> {
        let builder = self.client.post(self.url(EARN_PATH)).body("");
        let response = self.xhr(builder, html, jar, true).send().await?;
        Self::into_panel_response(response).await
    }
}
