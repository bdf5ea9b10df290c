//! Session layer - cookie jar handling and the panel HTTP client
//!
//! This module provides:
//! - CookieJar with monotonic `Set-Cookie` merging and token resolution
//! - SessionClient trait for the three panel exchanges
//! - PanelClient, the reqwest implementation with the browser header profile

pub mod client;
pub mod cookies;

pub use client::{DEFAULT_BASE_URL, PanelClient, PanelConfig, PanelResponse, RefreshedSession, SessionClient};
pub use cookies::{CookieJar, XSRF_COOKIE};
