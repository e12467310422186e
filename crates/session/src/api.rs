// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote account service: profile, timezone, and agreement endpoints.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ApiError;
use crate::profile::{Agreement, Envelope, Profile};

/// Header carrying the client's IANA timezone.
pub const TIMEZONE_HEADER: &str = "X-Timezone";

/// Calls this layer makes against the account service. All take the raw
/// bearer token.
pub trait AuthApi: Send + Sync + 'static {
    /// `GET` the authenticated profile. 401/403 map to [`ApiError::Unauthorized`].
    fn fetch_profile(&self, token: &str) -> impl Future<Output = Result<Profile, ApiError>> + Send;

    /// Record the user's timezone server-side.
    fn set_timezone(
        &self,
        token: &str,
        timezone: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Latest agreement of `kind` and whether the user accepted it.
    fn latest_agreement(
        &self,
        token: &str,
        kind: &str,
    ) -> impl Future<Output = Result<Agreement, ApiError>> + Send;

    /// Record acceptance of the agreement identified by `uuid`.
    fn accept_agreement(
        &self,
        token: &str,
        uuid: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// HTTP implementation of [`AuthApi`].
pub struct HttpAuthApi {
    base_url: Url,
    locale: String,
    timezone: String,
    client: Client,
}

impl HttpAuthApi {
    pub fn new(base_url: Url, locale: impl Into<String>, timezone: impl Into<String>) -> Self {
        crate::ensure_crypto();
        let client = Client::builder().timeout(Duration::from_secs(10)).build().unwrap_or_default();
        Self { base_url, locale: locale.into(), timezone: timezone.into(), client }
    }

    /// Absolute URL for `segments` under the base URL, each segment escaped.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Network(format!("base url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, req: RequestBuilder, token: &str) -> RequestBuilder {
        req.bearer_auth(token)
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, self.locale.as_str())
            .header(TIMEZONE_HEADER, self.timezone.as_str())
    }

    async fn send(&self, req: RequestBuilder, token: &str) -> Result<reqwest::Response, ApiError> {
        let resp = self.authed(req, token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16()));
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, token: &str) -> Result<T, ApiError> {
        let resp = self.send(self.client.get(url), token).await?;
        let bytes = resp.bytes().await?;
        let envelope: Envelope<T> =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(envelope.into_inner())
    }
}

impl AuthApi for HttpAuthApi {
    async fn fetch_profile(&self, token: &str) -> Result<Profile, ApiError> {
        let url = self.endpoint(&["api", "account", "profile"])?;
        self.get_json(url, token).await
    }

    async fn set_timezone(&self, token: &str, timezone: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "account", "timezone", "set"])?;
        let body = serde_json::json!({ "timezone": timezone });
        self.send(self.client.post(url).json(&body), token).await?;
        Ok(())
    }

    async fn latest_agreement(&self, token: &str, kind: &str) -> Result<Agreement, ApiError> {
        let url = self.endpoint(&["api", "common", "setting", "agreement", "latest", kind])?;
        self.get_json(url, token).await
    }

    async fn accept_agreement(&self, token: &str, uuid: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "common", "setting", "agreement", "accept", uuid])?;
        self.send(self.client.put(url), token).await?;
        Ok(())
    }
}
