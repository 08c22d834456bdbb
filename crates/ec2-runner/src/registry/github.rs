// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! GitHub Actions self-hosted runner registry over the REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::traits::*;

/// REST API version header value.
pub const API_VERSION: &str = "2022-11-28";

const PER_PAGE: usize = 100;

/// Connection settings for [`GithubRegistry`].
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// REST API base, e.g. `https://api.github.com`.
    pub api_url: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Token with administration rights on the repository.
    pub token: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl GithubConfig {
    /// Create a config for `owner/repo`.
    pub fn new(
        api_url: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize)]
struct RunnerPage {
    total_count: usize,
    runners: Vec<RunnerDescriptor>,
}

#[derive(Deserialize)]
struct RegistrationToken {
    token: String,
}

/// Runner registry backed by `/repos/{owner}/{repo}/actions/runners`.
pub struct GithubRegistry {
    http: reqwest::Client,
    base: String,
}

impl GithubRegistry {
    /// Create a registry client.
    pub fn new(config: GithubConfig) -> RegistryResult<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| RegistryError::Decode(format!("invalid token: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("ec2-runner/", env!("CARGO_PKG_VERSION"))),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        let base = format!(
            "{}/repos/{}/{}/actions/runners",
            config.api_url.trim_end_matches('/'),
            config.owner,
            config.repo
        );

        Ok(Self { http, base })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> RegistryResult<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RegistryError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        serde_json::from_str(&body).map_err(|e| RegistryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RunnerRegistry for GithubRegistry {
    #[instrument(skip(self))]
    async fn list_runners(&self) -> RegistryResult<Vec<RunnerDescriptor>> {
        let mut runners = Vec::new();
        let mut page = 1;

        loop {
            let response = self
                .http
                .get(&self.base)
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?;
            let body: RunnerPage = Self::decode(response).await?;

            let received = body.runners.len();
            runners.extend(body.runners);
            debug!(page, received, total = body.total_count, "Fetched runner page");

            if received == 0 || runners.len() >= body.total_count {
                break;
            }
            page += 1;
        }

        Ok(runners)
    }

    #[instrument(skip(self))]
    async fn delete_runner(&self, runner_id: u64) -> RegistryResult<()> {
        let response = self
            .http
            .delete(format!("{}/{}", self.base, runner_id))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn registration_token(&self) -> RegistryResult<String> {
        let response = self
            .http
            .post(format!("{}/registration-token", self.base))
            .send()
            .await?;
        let body: RegistrationToken = Self::decode(response).await?;
        Ok(body.token)
    }
}
