// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the EC2 client.

use std::time::Duration;

use crate::error::{Ec2Error, Result};

/// Static AWS credentials used for request signing.
#[derive(Clone)]
pub struct Credentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl Credentials {
    /// Create credentials without a session token.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Load credentials from the standard AWS environment variables.
    ///
    /// - `AWS_ACCESS_KEY_ID` (required)
    /// - `AWS_SECRET_ACCESS_KEY` (required)
    /// - `AWS_SESSION_TOKEN` (optional)
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| Ec2Error::Config("AWS_ACCESS_KEY_ID is not set".to_string()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| Ec2Error::Config("AWS_SECRET_ACCESS_KEY is not set".to_string()))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// Keep secrets out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Configuration for the Ec2Client.
#[derive(Debug, Clone)]
pub struct Ec2Config {
    /// AWS region, e.g. `eu-west-1`.
    pub region: String,
    /// Endpoint base URL. Defaults to the regional public endpoint.
    pub endpoint: String,
    /// Signing credentials.
    pub credentials: Credentials,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Delay between describe calls while waiting for an instance to run.
    pub waiter_delay: Duration,
}

impl Ec2Config {
    /// Create a configuration for a region with the public endpoint.
    pub fn new(region: impl Into<String>, credentials: Credentials) -> Self {
        let region = region.into();
        Self {
            endpoint: default_endpoint(&region),
            region,
            credentials,
            request_timeout: Duration::from_secs(30),
            waiter_delay: Duration::from_secs(15),
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `AWS_REGION` / `AWS_DEFAULT_REGION`: region (required)
    /// - `EC2_ENDPOINT_URL`: endpoint override
    /// - credentials, see [`Credentials::from_env`]
    pub fn from_env() -> Result<Self> {
        let region = std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .map_err(|_| Ec2Error::Config("AWS_REGION is not set".to_string()))?;
        let mut config = Self::new(region, Credentials::from_env()?);
        if let Ok(endpoint) = std::env::var("EC2_ENDPOINT_URL") {
            config.endpoint = endpoint;
        }
        Ok(config)
    }

    /// Override the endpoint (used for VPC endpoints and tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the delay between waiter polls.
    pub fn with_waiter_delay(mut self, delay: Duration) -> Self {
        self.waiter_delay = delay;
        self
    }
}

/// Public regional endpoint for EC2.
pub fn default_endpoint(region: &str) -> String {
    format!("https://ec2.{}.amazonaws.com", region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint_follows_region() {
        let config = Ec2Config::new("eu-central-1", Credentials::new("AKID", "secret"));
        assert_eq!(config.endpoint, "https://ec2.eu-central-1.amazonaws.com");
        assert_eq!(config.waiter_delay, Duration::from_secs(15));
    }

    #[test]
    fn test_builder_methods() {
        let config = Ec2Config::new("us-east-1", Credentials::new("AKID", "secret"))
            .with_endpoint("http://127.0.0.1:9000")
            .with_request_timeout(Duration::from_secs(5))
            .with_waiter_delay(Duration::from_millis(10));

        assert_eq!(config.endpoint, "http://127.0.0.1:9000");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.waiter_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = Credentials::new("AKID", "very-secret").with_session_token("tok");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("AKID"));
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("tok\""));
    }
}
