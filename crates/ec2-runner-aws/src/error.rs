// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for ec2-runner-aws.

use std::time::Duration;

use thiserror::Error;

/// Result type using Ec2Error.
pub type Result<T> = std::result::Result<T, Ec2Error>;

/// Errors that can occur when talking to the EC2 API.
#[derive(Debug, Error)]
pub enum Ec2Error {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure (connection refused, TLS, timeout).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// EC2 returned an error envelope.
    #[error("{code}: {message}")]
    Api {
        /// EC2 error code, e.g. `InsufficientInstanceCapacity`.
        code: String,
        /// Human-readable message from EC2.
        message: String,
        /// Request id, if the envelope carried one.
        request_id: Option<String>,
    },

    /// Response body was not well-formed XML.
    #[error("xml error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Response was well-formed but missing expected content.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The running-waiter gave up before the instance reached `running`.
    #[error("instance {instance_id} did not reach running within {}s", waited.as_secs())]
    WaiterTimeout {
        /// Instance being waited on.
        instance_id: String,
        /// Total wait budget.
        waited: Duration,
    },

    /// The instance entered a state from which it cannot become `running`.
    #[error("instance {instance_id} entered state {state} while waiting for running")]
    WaiterFailure {
        /// Instance being waited on.
        instance_id: String,
        /// The terminal state observed.
        state: String,
    },
}

impl Ec2Error {
    /// EC2 error code, when the failure came from an API error envelope.
    pub fn code(&self) -> Option<&str> {
        match self {
            Ec2Error::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}
