// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! XML response parsing for the EC2 Query API.

use roxmltree::{Document, Node};

use crate::error::{Ec2Error, Result};
use crate::types::{Instance, InstanceState};

/// Instances parsed from a response plus the pagination token, if any.
#[derive(Debug, Default)]
pub struct InstancePage {
    /// Instances in document order.
    pub instances: Vec<Instance>,
    /// `nextToken` for the following page.
    pub next_token: Option<String>,
}

/// Parse an EC2 error envelope.
///
/// Returns `None` when the body is not an error envelope.
pub fn parse_error(body: &str) -> Option<Ec2Error> {
    let doc = Document::parse(body).ok()?;
    let error = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "Error")?;

    let code = child_text(&error, "Code")?;
    let message = child_text(&error, "Message").unwrap_or_default();
    let request_id = doc
        .descendants()
        .find(|n| {
            n.is_element() && matches!(n.tag_name().name(), "RequestID" | "RequestId" | "requestId")
        })
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string());

    Some(Ec2Error::Api {
        code,
        message,
        request_id,
    })
}

/// Parse every instance in a `RunInstances` or `DescribeInstances` response.
pub fn parse_instances(body: &str) -> Result<InstancePage> {
    let doc = Document::parse(body)?;
    let root = doc.root_element();

    let instances = root
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "instancesSet")
        .flat_map(|set| set.children().filter(|n| n.is_element()))
        .map(|item| parse_instance(&item))
        .collect::<Result<Vec<_>>>()?;

    let next_token = child_text(&root, "nextToken").filter(|t| !t.is_empty());

    Ok(InstancePage {
        instances,
        next_token,
    })
}

/// Check that a response parses and carries the expected root element.
pub fn expect_root(body: &str, expected: &str) -> Result<()> {
    let doc = Document::parse(body)?;
    let name = doc.root_element().tag_name().name();
    if name == expected {
        Ok(())
    } else {
        Err(Ec2Error::UnexpectedResponse(format!(
            "expected <{}>, got <{}>",
            expected, name
        )))
    }
}

fn parse_instance(item: &Node) -> Result<Instance> {
    let instance_id = child_text(item, "instanceId").ok_or_else(|| {
        Ec2Error::UnexpectedResponse("instance item without instanceId".to_string())
    })?;

    let state = item
        .children()
        .find(|n| {
            n.is_element() && matches!(n.tag_name().name(), "instanceState" | "currentState")
        })
        .and_then(|s| child_text(&s, "name"))
        .map(|name| InstanceState::from_name(&name))
        .unwrap_or_else(|| InstanceState::Unknown(String::new()));

    Ok(Instance {
        instance_id,
        state,
        instance_type: child_text(item, "instanceType"),
        image_id: child_text(item, "imageId"),
        subnet_id: child_text(item, "subnetId"),
        spot_instance_request_id: child_text(item, "spotInstanceRequestId"),
        lifecycle: child_text(item, "instanceLifecycle"),
    })
}

fn child_text(node: &Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}
