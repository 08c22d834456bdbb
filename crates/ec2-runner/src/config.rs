// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for ec2-runner.
//!
//! Every option is a long flag with an environment fallback. Action inputs
//! use the `INPUT_<NAME>` variables the Actions runner exports, so the binary
//! runs unchanged as an action step.

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};

use crate::provider::{MarketType, ProvisioningRequest, Tag, VolumeSpec};
use crate::user_data::DEFAULT_RUNNER_VERSION;

/// Which phase to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Acquire an instance and wait for its runners.
    Start,
    /// Remove runners and release the instance.
    Stop,
}

/// Capacity market as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MarketArg {
    /// Spot first, on-demand as fallback.
    Spot,
    /// On-demand only.
    OnDemand,
}

impl From<MarketArg> for MarketType {
    fn from(arg: MarketArg) -> Self {
        match arg {
            MarketArg::Spot => MarketType::Spot,
            MarketArg::OnDemand => MarketType::OnDemand,
        }
    }
}

/// Command line / environment inputs.
#[derive(Debug, Parser)]
#[command(name = "ec2-runner", version, about)]
pub struct Cli {
    /// Phase to run.
    #[arg(long, env = "INPUT_MODE", value_enum)]
    pub mode: Mode,

    /// Token with administration rights on the repository.
    #[arg(long, env = "INPUT_GITHUB-TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// Repository as `owner/repo`.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub github_repository: String,

    /// REST API base.
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// Web base the runner agents register against.
    #[arg(long, env = "GITHUB_SERVER_URL", default_value = "https://github.com")]
    pub github_server_url: String,

    /// Image id.
    #[arg(long, env = "INPUT_EC2-IMAGE-ID")]
    pub ec2_image_id: Option<String>,

    /// Instance type.
    #[arg(long, env = "INPUT_EC2-INSTANCE-TYPE")]
    pub ec2_instance_type: Option<String>,

    /// Subnets, comma or space separated.
    #[arg(long, env = "INPUT_SUBNET-ID")]
    pub subnet_id: Option<String>,

    /// Security group.
    #[arg(long, env = "INPUT_SECURITY-GROUP-ID")]
    pub security_group_id: Option<String>,

    /// IAM instance profile name.
    #[arg(long, env = "INPUT_IAM-ROLE-NAME")]
    pub iam_role_name: Option<String>,

    /// Root volume size in GiB.
    #[arg(long, env = "INPUT_EC2-VOLUME-SIZE")]
    pub ec2_volume_size: Option<u32>,

    /// Root device name.
    #[arg(long, env = "INPUT_EC2-VOLUME-MOUNT-POINT", default_value = "/dev/sda1")]
    pub ec2_volume_mount_point: String,

    /// Instance to release (stop mode).
    #[arg(long, env = "INPUT_EC2-INSTANCE-ID")]
    pub ec2_instance_id: Option<String>,

    /// Runner agents per instance.
    #[arg(long, env = "INPUT_RUNNER-COUNT", default_value_t = 1)]
    pub runner_count: u32,

    /// Reuse stopped instances and keep instances stopped instead of terminated.
    #[arg(
        long,
        env = "INPUT_REUSE-RUNNER",
        action = ArgAction::Set,
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    pub reuse_runner: bool,

    /// Preferred capacity market.
    #[arg(long, env = "INPUT_MARKET-TYPE", value_enum, default_value = "spot")]
    pub market_type: MarketArg,

    /// Tags as JSON, `[{"Key": "...", "Value": "..."}]`.
    #[arg(long, env = "INPUT_AWS-RESOURCE-TAGS", default_value = "[]")]
    pub aws_resource_tags: String,

    /// Directory of an agent pre-installed in the image.
    #[arg(long, env = "INPUT_RUNNER-HOME-DIR")]
    pub runner_home_dir: Option<String>,

    /// Agent release to install.
    #[arg(long, env = "INPUT_RUNNER-VERSION", default_value = DEFAULT_RUNNER_VERSION)]
    pub runner_version: String,

    /// Extra runner labels.
    #[arg(long = "label", env = "INPUT_LABELS", value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Release the acquired instance when a start fails after acquisition.
    #[arg(
        long,
        env = "INPUT_CLEANUP-ON-FAILURE",
        action = ArgAction::Set,
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    pub cleanup_on_failure: bool,

    /// Region; falls back to `AWS_DEFAULT_REGION`.
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// EC2 endpoint override.
    #[arg(long, env = "EC2_ENDPOINT_URL")]
    pub ec2_endpoint: Option<String>,
}

/// CI platform settings.
#[derive(Debug, Clone)]
pub struct GithubSettings {
    /// REST API base.
    pub api_url: String,
    /// Web base.
    pub server_url: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Token.
    pub token: String,
}

/// Cloud settings. Credentials are read by the EC2 client itself.
#[derive(Debug, Clone)]
pub struct AwsSettings {
    /// Region.
    pub region: String,
    /// Endpoint override.
    pub endpoint: Option<String>,
}

/// Start phase settings.
#[derive(Debug, Clone)]
pub struct StartConfig {
    /// Image id.
    pub image_id: String,
    /// Instance type.
    pub instance_type: String,
    /// Candidate subnets, never empty.
    pub subnet_ids: Vec<String>,
    /// Security group.
    pub security_group_id: String,
    /// IAM instance profile.
    pub iam_role_name: Option<String>,
    /// Root volume override.
    pub volume: Option<VolumeSpec>,
    /// Runner agents per instance, at least 1.
    pub runner_count: u32,
    /// Reuse path.
    pub reuse: bool,
    /// Preferred market.
    pub market: MarketType,
    /// Instance tags.
    pub tags: Vec<Tag>,
    /// Extra runner labels.
    pub labels: Vec<String>,
    /// Pre-installed agent directory.
    pub runner_home_dir: Option<String>,
    /// Agent release.
    pub runner_version: String,
    /// Release the instance when a later start step fails.
    pub cleanup_on_failure: bool,
}

impl StartConfig {
    /// Labels every runner carries next to the instance id: the extra labels
    /// followed by tag values, without duplicates.
    pub fn runner_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for label in self
            .labels
            .iter()
            .chain(self.tags.iter().map(|t| &t.value))
        {
            if !label.is_empty() && !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels
    }

    /// Build the provisioning request carrying a boot payload.
    pub fn provisioning_request(&self, user_data: String) -> ProvisioningRequest {
        ProvisioningRequest {
            image_id: self.image_id.clone(),
            instance_type: self.instance_type.clone(),
            runner_count: self.runner_count,
            subnet_ids: self.subnet_ids.clone(),
            security_group_id: Some(self.security_group_id.clone()),
            iam_role_name: self.iam_role_name.clone(),
            volume: self.volume.clone(),
            tags: self.tags.clone(),
            market: self.market,
            reuse: self.reuse,
            user_data,
        }
    }
}

/// Stop phase settings.
#[derive(Debug, Clone)]
pub struct StopConfig {
    /// Instance to release.
    pub instance_id: String,
    /// Stop instead of terminate.
    pub reuse: bool,
}

/// Phase-specific settings.
#[derive(Debug, Clone)]
pub enum Action {
    /// Start phase.
    Start(StartConfig),
    /// Stop phase.
    Stop(StopConfig),
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// CI platform settings.
    pub github: GithubSettings,
    /// Cloud settings.
    pub aws: AwsSettings,
    /// Phase.
    pub action: Action,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required input is missing.
    #[error("Missing required input: {0}")]
    Missing(&'static str),
    /// An input has an invalid value.
    #[error("Invalid input {name}: {reason}")]
    Invalid {
        /// Input name.
        name: &'static str,
        /// What is wrong.
        reason: String,
    },
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Split a subnet list on commas and whitespace.
pub fn parse_subnets(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the JSON tag list.
///
/// Tag values become runner labels, which the agent takes as a
/// comma-separated list, so a value containing a comma is rejected.
pub fn parse_tags(value: &str) -> Result<Vec<Tag>, ConfigError> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    let tags: Vec<Tag> = serde_json::from_str(value).map_err(|e| ConfigError::Invalid {
        name: "aws-resource-tags",
        reason: e.to_string(),
    })?;
    if let Some(tag) = tags.iter().find(|t| t.value.contains(',')) {
        return Err(ConfigError::Invalid {
            name: "aws-resource-tags",
            reason: format!("value of tag '{}' contains a comma", tag.key),
        });
    }
    Ok(tags)
}

fn parse_repository(value: &str) -> Result<(String, String), ConfigError> {
    match value.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(ConfigError::Invalid {
            name: "github-repository",
            reason: format!("expected owner/repo, got '{}'", value),
        }),
    }
}

impl Cli {
    /// Validate the inputs for the selected mode.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let (owner, repo) = parse_repository(&self.github_repository)?;
        if self.github_token.trim().is_empty() {
            return Err(ConfigError::Missing("github-token"));
        }
        let github = GithubSettings {
            api_url: self.github_api_url,
            server_url: self.github_server_url,
            owner,
            repo,
            token: self.github_token,
        };

        let region = self
            .aws_region
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok());
        let aws = AwsSettings {
            region: required(region, "aws-region")?,
            endpoint: self.ec2_endpoint,
        };

        let action = match self.mode {
            Mode::Stop => Action::Stop(StopConfig {
                instance_id: required(self.ec2_instance_id, "ec2-instance-id")?,
                reuse: self.reuse_runner,
            }),
            Mode::Start => {
                let subnet_ids = parse_subnets(&required(self.subnet_id, "subnet-id")?);
                if subnet_ids.is_empty() {
                    return Err(ConfigError::Missing("subnet-id"));
                }
                if self.runner_count == 0 {
                    return Err(ConfigError::Invalid {
                        name: "runner-count",
                        reason: "must be at least 1".to_string(),
                    });
                }
                Action::Start(StartConfig {
                    image_id: required(self.ec2_image_id, "ec2-image-id")?,
                    instance_type: required(self.ec2_instance_type, "ec2-instance-type")?,
                    subnet_ids,
                    security_group_id: required(self.security_group_id, "security-group-id")?,
                    iam_role_name: self.iam_role_name.filter(|v| !v.is_empty()),
                    volume: self.ec2_volume_size.map(|size_gib| VolumeSpec {
                        device_name: self.ec2_volume_mount_point.clone(),
                        size_gib,
                    }),
                    runner_count: self.runner_count,
                    reuse: self.reuse_runner,
                    market: self.market_type.into(),
                    tags: parse_tags(&self.aws_resource_tags)?,
                    labels: self
                        .labels
                        .into_iter()
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect(),
                    runner_home_dir: self.runner_home_dir.filter(|v| !v.is_empty()),
                    runner_version: self.runner_version,
                    cleanup_on_failure: self.cleanup_on_failure,
                })
            }
        };

        Ok(Config {
            github,
            aws,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &[&str] = &[
        "ec2-runner",
        "--github-token",
        "ghp_x",
        "--github-repository",
        "acme/widgets",
        "--aws-region",
        "eu-west-1",
    ];

    fn parse(extra: &[&str]) -> Result<Config, ConfigError> {
        let args: Vec<&str> = BASE.iter().chain(extra.iter()).copied().collect();
        Cli::try_parse_from(args).unwrap().into_config()
    }

    fn start_args() -> Vec<&'static str> {
        vec![
            "--mode",
            "start",
            "--ec2-image-id",
            "ami-1",
            "--ec2-instance-type",
            "t3.large",
            "--subnet-id",
            "subnet-a, subnet-b",
            "--security-group-id",
            "sg-1",
        ]
    }

    #[test]
    fn test_start_config() {
        let mut args = start_args();
        args.extend([
            "--runner-count",
            "2",
            "--reuse-runner",
            "true",
            "--market-type",
            "on-demand",
            "--ec2-volume-size",
            "64",
            "--aws-resource-tags",
            r#"[{"Key":"Team","Value":"infra"}]"#,
            "--label",
            "gpu,infra",
        ]);

        let config = parse(&args).unwrap();

        assert_eq!(config.github.owner, "acme");
        assert_eq!(config.github.repo, "widgets");
        assert_eq!(config.aws.region, "eu-west-1");
        let Action::Start(start) = config.action else {
            panic!("expected start");
        };
        assert_eq!(start.subnet_ids, vec!["subnet-a", "subnet-b"]);
        assert_eq!(start.runner_count, 2);
        assert!(start.reuse);
        assert_eq!(start.market, MarketType::OnDemand);
        assert_eq!(start.volume.as_ref().unwrap().size_gib, 64);
        assert_eq!(start.volume.as_ref().unwrap().device_name, "/dev/sda1");
        assert_eq!(start.tags, vec![Tag::new("Team", "infra")]);
        assert_eq!(start.runner_labels(), vec!["gpu", "infra"]);
        assert_eq!(start.runner_version, DEFAULT_RUNNER_VERSION);
        assert!(!start.cleanup_on_failure);
    }

    #[test]
    fn test_start_defaults() {
        let config = parse(&start_args()).unwrap();
        let Action::Start(start) = config.action else {
            panic!("expected start");
        };
        assert_eq!(start.runner_count, 1);
        assert!(!start.reuse);
        assert_eq!(start.market, MarketType::Spot);
        assert!(start.volume.is_none());
        assert!(start.tags.is_empty());
    }

    #[test]
    fn test_start_requires_image() {
        let args: Vec<&str> = start_args()
            .into_iter()
            .filter(|a| *a != "--ec2-image-id" && *a != "ami-1")
            .collect();

        let err = parse(&args).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ec2-image-id")));
    }

    #[test]
    fn test_zero_runner_count_rejected() {
        let mut args = start_args();
        args.extend(["--runner-count", "0"]);

        let err = parse(&args).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "runner-count", .. }));
    }

    #[test]
    fn test_malformed_tags_rejected() {
        let mut args = start_args();
        args.extend(["--aws-resource-tags", "{not json"]);

        let err = parse(&args).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "aws-resource-tags", .. }));
    }

    #[test]
    fn test_tag_value_with_comma_rejected() {
        let mut args = start_args();
        args.extend([
            "--aws-resource-tags",
            r#"[{"Key":"Team","Value":"infra,gpu"}]"#,
        ]);

        let err = parse(&args).unwrap_err();
        match err {
            ConfigError::Invalid { name, reason } => {
                assert_eq!(name, "aws-resource-tags");
                assert!(reason.contains("Team"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stop_config() {
        let config = parse(&["--mode", "stop", "--ec2-instance-id", "i-1234"]).unwrap();
        let Action::Stop(stop) = config.action else {
            panic!("expected stop");
        };
        assert_eq!(stop.instance_id, "i-1234");
        assert!(!stop.reuse);
    }

    #[test]
    fn test_stop_requires_instance_id() {
        let err = parse(&["--mode", "stop"]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ec2-instance-id")));
    }

    #[test]
    fn test_repository_shape() {
        assert!(parse_repository("acme/widgets").is_ok());
        assert!(parse_repository("acme").is_err());
        assert!(parse_repository("acme/").is_err());
        assert!(parse_repository("a/b/c").is_err());
    }

    #[test]
    fn test_parse_subnets() {
        assert_eq!(
            parse_subnets("subnet-a,subnet-b  subnet-c"),
            vec!["subnet-a", "subnet-b", "subnet-c"]
        );
        assert!(parse_subnets(" , ").is_empty());
    }

    #[test]
    fn test_runner_labels_deduplicate() {
        let config = parse(&start_args()).unwrap();
        let Action::Start(mut start) = config.action else {
            panic!("expected start");
        };
        start.labels = vec!["infra".to_string()];
        start.tags = vec![Tag::new("Team", "infra"), Tag::new("Name", "ci")];

        assert_eq!(start.runner_labels(), vec!["infra", "ci"]);
    }
}
