// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Boot payload for runner instances.
//!
//! A two-part multipart document: a cloud-config part that makes cloud-init
//! run user scripts on every boot (so a reused instance re-registers after
//! start), and a shell script that registers and runs the runner agents.

/// Runner agent release installed when the image does not carry one.
pub const DEFAULT_RUNNER_VERSION: &str = "2.321.0";

const BOUNDARY: &str = "//";

const CLOUD_CONFIG: &str = "#cloud-config
cloud_final_modules:
- [scripts-user, always]
";

const INSTALL: &str = r#"if [ ! -d "$RUNNER_DIST" ]; then
  command -v yum >/dev/null 2>&1 && { echo "Installing dependencies with yum"; yum -y install libicu jq git tar; }
  command -v apt-get >/dev/null 2>&1 && { echo "Installing dependencies with apt-get"; apt-get update; apt-get install -y jq git curl tar; }
  case $(uname -m) in aarch64|arm64) ARCH="arm64" ;; *) ARCH="x64" ;; esac
  echo "Installing runner @@VERSION@@"
  mkdir -p "$RUNNER_DIST"
  curl -fsSL "https://github.com/actions/runner/releases/download/v@@VERSION@@/actions-runner-linux-${ARCH}-@@VERSION@@.tar.gz" | tar xz -C "$RUNNER_DIST"
fi
"#;

const REGISTER: &str = r#"echo "Getting instance id"
IMDS_TOKEN=$(curl -s -X PUT "http://169.254.169.254/latest/api/token" -H "X-aws-ec2-metadata-token-ttl-seconds: 21600")
INSTANCE_ID=$(curl -s -H "X-aws-ec2-metadata-token: ${IMDS_TOKEN}" http://169.254.169.254/latest/meta-data/instance-id)
echo "Got instance id ${INSTANCE_ID}"

LABELS="${INSTANCE_ID}"
if [ -n "$EXTRA_LABELS" ]; then
  LABELS="${LABELS},${EXTRA_LABELS}"
fi

for i in $(seq 1 @@COUNT@@); do
  RUNNER_DIR="$RUNNER_ROOT/runner-$i"
  if [ ! -d "$RUNNER_DIR" ]; then
    cp -r "$RUNNER_DIST" "$RUNNER_DIR"
  fi
  (
    cd "$RUNNER_DIR"
    if [ -f ".runner" ]; then
      echo "Removing previous registration of runner $i"
      ./config.sh remove --token "$RUNNER_TOKEN" || rm -f .runner .credentials .credentials_rsaparams
    fi
    echo "Registering runner ${INSTANCE_ID}_runner_$i"
    ./config.sh --unattended --replace \
      --url "$REPO_URL" \
      --token "$RUNNER_TOKEN" \
      --name "${INSTANCE_ID}_runner_$i" \
      --labels "$LABELS" \
      --work _work
    ./run.sh
  ) &
done

wait
"#;

/// Inputs to the boot payload.
#[derive(Debug, Clone)]
pub struct UserDataParams {
    /// Short-lived runner registration token.
    pub registration_token: String,
    /// Runner agents to start.
    pub runner_count: u32,
    /// Labels added next to the instance id label.
    pub labels: Vec<String>,
    /// Web base, e.g. `https://github.com`.
    pub server_url: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Agent release to install.
    pub runner_version: String,
    /// Directory holding a pre-installed agent; skips installation.
    pub runner_home_dir: Option<String>,
}

impl UserDataParams {
    /// Repository URL the agents register against.
    pub fn repository_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.server_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

/// Quote a value for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn script(params: &UserDataParams) -> String {
    let mut script = String::from("#!/bin/bash\nexport RUNNER_ALLOW_RUNASROOT=1\n\n");

    let dist = params
        .runner_home_dir
        .as_deref()
        .unwrap_or("/opt/actions-runner/dist");
    let vars = [
        ("RUNNER_TOKEN", params.registration_token.clone()),
        ("REPO_URL", params.repository_url()),
        ("EXTRA_LABELS", params.labels.join(",")),
        ("RUNNER_ROOT", "/opt/actions-runner".to_string()),
        ("RUNNER_DIST", dist.to_string()),
    ];
    for (name, value) in vars {
        script.push_str(&format!("{}={}\n", name, shell_quote(&value)));
    }
    script.push_str("mkdir -p \"$RUNNER_ROOT\"\n\n");

    if params.runner_home_dir.is_none() {
        script.push_str(&INSTALL.replace("@@VERSION@@", &params.runner_version));
        script.push('\n');
    }

    script.push_str(&REGISTER.replace("@@COUNT@@", &params.runner_count.to_string()));
    script
}

fn part(content_type: &str, filename: &str, body: &str) -> String {
    format!(
        "--{BOUNDARY}\n\
         Content-Type: {content_type}; charset=\"us-ascii\"\n\
         MIME-Version: 1.0\n\
         Content-Transfer-Encoding: 7bit\n\
         Content-Disposition: attachment; filename=\"{filename}\"\n\
         \n\
         {body}\n"
    )
}

/// Render the multipart boot payload.
pub fn build(params: &UserDataParams) -> String {
    let mut out = format!(
        "Content-Type: multipart/mixed; boundary=\"{BOUNDARY}\"\nMIME-Version: 1.0\n\n"
    );
    out.push_str(&part("text/cloud-config", "cloud-config.txt", CLOUD_CONFIG));
    out.push_str(&part("text/x-shellscript", "userdata.txt", &script(params)));
    out.push_str(&format!("--{BOUNDARY}--\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> UserDataParams {
        UserDataParams {
            registration_token: "AABBCC".to_string(),
            runner_count: 3,
            labels: vec!["gpu".to_string(), "infra".to_string()],
            server_url: "https://github.com/".to_string(),
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            runner_version: DEFAULT_RUNNER_VERSION.to_string(),
            runner_home_dir: None,
        }
    }

    #[test]
    fn test_multipart_structure() {
        let payload = build(&params());

        assert!(payload.starts_with("Content-Type: multipart/mixed; boundary=\"//\""));
        assert!(payload.contains("Content-Type: text/cloud-config"));
        assert!(payload.contains("- [scripts-user, always]"));
        assert!(payload.contains("Content-Type: text/x-shellscript"));
        assert!(payload.contains("#!/bin/bash"));
        assert!(payload.trim_end().ends_with("--//--"));
    }

    #[test]
    fn test_script_registers_each_slot() {
        let payload = build(&params());

        assert!(payload.contains("for i in $(seq 1 3); do"));
        assert!(payload.contains("--name \"${INSTANCE_ID}_runner_$i\""));
        assert!(payload.contains("EXTRA_LABELS='gpu,infra'"));
        assert!(payload.contains("REPO_URL='https://github.com/acme/widgets'"));
        assert!(payload.contains("RUNNER_TOKEN='AABBCC'"));
        assert!(payload.contains("latest/meta-data/instance-id"));
        assert!(payload.contains("\nwait\n"));
    }

    #[test]
    fn test_installs_agent_without_home_dir() {
        let payload = build(&params());
        assert!(payload.contains("actions-runner-linux-${ARCH}-2.321.0.tar.gz"));
        assert!(payload.contains("RUNNER_DIST='/opt/actions-runner/dist'"));
    }

    #[test]
    fn test_home_dir_skips_install() {
        let mut params = params();
        params.runner_home_dir = Some("/home/runner/actions-runner".to_string());

        let payload = build(&params);

        assert!(!payload.contains("tar xz"));
        assert!(payload.contains("RUNNER_DIST='/home/runner/actions-runner'"));
    }

    #[test]
    fn test_values_are_shell_quoted() {
        let mut params = params();
        params.labels = vec!["it's".to_string()];

        let payload = build(&params);

        assert!(payload.contains(r"EXTRA_LABELS='it'\''s'"));
    }
}
