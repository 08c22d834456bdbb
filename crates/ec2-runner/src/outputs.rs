// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step outputs for the invoking pipeline.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Output carrying the acquired instance id.
pub const INSTANCE_ID_OUTPUT: &str = "ec2-instance-id";

/// Output carrying the runner names as a JSON array.
pub const RUNNERS_OUTPUT: &str = "runners";

/// Destination for step outputs.
pub trait OutputSink: Send + Sync {
    /// Publish one output.
    fn set_output(&self, name: &str, value: &str) -> io::Result<()>;
}

/// Appends outputs to the file named by `GITHUB_OUTPUT`.
pub struct GithubOutputFile {
    path: PathBuf,
}

impl GithubOutputFile {
    /// Write to the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn delimiter() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("ghadelimiter_{}", suffix)
}

impl OutputSink for GithubOutputFile {
    fn set_output(&self, name: &str, value: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if value.contains('\n') {
            let delimiter = delimiter();
            writeln!(file, "{}<<{}\n{}\n{}", name, delimiter, value, delimiter)
        } else {
            writeln!(file, "{}={}", name, value)
        }
    }
}

/// Prints `name=value` lines, for runs outside an Actions runner.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn set_output(&self, name: &str, value: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}={}", name, value)
    }
}

/// Records outputs in memory.
#[derive(Default)]
pub struct MemorySink {
    outputs: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs published so far, in order.
    pub fn outputs(&self) -> Vec<(String, String)> {
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Last value published under a name.
    pub fn get(&self, name: &str) -> Option<String> {
        self.outputs()
            .into_iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl OutputSink for MemorySink {
    fn set_output(&self, name: &str, value: &str) -> io::Result<()> {
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), value.to_string()));
        Ok(())
    }
}

/// `GITHUB_OUTPUT` file when set, stdout otherwise.
pub fn from_env() -> Box<dyn OutputSink> {
    match std::env::var_os("GITHUB_OUTPUT") {
        Some(path) if !path.is_empty() => Box::new(GithubOutputFile::new(path)),
        _ => Box::new(StdoutSink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_output_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output");
        std::fs::write(&path, "existing=1\n").unwrap();

        let sink = GithubOutputFile::new(&path);
        sink.set_output(INSTANCE_ID_OUTPUT, "i-1234").unwrap();
        sink.set_output(RUNNERS_OUTPUT, r#"["i-1234_runner_1"]"#).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "existing=1\nec2-instance-id=i-1234\nrunners=[\"i-1234_runner_1\"]\n"
        );
    }

    #[test]
    fn test_multiline_value_uses_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output");

        GithubOutputFile::new(&path)
            .set_output("notes", "a\nb")
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        let delimiter = lines[0].strip_prefix("notes<<").unwrap();
        assert!(delimiter.starts_with("ghadelimiter_"));
        assert_eq!(&lines[1..3], &["a", "b"]);
        assert_eq!(lines[3], delimiter);
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        sink.set_output("a", "1").unwrap();
        sink.set_output("a", "2").unwrap();

        assert_eq!(sink.get("a").as_deref(), Some("2"));
        assert_eq!(sink.outputs().len(), 2);
        assert!(sink.get("b").is_none());
    }
}
