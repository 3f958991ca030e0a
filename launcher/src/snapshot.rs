//! Persist the resolved configuration for later shells and tooling.
//!
//! Two sinks are written on every launch:
//! - the user's shell profile gets one `declare -x NAME="value"` line per set
//!   variable appended;
//! - a JSON snapshot is overwritten with the full name to value map (unset
//!   variables as `""`).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::LaunchConfig;

/// Overrides the JSON snapshot location.
pub const SNAPSHOT_PATH_VAR: &str = "LAUNCH_SNAPSHOT_PATH";
pub const DEFAULT_SNAPSHOT_PATH: &str = "/var/run/app-launch.json";
const PROFILE_FILE: &str = ".bashrc";

/// Where the snapshot sinks live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub profile: PathBuf,
    pub json: PathBuf,
}

impl SnapshotPaths {
    /// Profile under the home directory, JSON at `LAUNCH_SNAPSHOT_PATH` or the default.
    pub fn resolve<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = dirs::home_dir().context("resolve home directory")?;
        let json = lookup(SNAPSHOT_PATH_VAR)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH));
        Ok(Self {
            profile: home.join(PROFILE_FILE),
            json,
        })
    }
}

/// Write both sinks.
pub fn persist(config: &LaunchConfig, paths: &SnapshotPaths) -> Result<()> {
    append_profile(&paths.profile, config)?;
    write_snapshot_json(&paths.json, config)?;
    debug!(
        profile = %paths.profile.display(),
        json = %paths.json.display(),
        "configuration snapshot persisted"
    );
    Ok(())
}

/// `declare -x` lines for every set variable, in registry order.
pub fn profile_lines(config: &LaunchConfig) -> String {
    config
        .entries()
        .into_iter()
        .filter_map(|(name, value)| {
            value.map(|v| format!("declare -x {name}=\"{}\"\n", shell_escape(&v)))
        })
        .collect()
}

/// Pretty JSON object of every variable, sorted by name, with a trailing newline.
pub fn snapshot_json(config: &LaunchConfig) -> Result<String> {
    let map: Map<String, Value> = config
        .entries()
        .into_iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.unwrap_or_default())))
        .collect();
    let mut payload =
        serde_json::to_string_pretty(&Value::Object(map)).context("serialize snapshot")?;
    payload.push('\n');
    Ok(payload)
}

fn append_profile(path: &Path, config: &LaunchConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(profile_lines(config).as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    Ok(())
}

/// Atomically replace the JSON snapshot (temp file + rename).
fn write_snapshot_json(path: &Path, config: &LaunchConfig) -> Result<()> {
    let payload = snapshot_json(config)?;
    let parent = path
        .parent()
        .with_context(|| format!("snapshot path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload)
        .with_context(|| format!("write temp snapshot {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace snapshot {}", path.display()))?;
    Ok(())
}

/// Escape for the inside of a double-quoted shell word.
fn shell_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_lines_skip_unset_variables() {
        let mut cfg = LaunchConfig::default();
        cfg.run_mode = None;
        assert_eq!(
            profile_lines(&cfg),
            "declare -x PORT=\"8000\"\n\
             declare -x HOST=\"0.0.0.0\"\n\
             declare -x AUTORELOAD=\"false\"\n"
        );
    }

    #[test]
    fn profile_values_are_shell_escaped() {
        let cfg = LaunchConfig {
            host: "a\"b$c`d\\e".to_string(),
            ..LaunchConfig::default()
        };
        assert!(profile_lines(&cfg).contains("declare -x HOST=\"a\\\"b\\$c\\`d\\\\e\"\n"));
    }

    #[test]
    fn snapshot_json_includes_unset_as_empty() {
        let mut cfg = LaunchConfig::default();
        cfg.run_mode = None;
        let raw = snapshot_json(&cfg).expect("json");
        let value: Value = serde_json::from_str(&raw).expect("parse");
        assert_eq!(
            value,
            serde_json::json!({
                "AUTORELOAD": "false",
                "HOST": "0.0.0.0",
                "PORT": "8000",
                "RUN_MODE": "",
            })
        );
    }

    #[test]
    fn persist_appends_profile_and_overwrites_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SnapshotPaths {
            profile: temp.path().join("home").join(".bashrc"),
            json: temp.path().join("run").join("app-launch.json"),
        };
        fs::create_dir_all(temp.path().join("home")).expect("mkdir");
        fs::write(&paths.profile, "# existing\n").expect("seed profile");

        let cfg = LaunchConfig::default();
        persist(&cfg, &paths).expect("first persist");
        let first_json = fs::read_to_string(&paths.json).expect("read json");
        persist(&cfg, &paths).expect("second persist");
        let second_json = fs::read_to_string(&paths.json).expect("read json");

        assert_eq!(first_json, second_json);
        let profile = fs::read_to_string(&paths.profile).expect("read profile");
        assert!(profile.starts_with("# existing\n"));
        assert_eq!(profile.matches("declare -x PORT=\"8000\"").count(), 2);
        assert!(!paths.json.with_extension("json.tmp").exists());
    }

    #[test]
    fn snapshot_path_can_be_overridden() {
        let paths = SnapshotPaths::resolve(|name| {
            (name == SNAPSHOT_PATH_VAR).then(|| "/tmp/custom.json".to_string())
        })
        .expect("resolve");
        assert_eq!(paths.json, PathBuf::from("/tmp/custom.json"));
        assert!(paths.profile.ends_with(".bashrc"));

        let defaults = SnapshotPaths::resolve(|_| None).expect("resolve");
        assert_eq!(defaults.json, PathBuf::from(DEFAULT_SNAPSHOT_PATH));
    }
}
