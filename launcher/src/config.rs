//! Launch configuration resolved from the process environment.
//!
//! Each setting is a named, typed variable with a default. Values are read once
//! at startup into a [`LaunchConfig`] that is then passed to whatever needs it.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};

pub const PORT: &str = "PORT";
pub const HOST: &str = "HOST";
pub const RUN_MODE: &str = "RUN_MODE";
pub const AUTORELOAD: &str = "AUTORELOAD";

/// Registry order of the configuration variables.
pub const VARIABLES: [&str; 4] = [PORT, HOST, RUN_MODE, AUTORELOAD];

/// Run mode (and first-argument token) that starts the decompile service.
pub const SERVE_MODE: &str = "serve";

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Resolved launcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub port: u16,
    pub host: String,
    /// `None` once cleared for a passthrough command.
    pub run_mode: Option<String>,
    pub autoreload: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            run_mode: Some(SERVE_MODE.to_string()),
            autoreload: false,
        }
    }
}

impl LaunchConfig {
    /// Resolve from the current process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` to read raw variable values.
    ///
    /// Unset variables take their default. Set variables are coerced to their type;
    /// a value that does not coerce is an error naming the variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup(PORT) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("{PORT}={raw:?} is not a valid port number"))?,
            None => defaults.port,
        };
        let host = lookup(HOST).unwrap_or(defaults.host);
        let run_mode = lookup(RUN_MODE).or(defaults.run_mode);
        let autoreload = match lookup(AUTORELOAD) {
            Some(raw) => parse_bool(&raw).with_context(|| format!("invalid {AUTORELOAD}"))?,
            None => defaults.autoreload,
        };

        Ok(Self {
            port,
            host,
            run_mode,
            autoreload,
        })
    }

    /// Every variable with its string value, in registry order. Unset variables are `None`.
    pub fn entries(&self) -> [(&'static str, Option<String>); 4] {
        [
            (PORT, Some(self.port.to_string())),
            (HOST, Some(self.host.clone())),
            (RUN_MODE, self.run_mode.clone()),
            (AUTORELOAD, Some(self.autoreload.to_string())),
        ]
    }

    /// Name to value for variables that are set; merged over the inherited environment
    /// of launched commands.
    pub fn env_overrides(&self) -> BTreeMap<String, String> {
        self.entries()
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect()
    }

    /// Names of variables that are unset and must be removed from a child's environment.
    ///
    /// A cleared `RUN_MODE` is dropped from the child's environment entirely rather than
    /// passed down as `RUN_MODE=""`, so children see it as unset.
    pub fn env_removals(&self) -> Vec<&'static str> {
        self.entries()
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect()
    }
}

/// Parse a truthy/falsy string. Case-insensitive; an empty string is false.
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        _ => bail!("{raw:?} is not a boolean value"),
    }
}
