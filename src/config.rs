//! Session configuration: an explicit struct constructed once at startup and
//! passed into `init`, replacing ambient process-global option state.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Three-valued toggle for the input-segregation mode: leave the grammar's
/// own setting alone, or force it off/on for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegregationMode {
    #[default]
    Default,
    Off,
    On,
}

/// Named option overrides for one session.
///
/// Keys must match `[a-z][a-z0-9_-]*`, may be set at most once, and must name
/// a known option; violations are reported, never silently dropped.
#[derive(Debug, Clone, Default)]
pub struct Options {
    entries: Vec<(String, String)>,
}

/// Options the parse session understands.
pub const KNOWN_OPTIONS: &[&str] = &["edge-limit", "max-readings", "morph-max-chain"];

fn option_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[a-z][a-z0-9_-]*$").expect("static pattern"))
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one named option. Fails on bad key syntax or a repeated key.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if !option_name_pattern().is_match(&name) {
            return Err(ConfigError::InvalidOptionName { name });
        }
        if self.entries.iter().any(|(k, _)| *k == name) {
            return Err(ConfigError::DuplicateOption { name });
        }
        self.entries.push((name, value.into()));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Reject any option the session does not understand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, _) in &self.entries {
            if !KNOWN_OPTIONS.contains(&name.as_str()) {
                return Err(ConfigError::UnknownOption { name: name.clone() });
            }
        }
        Ok(())
    }

    /// Fetch a positive-integer option, falling back to a default.
    pub fn get_usize(&self, name: &str, default: usize) -> Result<usize, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(raw) => {
                let parsed: usize =
                    raw.parse()
                        .map_err(|e| ConfigError::InvalidOptionValue {
                            name: name.to_string(),
                            value: raw.to_string(),
                            message: format!("{e}"),
                        })?;
                if parsed == 0 {
                    return Err(ConfigError::InvalidOptionValue {
                        name: name.to_string(),
                        value: raw.to_string(),
                        message: "must be positive".into(),
                    });
                }
                Ok(parsed)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything `GrammarParser::init` needs for one session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Grammar resource consumed at init.
    pub grammar_path: PathBuf,
    /// Append-only text sink for session diagnostics.
    pub log_path: PathBuf,
    /// Input-segregation toggle.
    pub segregation: SegregationMode,
    /// Validated named overrides.
    pub options: Options,
}

impl SessionConfig {
    pub fn new(grammar_path: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            grammar_path: grammar_path.into(),
            log_path: log_path.into(),
            segregation: SegregationMode::Default,
            options: Options::new(),
        }
    }
}
