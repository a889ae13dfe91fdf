//! App configuration entries and per-call start overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Transport between the supervisor and a spawned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Child speaks over its own stdin/stdout, both ends piped.
    #[default]
    Stdio,
    /// Child creates a Unix domain socket the supervisor connects to.
    Socket,
}

/// Framing applied to the channel handed back to callers.
///
/// Unrecognized config strings fall back to raw framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Buffering {
    Line,
    #[default]
    Raw,
}

impl<'de> Deserialize<'de> for Buffering {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Only "line" selects line framing; anything else means raw bytes.
        let s = String::deserialize(deserializer)?;
        if s.eq_ignore_ascii_case("line") {
            Ok(Buffering::Line)
        } else {
            Ok(Buffering::Raw)
        }
    }
}

/// One app definition: the recipe a template is built from.
///
/// Derives serde so callers can feed [`crate::Supervisor::update_config`]
/// straight from YAML/JSON/TOML, e.g.
///
/// ```yaml
/// cat:
///   command: cat
///   type: stdio
///   buffering: line
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Program and arguments as one shell-tokenized string. The child is
    /// spawned directly; quotes group words, nothing else is interpreted.
    pub command: String,

    /// Transport kind; defaults to stdio.
    #[serde(rename = "type", default)]
    pub transport: Transport,

    /// Filesystem path of the child's Unix socket. Required for the socket
    /// transport unless supplied per call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<PathBuf>,

    /// Working directory for the spawned process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// `line` wraps the channel in a [`crate::LineChannel`].
    #[serde(default)]
    pub buffering: Buffering,

    /// Spawn the child into its own process group, so signals delivered to
    /// the supervisor's group do not also hit the helper.
    #[serde(default)]
    pub setpgrp: bool,
}

impl AppConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            transport: Transport::default(),
            socket: None,
            cwd: None,
            buffering: Buffering::default(),
            setpgrp: false,
        }
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket = Some(path.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn buffering(mut self, buffering: Buffering) -> Self {
        self.buffering = buffering;
        self
    }

    pub fn setpgrp(mut self, setpgrp: bool) -> Self {
        self.setpgrp = setpgrp;
        self
    }
}

/// Options a template stores and a start call can override.
#[derive(Debug, Clone, Default)]
pub(crate) struct StartOptions {
    pub cwd: Option<PathBuf>,
    pub socket: Option<PathBuf>,
    pub buffering: Buffering,
    pub setpgrp: bool,
}

impl StartOptions {
    pub(crate) fn from_config(config: &AppConfig) -> Self {
        Self {
            cwd: config.cwd.clone(),
            socket: config.socket.clone(),
            buffering: config.buffering,
            setpgrp: config.setpgrp,
        }
    }

    /// Apply per-call overrides; a set override wins over the template
    /// default for every field, uniformly.
    pub(crate) fn merged(&self, overrides: &StartOverrides) -> Self {
        Self {
            cwd: overrides.cwd.clone().or_else(|| self.cwd.clone()),
            socket: overrides.socket.clone().or_else(|| self.socket.clone()),
            buffering: overrides.buffering.unwrap_or(self.buffering),
            setpgrp: overrides.setpgrp.unwrap_or(self.setpgrp),
        }
    }
}

/// Per-call overrides for `start`/`ensure_running`. Unset fields keep the
/// template's defaults.
#[derive(Debug, Clone, Default)]
pub struct StartOverrides {
    cwd: Option<PathBuf>,
    socket: Option<PathBuf>,
    buffering: Option<Buffering>,
    setpgrp: Option<bool>,
}

impl StartOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket = Some(path.into());
        self
    }

    pub fn buffering(mut self, buffering: Buffering) -> Self {
        self.buffering = Some(buffering);
        self
    }

    pub fn setpgrp(mut self, setpgrp: bool) -> Self {
        self.setpgrp = Some(setpgrp);
        self
    }
}
