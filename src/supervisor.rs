//! Registry of app templates and live process instances.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::app::{AppTemplate, ProcessHandle};
use crate::channel::ChannelHandle;
use crate::config::{AppConfig, StartOverrides};
use crate::errors::{Error, Result};

/// Owns app templates by name and live process handles by alias, and
/// orchestrates start/ensure/terminate between them.
///
/// Per alias the state machine is `{absent}` → `start`/`ensure_running` →
/// `{running}` → `terminate` → `{absent}`, with at most one live handle per
/// alias at any time. Registry mutation goes through `&mut self`, so a shared
/// supervisor is serialized by whatever lock the embedding application puts
/// around it; the contract only requires per-alias serialization.
///
/// Supervisors are instance-scoped: construct one, use it, drop it. Dropping
/// does not terminate registered instances; call [`Supervisor::terminate`]
/// for each alias that should not outlive the supervisor.
#[derive(Debug, Default)]
pub struct Supervisor {
    apps: HashMap<String, AppTemplate>,
    procs: HashMap<String, ProcessHandle>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)define app templates from a name → config mapping.
    ///
    /// Entries are applied in name order; an invalid entry stops the update
    /// there, leaving earlier entries applied. Replacing a template only
    /// affects future starts, never running handles.
    pub fn update_config<I>(&mut self, config: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, AppConfig)>,
    {
        let mut entries: Vec<(String, AppConfig)> = config.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, app_config) in entries {
            debug!("updating template for {name}");
            let template = AppTemplate::from_config(&app_config)?;
            self.apps.insert(name, template);
        }
        Ok(())
    }

    /// Define a single app template.
    pub fn add(&mut self, name: &str, config: AppConfig) -> Result<()> {
        self.update_config([(name.to_string(), config)])
    }

    /// Start an instance unless the alias is already live; a repeat call is a
    /// logged no-op (first registration wins, later args and overrides are
    /// discarded). The alias defaults to the app name.
    pub fn ensure_running<I, S>(
        &mut self,
        app: &str,
        alias: Option<&str>,
        with_args: I,
        overrides: &StartOverrides,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let alias = alias.unwrap_or(app);
        if self.procs.contains_key(alias) {
            info!("alias {alias} is already taken, not starting {app}");
            return Ok(());
        }
        let template = self
            .apps
            .get(app)
            .ok_or_else(|| Error::UnknownApp {
                name: app.to_string(),
            })?;

        info!("starting {app} as {alias}");
        let args: Vec<String> = with_args.into_iter().map(Into::into).collect();
        let handle = template.start(&args, overrides)?;
        debug!("{alias} started with pid {}", handle.pid());
        self.procs.insert(alias.to_string(), handle);
        Ok(())
    }

    /// Strict variant of [`Supervisor::ensure_running`]: an occupied alias is
    /// an error, not a no-op.
    pub fn start<I, S>(
        &mut self,
        app: &str,
        alias: Option<&str>,
        with_args: I,
        overrides: &StartOverrides,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = alias.unwrap_or(app);
        if self.procs.contains_key(name) {
            return Err(Error::AlreadyRunning {
                alias: name.to_string(),
            });
        }
        self.ensure_running(app, alias, with_args, overrides)
    }

    /// Channel of the live instance under `alias`, or `None` when the alias
    /// is unregistered (not an error).
    pub fn get_channel(&self, alias: &str) -> Option<ChannelHandle> {
        self.procs.get(alias).map(ProcessHandle::channel)
    }

    /// Pid of the live instance under `alias`, if any.
    pub fn pid(&self, alias: &str) -> Option<u32> {
        self.procs.get(alias).map(ProcessHandle::pid)
    }

    /// Close the instance's channel, stop the process, wait for it to exit,
    /// and free the alias. Channels previously handed out for this alias
    /// fail with `EndpointClosed` from the moment the channel closes.
    pub fn terminate(&mut self, alias: &str) -> Result<()> {
        let handle = self
            .procs
            .remove(alias)
            .ok_or_else(|| Error::AliasNotRunning {
                alias: alias.to_string(),
            })?;
        info!("terminating {alias}");
        handle.terminate()
    }

    /// Registered app names, sorted.
    pub fn apps(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.apps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Aliases with a live instance, sorted.
    pub fn aliases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.procs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
