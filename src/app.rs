//! App templates and the process handles they produce.

use std::fs;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

use crate::channel::{Channel, ChannelHandle, PipeChannel, SocketChannel};
use crate::config::{AppConfig, Buffering, StartOptions, StartOverrides, Transport};
use crate::errors::{Error, Result};
use crate::line::LineChannel;
use crate::util::split_command;

/// Poll interval while waiting for a child to create its socket file.
const SOCKET_WAIT_INTERVAL: Duration = Duration::from_millis(10);

/// How long terminate waits after SIGTERM before falling back to SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Immutable recipe for starting instances of one app: tokenized argv plus
/// transport kind and default options. Built once from an [`AppConfig`];
/// replacing the template never affects instances already running.
#[derive(Debug, Clone)]
pub struct AppTemplate {
    argv: Vec<String>,
    transport: Transport,
    defaults: StartOptions,
}

impl AppTemplate {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let argv = split_command(&config.command);
        if argv.is_empty() {
            return Err(Error::EmptyCommand);
        }
        Ok(Self {
            argv,
            transport: config.transport,
            defaults: StartOptions::from_config(config),
        })
    }

    /// Spawn one instance: merged options, extra args appended to the base
    /// argv, transport-specific channel setup, optional line framing.
    pub fn start(&self, extra_args: &[String], overrides: &StartOverrides) -> Result<ProcessHandle> {
        let opts = self.defaults.merged(overrides);
        let mut argv = self.argv.clone();
        argv.extend(extra_args.iter().cloned());

        let (child, channel) = match self.transport {
            Transport::Stdio => self.spawn_stdio(&argv, &opts)?,
            Transport::Socket => self.spawn_socket(&argv, &opts)?,
        };

        let channel: Box<dyn Channel> = match opts.buffering {
            Buffering::Line => Box::new(LineChannel::new(channel)),
            Buffering::Raw => channel,
        };

        Ok(ProcessHandle {
            child,
            channel: ChannelHandle::new(channel),
        })
    }

    fn command(&self, argv: &[String], opts: &StartOptions) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        if opts.setpgrp {
            // Isolated process group: a Ctrl-C aimed at the supervisor's
            // group must not also kill the helper.
            cmd.process_group(0);
        }
        cmd
    }

    fn spawn_stdio(
        &self,
        argv: &[String],
        opts: &StartOptions,
    ) -> Result<(Child, Box<dyn Channel>)> {
        let mut child = self
            .command(argv, opts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Spawn {
                program: argv[0].clone(),
                source: e,
            })?;

        let stdin = take_stdio(child.stdin.take().map(OwnedFd::from))?;
        let stdout = take_stdio(child.stdout.take().map(OwnedFd::from))?;
        let channel = PipeChannel::new(Some(stdout), Some(stdin))?;
        Ok((child, Box::new(channel)))
    }

    fn spawn_socket(
        &self,
        argv: &[String],
        opts: &StartOptions,
    ) -> Result<(Child, Box<dyn Channel>)> {
        let path = opts.socket.as_deref().ok_or_else(|| Error::SocketPathRequired {
            program: argv[0].clone(),
        })?;

        // A leftover socket file from an earlier run would block the child's
        // bind; remove it before spawning.
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }

        let child = self
            .command(argv, opts)
            .spawn()
            .map_err(|e| Error::Spawn {
                program: argv[0].clone(),
                source: e,
            })?;

        tracing::debug!("waiting for socket {}", path.display());
        wait_for_path(path);
        let channel = SocketChannel::connect(path)?;
        Ok((child, Box::new(channel)))
    }
}

fn take_stdio(fd: Option<OwnedFd>) -> Result<OwnedFd> {
    fd.ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::Other,
            "child spawned without piped stdio",
        ))
    })
}

/// Poll until the socket path exists. No internal timeout: callers that need
/// a bound impose their own deadline around `start`.
fn wait_for_path(path: &Path) {
    while !path.exists() {
        thread::sleep(SOCKET_WAIT_INTERVAL);
    }
}

/// One spawned process paired with exactly one channel. Lives in the
/// supervisor's registry from spawn to terminate.
pub struct ProcessHandle {
    child: Child,
    channel: ChannelHandle,
}

impl ProcessHandle {
    /// Cloneable handle to this instance's channel.
    pub fn channel(&self) -> ChannelHandle {
        self.channel.clone()
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Close the channel, then stop the process and wait for it to exit.
    ///
    /// The channel goes first so stale [`ChannelHandle`] clones start failing
    /// with `EndpointClosed` before the process disappears. SIGTERM gets a
    /// bounded grace period, then SIGKILL; the child is always reaped.
    pub fn terminate(mut self) -> Result<()> {
        self.channel.close()?;

        match kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM) {
            Ok(()) => {}
            // Already gone; still reap below.
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => return Err(e.into()),
        }

        if self.child.wait_timeout(TERMINATE_GRACE)?.is_none() {
            tracing::warn!(
                "pid {} ignored SIGTERM for {:?}; killing",
                self.child.id(),
                TERMINATE_GRACE
            );
            let _ = self.child.kill();
            self.child.wait()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.child.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rejects_empty_command() {
        assert!(matches!(
            AppTemplate::from_config(&AppConfig::new("   ")),
            Err(Error::EmptyCommand)
        ));
    }

    #[test]
    fn template_keeps_quoted_args_together() {
        let template =
            AppTemplate::from_config(&AppConfig::new("sh -c 'exec cat'")).expect("template");
        assert_eq!(
            template.argv,
            vec!["sh".to_string(), "-c".to_string(), "exec cat".to_string()]
        );
    }

    #[test]
    fn socket_transport_without_path_fails() {
        let template = AppTemplate::from_config(
            &AppConfig::new("cat").transport(Transport::Socket),
        )
        .expect("template");
        assert!(matches!(
            template.start(&[], &StartOverrides::new()),
            Err(Error::SocketPathRequired { .. })
        ));
    }

    #[test]
    fn spawn_failure_reports_program() {
        let template = AppTemplate::from_config(&AppConfig::new(
            "/nonexistent/procline-test-binary",
        ))
        .expect("template");
        match template.start(&[], &StartOverrides::new()) {
            Err(Error::Spawn { program, .. }) => {
                assert_eq!(program, "/nonexistent/procline-test-binary");
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[test]
    fn stdio_instance_echoes_and_terminates() {
        let template = AppTemplate::from_config(&AppConfig::new("cat")).expect("template");
        let handle = template.start(&[], &StartOverrides::new()).expect("start");
        let chan = handle.channel();

        chan.write(b"ping").expect("write");
        let mut got = Vec::new();
        for _ in 0..1000 {
            got = chan.read().expect("read");
            if !got.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(got, b"ping".to_vec());

        handle.terminate().expect("terminate");
        assert!(chan.read().unwrap_err().is_endpoint_closed());
    }
}
