//! Tracing session control.
//!
//! A [`Session`] walks `configured -> active -> destroyed`. Creation enables
//! one channel and the requested events in one domain; dropping a session that
//! was not [`Session::finish`]ed still stops and destroys it.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::command::checked_output;
use crate::error::{Error, Result};

pub const DEFAULT_CHANNEL: &str = "channel0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Ust,
    Kernel,
}

impl Domain {
    fn flag(self) -> &'static str {
        match self {
            Domain::Ust => "--userspace",
            Domain::Kernel => "--kernel",
        }
    }
}

/// Everything needed to set up one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub name: String,
    pub trace_path: PathBuf,
    pub domain: Domain,
    pub channel: String,
    /// Tracepoint names or wildcard patterns, enabled at every log level.
    pub events: Vec<String>,
    /// Snapshot sessions keep events in memory and never write the trace.
    pub snapshot: bool,
}

/// Narrow view of the tracing control library.
pub trait TracingController {
    /// Set up `config.name`: replace any stale session of the same name,
    /// create it on `config.trace_path` and enable the channel and events.
    fn create(&mut self, config: &SessionConfig) -> Result<()>;
    fn start(&mut self, name: &str) -> Result<()>;
    /// Stop recording; returns once buffered data has been flushed.
    fn stop(&mut self, name: &str) -> Result<()>;
    fn destroy(&mut self, name: &str) -> Result<()>;
}

impl<C: TracingController + ?Sized> TracingController for &mut C {
    fn create(&mut self, config: &SessionConfig) -> Result<()> {
        (**self).create(config)
    }
    fn start(&mut self, name: &str) -> Result<()> {
        (**self).start(name)
    }
    fn stop(&mut self, name: &str) -> Result<()> {
        (**self).stop(name)
    }
    fn destroy(&mut self, name: &str) -> Result<()> {
        (**self).destroy(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Configured,
    Active,
    Stopped,
    Destroyed,
}

/// A live session exclusively owned by the caller.
pub struct Session<'c, C: TracingController + ?Sized> {
    controller: &'c mut C,
    config: SessionConfig,
    state: SessionState,
}

impl<'c, C: TracingController + ?Sized> Session<'c, C> {
    /// Create, configure and start a session.
    pub fn begin(controller: &'c mut C, config: SessionConfig) -> Result<Self> {
        controller.create(&config)?;
        let mut session = Session {
            controller,
            config,
            state: SessionState::Configured,
        };
        session.controller.start(&session.config.name)?;
        session.state = SessionState::Active;
        info!(
            "tracing session {} active ({:?}, {} event rule(s))",
            session.config.name,
            session.config.domain,
            session.config.events.len()
        );
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Stop and destroy, reporting failures. Returns the configuration so the
    /// caller can read the trace back.
    pub fn finish(mut self) -> Result<SessionConfig> {
        if self.state == SessionState::Active {
            self.controller.stop(&self.config.name)?;
            self.state = SessionState::Stopped;
        }
        self.controller.destroy(&self.config.name)?;
        self.state = SessionState::Destroyed;
        Ok(self.config.clone())
    }
}

impl<C: TracingController + ?Sized> Drop for Session<'_, C> {
    fn drop(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }
        if self.state == SessionState::Active {
            if let Err(e) = self.controller.stop(&self.config.name) {
                warn!("failed to stop session {}: {e}", self.config.name);
            }
        }
        if let Err(e) = self.controller.destroy(&self.config.name) {
            warn!("failed to destroy session {}: {e}", self.config.name);
        }
        self.state = SessionState::Destroyed;
    }
}

/// Per-run scratch space: temporary directory holding traces and the daemon
/// pidfile, plus the session name shared by every session of the run.
pub struct Workspace {
    dir: TempDir,
    session_name: String,
    next_trace: u32,
}

impl Workspace {
    /// `seed == 0` draws the session name from entropy.
    pub fn new(seed: u64) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("lttng-ust-bench-")
            .tempdir()?;
        let seed = if seed == 0 {
            rand::thread_rng().gen()
        } else {
            seed
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let session_name = format!(
            "bench-{:08x}-{:04x}-{:012x}",
            rng.gen::<u32>(),
            rng.gen::<u16>(),
            rng.gen::<u64>() & 0xffff_ffff_ffff
        );
        Ok(Self {
            dir,
            session_name,
            next_trace: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn pidfile(&self) -> PathBuf {
        self.dir.path().join("lttng-sessiond.pid")
    }

    /// Configuration for the next session; every session records into its
    /// own directory under `<tmp>/<session name>/`.
    pub fn session_config(
        &mut self,
        domain: Domain,
        events: Vec<String>,
        snapshot: bool,
    ) -> SessionConfig {
        let trace_path = self
            .dir
            .path()
            .join(&self.session_name)
            .join(self.next_trace.to_string());
        self.next_trace += 1;
        SessionConfig {
            name: self.session_name.clone(),
            trace_path,
            domain,
            channel: DEFAULT_CHANNEL.to_string(),
            events,
            snapshot,
        }
    }
}

/// The `lttng-sessiond` process. Only a daemon started by us is terminated.
pub struct SessionDaemon {
    lttng: PathBuf,
    sessiond: PathBuf,
    pidfile: PathBuf,
    started: bool,
}

impl SessionDaemon {
    pub fn new(lttng: impl Into<PathBuf>, sessiond: impl Into<PathBuf>, pidfile: PathBuf) -> Self {
        Self {
            lttng: lttng.into(),
            sessiond: sessiond.into(),
            pidfile,
            started: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        match Command::new(&self.lttng).arg("list").output() {
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                out.status.success() || !stderr.contains("No session daemon")
            }
            Err(_) => false,
        }
    }

    pub fn ensure_running(&mut self) -> Result<()> {
        if self.is_alive() {
            return Ok(());
        }
        info!("starting {}", self.sessiond.display());
        checked_output(
            Command::new(&self.sessiond)
                .args(["--daemonize", "--quiet", "--pidfile"])
                .arg(&self.pidfile),
        )?;
        self.started = true;
        Ok(())
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// SIGTERM the daemon we launched, if any.
    pub fn terminate(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        let pid: i32 = fs::read_to_string(&self.pidfile)?
            .trim()
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(std::io::Error::from)?;
        info!("terminated lttng-sessiond [{pid}]");
        Ok(())
    }
}

impl Drop for SessionDaemon {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!("failed to terminate lttng-sessiond: {e}");
        }
    }
}

/// [`TracingController`] driving the `lttng` command-line client.
pub struct LttngCli {
    lttng: PathBuf,
    daemon: SessionDaemon,
}

impl LttngCli {
    pub fn new(lttng: impl Into<PathBuf>, daemon: SessionDaemon) -> Self {
        Self {
            lttng: lttng.into(),
            daemon,
        }
    }

    pub fn daemon(&self) -> &SessionDaemon {
        &self.daemon
    }

    fn lttng<I, S>(&self, op: &'static str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        match checked_output(Command::new(&self.lttng).args(&args)) {
            Ok(_) => Ok(()),
            Err(Error::CommandFailed { stderr, status, .. }) => Err(Error::tracing(
                op,
                if stderr.is_empty() {
                    status.to_string()
                } else {
                    stderr
                },
            )),
            Err(e) => Err(e),
        }
    }

    /// Channel and event rules of a freshly created session.
    fn configure(&self, config: &SessionConfig) -> Result<()> {
        let session = ["--session", config.name.as_str()];
        self.lttng(
            "enable-channel",
            ["enable-channel"]
                .into_iter()
                .chain(session)
                .chain([config.domain.flag(), config.channel.as_str()]),
        )?;

        for event in &config.events {
            self.lttng(
                "enable-event",
                ["enable-event"].into_iter().chain(session).chain([
                    config.domain.flag(),
                    "--channel",
                    config.channel.as_str(),
                    "--tracepoint",
                    event.as_str(),
                ]),
            )?;
        }
        Ok(())
    }
}

impl TracingController for LttngCli {
    fn create(&mut self, config: &SessionConfig) -> Result<()> {
        self.daemon.ensure_running()?;

        if let Err(e) = self.destroy(&config.name) {
            debug!("no stale session {}: {e}", config.name);
        }

        let mut create: Vec<OsString> = vec!["create".into(), config.name.clone().into()];
        if config.snapshot {
            create.push("--snapshot".into());
        }
        create.push("--output".into());
        create.push(config.trace_path.clone().into());
        self.lttng("create", create)?;

        if let Err(e) = self.configure(config) {
            if let Err(destroy) = self.destroy(&config.name) {
                warn!("failed to destroy half-configured session {}: {destroy}", config.name);
            }
            return Err(e);
        }
        debug!("session {} created at {}", config.name, config.trace_path.display());
        Ok(())
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.lttng("start", ["start", name])
    }

    fn stop(&mut self, name: &str) -> Result<()> {
        self.lttng("stop", ["stop", name])
    }

    fn destroy(&mut self, name: &str) -> Result<()> {
        self.lttng("destroy", ["destroy", name])
    }
}
