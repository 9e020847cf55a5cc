//! Native PTY implementation using portable-pty.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use portable_pty::{
    native_pty_system, Child, ChildKiller, CommandBuilder, ExitStatus, MasterPty,
};
use tracing::{debug, trace, warn};

use super::Geometry;
use crate::error::MuxError;
use crate::Result;

/// Terminal type advertised to spawned shells unless overridden.
pub const DEFAULT_TERM: &str = "xterm-256color";

/// How long `close` waits for a signalled child before giving up on reaping it.
const CLOSE_REAP_BUDGET: Duration = Duration::from_millis(500);

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Get the default shell for the current platform.
pub fn default_shell() -> String {
    #[cfg(unix)]
    {
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
    #[cfg(windows)]
    {
        "powershell.exe".to_string()
    }
}

/// The program a session runs on the slave side of its PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl ShellCommand {
    /// Run `program` with no arguments and the inherited environment.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// The platform's default interactive shell with `TERM` set.
    pub fn default_shell() -> Self {
        Self::new(default_shell()).env("TERM", DEFAULT_TERM)
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable for the child. Later values win.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.env.retain(|(k, _)| *k != key);
        self.env.push((key, value.into()));
        self
    }

    /// Start the child in `dir`.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn to_builder(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.cwd(dir);
        }
        cmd
    }
}

impl Default for ShellCommand {
    fn default() -> Self {
        Self::default_shell()
    }
}

/// One read from the master side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadChunk {
    /// Output bytes, not necessarily UTF-8 aligned.
    Data(Vec<u8>),
    /// The child side is gone and no further bytes remain.
    EndOfStream,
}

/// Reading half of a PTY master.
pub struct PtyReader<R: Read = Box<dyn Read + Send>> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: Read> PtyReader<R> {
    /// Wrap a reader with the default 4 KiB buffer.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0u8; 4096],
        }
    }

    /// Use a custom read buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buf = vec![0u8; size.max(1)];
        self
    }

    /// Block until output is available or the stream ends.
    pub fn read_chunk(&mut self) -> std::io::Result<ReadChunk> {
        loop {
            match self.inner.read(&mut self.buf) {
                Ok(0) => return Ok(ReadChunk::EndOfStream),
                Ok(n) => {
                    trace!("PTY reader: read {} bytes", n);
                    return Ok(ReadChunk::Data(self.buf[..n].to_vec()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) if is_pty_closed(&e) => {
                    debug!("PTY reader: slave side closed ({})", e);
                    return Ok(ReadChunk::EndOfStream);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// EIO on Unix means every slave descriptor was closed, i.e. the child is gone.
fn is_pty_closed(e: &std::io::Error) -> bool {
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::EIO) {
        return true;
    }
    e.kind() == std::io::ErrorKind::BrokenPipe
}

/// An open PTY pair and the shell attached to it.
pub struct PtyHandle {
    master: Option<Box<dyn MasterPty + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
    geometry: Geometry,
    pid: Option<u32>,
    exit: Option<ExitStatus>,
    closed: bool,
}

impl PtyHandle {
    /// Allocate a PTY of the given size and spawn `command` on its slave side.
    pub fn open(command: &ShellCommand, geometry: Geometry) -> Result<Self> {
        geometry.validate()?;

        let pair = native_pty_system()
            .openpty(geometry.to_native())
            .map_err(|e| MuxError::Spawn(format!("failed to open PTY: {e}")))?;

        let child = pair
            .slave
            .spawn_command(command.to_builder())
            .map_err(|e| {
                MuxError::Spawn(format!("failed to spawn {}: {e}", command.program()))
            })?;

        // The parent must not keep the slave open, or reads never see EOF.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| MuxError::Spawn(format!("failed to take writer: {e}")))?;

        let pid = child.process_id();
        debug!(program = command.program(), ?pid, %geometry, "PTY opened");

        Ok(Self {
            master: Some(pair.master),
            writer: Some(writer),
            child,
            geometry,
            pid,
            exit: None,
            closed: false,
        })
    }

    /// Clone a reader for the master side.
    pub fn take_reader(&self) -> Result<PtyReader> {
        let master = self.master.as_ref().ok_or(MuxError::Terminated)?;
        let reader = master
            .try_clone_reader()
            .map_err(|e| MuxError::Spawn(format!("failed to clone reader: {e}")))?;
        Ok(PtyReader::new(reader))
    }

    /// Write all of `data` to the child's input.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(MuxError::Terminated)?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Change the window size; the kernel notifies the foreground process group.
    pub fn resize(&mut self, geometry: Geometry) -> Result<()> {
        geometry.validate()?;
        let master = self.master.as_ref().ok_or(MuxError::Terminated)?;
        master
            .resize(geometry.to_native())
            .map_err(|e| MuxError::Io(std::io::Error::other(e.to_string())))?;
        self.geometry = geometry;
        Ok(())
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Process ID of the child, if the platform reports one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// A killer usable from another thread without touching this handle.
    pub fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
        self.child.clone_killer()
    }

    /// Non-blocking check for the child's exit status.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit.is_none() {
            self.exit = self.child.try_wait()?;
        }
        Ok(self.exit.clone())
    }

    /// Poll for the exit status for at most `budget`.
    pub fn reap(&mut self, budget: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + budget;
        loop {
            match self.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => std::thread::sleep(REAP_POLL_INTERVAL),
                Ok(None) => return None,
                Err(e) => {
                    warn!(pid = ?self.pid, error = %e, "failed to reap child");
                    return None;
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the master side and terminate the child if it is still running.
    ///
    /// Idempotent. Reaping is bounded; a child that ignores the signal is left
    /// behind rather than blocking the caller.
    pub fn close(&mut self) -> Option<ExitStatus> {
        if self.closed {
            return self.exit.clone();
        }
        self.closed = true;
        self.writer.take();
        self.master.take();

        if let Ok(Some(status)) = self.try_wait() {
            return Some(status);
        }

        if let Err(e) = self.child.kill() {
            debug!(pid = ?self.pid, error = %e, "kill failed");
        }
        let status = self.reap(CLOSE_REAP_BUDGET);
        debug!(pid = ?self.pid, exited = status.is_some(), "PTY closed");
        status
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("pid", &self.pid)
            .field("geometry", &self.geometry)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
