//! Bidirectional byte-stream endpoints over pipes and Unix domain sockets.
//!
//! Both transports poll non-blocking: `read` returns an empty buffer when no
//! data is currently available and fails with [`Error::EndpointClosed`] once
//! the peer is gone for good. The two transports signal EOF differently and
//! that difference is preserved here on purpose:
//!
//! - on a pipe, a successful zero-length read *is* EOF;
//! - on a socket, "would block" means no data yet, while a zero-length
//!   receive means the peer closed.
//!
//! The line decorator in [`crate::line`] relies on each transport keeping its
//! own rule.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nix::fcntl::{fcntl, FcntlArg, OFlag};

use crate::errors::{Error, Result};

/// Bounded size of a single transport read.
const READ_CHUNK: usize = 4096;

/// A bidirectional byte-stream endpoint.
///
/// `read` never blocks: `Ok` with an empty buffer means "no data yet". After
/// `close`, or once the peer is known to be gone, every call fails with
/// [`Error::EndpointClosed`]; channels never silently no-op.
pub trait Channel: Send {
    /// Read whatever bytes are currently available, up to a bounded chunk.
    fn read(&mut self) -> Result<Vec<u8>>;

    /// Write one chunk of bytes to the peer.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Write several chunks in order.
    fn write_many(&mut self, chunks: &[&[u8]]) -> Result<()> {
        for chunk in chunks {
            self.write(chunk)?;
        }
        Ok(())
    }

    /// Release owned descriptors. Safe to call repeatedly and on
    /// partially-built channels.
    fn close(&mut self) -> Result<()>;

    /// Raw descriptor of the readable end, for callers integrating with a
    /// readiness multiplexer. `None` for write-only or closed channels.
    fn raw_fd(&self) -> Option<RawFd>;
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

/// Channel over OS pipes, read-only, write-only, or both.
///
/// The read end is put into `O_NONBLOCK` at construction; writes go through
/// unbuffered and are flushed per chunk.
pub struct PipeChannel {
    reader: Option<File>,
    writer: Option<File>,
}

impl PipeChannel {
    /// Build from pipe descriptors. `read_end` is typically the child's
    /// stdout, `write_end` the child's stdin; at least one must be present.
    pub fn new(read_end: Option<OwnedFd>, write_end: Option<OwnedFd>) -> Result<Self> {
        if read_end.is_none() && write_end.is_none() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "pipe channel needs at least one end",
            )));
        }
        if let Some(fd) = &read_end {
            set_nonblocking(fd.as_raw_fd())?;
        }
        Ok(Self {
            reader: read_end.map(File::from),
            writer: write_end.map(File::from),
        })
    }
}

impl Channel for PipeChannel {
    fn read(&mut self) -> Result<Vec<u8>> {
        let reader = self.reader.as_mut().ok_or(Error::EndpointClosed)?;
        let mut buf = [0u8; READ_CHUNK];
        match reader.read(&mut buf) {
            // A successful zero-length read on a pipe is unambiguous EOF.
            Ok(0) => {
                self.reader = None;
                Err(Error::EndpointClosed)
            }
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(Vec::new()),
            Err(_) => {
                self.reader = None;
                Err(Error::EndpointClosed)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::EndpointClosed)?;
        if writer.write_all(data).and_then(|()| writer.flush()).is_err() {
            self.writer = None;
            return Err(Error::EndpointClosed);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        self.writer = None;
        Ok(())
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.reader.as_ref().map(|f| f.as_raw_fd())
    }
}

/// Channel over a connected Unix domain stream socket.
pub struct SocketChannel {
    stream: Option<UnixStream>,
}

impl SocketChannel {
    /// Wrap an already-connected stream; it is made non-blocking immediately.
    pub fn new(stream: UnixStream) -> Result<Self> {
        stream.set_nonblocking(true).map_err(Error::Io)?;
        Ok(Self {
            stream: Some(stream),
        })
    }

    /// Connect a client socket to `path` and wrap it.
    pub fn connect(path: &Path) -> Result<Self> {
        Self::new(UnixStream::connect(path)?)
    }
}

impl Channel for SocketChannel {
    fn read(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(Error::EndpointClosed)?;
        let mut buf = [0u8; READ_CHUNK];
        match stream.read(&mut buf) {
            // Unlike a pipe, would-block means "no data yet" and a valid
            // zero-length receive means the peer closed.
            Ok(0) => {
                self.stream = None;
                Err(Error::EndpointClosed)
            }
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(Vec::new()),
            Err(_) => {
                self.stream = None;
                Err(Error::EndpointClosed)
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::EndpointClosed)?;
        // Non-blocking send; any failure, including a full send buffer, is an
        // endpoint failure from the caller's point of view.
        if stream.write_all(data).is_err() {
            self.stream = None;
            return Err(Error::EndpointClosed);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stream = None;
        Ok(())
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|s| s.as_raw_fd())
    }
}

/// Cloneable handle to a supervised channel.
///
/// The supervisor hands these out from `get_channel` while keeping ownership
/// of the process. `terminate` closes the underlying channel through its own
/// handle, after which every clone fails with [`Error::EndpointClosed`] on
/// both `read` and `write`.
#[derive(Clone)]
pub struct ChannelHandle {
    inner: Arc<Mutex<Box<dyn Channel>>>,
}

impl ChannelHandle {
    pub(crate) fn new(channel: Box<dyn Channel>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(channel)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Channel>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`Channel::read`].
    pub fn read(&self) -> Result<Vec<u8>> {
        self.lock().read()
    }

    /// See [`Channel::write`].
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.lock().write(data)
    }

    /// See [`Channel::write_many`].
    pub fn write_many(&self, chunks: &[&[u8]]) -> Result<()> {
        self.lock().write_many(chunks)
    }

    /// See [`Channel::close`].
    pub fn close(&self) -> Result<()> {
        self.lock().close()
    }

    /// See [`Channel::raw_fd`].
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.lock().raw_fd()
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("fd", &self.raw_fd())
            .finish()
    }
}
