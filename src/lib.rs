//! Supervisor for named helper subprocesses with uniform byte-stream channels.
//!
//! `procline` starts, aliases, messages, and terminates small sets of local
//! helper processes. Every instance, whether it speaks over standard pipes or
//! a Unix domain socket, is exposed to callers through the same non-blocking
//! [`Channel`] contract, with optional newline framing layered on top by
//! [`LineChannel`].
//!
//! The crate never opens a network listener and never runs background
//! threads: reads poll, the socket-wait loop polls, and all orchestration is
//! driven by the calling thread.
//!
//! ```no_run
//! use procline::{AppConfig, StartOverrides, Supervisor};
//!
//! fn main() -> procline::Result<()> {
//!     let mut sup = Supervisor::new();
//!     sup.add("cat", AppConfig::new("cat"))?;
//!     sup.ensure_running("cat", None, ["-A"], &StartOverrides::new())?;
//!
//!     let chan = sup.get_channel("cat").expect("just started");
//!     chan.write(b"hello, world\n")?;
//!     loop {
//!         let bytes = chan.read()?;
//!         if !bytes.is_empty() {
//!             println!("{}", String::from_utf8_lossy(&bytes));
//!             break;
//!         }
//!         std::thread::sleep(std::time::Duration::from_millis(1));
//!     }
//!     sup.terminate("cat")
//! }
//! ```

pub mod app;
pub mod channel;
pub mod config;
pub mod errors;
pub mod line;
pub mod supervisor;
pub mod util;

pub use app::{AppTemplate, ProcessHandle};
pub use channel::{Channel, ChannelHandle, PipeChannel, SocketChannel};
pub use config::{AppConfig, Buffering, StartOverrides, Transport};
pub use errors::{Error, Result};
pub use line::LineChannel;
pub use supervisor::Supervisor;
