//! Line reframing decorator over any [`Channel`].

use std::mem;
use std::os::fd::RawFd;

use crate::channel::Channel;
use crate::errors::{Error, Result};

/// Wraps an inner channel and reassembles its byte stream into
/// newline-terminated records.
///
/// Each `read` returns at most one complete line (terminator included), in
/// original order; an empty result means "no complete line yet". Once the
/// inner channel reports its peer gone, a buffered unterminated fragment is
/// returned exactly once, after which every call fails with
/// [`Error::EndpointClosed`]. The decorator never blocks or sleeps; all
/// waiting is the caller's repeated polling.
pub struct LineChannel {
    inner: Box<dyn Channel>,
    buffer: Vec<u8>,
}

impl LineChannel {
    pub fn new(inner: Box<dyn Channel>) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
        }
    }

    /// Split off the first buffered line, terminator included.
    fn first_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let rest = self.buffer.split_off(pos + 1);
        Some(mem::replace(&mut self.buffer, rest))
    }
}

impl Channel for LineChannel {
    fn read(&mut self) -> Result<Vec<u8>> {
        // Serve what a previous pull already buffered before touching the
        // inner channel again.
        if let Some(line) = self.first_line() {
            return Ok(line);
        }
        match self.inner.read() {
            Err(Error::EndpointClosed) if !self.buffer.is_empty() => {
                // Final unterminated fragment, delivered exactly once.
                Ok(mem::take(&mut self.buffer))
            }
            Err(e) => Err(e),
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(Vec::new());
                }
                self.buffer.extend_from_slice(&bytes);
                Ok(self.first_line().unwrap_or_default())
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.inner.raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Inner channel driven by a script of read results; an exhausted script
    /// behaves like a closed peer.
    struct ScriptedChannel {
        reads: VecDeque<Vec<u8>>,
        written: Vec<u8>,
        closed: bool,
    }

    impl ScriptedChannel {
        fn new<const N: usize>(reads: [&[u8]; N]) -> Self {
            Self {
                reads: reads.iter().map(|r| r.to_vec()).collect(),
                written: Vec::new(),
                closed: false,
            }
        }
    }

    impl Channel for ScriptedChannel {
        fn read(&mut self) -> Result<Vec<u8>> {
            if self.closed {
                return Err(Error::EndpointClosed);
            }
            self.reads.pop_front().ok_or(Error::EndpointClosed)
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            if self.closed {
                return Err(Error::EndpointClosed);
            }
            self.written.extend_from_slice(data);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }

        fn raw_fd(&self) -> Option<RawFd> {
            None
        }
    }

    fn lines(script: ScriptedChannel) -> LineChannel {
        LineChannel::new(Box::new(script))
    }

    #[test]
    fn reassembles_line_split_across_chunks() {
        let mut chan = lines(ScriptedChannel::new([b"he", b"llo\n"]));
        assert_eq!(chan.read().unwrap(), Vec::<u8>::new());
        assert_eq!(chan.read().unwrap(), b"hello\n".to_vec());
        assert!(chan.read().unwrap_err().is_endpoint_closed());
    }

    #[test]
    fn several_lines_in_one_chunk_come_out_one_per_call() {
        let mut chan = lines(ScriptedChannel::new([b"a\nb\nc\n"]));
        assert_eq!(chan.read().unwrap(), b"a\n".to_vec());
        assert_eq!(chan.read().unwrap(), b"b\n".to_vec());
        assert_eq!(chan.read().unwrap(), b"c\n".to_vec());
        assert!(chan.read().unwrap_err().is_endpoint_closed());
    }

    #[test]
    fn empty_inner_read_keeps_partial_data_buffered() {
        let mut chan = lines(ScriptedChannel::new([b"par", b"", b"tial\nrest"]));
        assert_eq!(chan.read().unwrap(), Vec::<u8>::new());
        assert_eq!(chan.read().unwrap(), Vec::<u8>::new());
        assert_eq!(chan.read().unwrap(), b"partial\n".to_vec());
        // Trailing fragment arrives once the inner channel closes.
        assert_eq!(chan.read().unwrap(), b"rest".to_vec());
        assert!(chan.read().unwrap_err().is_endpoint_closed());
    }

    #[test]
    fn final_fragment_is_delivered_exactly_once() {
        let mut chan = lines(ScriptedChannel::new([b"tail"]));
        assert_eq!(chan.read().unwrap(), Vec::<u8>::new());
        assert_eq!(chan.read().unwrap(), b"tail".to_vec());
        assert!(chan.read().unwrap_err().is_endpoint_closed());
        assert!(chan.read().unwrap_err().is_endpoint_closed());
    }

    #[test]
    fn close_with_empty_buffer_propagates_immediately() {
        let mut chan = lines(ScriptedChannel::new([]));
        assert!(chan.read().unwrap_err().is_endpoint_closed());
    }

    #[test]
    fn roundtrip_preserves_bytes_and_boundaries() {
        let input: &[u8] = b"first\nsecond line\n\nlast without newline";
        // Feed the same input at several chunk sizes; output must always be
        // the same records.
        for chunk_size in [1usize, 2, 3, 7, 64] {
            let chunks: Vec<&[u8]> = input.chunks(chunk_size).collect();
            let script = ScriptedChannel {
                reads: chunks.iter().map(|c| c.to_vec()).collect(),
                written: Vec::new(),
                closed: false,
            };
            let mut chan = LineChannel::new(Box::new(script));

            let mut records: Vec<Vec<u8>> = Vec::new();
            loop {
                match chan.read() {
                    Ok(r) if r.is_empty() => continue,
                    Ok(r) => records.push(r),
                    Err(e) => {
                        assert!(e.is_endpoint_closed());
                        break;
                    }
                }
            }

            let rejoined: Vec<u8> = records.concat();
            assert_eq!(rejoined, input, "chunk size {chunk_size}");
            assert_eq!(
                records,
                vec![
                    b"first\n".to_vec(),
                    b"second line\n".to_vec(),
                    b"\n".to_vec(),
                    b"last without newline".to_vec(),
                ],
                "chunk size {chunk_size}"
            );
        }
    }

    #[test]
    fn write_and_close_pass_through() {
        let mut chan = lines(ScriptedChannel::new([b"x"]));
        chan.write(b"payload").unwrap();
        chan.write_many(&[b"a", b"b"]).unwrap();
        chan.close().unwrap();
        assert!(chan.read().unwrap_err().is_endpoint_closed());
        assert!(chan.write(b"y").unwrap_err().is_endpoint_closed());
    }
}
