//! Line framing over a raw byte stream.
//!
//! Transport chunks split wherever the network felt like it, including
//! mid-line and mid-codepoint. [`LineReader`] buffers bytes and yields one
//! complete line per call, holding partial data until its newline arrives.

use crate::remote::{EventByteStream, TransportError};
use futures_util::StreamExt;

pub struct LineReader {
    inner: EventByteStream,
    buffer: Vec<u8>,
    done: bool,
}

impl LineReader {
    #[must_use]
    pub fn new(stream: EventByteStream) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Next complete line, without its terminator. `Ok(None)` means the
    /// stream ended cleanly; when it ends mid-line the remainder is yielded
    /// as a final line first.
    pub async fn next_line(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.done {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buffer);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }

            match self.inner.next().await {
                Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
                Some(Err(err)) => return Err(err),
                None => self.done = true,
            }
        }
    }
}
