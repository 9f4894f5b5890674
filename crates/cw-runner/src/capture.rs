//! Bounded capture of a child's output pipes.
//!
//! Each pipe is drained by its own thread for as long as the writer keeps it
//! open. Only the first `limit` bytes are kept; the rest is read and
//! discarded so the child never stalls on a full pipe.

use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::debug;

pub const DEFAULT_OUTPUT_LIMIT: usize = 512 * 1024;

/// Appended to captured text that hit the limit.
pub const TRUNCATION_MARKER: &str = "\n[Output truncated due to size limit]";

const CHUNK: usize = 8 * 1024;

#[derive(Debug, Default)]
struct Buffer {
    bytes: Vec<u8>,
    truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedText {
    pub text: String,
    pub truncated: bool,
}

/// A pipe being drained in the background.
pub struct PipeCapture {
    buffer: Arc<Mutex<Buffer>>,
    done: Receiver<()>,
}

impl PipeCapture {
    pub fn spawn<R>(name: &'static str, mut reader: R, limit: usize) -> Self
    where
        R: Read + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Buffer::default()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&buffer);

        thread::spawn(move || {
            let mut chunk = [0u8; CHUNK];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut buf = shared.lock().unwrap_or_else(PoisonError::into_inner);
                        let room = limit.saturating_sub(buf.bytes.len());
                        let keep = room.min(n);
                        buf.bytes.extend_from_slice(&chunk[..keep]);
                        if keep < n {
                            buf.truncated = true;
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!(pipe = name, error = %err, "pipe read failed");
                        break;
                    }
                }
            }
            let _ = tx.send(());
        });

        Self { buffer, done }
    }

    /// A capture for a pipe that was never opened.
    pub fn empty() -> Self {
        let (tx, done) = mpsc::channel();
        let _ = tx.send(());
        Self {
            buffer: Arc::new(Mutex::new(Buffer::default())),
            done,
        }
    }

    /// Wait up to `grace` for the writer side to close, then take whatever
    /// has been captured. A descendant that inherited the pipe can keep it
    /// open indefinitely; its reader is left behind rather than waited on.
    pub fn finish(self, grace: Duration) -> CapturedText {
        if self.done.recv_timeout(grace).is_err() {
            debug!("output pipe still open after grace period");
        }
        let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = std::mem::take(&mut buf.bytes);
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if buf.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        CapturedText {
            text,
            truncated: buf.truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const GRACE: Duration = Duration::from_secs(5);

    #[test]
    fn small_output_is_kept_whole() {
        let capture = PipeCapture::spawn("stdout", Cursor::new(b"hello\n".to_vec()), 64);
        let out = capture.finish(GRACE);
        assert_eq!(out.text, "hello\n");
        assert!(!out.truncated);
    }

    #[test]
    fn overflow_is_discarded_and_flagged() {
        let data = vec![b'x'; 100_000];
        let capture = PipeCapture::spawn("stdout", Cursor::new(data), 1000);
        let out = capture.finish(GRACE);
        assert!(out.truncated);
        assert_eq!(out.text.len(), 1000 + TRUNCATION_MARKER.len());
        assert!(out.text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn exact_limit_is_not_truncation() {
        let capture = PipeCapture::spawn("stderr", Cursor::new(vec![b'y'; 10]), 10);
        let out = capture.finish(GRACE);
        assert!(!out.truncated);
        assert_eq!(out.text, "y".repeat(10));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let capture = PipeCapture::spawn("stdout", Cursor::new(vec![b'o', b'k', 0xff]), 64);
        assert_eq!(capture.finish(GRACE).text, "ok\u{fffd}");
    }

    #[test]
    fn empty_capture_finishes_immediately() {
        assert_eq!(
            PipeCapture::empty().finish(Duration::ZERO),
            CapturedText::default()
        );
    }
}
