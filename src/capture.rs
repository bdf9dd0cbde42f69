use log::debug;
use std::io::{self, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Output capture ended while nothing was capturing")]
    NotCapturing,
    #[error("Captured output is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Redirects written output into memory until [`Capture::end`] hands it back.
pub trait Capture: Write {
    /// Opens a new capture level. Levels nest.
    fn start(&mut self);

    /// Closes the innermost level and returns what was written into it.
    fn end(&mut self) -> Result<String, CaptureError>;

    /// Number of open capture levels.
    fn depth(&self) -> usize;
}

/// Stack of in-memory buffers in front of a pass-through sink.
///
/// Writes land in the innermost open level; with no level open they go
/// straight to the sink (standard output unless built with [`OutputBuffer::with_sink`]).
pub struct OutputBuffer {
    levels: Vec<Vec<u8>>,
    sink: Box<dyn Write>,
}

impl OutputBuffer {
    pub fn stdout() -> Self {
        Self::with_sink(io::stdout())
    }

    pub fn with_sink<W: Write + 'static>(sink: W) -> Self {
        Self {
            levels: Vec::new(),
            sink: Box::new(sink),
        }
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Capture for OutputBuffer {
    fn start(&mut self) {
        self.levels.push(Vec::new());
        debug!("Output capture started (depth {})", self.levels.len());
    }

    fn end(&mut self) -> Result<String, CaptureError> {
        let bytes = self.levels.pop().ok_or(CaptureError::NotCapturing)?;
        debug!(
            "Output capture ended (depth {}, {} bytes)",
            self.levels.len(),
            bytes.len()
        );
        Ok(String::from_utf8(bytes)?)
    }

    fn depth(&self) -> usize {
        self.levels.len()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.levels.last_mut() {
            Some(level) => {
                level.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => self.sink.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.levels.is_empty() {
            self.sink.flush()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink whose contents stay readable after it is boxed away.
    #[derive(Clone, Default)]
    pub(crate) struct SharedSink(pub(crate) Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_capture_collects_writes() {
        let sink = SharedSink::default();
        let mut out = OutputBuffer::with_sink(sink.clone());
        out.start();
        write!(out, "Hello, {}!", "page").unwrap();
        assert_eq!(out.end().unwrap(), "Hello, page!");
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn test_writes_pass_through_without_capture() {
        let sink = SharedSink::default();
        let mut out = OutputBuffer::with_sink(sink.clone());
        write!(out, "direct").unwrap();
        out.flush().unwrap();
        assert_eq!(sink.contents(), "direct");
        assert_eq!(out.depth(), 0);
    }

    #[test]
    fn test_nested_levels() {
        let mut out = OutputBuffer::with_sink(SharedSink::default());
        out.start();
        write!(out, "outer ").unwrap();
        out.start();
        write!(out, "inner").unwrap();
        assert_eq!(out.depth(), 2);
        let inner = out.end().unwrap();
        write!(out, "[{}]", inner).unwrap();
        assert_eq!(out.end().unwrap(), "outer [inner]");
    }

    #[test]
    fn test_end_without_start() {
        let mut out = OutputBuffer::with_sink(SharedSink::default());
        assert!(matches!(out.end(), Err(CaptureError::NotCapturing)));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut out = OutputBuffer::with_sink(SharedSink::default());
        out.start();
        out.write_all(&[0xff, 0xfe]).unwrap();
        assert!(matches!(out.end(), Err(CaptureError::InvalidUtf8(_))));
    }
}
