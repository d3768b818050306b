//! Replayable request bodies.

use bytes::Bytes;
use std::fmt;
use std::io::Read;

/// A request body that can be sent byte-identically on every attempt.
///
/// A reader-backed body is drained into a buffer the first time it is
/// replayed; every later replay hands out the same buffer.
pub struct ReplayableBody {
    source: Source,
}

enum Source {
    Buffered(Bytes),
    Reader(Box<dyn Read + Send>),
}

impl ReplayableBody {
    /// An empty body.
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    /// A body backed by bytes already in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Buffered(bytes.into()),
        }
    }

    /// A body backed by a reader, captured on first replay.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            source: Source::Reader(Box::new(reader)),
        }
    }

    /// Whether the body has been captured into memory.
    pub fn is_buffered(&self) -> bool {
        matches!(self.source, Source::Buffered(_))
    }

    /// Bytes to send for the next attempt.
    pub fn replay(&mut self) -> std::io::Result<Bytes> {
        let captured = match &mut self.source {
            Source::Buffered(bytes) => return Ok(bytes.clone()),
            Source::Reader(reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Bytes::from(buf)
            }
        };

        self.source = Source::Buffered(captured.clone());
        Ok(captured)
    }
}

impl Default for ReplayableBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ReplayableBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Buffered(bytes) => f
                .debug_struct("ReplayableBody")
                .field("len", &bytes.len())
                .finish(),
            Source::Reader(_) => f
                .debug_struct("ReplayableBody")
                .field("len", &"<unread>")
                .finish(),
        }
    }
}

impl From<Bytes> for ReplayableBody {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for ReplayableBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<String> for ReplayableBody {
    fn from(text: String) -> Self {
        Self::from_bytes(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn test_reader_replays_identically() {
        let mut body = ReplayableBody::from_reader(Cursor::new(b"{\"query\":\"{}\"}".to_vec()));
        assert!(!body.is_buffered());

        let first = body.replay().unwrap();
        let second = body.replay().unwrap();

        assert!(body.is_buffered());
        assert_eq!(first, second);
        assert_eq!(&first[..], b"{\"query\":\"{}\"}");
    }

    #[test]
    fn test_buffered_replay() {
        let mut body = ReplayableBody::from(String::from("abc"));
        assert_eq!(&body.replay().unwrap()[..], b"abc");
        assert_eq!(&body.replay().unwrap()[..], b"abc");
    }

    #[test]
    fn test_reader_error() {
        let mut body = ReplayableBody::from_reader(FailingReader);
        let err = body.replay().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
