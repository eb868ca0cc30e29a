//! Fixed-capacity line buffer over an async byte stream.
//!
//! The protocol has no length framing, so the only way to find the end of a
//! response is to read line by line. A line that does not fit in the buffer
//! can never be resynchronized on and is reported as a fatal overrun.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{MpdError, Result};

/// Default read buffer size, which is also the maximum line length.
pub const BUFFER_CAPACITY: usize = 16384;

pub struct LineReader {
    buf: Box<[u8]>,
    start: usize,
    len: usize,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReader {
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            len: 0,
        }
    }

    /// Bytes received but not yet returned as lines.
    pub fn buffered(&self) -> usize {
        self.len - self.start
    }

    /// Whether a complete line is waiting in the buffer.
    pub fn has_line(&self) -> bool {
        self.buf[self.start..self.len].contains(&b'\n')
    }

    /// Take the next complete line from the buffer without touching the
    /// stream. The terminator and an optional preceding `\r` are stripped.
    pub fn buffered_line(&mut self) -> Option<String> {
        let pending = &self.buf[self.start..self.len];
        let newline = pending.iter().position(|&b| b == b'\n')?;

        let mut line = &pending[..newline];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        let line = String::from_utf8_lossy(line).into_owned();

        self.start += newline + 1;
        if self.start == self.len {
            self.start = 0;
            self.len = 0;
        }
        Some(line)
    }

    /// Perform one read from `stream` into the free tail of the buffer.
    ///
    /// Compacts first when the tail is full. A read that does not complete
    /// within `timeout` fails with [`MpdError::Timeout`]; `None` waits
    /// forever. Dropping the returned future before it completes loses no
    /// data, so it can be raced in `tokio::select!`.
    pub async fn fill<R>(&mut self, stream: &mut R, timeout: Option<Duration>) -> Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if self.len == self.buf.len() {
            if self.start == 0 {
                return Err(MpdError::BufferOverrun(self.buf.len()));
            }
            self.compact();
        }

        let read = stream.read(&mut self.buf[self.len..]);
        let n = match timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| MpdError::Timeout)??,
            None => read.await?,
        };

        if n == 0 {
            return Err(MpdError::ConnectionClosed);
        }
        self.len += n;
        tracing::trace!("read {} bytes ({} buffered)", n, self.buffered());
        Ok(n)
    }

    /// Return the next line, reading from `stream` as needed. Every
    /// individual read gets the full `timeout`.
    pub async fn next_line<R>(&mut self, stream: &mut R, timeout: Option<Duration>) -> Result<String>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        loop {
            if let Some(line) = self.buffered_line() {
                return Ok(line);
            }
            self.fill(stream, timeout).await?;
        }
    }

    fn compact(&mut self) {
        self.buf.copy_within(self.start..self.len, 0);
        self.len -= self.start;
        self.start = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(1));

    #[tokio::test]
    async fn joins_partial_reads_and_strips_cr() {
        let mut stream = Builder::new()
            .read(b"Artist: Bo")
            .read(b"b\r\nOK\n")
            .build();
        let mut reader = LineReader::new();

        assert_eq!(reader.next_line(&mut stream, TIMEOUT).await.unwrap(), "Artist: Bob");
        assert_eq!(reader.next_line(&mut stream, TIMEOUT).await.unwrap(), "OK");
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn serves_buffered_lines_without_reading() {
        let mut stream = Builder::new().read(b"a: 1\nb: 2\nOK\n").build();
        let mut reader = LineReader::new();

        assert_eq!(reader.next_line(&mut stream, TIMEOUT).await.unwrap(), "a: 1");
        assert!(reader.has_line());
        assert_eq!(reader.buffered_line().as_deref(), Some("b: 2"));
        assert_eq!(reader.buffered_line().as_deref(), Some("OK"));
        assert_eq!(reader.buffered_line(), None);
    }

    #[tokio::test]
    async fn compacts_when_tail_is_full() {
        let mut stream = Builder::new()
            .read(b"aaaa\nbbbbbbbbbbb")
            .read(b"cc\n")
            .build();
        let mut reader = LineReader::with_capacity(16);

        assert_eq!(reader.next_line(&mut stream, TIMEOUT).await.unwrap(), "aaaa");
        assert_eq!(
            reader.next_line(&mut stream, TIMEOUT).await.unwrap(),
            "bbbbbbbbbbbcc"
        );
    }

    #[tokio::test]
    async fn overlong_line_overruns() {
        let mut stream = Builder::new().read(b"0123456789abcdef").build();
        let mut reader = LineReader::with_capacity(16);

        let err = reader.next_line(&mut stream, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, MpdError::BufferOverrun(16)));
        assert_eq!(reader.buffered_line(), None);
    }

    #[tokio::test]
    async fn eof_reports_connection_closed() {
        let mut stream = Builder::new().read(b"half a li").build();
        let mut reader = LineReader::new();

        let err = reader.next_line(&mut stream, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, MpdError::ConnectionClosed));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (mut client, _server) = tokio::io::duplex(64);
        let mut reader = LineReader::new();

        let err = reader
            .next_line(&mut client, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, MpdError::Timeout));
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let mut stream = Builder::new().read(b"Title: \xff\xfe\n").build();
        let mut reader = LineReader::new();

        let line = reader.next_line(&mut stream, TIMEOUT).await.unwrap();
        assert!(line.starts_with("Title: "));
        assert!(line.contains('\u{FFFD}'));
    }
}
