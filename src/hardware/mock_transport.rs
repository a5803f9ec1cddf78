//! In-memory byte transport standing in for a serial port or TCP socket.
//!
//! `MockTransport` implements `AsyncRead` and `AsyncWrite` and is handed to a driver
//! in place of the real port. Every `poll_write` is treated as one command frame:
//! the frame (without its trailing CR/LF) is appended to a shared [`TransportLog`]
//! and passed to a responder closure, whose [`DeviceReply`] decides what the driver
//! reads back.
//!
//! # Example
//!
//! ```rust,ignore
//! use spr_daq::hardware::mock_transport::{DeviceReply, MockTransport};
//!
//! let (port, log) = MockTransport::scripted(vec![
//!     ("*IDN?", Some("NEWPORT 2936-R v1.0.2 01/06/2011 SN12345\r\n")),
//!     ("PM:DS:EN 1", None),
//! ]);
//! let meter = Newport2936Driver::with_transport(port, Duration::from_millis(200));
//! assert!(meter.identify().await?.starts_with("NEWPORT"));
//! assert_eq!(log.commands(), vec!["*IDN?"]);
//! ```

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// What the simulated device does in response to a command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceReply {
    /// Bytes made available to the driver's next read
    Bytes(Vec<u8>),
    /// Accept the command without answering
    Silent,
    /// Fail the write and close the read side (cable pulled)
    Disconnect,
}

impl DeviceReply {
    /// Reply with the given text verbatim
    pub fn text(text: impl Into<String>) -> Self {
        DeviceReply::Bytes(text.into().into_bytes())
    }
}

/// Shared record of the command frames a transport received
#[derive(Debug, Clone, Default)]
pub struct TransportLog {
    frames: Arc<Mutex<Vec<String>>>,
}

impl TransportLog {
    fn push(&self, frame: String) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
    }

    /// All frames received so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of frames that start with `prefix`
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|frame| frame.starts_with(prefix))
            .count()
    }
}

type Responder = Box<dyn FnMut(&str) -> DeviceReply + Send>;

/// Client-facing side of the simulated device
pub struct MockTransport {
    responder: Responder,
    pending: VecDeque<u8>,
    log: TransportLog,
    read_waker: Option<Waker>,
    closed: bool,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("pending", &self.pending.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl MockTransport {
    /// Transport driven by an arbitrary responder
    pub fn with_responder<F>(responder: F) -> (Self, TransportLog)
    where
        F: FnMut(&str) -> DeviceReply + Send + 'static,
    {
        let log = TransportLog::default();
        let transport = Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
            log: log.clone(),
            read_waker: None,
            closed: false,
        };
        (transport, log)
    }

    /// Transport that expects exactly the given command sequence
    ///
    /// Each entry pairs the expected frame with an optional reply. A frame that does
    /// not match the next expectation, or arrives after the script is exhausted,
    /// disconnects the transport so the driver sees an I/O error.
    pub fn scripted(script: Vec<(&str, Option<&str>)>) -> (Self, TransportLog) {
        let mut expectations: VecDeque<(String, Option<String>)> = script
            .into_iter()
            .map(|(cmd, reply)| (cmd.to_string(), reply.map(str::to_string)))
            .collect();

        Self::with_responder(move |frame| match expectations.pop_front() {
            Some((expected, reply)) if expected == frame => match reply {
                Some(text) => DeviceReply::text(text),
                None => DeviceReply::Silent,
            },
            Some((expected, _)) => {
                tracing::error!(expected = %expected, got = %frame, "MockTransport: unexpected command");
                DeviceReply::Disconnect
            }
            None => {
                tracing::error!(got = %frame, "MockTransport: command after end of script");
                DeviceReply::Disconnect
            }
        })
    }

    fn fill(&mut self, buf: &mut ReadBuf<'_>) {
        let to_read = std::cmp::min(buf.remaining(), self.pending.len());
        let chunk: Vec<u8> = self.pending.drain(..to_read).collect();
        buf.put_slice(&chunk);
    }
}

impl AsyncRead for MockTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.pending.is_empty() {
            self.fill(buf);
            return Poll::Ready(Ok(()));
        }
        if self.closed {
            // EOF
            return Poll::Ready(Ok(()));
        }
        self.read_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl AsyncWrite for MockTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device disconnected",
            )));
        }

        let frame = String::from_utf8_lossy(buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.log.push(frame.clone());

        match (self.responder)(&frame) {
            DeviceReply::Bytes(bytes) => self.pending.extend(bytes),
            DeviceReply::Silent => {}
            DeviceReply::Disconnect => {
                self.closed = true;
                if let Some(waker) = self.read_waker.take() {
                    waker.wake();
                }
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("mock device rejected command '{frame}'"),
                )));
            }
        }

        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.closed = true;
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_command_response() {
        let (port, log) = MockTransport::scripted(vec![("PING", Some("PONG\n"))]);
        let mut port = BufReader::new(port);

        port.write_all(b"PING\n").await.unwrap();
        let mut response = String::new();
        port.read_line(&mut response).await.unwrap();

        assert_eq!(response, "PONG\n");
        assert_eq!(log.commands(), vec!["PING"]);
    }

    #[tokio::test]
    async fn test_silent_command_then_query() {
        let (port, log) =
            MockTransport::scripted(vec![("SET 1", None), ("GET?", Some("1\r\n"))]);
        let mut port = BufReader::new(port);

        port.write_all(b"SET 1\r\n").await.unwrap();
        port.write_all(b"GET?\r\n").await.unwrap();
        let mut response = String::new();
        port.read_line(&mut response).await.unwrap();

        assert_eq!(response.trim(), "1");
        assert_eq!(log.count_prefix("SET"), 1);
    }

    #[tokio::test]
    async fn test_read_without_reply_times_out() {
        let (port, _log) = MockTransport::scripted(vec![("QUERY", None)]);
        let mut port = BufReader::new(port);

        port.write_all(b"QUERY\n").await.unwrap();
        let mut response = String::new();
        let result = timeout(Duration::from_millis(50), port.read_line(&mut response)).await;
        assert!(result.is_err(), "Expected timeout error");
    }

    #[tokio::test]
    async fn test_unexpected_command_disconnects() {
        let (port, _log) = MockTransport::scripted(vec![("A", Some("ok\n"))]);
        let mut port = BufReader::new(port);

        assert!(port.write_all(b"B\n").await.is_err());
        // Read side reports EOF afterwards
        let mut response = String::new();
        assert_eq!(port.read_line(&mut response).await.unwrap(), 0);
    }
}
