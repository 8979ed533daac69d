//! # Transport Session
//!
//! One session owns one [`Link`] to one device address.
//!
//! ## States
//!
//! ```text
//!                 connect()                    write(.., true)
//! Disconnected ─────────────▶ Connecting ──▶ Connected ──────────────▶ AwaitingResponse
//!      ▲                          │              ▲                           │
//!      │        link refused      │              │  notification / timeout   │
//!      └──────────────────────────┘              └───────────────────────────┘
//!      ▲                                         │
//!      └──────────────── disconnect() ───────────┘
//! ```
//!
//! At most one request waits for a response at a time; every operation
//! takes `&mut self`.
//!
//! ## Pacing
//!
//! The printer's receive buffer is small. Bulk data goes out through
//! [`Session::stream`] in 20-byte chunks with a 20 ms gap between them.

use std::time::Duration;

use super::{hex, Link};
use crate::error::{MxError, Result};
use crate::protocol::commands::{frames_to_bytes, Frame};

/// Bytes per transmission when streaming
pub const CHUNK_SIZE: usize = 20;

/// Gap between streamed chunks
pub const CHUNK_DELAY: Duration = Duration::from_millis(20);

/// How long a request waits for its notification
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    AwaitingResponse,
}

/// A paced, request/response-aware connection to one printer.
pub struct Session<L: Link> {
    link: L,
    address: String,
    state: SessionState,
    chunk_size: usize,
    chunk_delay: Duration,
    response_timeout: Duration,
}

impl<L: Link> Session<L> {
    pub fn new(link: L, address: impl Into<String>) -> Self {
        Self {
            link,
            address: address.into(),
            state: SessionState::Disconnected,
            chunk_size: CHUNK_SIZE,
            chunk_delay: CHUNK_DELAY,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }

    /// Override the streaming chunk size and gap.
    pub fn with_pacing(mut self, chunk_size: usize, chunk_delay: Duration) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.chunk_delay = chunk_delay;
        self
    }

    /// Override the response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Open the link. A no-op when already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Ok(());
        }
        self.state = SessionState::Connecting;
        match self.link.connect(&self.address).await {
            Ok(()) => {
                self.state = SessionState::Connected;
                tracing::info!("connected to {}", self.address);
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(match e {
                    MxError::Connection(_) => e,
                    other => MxError::Connection(format!(
                        "failed to connect to {}: {}",
                        self.address, other
                    )),
                })
            }
        }
    }

    /// Close the link. Safe to call in any state.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Ok(());
        }
        self.state = SessionState::Disconnected;
        self.link.disconnect().await?;
        tracing::info!("disconnected from {}", self.address);
        Ok(())
    }

    /// Write one block. With `expect_response`, wait for the next
    /// notification and return it.
    ///
    /// ## Errors
    ///
    /// - [`MxError::Connection`] when not connected or the write fails
    /// - [`MxError::Timeout`] when no notification arrives in time; the
    ///   session stays connected
    pub async fn write(&mut self, data: &[u8], expect_response: bool) -> Result<Option<Vec<u8>>> {
        self.ensure_connected()?;

        if !expect_response {
            self.transmit(data).await?;
            return Ok(None);
        }

        self.state = SessionState::AwaitingResponse;
        let result = self.exchange(data).await;
        self.state = SessionState::Connected;
        result.map(Some)
    }

    /// Send a frame and wait for its response.
    pub async fn request(&mut self, frame: &Frame) -> Result<Vec<u8>> {
        let response = self.write(&frame.to_bytes(), true).await?;
        response.ok_or_else(|| MxError::Decode("no response received".into()))
    }

    /// Send a frame without waiting.
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.write(&frame.to_bytes(), false).await.map(|_| ())
    }

    /// Stream `data` in paced chunks. The first failed chunk aborts.
    pub async fn stream(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_connected()?;

        let total = data.len().div_ceil(self.chunk_size);
        for (i, chunk) in data.chunks(self.chunk_size).enumerate() {
            if i > 0 && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            self.transmit(chunk).await.map_err(|e| {
                MxError::Connection(format!("chunk {}/{} failed: {}", i + 1, total, e))
            })?;
        }
        Ok(())
    }

    /// Serialize and stream a frame sequence.
    pub async fn stream_frames(&mut self, frames: &[Frame]) -> Result<()> {
        self.stream(&frames_to_bytes(frames)).await
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.state {
            SessionState::Connected => Ok(()),
            other => Err(MxError::Connection(format!(
                "cannot write to {} while {:?}",
                self.address, other
            ))),
        }
    }

    async fn transmit(&mut self, data: &[u8]) -> Result<()> {
        tracing::debug!("TX: {}", hex(data));
        self.link.write(data).await.map_err(|e| match e {
            MxError::Connection(_) => e,
            other => MxError::Connection(format!("write failed: {}", other)),
        })
    }

    async fn exchange(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.link.subscribe().await?;

        let outcome = match self.transmit(data).await {
            Ok(()) => {
                match tokio::time::timeout(self.response_timeout, self.link.next_notification()).await
                {
                    Ok(response) => response,
                    Err(_) => Err(MxError::Timeout(self.response_timeout.as_millis() as u64)),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = self.link.unsubscribe().await {
            tracing::warn!("unsubscribe failed: {}", e);
        }

        if let Ok(response) = &outcome {
            tracing::debug!("RX: {}", hex(response));
        }
        outcome
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockLink {
        refuse_connect: bool,
        fail_write_after: Option<usize>,
        writes: Vec<Vec<u8>>,
        responses: VecDeque<Vec<u8>>,
        subscribed: bool,
        subscriptions: usize,
        disconnects: usize,
    }

    #[async_trait]
    impl Link for MockLink {
        async fn connect(&mut self, _address: &str) -> Result<()> {
            if self.refuse_connect {
                Err(MxError::Connection("refused".into()))
            } else {
                Ok(())
            }
        }

        async fn write(&mut self, data: &[u8]) -> Result<()> {
            if self.fail_write_after == Some(self.writes.len()) {
                return Err(MxError::Io(std::io::Error::other("link dropped")));
            }
            self.writes.push(data.to_vec());
            Ok(())
        }

        async fn subscribe(&mut self) -> Result<()> {
            self.subscribed = true;
            self.subscriptions += 1;
            Ok(())
        }

        async fn next_notification(&mut self) -> Result<Vec<u8>> {
            match self.responses.pop_front() {
                Some(r) => Ok(r),
                None => std::future::pending().await,
            }
        }

        async fn unsubscribe(&mut self) -> Result<()> {
            self.subscribed = false;
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<()> {
            self.disconnects += 1;
            Ok(())
        }
    }

    fn session(link: MockLink) -> Session<MockLink> {
        Session::new(link, "AA:BB:CC:DD:EE:FF")
            .with_pacing(CHUNK_SIZE, Duration::ZERO)
            .with_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let mut s = session(MockLink::default());
        assert_eq!(s.state(), SessionState::Disconnected);
        s.connect().await.unwrap();
        assert_eq!(s.state(), SessionState::Connected);

        s.disconnect().await.unwrap();
        s.disconnect().await.unwrap();
        assert_eq!(s.state(), SessionState::Disconnected);
        assert_eq!(s.link().disconnects, 1);
    }

    #[tokio::test]
    async fn test_refused_connect_reverts() {
        let mut s = session(MockLink {
            refuse_connect: true,
            ..Default::default()
        });
        let err = s.connect().await.unwrap_err();
        assert!(matches!(err, MxError::Connection(_)));
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_write_requires_connection() {
        let mut s = session(MockLink::default());
        let err = s.write(&[1, 2, 3], false).await.unwrap_err();
        assert!(matches!(err, MxError::Connection(_)));
        assert!(s.stream(&[0; 40]).await.is_err());
        assert!(s.link().writes.is_empty());
    }

    #[tokio::test]
    async fn test_request_returns_notification() {
        let mut link = MockLink::default();
        link.responses.push_back(vec![0x51, 0x78, 0xa3, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0xff]);
        let mut s = session(link);
        s.connect().await.unwrap();

        let response = s.request(&commands::get_status()).await.unwrap();
        assert_eq!(response[6], 0x00);
        assert_eq!(s.state(), SessionState::Connected);
        assert_eq!(s.link().writes, vec![commands::get_status().to_bytes()]);
        assert_eq!(s.link().subscriptions, 1);
        assert!(!s.link().subscribed);
    }

    #[tokio::test]
    async fn test_timeout_keeps_connection() {
        let mut s = session(MockLink::default());
        s.connect().await.unwrap();

        let err = s.write(&[0xaa], true).await.unwrap_err();
        assert!(matches!(err, MxError::Timeout(50)));
        assert_eq!(s.state(), SessionState::Connected);
        assert!(!s.link().subscribed);

        // Still usable afterwards
        s.write(&[0xbb], false).await.unwrap();
        assert_eq!(s.link().writes.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_chunks() {
        let mut s = session(MockLink::default());
        s.connect().await.unwrap();

        let data: Vec<u8> = (0..=49).collect();
        s.stream(&data).await.unwrap();

        let writes = &s.link().writes;
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0].len(), 20);
        assert_eq!(writes[1].len(), 20);
        assert_eq!(writes[2].len(), 10);
        assert_eq!(writes.concat(), data);
    }

    #[tokio::test]
    async fn test_stream_aborts_on_failed_chunk() {
        let mut s = session(MockLink {
            fail_write_after: Some(1),
            ..Default::default()
        });
        s.connect().await.unwrap();

        let err = s.stream(&[0u8; 100]).await.unwrap_err();
        assert!(matches!(err, MxError::Connection(_)));
        assert!(err.to_string().contains("chunk 2/5"));
        assert_eq!(s.link().writes.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_paces_chunks() {
        let mut s = Session::new(MockLink::default(), "dev").with_pacing(4, Duration::from_millis(5));
        s.connect().await.unwrap();

        let start = std::time::Instant::now();
        s.stream(&[0u8; 16]).await.unwrap();
        // 4 chunks, 3 gaps
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_stream_frames_matches_serialization() {
        let mut s = session(MockLink::default());
        s.connect().await.unwrap();
        let frames = vec![commands::get_status(), commands::set_quality()];
        s.stream_frames(&frames).await.unwrap();
        assert_eq!(s.link().writes.concat(), frames_to_bytes(&frames));
    }
}
