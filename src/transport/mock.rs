//! A scripted [`super::Transport`] test double.
//!
//! `MockTransport` replays a fixed sequence of inbound frames and records
//! every outbound frame for assertions, so the handshake, session, and
//! supervisor can be driven deterministically without a socket.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StreamError};

use super::Transport;

/// Frames this double will hand back from successive [`Transport::read`]
/// calls, plus a log of everything written to it.
#[derive(Default)]
struct Script {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<Vec<u8>>,
    closed: bool,
    /// Once set and `inbound` is drained, `read` returns `Ok(None)` — a
    /// clean peer close — instead of waiting forever for a frame that will
    /// never arrive.
    end_of_stream: bool,
    ping_count: usize,
}

/// A handle shared between a [`MockTransport`] and its test, used to seed
/// inbound frames and inspect outbound ones after the fact.
#[derive(Clone, Default)]
pub struct MockHandle {
    script: Arc<Mutex<Script>>,
    notify: Arc<Notify>,
}

impl MockHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame to be returned by the next `read` call.
    pub fn push_inbound(&self, frame: Vec<u8>) {
        self.script.lock().unwrap().inbound.push_back(frame);
        self.notify.notify_waiters();
    }

    /// Mark the script exhausted: once queued frames are drained, `read`
    /// returns `Ok(None)` as if the peer closed the connection.
    pub fn end_stream(&self) {
        self.script.lock().unwrap().end_of_stream = true;
        self.notify.notify_waiters();
    }

    /// All frames written through this transport so far, in order.
    pub fn outbound(&self) -> Vec<Vec<u8>> {
        self.script.lock().unwrap().outbound.clone()
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.script.lock().unwrap().closed
    }

    /// How many times `ping` has been called.
    pub fn ping_count(&self) -> usize {
        self.script.lock().unwrap().ping_count
    }
}

/// A [`Transport`] backed by an in-memory script instead of a socket.
pub struct MockTransport {
    handle: MockHandle,
}

impl MockTransport {
    /// Create a transport paired with a [`MockHandle`] the test keeps to
    /// seed frames and inspect what was sent.
    pub fn new() -> (Self, MockHandle) {
        let handle = MockHandle::new();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Vec<u8>>> {
        loop {
            {
                let mut script = self.handle.script.lock().unwrap();
                if let Some(frame) = script.inbound.pop_front() {
                    return Ok(Some(frame));
                }
                if script.end_of_stream {
                    return Ok(None);
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = self.handle.notify.notified() => continue,
            }
        }
    }

    async fn write(&mut self, data: Vec<u8>, _cancel: &CancellationToken) -> Result<()> {
        self.handle.script.lock().unwrap().outbound.push(data);
        Ok(())
    }

    async fn ping(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.handle.script.lock().unwrap().ping_count += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.handle.script.lock().unwrap().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_returns_scripted_frames_in_order() {
        let (mut transport, handle) = MockTransport::new();
        handle.push_inbound(vec![1, 2, 3]);
        handle.push_inbound(vec![4, 5]);
        let cancel = CancellationToken::new();
        assert_eq!(transport.read(&cancel).await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(transport.read(&cancel).await.unwrap(), Some(vec![4, 5]));
    }

    #[tokio::test]
    async fn write_is_recorded_on_the_handle() {
        let (mut transport, handle) = MockTransport::new();
        let cancel = CancellationToken::new();
        transport.write(vec![9], &cancel).await.unwrap();
        assert_eq!(handle.outbound(), vec![vec![9]]);
    }

    #[tokio::test]
    async fn close_marks_handle_closed() {
        let (mut transport, handle) = MockTransport::new();
        transport.close().await.unwrap();
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn read_respects_cancellation() {
        let (mut transport, _handle) = MockTransport::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            transport.read(&cancel).await,
            Err(StreamError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn end_stream_yields_clean_close_after_queued_frames_drain() {
        let (mut transport, handle) = MockTransport::new();
        handle.push_inbound(vec![1]);
        handle.end_stream();
        let cancel = CancellationToken::new();
        assert_eq!(transport.read(&cancel).await.unwrap(), Some(vec![1]));
        assert_eq!(transport.read(&cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn end_stream_before_any_frame_is_an_immediate_clean_close() {
        let (mut transport, handle) = MockTransport::new();
        handle.end_stream();
        let cancel = CancellationToken::new();
        assert_eq!(transport.read(&cancel).await.unwrap(), None);
    }
}
