//! Connection supervisor
//!
//! Owns one client connection from `join` to teardown:
//!
//! ```text
//! CONNECTING -> ACTIVE -> CLOSING -> CLOSED
//! ```
//!
//! While ACTIVE two tokio tasks run: the reader publishes every inbound
//! frame, the writer drains the subscriber's outbox into the socket. The
//! supervisor waits for whichever finishes first, aborts the other
//! immediately, leaves the channel and only then awaits the aborted task.
//! The loser is never awaited un-aborted: an idle reader does not return
//! while the client stays silent.
//!
//! When the client closed first, or sent a message the relay cannot accept,
//! the closing handshake is completed on the shared sink before the socket
//! is dropped. Dropping `run` half way aborts both tasks and leaves the
//! channel all the same.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, info, trace, warn};
use tungstenite::Error as WsError;
use tungstenite::protocol::frame::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::Message as WsMessage;

use crate::relay::{Broadcaster, Outbox, Payload, SubscriberHandle, SubscriberId};
use crate::utils::{InboundFault, RelayError, classify_inbound};

/// Upper bound on finishing a closing handshake with a peer that stopped
/// reading.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type SharedSink<S> = Arc<Mutex<SplitSink<S, WsMessage>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Which of the two tasks finished first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Reader,
    Writer,
}

/// Normal (non-error) ways a connection task ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    /// Reader saw a close frame.
    ClientClosed,
    /// Reader's stream ended without a close frame.
    InboundEnded,
    /// Reader got a message it cannot relay; the connection is closed with
    /// this status code.
    Malformed(CloseCode),
    /// Writer drained a closed outbox.
    OutboxClosed,
    /// Writer observed its handle being closed (left or evicted).
    HandleClosed,
}

#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub received: AtomicU64,
    pub sent: AtomicU64,
    pub malformed: AtomicU64,
}

#[derive(Debug)]
pub struct ConnectionReport {
    pub subscriber: SubscriberId,
    pub channel: String,
    pub first: Side,
    pub exit: Result<TaskExit, RelayError>,
    pub received: u64,
    pub sent: u64,
    pub malformed: u64,
}

pub struct ConnectionSupervisor {
    broadcaster: Arc<Broadcaster>,
    channel: String,
    peer: String,
    state: ConnectionState,
}

impl ConnectionSupervisor {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        channel: impl Into<String>,
        peer: impl Into<String>,
    ) -> Self {
        Self {
            broadcaster,
            channel: channel.into(),
            peer: peer.into(),
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Moves forward only; a repeated or backwards trigger is ignored.
    pub(crate) fn transition(&mut self, next: ConnectionState) -> bool {
        if next <= self.state {
            return false;
        }
        debug!(
            peer = %self.peer,
            channel = %self.channel,
            from = ?self.state,
            to = ?next,
            "connection state"
        );
        self.state = next;
        true
    }

    /// Drives an accepted WebSocket until either side ends, then tears it
    /// down. Never panics and never returns before both tasks have stopped.
    pub async fn run<S>(&mut self, stream: S) -> ConnectionReport
    where
        S: Stream<Item = Result<WsMessage, WsError>>
            + Sink<WsMessage, Error = WsError>
            + Send
            + 'static,
    {
        let (handle, outbox) = self.broadcaster.join(&self.channel);
        self.transition(ConnectionState::Active);
        info!(
            peer = %self.peer,
            channel = %self.channel,
            subscriber = %handle.id(),
            "connection active"
        );

        let stats = Arc::new(ConnectionStats::default());
        let (sink, inbound) = stream.split();
        let sink = Arc::new(Mutex::new(sink));

        let mut reader = tokio::spawn(read_inbound(
            self.broadcaster.clone(),
            self.channel.clone(),
            handle.id().clone(),
            inbound,
            stats.clone(),
        ));
        let mut writer = tokio::spawn(write_outbound(
            handle.clone(),
            outbox,
            sink.clone(),
            stats.clone(),
        ));
        let _teardown = Teardown {
            broadcaster: self.broadcaster.clone(),
            handle: handle.clone(),
            tasks: [reader.abort_handle(), writer.abort_handle()],
        };

        let (first, exit, loser) = tokio::select! {
            res = &mut reader => (Side::Reader, flatten(res), writer),
            res = &mut writer => (Side::Writer, flatten(res), reader),
        };

        self.transition(ConnectionState::Closing);
        loser.abort();
        self.broadcaster.leave(&handle);

        if let Err(err) = loser.await {
            if err.is_panic() {
                warn!(
                    peer = %self.peer,
                    channel = %self.channel,
                    "connection task panicked during shutdown"
                );
            }
        }

        match &exit {
            Ok(TaskExit::ClientClosed) => self.finish_close(&sink, None).await,
            Ok(TaskExit::Malformed(code)) => {
                let frame = CloseFrame {
                    code: *code,
                    reason: "malformed message".into(),
                };
                self.finish_close(&sink, Some(frame)).await;
            }
            _ => {}
        }
        self.transition(ConnectionState::Closed);

        let report = ConnectionReport {
            subscriber: handle.id().clone(),
            channel: self.channel.clone(),
            first,
            exit,
            received: stats.received.load(Ordering::Relaxed),
            sent: stats.sent.load(Ordering::Relaxed),
            malformed: stats.malformed.load(Ordering::Relaxed),
        };

        match &report.exit {
            Ok(exit) => info!(
                peer = %self.peer,
                channel = %report.channel,
                subscriber = %report.subscriber,
                first = ?report.first,
                exit = ?exit,
                received = report.received,
                sent = report.sent,
                malformed = report.malformed,
                "connection closed"
            ),
            Err(err) => warn!(
                peer = %self.peer,
                channel = %report.channel,
                subscriber = %report.subscriber,
                first = ?report.first,
                kind = err.as_label(),
                error = %err,
                received = report.received,
                sent = report.sent,
                "connection dropped"
            ),
        }

        report
    }

    /// Sends `frame` when the relay is the side closing, then flushes the
    /// close reply tungstenite queued if the client closed first.
    async fn finish_close<S>(&self, sink: &SharedSink<S>, frame: Option<CloseFrame>)
    where
        S: Sink<WsMessage, Error = WsError>,
    {
        let close = async {
            let mut sink = sink.lock().await;
            if let Some(frame) = frame {
                sink.send(WsMessage::Close(Some(frame))).await?;
            }
            sink.close().await
        };

        match tokio::time::timeout(CLOSE_GRACE, close).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(peer = %self.peer, error = %err, "closing handshake not completed")
            }
            Err(_) => debug!(peer = %self.peer, "closing handshake timed out"),
        }
    }
}

/// Aborts both tasks and leaves the channel when dropped. After a normal
/// teardown both steps are no-ops; if `run` is cancelled they release the
/// connection.
struct Teardown {
    broadcaster: Arc<Broadcaster>,
    handle: SubscriberHandle,
    tasks: [AbortHandle; 2],
}

impl Drop for Teardown {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.broadcaster.leave(&self.handle);
    }
}

fn flatten(res: Result<Result<TaskExit, RelayError>, JoinError>) -> Result<TaskExit, RelayError> {
    match res {
        Ok(exit) => exit,
        Err(err) => Err(RelayError::Task(err.to_string())),
    }
}

async fn read_inbound<S>(
    broadcaster: Arc<Broadcaster>,
    channel: String,
    subscriber: SubscriberId,
    mut inbound: SplitStream<S>,
    stats: Arc<ConnectionStats>,
) -> Result<TaskExit, RelayError>
where
    S: Stream<Item = Result<WsMessage, WsError>>,
{
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(WsMessage::Close(_)) => return Ok(TaskExit::ClientClosed),
            Ok(frame) => {
                if let Some(payload) = Payload::from_frame(frame) {
                    stats.received.fetch_add(1, Ordering::Relaxed);
                    let bytes = payload.len();
                    let delivered = broadcaster.publish(&channel, payload);
                    trace!(%channel, %subscriber, bytes, delivered, "published");
                }
            }
            // the stream yields nothing more after an error
            Err(err) => {
                return match classify_inbound(&err) {
                    InboundFault::Malformed(code) => {
                        stats.malformed.fetch_add(1, Ordering::Relaxed);
                        warn!(%channel, %subscriber, error = %err, "malformed message, closing");
                        Ok(TaskExit::Malformed(code))
                    }
                    InboundFault::Transport => Err(err.into()),
                };
            }
        }
    }
    Ok(TaskExit::InboundEnded)
}

async fn write_outbound<S>(
    handle: SubscriberHandle,
    mut outbox: Outbox,
    sink: SharedSink<S>,
    stats: Arc<ConnectionStats>,
) -> Result<TaskExit, RelayError>
where
    S: Sink<WsMessage, Error = WsError>,
{
    let pump = async {
        let mut sink = sink.lock().await;
        while let Some(message) = outbox.recv().await {
            sink.send(message.to_frame()).await?;
            stats.sent.fetch_add(1, Ordering::Relaxed);
        }
        Ok::<_, RelayError>(TaskExit::OutboxClosed)
    };

    // a close must win even when the socket write is stuck
    tokio::select! {
        _ = handle.closed() => Ok(TaskExit::HandleClosed),
        res = pump => res,
    }
}
