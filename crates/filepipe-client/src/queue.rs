//! Correlation of worker responses with the requests that caused them.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{ClientError, Result};
use crate::message::{Command, CommandKind, Request, Response};

/// Lifecycle of the channel to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Worker alive, pipes usable.
    Open,
    /// Worker exited cleanly.
    Closed,
    /// Worker died, a pipe broke, or the protocol can no longer be trusted.
    Failed(String),
}

impl ChannelState {
    pub fn is_open(&self) -> bool {
        matches!(self, ChannelState::Open)
    }

    /// The error handed to requests that meet this state.
    pub fn to_error(&self) -> ClientError {
        match self {
            ChannelState::Failed(reason) => ClientError::ChannelFailed(reason.clone()),
            ChannelState::Open | ChannelState::Closed => ClientError::ChannelClosed,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Open => f.write_str("open"),
            ChannelState::Closed => f.write_str("closed"),
            ChannelState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

struct PendingRequest {
    id: u64,
    kind: CommandKind,
    completion: oneshot::Sender<Result<Response>>,
}

/// Awaitable completion of one submitted command.
///
/// Dropping the handle does not cancel the command: the worker still runs it
/// and its response is still consumed in order, then discarded.
#[derive(Debug)]
pub struct ResponseHandle {
    id: u64,
    kind: CommandKind,
    rx: oneshot::Receiver<Result<Response>>,
}

impl ResponseHandle {
    /// Correlation id assigned to the command.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }
}

impl Future for ResponseHandle {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ClientError::ChannelClosed)))
    }
}

struct QueueInner {
    pending: VecDeque<PendingRequest>,
    state: ChannelState,
    next_id: u64,
}

/// FIFO of requests awaiting a response.
///
/// All state sits behind one mutex that is never held across an `.await`.
pub struct CorrelationQueue {
    inner: Mutex<QueueInner>,
}

impl Default for CorrelationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                state: ChannelState::Open,
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a request to the tail and hand back its completion.
    ///
    /// Fails with `ChannelClosed`/`ChannelFailed` once the queue is terminal.
    pub fn enqueue(&self, command: Command) -> Result<(Request, ResponseHandle)> {
        let mut inner = self.lock();
        if !inner.state.is_open() {
            return Err(inner.state.to_error());
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let kind = command.kind();
        let (tx, rx) = oneshot::channel();
        inner.pending.push_back(PendingRequest {
            id,
            kind,
            completion: tx,
        });
        tracing::trace!(id, op = %kind, pending = inner.pending.len(), "request enqueued");

        Ok((Request { id, command }, ResponseHandle { id, kind, rx }))
    }

    /// Fulfill one pending request with a decoded response or a decode failure.
    ///
    /// Responses carrying an `id` go to the request with that id; everything
    /// else goes to the oldest pending request. Fails with `ProtocolDesync`
    /// when nothing is pending for it.
    pub fn match_next(&self, outcome: Result<Response>) -> Result<()> {
        let correlated = outcome.as_ref().ok().and_then(|response| response.id);

        let entry = {
            let mut inner = self.lock();
            match correlated {
                Some(id) => {
                    let position = inner
                        .pending
                        .iter()
                        .position(|entry| entry.id == id)
                        .ok_or_else(|| {
                            ClientError::ProtocolDesync(format!(
                                "response id {id} matches no pending request"
                            ))
                        })?;
                    if position != 0 {
                        tracing::debug!(id, position, "worker answered out of order");
                    }
                    inner.pending.remove(position)
                }
                None => inner.pending.pop_front(),
            }
        };

        let entry = entry.ok_or_else(|| {
            ClientError::ProtocolDesync("response arrived with no pending request".to_string())
        })?;

        if entry.completion.send(outcome).is_err() {
            tracing::debug!(id = entry.id, op = %entry.kind, "caller gone, response discarded");
        }
        Ok(())
    }

    /// Move to a terminal state and fail every pending request with it.
    ///
    /// The first terminal state wins; later calls only drain. Returns the
    /// number of requests failed by this call.
    pub fn fail_all(&self, state: ChannelState) -> usize {
        let (drained, state) = {
            let mut inner = self.lock();
            if inner.state.is_open() {
                inner.state = match state {
                    ChannelState::Open => ChannelState::Closed,
                    terminal => terminal,
                };
            }
            let drained: Vec<PendingRequest> = inner.pending.drain(..).collect();
            (drained, inner.state.clone())
        };

        let count = drained.len();
        if count > 0 {
            tracing::debug!(count, %state, "failing pending requests");
        }
        for entry in drained {
            let _ = entry.completion.send(Err(state.to_error()));
        }
        count
    }

    /// Remove a pending request whose frame never reached the worker.
    pub fn withdraw(&self, id: u64) -> bool {
        let mut inner = self.lock();
        match inner.pending.iter().position(|entry| entry.id == id) {
            Some(position) => {
                inner.pending.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.lock().state.clone()
    }

    /// Number of requests awaiting a response.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
