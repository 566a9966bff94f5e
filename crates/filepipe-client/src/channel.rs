//! Ownership of the worker process and its two pipes.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use filepipe_frame::{FrameConfig, FrameError, LineCodec};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::config::{ClientConfig, StderrMode};
use crate::error::{ClientError, Result};
use crate::message::{decode_response, encode_request, Command};
use crate::queue::{ChannelState, CorrelationQueue, ResponseHandle};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type FrameSink = FramedWrite<BoxedWriter, LineCodec>;
type FrameStream = FramedRead<BoxedReader, LineCodec>;

/// How long output is still read after the worker process has exited.
const EXIT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// A live connection to one worker.
///
/// A background task drains the worker's stdout and resolves pending
/// requests; when the output ends or the worker exits, the worker is reaped
/// and every pending request fails with the final [`ChannelState`]. Dropping the channel kills
/// the worker.
pub struct ProcessChannel {
    queue: Arc<CorrelationQueue>,
    writer: Mutex<Option<FrameSink>>,
    supervisor: StdMutex<Option<JoinHandle<ChannelState>>>,
    pid: Option<u32>,
    shutdown_timeout: Duration,
}

impl ProcessChannel {
    /// Spawn the worker described by `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &ClientConfig) -> Result<Self> {
        let mut command = ProcessCommand::new(&config.program);
        command
            .args(&config.args)
            .envs(config.envs.iter().cloned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(match config.stderr {
                StderrMode::Inherit => Stdio::inherit(),
                StderrMode::Null => Stdio::null(),
            })
            .kill_on_drop(true);
        if let Some(dir) = &config.current_dir {
            command.current_dir(dir);
        }

        let spawn_error = |source: std::io::Error| ClientError::Spawn {
            program: config.program.clone(),
            source,
        };

        let mut child = command.spawn().map_err(spawn_error)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("worker stdin unavailable")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("worker stdout unavailable")))?;

        tracing::info!(
            program = %config.program.display(),
            pid = child.id(),
            "worker started"
        );

        Ok(Self::start(
            Box::new(stdout),
            Box::new(stdin),
            Some(child),
            config,
        ))
    }

    /// Run the protocol over an already connected pair of pipes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_pipes<R, W>(reader: R, writer: W, config: &ClientConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::start(Box::new(reader), Box::new(writer), None, config)
    }

    fn start(
        reader: BoxedReader,
        writer: BoxedWriter,
        child: Option<Child>,
        config: &ClientConfig,
    ) -> Self {
        let frame_config = FrameConfig {
            max_frame_size: config.max_frame_size,
        };
        let queue = Arc::new(CorrelationQueue::new());
        let pid = child.as_ref().and_then(Child::id);

        let frames = FramedRead::new(reader, LineCodec::with_config(frame_config.clone()));
        let supervisor = tokio::spawn(supervise(
            frames,
            child,
            Arc::clone(&queue),
            config.shutdown_timeout,
        ));

        Self {
            queue,
            writer: Mutex::new(Some(FramedWrite::new(
                writer,
                LineCodec::with_config(frame_config),
            ))),
            supervisor: StdMutex::new(Some(supervisor)),
            pid,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Enqueue a command and write it to the worker.
    ///
    /// The writer lock is held from enqueue to flush, so the queue order is
    /// always the wire order.
    pub async fn submit(&self, command: Command) -> Result<ResponseHandle> {
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(self.queue.state().to_error());
        };

        let (request, handle) = self.queue.enqueue(command)?;
        let payload = match encode_request(&request) {
            Ok(payload) => payload,
            Err(err) => {
                self.queue.withdraw(request.id);
                return Err(err);
            }
        };

        match sink.send(payload).await {
            Ok(()) => {
                tracing::debug!(id = request.id, op = %handle.kind(), "command sent");
                Ok(handle)
            }
            Err(FrameError::Io(err)) => {
                self.queue.withdraw(request.id);
                tracing::warn!(id = request.id, error = %err, "write to worker failed");
                *writer = None;
                self.queue
                    .fail_all(ChannelState::Failed(format!("write to worker failed: {err}")));
                Err(ClientError::WriteFailed(err))
            }
            Err(err) => {
                // Rejected by the encoder; nothing reached the pipe.
                self.queue.withdraw(request.id);
                Err(err.into())
            }
        }
    }

    /// Close the worker's stdin and wait for it to exit.
    ///
    /// A worker still running after `shutdown_timeout` is killed. Every
    /// pending request is failed. Returns the final state.
    pub async fn shutdown(&self) -> ChannelState {
        if let Some(mut sink) = self.writer.lock().await.take() {
            if let Err(err) = sink.close().await {
                tracing::debug!(error = %err, "closing worker stdin failed");
            }
        }

        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut handle) = supervisor {
            match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    self.queue
                        .fail_all(ChannelState::Failed(format!("worker supervisor: {err}")));
                }
                Err(_) => {
                    tracing::warn!(
                        timeout = ?self.shutdown_timeout,
                        "worker did not exit in time, killing it"
                    );
                    handle.abort();
                    self.queue.fail_all(ChannelState::Failed(format!(
                        "worker did not exit within {:?}",
                        self.shutdown_timeout
                    )));
                }
            }
        }

        self.queue.fail_all(ChannelState::Closed);
        self.queue.state()
    }

    pub fn state(&self) -> ChannelState {
        self.queue.state()
    }

    /// Number of commands awaiting a response.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Process id of the worker, if this channel spawned one.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        let supervisor = self
            .supervisor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = supervisor {
            // Dropping the task drops the child, which kills it.
            handle.abort();
        }
    }
}

async fn supervise(
    mut frames: FrameStream,
    child: Option<Child>,
    queue: Arc<CorrelationQueue>,
    reap_timeout: Duration,
) -> ChannelState {
    let state = match child {
        Some(mut child) => {
            tokio::select! {
                state = read_loop(&mut frames, &queue) => {
                    drop(frames);
                    reap(child, state, reap_timeout).await
                }
                status = child.wait() => {
                    // Whatever the worker wrote before exiting is still
                    // readable; a descendant holding stdout keeps it open.
                    let drained = tokio::time::timeout(
                        EXIT_DRAIN_TIMEOUT,
                        read_loop(&mut frames, &queue),
                    )
                    .await;
                    drop(frames);
                    match status {
                        Ok(status) => {
                            tracing::debug!(%status, "worker exited");
                            match drained {
                                Ok(state) => exit_state(state, status),
                                Err(_) => {
                                    tracing::warn!(
                                        %status,
                                        "worker exited but its output is still open"
                                    );
                                    exit_state(ChannelState::Closed, status)
                                }
                            }
                        }
                        Err(err) => ChannelState::Failed(format!("waiting for worker: {err}")),
                    }
                }
            }
        }
        None => {
            let state = read_loop(&mut frames, &queue).await;
            drop(frames);
            state
        }
    };

    tracing::info!(%state, pending = queue.len(), "worker channel finished");
    queue.fail_all(state);
    queue.state()
}

async fn read_loop(frames: &mut FrameStream, queue: &CorrelationQueue) -> ChannelState {
    while let Some(item) = frames.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "worker output unreadable");
                return ChannelState::Failed(format!("reading worker output: {err}"));
            }
        };

        let outcome = decode_response(&frame);
        if let Err(err) = &outcome {
            tracing::warn!(error = %err, "undecodable response from worker");
        }

        if let Err(err) = queue.match_next(outcome) {
            tracing::error!(error = %err, "response ordering lost, closing channel");
            return ChannelState::Failed(err.to_string());
        }
    }

    tracing::debug!("worker closed its output");
    ChannelState::Closed
}

async fn reap(mut child: Child, state: ChannelState, timeout: Duration) -> ChannelState {
    if !matches!(state, ChannelState::Closed) {
        if let Err(err) = child.start_kill() {
            tracing::debug!(error = %err, "kill after protocol failure");
        }
    }

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            return match state {
                ChannelState::Failed(_) => state,
                _ => ChannelState::Failed(format!("waiting for worker: {err}")),
            };
        }
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return match state {
                ChannelState::Failed(_) => state,
                _ => ChannelState::Failed(format!(
                    "worker closed its output but did not exit within {timeout:?}"
                )),
            };
        }
    };

    tracing::debug!(%status, "worker exited");
    exit_state(state, status)
}

fn exit_state(state: ChannelState, status: ExitStatus) -> ChannelState {
    match state {
        ChannelState::Closed if status.success() => ChannelState::Closed,
        ChannelState::Closed | ChannelState::Open => {
            ChannelState::Failed(format!("worker exited with {status}"))
        }
        failed => failed,
    }
}
