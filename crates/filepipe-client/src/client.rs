use std::time::Duration;

use crate::channel::ProcessChannel;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::message::{Command, Response};
use crate::queue::ChannelState;

/// File-management commands executed by a worker process.
///
/// Methods take `&self` and may be called concurrently; each call resolves
/// with the response to its own command. A [`Response`] with a non-empty
/// `error` is a worker-side failure and is returned as `Ok`.
pub struct FileClient {
    channel: ProcessChannel,
    request_timeout: Option<Duration>,
}

impl FileClient {
    /// Start a worker and connect to it.
    pub fn spawn(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            channel: ProcessChannel::spawn(config)?,
            request_timeout: config.request_timeout,
        })
    }

    /// Speak the protocol over an already connected pair of pipes.
    pub fn from_pipes<R, W>(reader: R, writer: W, config: &ClientConfig) -> Self
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
        W: tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            channel: ProcessChannel::from_pipes(reader, writer, config),
            request_timeout: config.request_timeout,
        }
    }

    /// Wrap an existing channel.
    pub fn with_channel(channel: ProcessChannel, request_timeout: Option<Duration>) -> Self {
        Self {
            channel,
            request_timeout,
        }
    }

    /// List the entries of the directory at `path`.
    pub async fn list(&self, path: impl Into<String>) -> Result<Response> {
        self.request(Command::List { path: path.into() }).await
    }

    /// Remove the file or directory at `path`. Directories are removed with
    /// their contents.
    pub async fn remove(&self, path: impl Into<String>) -> Result<Response> {
        self.request(Command::Remove { path: path.into() }).await
    }

    /// Create a single directory at `path`.
    pub async fn make_directory(&self, path: impl Into<String>) -> Result<Response> {
        self.request(Command::MakeDirectory { path: path.into() })
            .await
    }

    /// Copy `source` into the directory `destination`.
    pub async fn copy(
        &self,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<Response> {
        self.request(Command::Copy {
            source: source.into(),
            destination: destination.into(),
        })
        .await
    }

    /// Rename `source` to `destination`.
    pub async fn move_path(
        &self,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<Response> {
        self.request(Command::Move {
            source: source.into(),
            destination: destination.into(),
        })
        .await
    }

    /// Validate, submit and await a single command.
    ///
    /// On timeout the command stays queued: its response is still consumed
    /// in order when it arrives.
    pub async fn request(&self, command: Command) -> Result<Response> {
        command.validate()?;
        let kind = command.kind();
        let handle = self.channel.submit(command).await?;
        let id = handle.id();

        let response = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, handle)
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => handle.await,
        }?;

        tracing::debug!(id, op = %kind, ok = response.is_ok(), "command completed");
        Ok(response)
    }

    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Number of commands awaiting a response.
    pub fn pending(&self) -> usize {
        self.channel.pending()
    }

    /// Process id of the worker, if one was spawned.
    pub fn id(&self) -> Option<u32> {
        self.channel.id()
    }

    /// Close the worker's stdin and wait for it to exit.
    pub async fn shutdown(&self) -> ChannelState {
        self.channel.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use filepipe_frame::LineCodec;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{duplex, split};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::message::{EntryKind, FileEntry, Request};

    /// Client wired to an in-process worker that answers with `answer`.
    fn client_with<F>(request_timeout: Option<Duration>, answer: F) -> FileClient
    where
        F: Fn(Request) -> Option<Response> + Send + 'static,
    {
        let (client_io, worker_io) = duplex(64 * 1024);
        let (client_read, client_write) = split(client_io);
        let (worker_read, worker_write) = split(worker_io);

        tokio::spawn(async move {
            let mut frames = FramedRead::new(worker_read, LineCodec::new());
            let mut sink = FramedWrite::new(worker_write, LineCodec::new());
            while let Some(Ok(frame)) = frames.next().await {
                let request: Request = serde_json::from_slice(&frame.payload).unwrap();
                if let Some(response) = answer(request) {
                    let payload = Bytes::from(serde_json::to_vec(&response).unwrap());
                    sink.send(payload).await.unwrap();
                }
            }
        });

        let config = ClientConfig::new("unused");
        FileClient::with_channel(
            ProcessChannel::from_pipes(client_read, client_write, &config),
            request_timeout,
        )
    }

    #[tokio::test]
    async fn list_returns_entries() {
        let client = client_with(None, |request| {
            let files = ["a", "b", "c", "d"]
                .iter()
                .map(|name| FileEntry {
                    name: name.to_string(),
                    kind: EntryKind::Directory,
                    size: 0,
                    mode: 0o755,
                    modified: 0,
                })
                .collect();
            Some(Response::listing(Some(request.id), files))
        });

        let response = client.list("/tmp/fixture").await.unwrap();
        assert!(response.is_ok());
        assert_eq!(response.files.len(), 4);
        assert!(response.files.iter().all(FileEntry::is_dir));
    }

    #[tokio::test]
    async fn worker_errors_are_data() {
        let client = client_with(None, |request| {
            Some(Response::failure(
                Some(request.id),
                "remove /missing: no such file or directory",
            ))
        });

        let response = client.remove("/missing").await.unwrap();
        assert!(!response.is_ok());
        assert!(response.error.contains("no such file"));
    }

    #[tokio::test]
    async fn each_operation_sends_its_command() {
        let client = client_with(None, |request| {
            let echo = serde_json::to_string(&request.command).unwrap();
            Some(Response::failure(Some(request.id), echo))
        });

        let mkdir = client.make_directory("/d").await.unwrap();
        assert!(mkdir.error.contains("\"op\":\"makeDirectory\""));

        let copy = client.copy("/s", "/d").await.unwrap();
        assert!(copy.error.contains("\"op\":\"copy\""));
        assert!(copy.error.contains("\"destination\":\"/d\""));

        let moved = client.move_path("/s", "/t").await.unwrap();
        assert!(moved.error.contains("\"op\":\"move\""));
    }

    #[tokio::test]
    async fn empty_argument_is_rejected_before_sending() {
        let client = client_with(None, |_| panic!("nothing should reach the worker"));

        let err = client.copy("", "/d").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(msg) if msg.contains("source")));
        assert_eq!(client.pending(), 0);
        assert!(client.state().is_open());
    }

    #[tokio::test]
    async fn slow_worker_times_out() {
        let client = client_with(Some(Duration::from_millis(50)), |_| None);

        let err = client.list("/slow").await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(limit) if limit == Duration::from_millis(50)));
        // Still queued; its response would be consumed in order.
        assert_eq!(client.pending(), 1);
    }

    #[tokio::test]
    async fn shutdown_then_commands_fail() {
        let client = client_with(None, |request| Some(Response::success(Some(request.id))));

        assert!(client.make_directory("/x").await.unwrap().is_ok());
        assert_eq!(client.shutdown().await, ChannelState::Closed);

        let err = client.list("/x").await.unwrap_err();
        assert!(matches!(err, ClientError::ChannelClosed));
    }
}
