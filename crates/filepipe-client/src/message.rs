//! Wire messages exchanged with the worker.
//!
//! Each request and each response is one JSON object on its own line:
//!
//! ```text
//! → {"id":7,"op":"copy","source":"/tmp/src","destination":"/tmp/dest"}
//! ← {"id":7,"error":"","files":[]}
//! ```

use std::fmt;

use bytes::Bytes;
use filepipe_frame::RawFrame;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

const PREVIEW_LEN: usize = 96;

/// A file-management command. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Command {
    /// List the entries of a directory.
    List { path: String },
    /// Remove a file or directory.
    Remove { path: String },
    /// Create a directory.
    MakeDirectory { path: String },
    /// Copy `source` into the `destination` directory.
    Copy { source: String, destination: String },
    /// Rename `source` to `destination`.
    Move { source: String, destination: String },
}

/// Operation name of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    List,
    Remove,
    MakeDirectory,
    Copy,
    Move,
}

impl CommandKind {
    /// Wire name of the operation.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::List => "list",
            CommandKind::Remove => "remove",
            CommandKind::MakeDirectory => "makeDirectory",
            CommandKind::Copy => "copy",
            CommandKind::Move => "move",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::List { .. } => CommandKind::List,
            Command::Remove { .. } => CommandKind::Remove,
            Command::MakeDirectory { .. } => CommandKind::MakeDirectory,
            Command::Copy { .. } => CommandKind::Copy,
            Command::Move { .. } => CommandKind::Move,
        }
    }

    /// Reject empty path arguments.
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::List { path } | Command::Remove { path } | Command::MakeDirectory { path } => {
                require_path("path", path)
            }
            Command::Copy {
                source,
                destination,
            }
            | Command::Move {
                source,
                destination,
            } => {
                require_path("source", source)?;
                require_path("destination", destination)
            }
        }
    }
}

fn require_path(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ClientError::InvalidArgument(format!(
            "{name} must not be empty"
        )));
    }
    Ok(())
}

/// Request envelope: a command plus its correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub command: Command,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// One directory entry reported by `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub kind: EntryKind,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mode: u32,
    /// Modification time in seconds since the unix epoch.
    #[serde(default)]
    pub modified: u64,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Result of one command as reported by the worker.
///
/// `error` is empty on success. Check it rather than inferring success from
/// the payload: a failed `list` also carries an empty `files`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub error: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl Response {
    /// Successful response without payload.
    pub fn success(id: Option<u64>) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Successful response carrying directory entries.
    pub fn listing(id: Option<u64>, files: Vec<FileEntry>) -> Self {
        Self {
            id,
            error: String::new(),
            files,
        }
    }

    /// Worker-side failure.
    pub fn failure(id: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            id,
            error: error.into(),
            files: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

/// Serialize a request into one frame payload (delimiter not included).
pub fn encode_request(request: &Request) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(request)?))
}

/// Decode a frame received from the worker.
pub fn decode_response(frame: &RawFrame) -> Result<Response> {
    serde_json::from_slice(&frame.payload).map_err(|err| {
        ClientError::MalformedResponse(format!("{err} (frame: {})", preview(&frame.payload)))
    })
}

fn preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    if text.chars().count() <= PREVIEW_LEN {
        return text.into_owned();
    }
    let mut cut: String = text.chars().take(PREVIEW_LEN).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use filepipe_frame::{encode_frame, LineCodec};

    use super::*;

    fn request_wire(request: &Request) -> String {
        String::from_utf8(encode_request(request).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn request_wire_shape() {
        let list = Request {
            id: 7,
            command: Command::List {
                path: "/tmp/d".to_string(),
            },
        };
        let value: serde_json::Value = serde_json::from_str(&request_wire(&list)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"id": 7, "op": "list", "path": "/tmp/d"})
        );

        let copy = Request {
            id: 8,
            command: Command::Copy {
                source: "/a".to_string(),
                destination: "/b".to_string(),
            },
        };
        let value: serde_json::Value = serde_json::from_str(&request_wire(&copy)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"id": 8, "op": "copy", "source": "/a", "destination": "/b"})
        );

        let mkdir = Request {
            id: 9,
            command: Command::MakeDirectory {
                path: "/m".to_string(),
            },
        };
        assert!(request_wire(&mkdir).contains("\"op\":\"makeDirectory\""));
    }

    #[test]
    fn awkward_paths_survive_the_wire() {
        let paths = [
            "/tmp/with space/file",
            "/tmp/ünïcødé/日本語",
            "/tmp//empty//segments/",
            "/tmp/new\nline/tab\there/\u{1}\u{7f}",
            "/tmp/quote\"back\\slash",
        ];

        for (idx, path) in paths.iter().enumerate() {
            let request = Request {
                id: idx as u64,
                command: Command::Move {
                    source: path.to_string(),
                    destination: format!("{path}.bak"),
                },
            };

            let mut wire = BytesMut::new();
            encode_frame(&encode_request(&request).unwrap(), &mut wire).unwrap();

            let frames = LineCodec::new().feed(&wire).unwrap();
            assert_eq!(frames.len(), 1, "path {path:?} split the frame");
            let decoded: Request = serde_json::from_slice(&frames[0].payload).unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn decode_success_and_failure() {
        let ok = decode_response(&RawFrame::new(
            &br#"{"id":1,"error":"","files":[{"name":"a","kind":"directory"},{"name":"b","kind":"file","size":3}]}"#[..],
        ))
        .unwrap();
        assert!(ok.is_ok());
        assert_eq!(ok.id, Some(1));
        assert_eq!(ok.files.len(), 2);
        assert!(ok.files[0].is_dir());
        assert_eq!(ok.files[1].size, 3);

        let failed =
            decode_response(&RawFrame::new(&br#"{"error":"no such file"}"#[..])).unwrap();
        assert!(!failed.is_ok());
        assert_eq!(failed.id, None);
        assert!(failed.files.is_empty());
    }

    #[test]
    fn decode_rejects_wrong_shapes() {
        for payload in [
            &b"not json"[..],
            &br#"{"files":[]}"#[..],
            &br#"{"error":42}"#[..],
            &br#"[1,2,3]"#[..],
            &br#"{"error":"","files":[{"name":"x","kind":"socket"}]}"#[..],
        ] {
            let err = decode_response(&RawFrame::new(payload)).unwrap_err();
            assert!(
                matches!(err, ClientError::MalformedResponse(_)),
                "{payload:?} should be malformed"
            );
        }
    }

    #[test]
    fn validate_rejects_empty_paths() {
        assert!(Command::List {
            path: String::new()
        }
        .validate()
        .is_err());
        let err = Command::Copy {
            source: "/a".to_string(),
            destination: String::new(),
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(msg) if msg.contains("destination")));
        assert!(Command::Remove {
            path: "relative/is/fine/here".to_string()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn kind_names_match_wire_ops() {
        let command = Command::MakeDirectory {
            path: "/x".to_string(),
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["op"], command.kind().as_str());
        assert_eq!(CommandKind::Move.to_string(), "move");
    }

    #[test]
    fn preview_truncates_long_frames() {
        let long = "x".repeat(500);
        let shown = preview(long.as_bytes());
        assert_eq!(shown.chars().count(), PREVIEW_LEN + 1);
        assert!(shown.ends_with('…'));
    }
}
