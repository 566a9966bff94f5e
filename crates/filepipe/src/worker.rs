//! Reference worker: executes commands against the local filesystem.
//!
//! Reads one request per line from `reader`, runs it, and writes one response
//! per line to `writer`, strictly in receipt order. Nothing but responses is
//! ever written to `writer`; diagnostics go through `tracing`.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

use filepipe_client::{Command, EntryKind, FileEntry, Request, Response};
use filepipe_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Serve requests until `reader` reaches end of stream.
///
/// Returns the number of requests answered. A request line that does not
/// decode is answered with an error response without `id`.
pub fn serve<R: Read, W: Write>(reader: R, writer: W, config: FrameConfig) -> Result<u64> {
    let mut frames = FrameReader::with_config(reader, config.clone());
    let mut out = FrameWriter::with_config(writer, config);
    let mut served = 0u64;

    loop {
        let frame = match frames.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(err.into()),
        };

        let response = match serde_json::from_slice::<Request>(&frame.payload) {
            Ok(request) => {
                let mut response = execute(&request.command);
                response.id = Some(request.id);
                if response.is_ok() {
                    tracing::debug!(id = request.id, op = %request.command.kind(), "command done");
                } else {
                    tracing::info!(
                        id = request.id,
                        op = %request.command.kind(),
                        error = %response.error,
                        "command failed"
                    );
                }
                response
            }
            Err(err) => {
                tracing::warn!(error = %err, "undecodable request");
                Response::failure(None, format!("invalid request: {err}"))
            }
        };

        out.send(&serde_json::to_vec(&response)?)?;
        served += 1;
    }

    tracing::debug!(served, "input closed");
    Ok(served)
}

/// Run one command. The returned response carries no `id`.
pub fn execute(command: &Command) -> Response {
    let outcome = match command {
        Command::List { path } => list(path),
        Command::Remove { path } => remove(path).map(|()| Vec::new()),
        Command::MakeDirectory { path } => make_directory(path).map(|()| Vec::new()),
        Command::Copy {
            source,
            destination,
        } => copy(source, destination).map(|()| Vec::new()),
        Command::Move {
            source,
            destination,
        } => rename(source, destination).map(|()| Vec::new()),
    };

    match outcome {
        Ok(files) => Response::listing(None, files),
        Err(error) => Response::failure(None, error),
    }
}

fn absolute(path: &str) -> std::result::Result<&Path, String> {
    let path = Path::new(path);
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(format!("path must be absolute: {}", path.display()))
    }
}

fn describe(op: &str, path: &Path, err: io::Error) -> String {
    format!("{op} {}: {err}", path.display())
}

fn list(path: &str) -> std::result::Result<Vec<FileEntry>, String> {
    let dir = absolute(path)?;
    let entries = fs::read_dir(dir).map_err(|err| describe("list", dir, err))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| describe("list", dir, err))?;
        let metadata = entry
            .metadata()
            .map_err(|err| describe("stat", &entry.path(), err))?;
        files.push(file_entry(
            entry.file_name().to_string_lossy().into_owned(),
            &metadata,
        ));
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

fn file_entry(name: String, metadata: &fs::Metadata) -> FileEntry {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    };

    let modified = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_secs())
        .unwrap_or(0);

    FileEntry {
        name,
        kind,
        size: metadata.len(),
        mode: mode_bits(metadata),
        modified,
    }
}

#[cfg(unix)]
fn mode_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

fn remove(path: &str) -> std::result::Result<(), String> {
    let target = absolute(path)?;
    let metadata = fs::symlink_metadata(target).map_err(|err| describe("remove", target, err))?;
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };
    removed.map_err(|err| describe("remove", target, err))
}

fn make_directory(path: &str) -> std::result::Result<(), String> {
    let target = absolute(path)?;
    fs::create_dir(target).map_err(|err| describe("mkdir", target, err))
}

fn copy(source: &str, destination: &str) -> std::result::Result<(), String> {
    let source = absolute(source)?;
    let destination = absolute(destination)?;

    let dest_meta =
        fs::metadata(destination).map_err(|err| describe("copy", destination, err))?;
    if !dest_meta.is_dir() {
        return Err(format!(
            "copy {}: destination is not a directory",
            destination.display()
        ));
    }
    let name = source
        .file_name()
        .ok_or_else(|| format!("copy {}: source has no file name", source.display()))?;

    let src_meta = fs::symlink_metadata(source).map_err(|err| describe("copy", source, err))?;
    if src_meta.is_dir() {
        let src_real = source
            .canonicalize()
            .map_err(|err| describe("copy", source, err))?;
        let dest_real = destination
            .canonicalize()
            .map_err(|err| describe("copy", destination, err))?;
        if dest_real.starts_with(&src_real) {
            return Err(format!(
                "copy {}: cannot copy a directory into itself",
                source.display()
            ));
        }
    }

    let target = destination.join(name);
    if fs::symlink_metadata(&target).is_ok() {
        return Err(format!("copy {}: file exists", target.display()));
    }
    copy_tree(source, &target)
}

fn copy_tree(source: &Path, target: &Path) -> std::result::Result<(), String> {
    let metadata = fs::symlink_metadata(source).map_err(|err| describe("copy", source, err))?;
    let file_type = metadata.file_type();

    if file_type.is_dir() {
        fs::create_dir(target).map_err(|err| describe("mkdir", target, err))?;
        let entries = fs::read_dir(source).map_err(|err| describe("copy", source, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| describe("copy", source, err))?;
            copy_tree(&entry.path(), &target.join(entry.file_name()))?;
        }
        fs::set_permissions(target, metadata.permissions())
            .map_err(|err| describe("chmod", target, err))
    } else if file_type.is_symlink() {
        copy_symlink(source, target)
    } else {
        fs::copy(source, target)
            .map(|_| ())
            .map_err(|err| describe("copy", source, err))
    }
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> std::result::Result<(), String> {
    let link = fs::read_link(source).map_err(|err| describe("readlink", source, err))?;
    std::os::unix::fs::symlink(link, target).map_err(|err| describe("symlink", target, err))
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> std::result::Result<(), String> {
    fs::copy(source, target)
        .map(|_| ())
        .map_err(|err| describe("copy", source, err))
}

fn rename(source: &str, destination: &str) -> std::result::Result<(), String> {
    let source = absolute(source)?;
    let destination = absolute(destination)?;
    fs::rename(source, destination).map_err(|err| describe("move", source, err))
}
