//! Reading and atomically replacing a job's target file.

#[cfg(unix)]
use std::fs::Permissions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::error::JobError;
use crate::merge::Document;
use crate::schema::Schema;

/// Reads the persisted document at `path`.
///
/// A missing or whitespace-only file means there is no document yet. A file
/// with the wrong top-level framing for `schema` is an error rather than
/// something to silently overwrite.
pub fn read_document(path: &Path, schema: &Schema) -> Result<Option<Document>, JobError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no existing document");
            return Ok(None);
        }
        Err(source) => {
            return Err(JobError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }

    let value = serde_json::from_str(&contents).map_err(|source| JobError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let document = Document::from_value(value, schema)?;
    debug!(path = %path.display(), entries = document.len(), "loaded existing document");
    Ok(Some(document))
}

/// Writes `document` as pretty JSON through a sibling temp file that is
/// renamed over `path`, so readers never observe a partial file.
pub fn write_document(path: &Path, document: &Document) -> Result<(), JobError> {
    let write_err = |source: std::io::Error| JobError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut body = serde_json::to_string_pretty(&document.to_value())
        .map_err(|e| write_err(std::io::Error::other(e)))?;
    body.push('\n');

    let mut tmp = temp_file_in(dir).map_err(write_err)?;
    // The rename replaces the inode, so carry the target's mode over.
    match std::fs::metadata(path) {
        Ok(meta) => tmp
            .as_file()
            .set_permissions(meta.permissions())
            .map_err(write_err)?,
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(write_err(e)),
    }
    tmp.write_all(body.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!(path = %path.display(), bytes = body.len(), "document written");
    Ok(())
}

/// Temp file for the next version of a document. New documents get the
/// usual 0644 (less the umask) instead of the temp-file default of 0600.
fn temp_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(Permissions::from_mode(0o644));
    }
    builder.tempfile_in(dir)
}
