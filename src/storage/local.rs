//! Directory-backed object storage.

use std::io;
use std::path::{Component, Path, PathBuf};

use axum::http::{header, HeaderValue, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::context::writer::write_error;
use crate::context::Context;
use crate::storage::{Archive, Storage, ARCHIVE_PATH_KEY, OBJECT_KEY};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object path '{0}'")]
    InvalidPath(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Archive path taken from a context key, typically a path capture.
#[derive(Debug, Clone)]
pub struct KeyArchive {
    key: String,
}

impl KeyArchive {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Archive for KeyArchive {
    fn path(&self, ctx: &Context) -> String {
        ctx.get(&self.key).to_string()
    }
}

/// Stores objects as files below a root directory:
/// `<root>/<archive path>/<object>`.
pub struct DirectoryStorage {
    root: String,
    archive: Option<Box<dyn Archive>>,
}

#[derive(Serialize)]
struct Stored<'a> {
    object: &'a str,
    archive: &'a str,
    size: usize,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            archive: None,
        }
    }

    pub fn with_archive(mut self, archive: impl Archive + 'static) -> Self {
        self.archive = Some(Box::new(archive));
        self
    }

    /// File for the object addressed by `ctx`, below this storage's own
    /// root and the archive path the dispatcher injected.
    fn locate(&self, ctx: &Context) -> Result<PathBuf, StorageError> {
        let root = self.root.as_str();
        let archive = relative(ctx.get(ARCHIVE_PATH_KEY), true)?;
        let object = relative(ctx.get(OBJECT_KEY), false)?;
        Ok(Path::new(root).join(archive).join(object))
    }
}

/// Validate a client-supplied relative path.
fn relative(raw: &str, allow_empty: bool) -> Result<PathBuf, StorageError> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return if allow_empty {
            Ok(PathBuf::new())
        } else {
            Err(StorageError::InvalidPath(raw.to_string()))
        };
    }
    if raw.starts_with('/') || raw.contains('\\') {
        return Err(StorageError::InvalidPath(raw.to_string()));
    }

    let path = PathBuf::from(trimmed);
    if path.components().all(|c| matches!(c, Component::Normal(_))) {
        Ok(path)
    } else {
        Err(StorageError::InvalidPath(raw.to_string()))
    }
}

fn fail(ctx: &mut Context, err: &StorageError) {
    let status = match err {
        StorageError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::NOT_FOUND {
        ctx.not_found();
    } else {
        write_error(ctx.writer_mut(), status, &err.to_string());
    }
}

impl Storage for DirectoryStorage {
    fn download(&self, ctx: &mut Context) {
        let result = self
            .locate(ctx)
            .and_then(|file| std::fs::read(&file).map_err(StorageError::from));

        match result {
            Ok(content) => {
                tracing::debug!(object = %ctx.get(OBJECT_KEY), size = content.len(), "Object served");
                ctx.writer_mut().headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                if let Err(e) = ctx.write(&content) {
                    tracing::debug!(error = %e, "Object download interrupted");
                }
            }
            Err(e) => {
                tracing::debug!(object = %ctx.get(OBJECT_KEY), error = %e, "Object download failed");
                fail(ctx, &e);
            }
        }
    }

    fn upload(&self, ctx: &mut Context) {
        let result = self.locate(ctx).and_then(|file| {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&file, ctx.body())?;
            Ok(())
        });

        if let Err(e) = result {
            tracing::warn!(object = %ctx.get(OBJECT_KEY), error = %e, "Object upload failed");
            fail(ctx, &e);
            return;
        }

        let object = ctx.get(OBJECT_KEY).to_string();
        let archive = ctx.get(ARCHIVE_PATH_KEY).to_string();
        let size = ctx.body().len();
        tracing::info!(object = %object, archive = %archive, size, "Object stored");

        ctx.write_header(StatusCode::CREATED);
        let stored = Stored {
            object: &object,
            archive: &archive,
            size,
        };
        if let Err(e) = ctx.json(&stored, false) {
            tracing::error!(error = %e, "Upload summary not encodable");
        }
    }

    fn root(&self) -> &str {
        &self.root
    }

    fn archive(&self) -> Option<&dyn Archive> {
        self.archive.as_deref()
    }
}
