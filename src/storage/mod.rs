//! Object-storage adapter.
//!
//! # Responsibilities
//! - Define the collaborator surface a storage backend implements
//! - Name the context keys the dispatcher fills before calling it
//!
//! # Data Flow
//! ```text
//! Router::storage(pattern, storage)
//!     → GET  pattern → Storage::download
//!     → POST pattern → Storage::upload
//! per request, before the handler:
//!     ctx[ROOT_KEY]         = storage.root()
//!     ctx[ARCHIVE_PATH_KEY] = storage.archive().path(ctx)   (only with an archive)
//! ```

pub mod local;

use crate::context::Context;

pub use local::{DirectoryStorage, KeyArchive, StorageError};

/// Context key holding the storage root.
pub const ROOT_KEY: &str = "storage.root";

/// Context key holding the resolved archive path.
pub const ARCHIVE_PATH_KEY: &str = "storage.archive_path";

/// Capture name conventionally used for the object name in storage patterns.
pub const OBJECT_KEY: &str = "object";

/// Resolves the archive (sub-directory, bucket, ...) a request addresses.
pub trait Archive: Send + Sync {
    fn path(&self, ctx: &Context) -> String;
}

/// A storage backend served through the dispatcher.
pub trait Storage: Send + Sync {
    fn download(&self, ctx: &mut Context);

    fn upload(&self, ctx: &mut Context);

    fn root(&self) -> &str;

    fn archive(&self) -> Option<&dyn Archive> {
        None
    }
}
