//! The repository collaborator (§6): `read`/`exists`/`list` over
//! content-addressed backup objects, plus the cipher and compression filters
//! the planner (`pgr-planner`) and file restorer (`pgr-restore-worker`) route
//! by kind.
//!
//! Grounded on `pbs-datastore::chunk_store::ChunkStore` (local POSIX layout)
//! and `pbs-datastore::local_chunk_reader::LocalChunkReader` (trait-based
//! repository access returning owned buffers rather than `Read` trait
//! objects, since every read here is already bounded to one super-block or
//! file-sized object).

pub mod cipher;
pub mod compression;
pub mod local;

use anyhow::Error;
use regex::Regex;

/// The repository collaborator's interface (§6). Implementations need not be
/// `Sync`-safe across threads sharing one handle; each worker opens its own.
pub trait Repository: Send + Sync {
    /// Read `length` bytes starting at `offset` from the object at `path`.
    /// `offset`/`length` of `None` mean "from the start"/"to the end".
    fn read(&self, path: &str, offset: Option<u64>, length: Option<u64>) -> Result<Vec<u8>, Error>;

    fn exists(&self, path: &str) -> Result<bool, Error>;

    /// List object names directly under `path`, optionally filtered by `pattern`.
    fn list(&self, path: &str, pattern: Option<&Regex>) -> Result<Vec<String>, Error>;
}

pub use local::LocalRepository;
