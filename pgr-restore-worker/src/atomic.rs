//! Atomic temp-then-rename file materialisation (§4.B), mirroring
//! `pbs-client::pxar::extract`'s approach of writing into a sibling path and
//! renaming over the final name only once content is settled.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};

pub struct AtomicFile {
    tmp_path: PathBuf,
    final_path: PathBuf,
    file: std::fs::File,
}

impl AtomicFile {
    /// `pg_control` is written to a fixed `.pgbackrest.tmp` sibling and
    /// renamed only after every other file completes, at controller
    /// finalisation (out of this core's scope, §4.B); every other file uses
    /// a pid-suffixed sibling so concurrent workers never collide.
    pub fn create(final_path: &Path) -> Result<Self, Error> {
        let is_control = final_path.file_name().map(|n| n == "pg_control").unwrap_or(false);
        let tmp_path = if is_control {
            final_path.with_extension("pgbackrest.tmp")
        } else {
            let suffix = format!(".pgr-tmp-{}", std::process::id());
            let mut name = final_path.as_os_str().to_os_string();
            name.push(&suffix);
            PathBuf::from(name)
        };

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to create temporary file {tmp_path:?}"))?;

        Ok(Self {
            tmp_path,
            final_path: final_path.to_path_buf(),
            file,
        })
    }

    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), Error> {
        use std::io::Seek;
        self.file
            .seek(std::io::SeekFrom::Start(offset))
            .with_context(|| format!("failed to seek in {:?}", self.tmp_path))?;
        self.file
            .write_all(buf)
            .with_context(|| format!("failed to write to {:?}", self.tmp_path))
    }

    pub fn set_len(&mut self, len: u64) -> Result<(), Error> {
        self.file
            .set_len(len)
            .with_context(|| format!("failed to truncate {:?}", self.tmp_path))
    }

    /// Flush, fsync, rename into place, and return the final path.
    pub fn commit(self) -> Result<PathBuf, Error> {
        self.file
            .sync_all()
            .with_context(|| format!("failed to fsync {:?}", self.tmp_path))?;
        std::fs::rename(&self.tmp_path, &self.final_path)
            .with_context(|| format!("failed to rename {:?} -> {:?}", self.tmp_path, self.final_path))?;
        Ok(self.final_path)
    }
}
