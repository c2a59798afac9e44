//! `LocalRepository`: a plain-directory-tree repository driver, used by tests
//! and standalone/dev operation. Grounded on
//! `pbs-datastore::chunk_store::ChunkStore`'s local POSIX layout; remote
//! object-store drivers are out of scope (§1).

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use regex::Regex;

use crate::Repository;

pub struct LocalRepository {
    base: PathBuf,
}

impl LocalRepository {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path.trim_start_matches('/'))
    }
}

impl Repository for LocalRepository {
    fn read(&self, path: &str, offset: Option<u64>, length: Option<u64>) -> Result<Vec<u8>, Error> {
        let full = self.resolve(path);
        let mut file = std::fs::File::open(&full)
            .with_context(|| format!("failed to open repository object {full:?}"))?;

        if let Some(offset) = offset {
            file.seek(SeekFrom::Start(offset))
                .with_context(|| format!("failed to seek in repository object {full:?}"))?;
        }

        let mut buf = Vec::new();
        match length {
            Some(len) => {
                buf.resize(len as usize, 0);
                file.read_exact(&mut buf).with_context(|| {
                    format!("short read from repository object {full:?} (wanted {len} bytes)")
                })?;
            }
            None => {
                file.read_to_end(&mut buf)
                    .with_context(|| format!("failed to read repository object {full:?}"))?;
            }
        }

        Ok(buf)
    }

    fn exists(&self, path: &str) -> Result<bool, Error> {
        Ok(self.resolve(path).exists())
    }

    fn list(&self, path: &str, pattern: Option<&Regex>) -> Result<Vec<String>, Error> {
        let dir = self.resolve(path);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to list repository directory {dir:?}"))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if pattern.map(|re| re.is_match(&name)).unwrap_or(true) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[allow(dead_code)]
fn _assert_path_is_utf8(p: &Path) -> Option<&str> {
    p.to_str()
}
