//! On-disk layout of a lectern installation.
//!
//! ```text
//! <root>/
//!   config.redb        persisted settings
//!   corpus/
//!     index.bin        vector index
//!     passages.json    passage metadata, same order as the index
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LECTERN_DATA_DIR";

const XDG_PREFIX: &str = "lectern";
const CONFIG_DB_FILE: &str = "config.redb";
const CORPUS_DIR: &str = "corpus";

/// Root directory holding the settings database and the corpus.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Pick the root from `--data-dir`, then `LECTERN_DATA_DIR`, then the
    /// XDG data home, and create it.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        Self::resolve_from(explicit, from_env)
    }

    fn resolve_from(
        explicit: Option<&Path>,
        from_env: Option<PathBuf>,
    ) -> Result<Self> {
        let root = match (explicit, from_env) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(path)) if !path.as_os_str().is_empty() => path,
            _ => xdg::BaseDirectories::with_prefix(XDG_PREFIX)
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?,
        };

        ensure_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Settings database, opened once per process.
    pub fn config_db(&self) -> PathBuf {
        self.root.join(CONFIG_DB_FILE)
    }

    /// Directory holding the persisted index and passage store, created on
    /// first use.
    pub fn corpus_dir(&self) -> Result<PathBuf> {
        let path = self.root.join(CORPUS_DIR);
        ensure_dir(&path)?;
        Ok(path)
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|_| Error::DataDir(path.to_path_buf()))
}
