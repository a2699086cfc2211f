//! Load and save the vector index and passage store as one unit.
//!
//! The pair lives in two sibling files. A save writes both to temporary
//! files first and then renames them into place; a load requires both to be
//! present and of equal length.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    passages::PassageStore,
    vector_index::VectorIndex,
};

pub const INDEX_FILE: &str = "index.bin";
pub const PASSAGES_FILE: &str = "passages.json";

/// The in-memory corpus state: vectors and their passages, same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub index: VectorIndex,
    pub passages: PassageStore,
}

impl Snapshot {
    pub fn empty(dimension: usize) -> Self {
        Self {
            index: VectorIndex::new(dimension),
            passages: PassageStore::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    fn check_lengths(&self) -> Result<()> {
        if self.index.len() != self.passages.len() {
            return Err(Error::Desync {
                vectors: self.index.len(),
                passages: self.passages.len(),
            });
        }
        Ok(())
    }

    /// Load the pair stored in `dir`.
    ///
    /// Returns `Ok(None)` when either file is missing, and
    /// [`Error::Desync`] when both exist but disagree on length.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let index_path = dir.join(INDEX_FILE);
        let passages_path = dir.join(PASSAGES_FILE);

        if !index_path.is_file() || !passages_path.is_file() {
            debug!(dir = %dir.display(), "no persisted corpus found");
            return Ok(None);
        }

        let index =
            VectorIndex::read_from(BufReader::new(File::open(&index_path)?))?;
        let passages = PassageStore::from_json(&std::fs::read(&passages_path)?)?;

        let snapshot = Self { index, passages };
        snapshot.check_lengths()?;

        info!(
            passages = snapshot.len(),
            dimension = snapshot.index.dimension(),
            "loaded corpus"
        );
        Ok(Some(snapshot))
    }

    /// Write the full state to `dir`, replacing any previous save.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.check_lengths()?;

        let index_path = dir.join(INDEX_FILE);
        let passages_path = dir.join(PASSAGES_FILE);
        let index_tmp = temp_path(&index_path);
        let passages_tmp = temp_path(&passages_path);

        let passages_json = self.passages.to_json()?;

        write_file(&index_tmp, |w| self.index.write_to(w))?;
        write_file(&passages_tmp, |w| Ok(w.write_all(&passages_json)?))?;

        if let Err(e) = rename(&index_tmp, &index_path) {
            let _ = std::fs::remove_file(&index_tmp);
            let _ = std::fs::remove_file(&passages_tmp);
            return Err(e);
        }
        rename(&passages_tmp, &passages_path)?;

        debug!(passages = self.len(), dir = %dir.display(), "saved corpus");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn persistence(path: &Path, source: std::io::Error) -> Error {
    Error::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

fn write_file(
    path: &Path,
    fill: impl FnOnce(&mut BufWriter<&File>) -> Result<()>,
) -> Result<()> {
    let file = File::create(path).map_err(|e| persistence(path, e))?;
    let mut writer = BufWriter::new(&file);
    fill(&mut writer).map_err(|e| match e {
        Error::Io(source) => persistence(path, source),
        other => other,
    })?;
    writer.flush().map_err(|e| persistence(path, e))?;
    drop(writer);
    file.sync_all().map_err(|e| persistence(path, e))?;
    Ok(())
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|e| {
        let _ = std::fs::remove_file(from);
        persistence(to, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passages::Passage;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::empty(2);
        snapshot
            .index
            .add(&[vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        snapshot
            .passages
            .append(Passage::new("first", "a.pdf", 1, "bio").unwrap());
        snapshot
            .passages
            .append(Passage::new("second", "a.pdf", 2, "bio").unwrap());
        snapshot
    }

    #[test]
    fn missing_files_load_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Snapshot::load(tmp.path()).unwrap().is_none());

        // Only one half present is treated as no state.
        sample().save(tmp.path()).unwrap();
        std::fs::remove_file(tmp.path().join(PASSAGES_FILE)).unwrap();
        assert!(Snapshot::load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let snapshot = sample();
        snapshot.save(tmp.path()).unwrap();

        let loaded = Snapshot::load(tmp.path()).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!tmp.path().join("index.bin.tmp").exists());
    }

    #[test]
    fn mismatched_lengths_fail_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let mut snapshot = sample();
        snapshot.save(tmp.path()).unwrap();

        // Overwrite the index with one vector fewer.
        snapshot.index.truncate(1);
        let file = File::create(tmp.path().join(INDEX_FILE)).unwrap();
        snapshot.index.write_to(BufWriter::new(file)).unwrap();

        assert!(matches!(
            Snapshot::load(tmp.path()),
            Err(Error::Desync {
                vectors: 1,
                passages: 2
            })
        ));
    }

    #[test]
    fn save_refuses_desynced_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mut snapshot = sample();
        snapshot.index.truncate(1);
        assert!(snapshot.save(tmp.path()).is_err());
        assert!(!tmp.path().join(INDEX_FILE).exists());
    }

    #[test]
    fn blocked_destination_is_a_persistence_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join(INDEX_FILE);
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        let err = sample().save(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert!(!tmp.path().join(PASSAGES_FILE).exists());
    }
}
