//! The corpus manager: ingestion, subject-scoped retrieval and persistence
//! of the vector index and passage store as one unit.

use std::{
    collections::{BTreeSet, HashSet},
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard},
};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    chunking::ChunkingConfig,
    embedding::{Embedder, check_batch},
    error::{Error, Result},
    extraction::{DocumentExtractor, FileExtractor},
    passages::Passage,
    snapshot::Snapshot,
};

/// Number of results used by [`Corpus::search_subject_materials`] and the
/// tutor prompt.
pub const DEFAULT_TOP_K: usize = 3;

/// Default multiplier applied to `top_k` when fetching candidates from the
/// index, leaving room for subject filtering and deduplication.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 3;

/// Tunables for ingestion and retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorpusOptions {
    pub chunking: ChunkingConfig,
    pub overfetch_factor: usize,
}

impl Default for CorpusOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
        }
    }
}

/// A retrieved passage with its raw index distance (lower is closer).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub text: String,
    pub source: String,
    pub page: u32,
    pub subject: String,
    pub distance: f32,
}

impl SearchResult {
    fn new(passage: &Passage, distance: f32) -> Self {
        Self {
            text: passage.text().to_string(),
            source: passage.source().to_string(),
            page: passage.page(),
            subject: passage.subject().to_string(),
            distance,
        }
    }
}

/// The text [`Corpus::get_context`] returns when nothing matched.
///
/// Prompt builders compare against this to tell the model the topic is not
/// covered.
pub fn not_found_sentinel(subject: &str) -> String {
    format!("No specific information found in course materials for {subject}.")
}

/// An ingested document collection backed by a directory on disk.
///
/// Open one instance per process and share it by reference; it is
/// `Send + Sync`. Searches may run concurrently with each other and with an
/// ingest; ingests are serialized.
///
/// # Examples
///
/// ```
/// use lectern::{Corpus, HashEmbedder};
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("cells.txt"), "Mitochondria produce ATP.").unwrap();
///
/// let corpus = Corpus::open(dir.path(), Box::new(HashEmbedder::default())).unwrap();
/// assert!(corpus.ingest(&dir.path().join("cells.txt"), "biology", None));
///
/// let results = corpus.search("mitochondria", Some("biology"), 1);
/// assert_eq!(results[0].source, "cells.txt");
/// assert!(corpus.search("mitochondria", Some("chemistry"), 1).is_empty());
/// ```
pub struct Corpus {
    dir: PathBuf,
    embedder: Box<dyn Embedder>,
    extractor: Box<dyn DocumentExtractor>,
    options: CorpusOptions,
    state: RwLock<Snapshot>,
}

impl Corpus {
    /// Open the corpus stored in `dir` with default options and the
    /// [`FileExtractor`], creating an empty one if nothing is persisted.
    pub fn open(dir: &Path, embedder: Box<dyn Embedder>) -> Result<Self> {
        Self::open_with(
            dir,
            embedder,
            Box::new(FileExtractor),
            CorpusOptions::default(),
        )
    }

    /// Open the corpus stored in `dir`.
    ///
    /// Fails with [`Error::DimensionMismatch`] when the persisted index was
    /// built with a different embedding dimension, and with
    /// [`Error::Desync`] when the persisted files disagree on length.
    pub fn open_with(
        dir: &Path,
        embedder: Box<dyn Embedder>,
        extractor: Box<dyn DocumentExtractor>,
        options: CorpusOptions,
    ) -> Result<Self> {
        if options.overfetch_factor == 0 {
            return Err(Error::Config(
                "overfetch factor must be at least 1".to_string(),
            ));
        }
        std::fs::create_dir_all(dir)
            .map_err(|_| Error::DataDir(dir.to_path_buf()))?;

        let snapshot = match Snapshot::load(dir)? {
            Some(snapshot) => {
                if snapshot.index.dimension() != embedder.dimension() {
                    return Err(Error::DimensionMismatch {
                        expected: snapshot.index.dimension(),
                        actual: embedder.dimension(),
                    });
                }
                snapshot
            }
            None => {
                info!(dir = %dir.display(), "starting empty corpus");
                Snapshot::empty(embedder.dimension())
            }
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            embedder,
            extractor,
            options,
            state: RwLock::new(snapshot),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn options(&self) -> &CorpusOptions {
        &self.options
    }

    /// Embedding dimension shared by the index and the embedder.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Snapshot>> {
        self.state.read().map_err(|_| Error::LockPoisoned)
    }

    /// Number of stored passages.
    ///
    /// A poisoned lock is logged and counts as empty, matching what
    /// [`search`](Self::search) returns in that state.
    pub fn len(&self) -> usize {
        match self.read() {
            Ok(state) => state.len(),
            Err(e) => {
                error!(error = %e, "cannot read corpus size");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ingest one document under `subject`, optionally recording a
    /// description for the subject.
    ///
    /// Returns `false` after logging the cause when the document is missing,
    /// yields no text, or cannot be persisted. A failed call leaves the
    /// corpus exactly as it was.
    pub fn ingest(
        &self,
        path: &Path,
        subject: &str,
        description: Option<&str>,
    ) -> bool {
        match self.try_ingest(path, subject, description) {
            Ok(_) => true,
            Err(e) => {
                error!(
                    path = %path.display(),
                    subject,
                    error = %e,
                    "failed to ingest document"
                );
                false
            }
        }
    }

    /// Like [`ingest`](Self::ingest), but returns the number of passages
    /// added or the error that stopped the ingestion.
    pub fn try_ingest(
        &self,
        path: &Path,
        subject: &str,
        description: Option<&str>,
    ) -> Result<usize> {
        if !path.is_file() {
            return Err(Error::NotFound {
                kind: "document",
                name: path.display().to_string(),
            });
        }
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::NotFound {
                kind: "document",
                name: path.display().to_string(),
            })?;

        let pages = match self.extractor.extract(path) {
            Ok(pages) => pages,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "extraction failed, treating document as empty"
                );
                Vec::new()
            }
        };

        let mut passages = Vec::new();
        for page in pages.iter().filter(|p| !p.text.trim().is_empty()) {
            for chunk in self.options.chunking.chunk(&page.text) {
                passages.push(Passage::new(
                    chunk.text,
                    source.as_str(),
                    page.number,
                    subject,
                )?);
            }
        }
        if passages.is_empty() {
            return Err(Error::EmptyDocument(path.to_path_buf()));
        }

        let texts: Vec<String> =
            passages.iter().map(|p| p.text().to_string()).collect();
        let vectors = self.embedder.embed(&texts)?;
        check_batch(&vectors, texts.len(), self.embedder.dimension())?;

        let added = passages.len();
        let mut state = self.state.write().map_err(|_| Error::LockPoisoned)?;
        let before = state.len();
        let previous_description =
            description.map(|d| state.passages.set_description(subject, d));

        let appended = state.index.add(&vectors).and_then(|()| {
            for passage in passages {
                state.passages.append(passage);
            }
            state.save(&self.dir)
        });

        if let Err(e) = appended {
            state.index.truncate(before);
            state.passages.truncate(before);
            if let Some(previous) = previous_description {
                state.passages.restore_description(subject, previous);
            }
            return Err(e);
        }

        info!(
            source = %source,
            subject,
            passages = added,
            total = state.len(),
            "ingested document"
        );
        Ok(added)
    }

    /// Return up to `top_k` passages nearest to `query`, ascending by
    /// distance, restricted to `subject` when one is given.
    ///
    /// An empty subject string means no filter. Passages with identical
    /// text are reported once. Errors are logged and produce an empty
    /// result.
    pub fn search(
        &self,
        query: &str,
        subject: Option<&str>,
        top_k: usize,
    ) -> Vec<SearchResult> {
        match self.try_search(query, subject, top_k) {
            Ok(results) => results,
            Err(e @ (Error::OutOfRange { .. } | Error::Desync { .. })) => {
                error!(error = %e, "index and passage store out of sync");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "search failed");
                Vec::new()
            }
        }
    }

    /// Like [`search`](Self::search), but returns errors to the caller.
    pub fn try_search(
        &self,
        query: &str,
        subject: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let subject = subject.filter(|s| !s.is_empty());
        if top_k == 0 || self.read()?.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_one(query)?;

        let state = self.read()?;
        let candidates = top_k.saturating_mul(self.options.overfetch_factor);
        let neighbors = state.index.search(&query_vector, candidates)?;

        let mut seen: HashSet<&str> = HashSet::new();
        let mut results = Vec::with_capacity(top_k);
        for neighbor in &neighbors {
            let passage = state.passages.get(neighbor.position)?;
            if subject.is_some_and(|s| passage.subject() != s) {
                continue;
            }
            if !seen.insert(passage.text()) {
                continue;
            }
            results.push(SearchResult::new(passage, neighbor.distance));
            if results.len() == top_k {
                break;
            }
        }

        debug!(
            candidates = neighbors.len(),
            accepted = results.len(),
            subject = subject.unwrap_or("*"),
            "search complete"
        );
        Ok(results)
    }

    /// Format the best passages for `query` within `subject` as a context
    /// block, or return [`not_found_sentinel`] when nothing matched.
    pub fn get_context(&self, query: &str, subject: &str, top_k: usize) -> String {
        let results = self.search(query, Some(subject), top_k);
        if results.is_empty() {
            return not_found_sentinel(subject);
        }

        let mut context =
            format!("**Relevant content from {subject} materials:**\n\n");
        for result in &results {
            let _ = write!(
                context,
                "**Source:** {} (Page {})\n**Content:** {}\n\n",
                result.source, result.page, result.text
            );
        }
        context
    }

    /// Numbered listing of the best [`DEFAULT_TOP_K`] passages for `query`
    /// within `subject`, for direct display to a reader.
    pub fn search_subject_materials(&self, query: &str, subject: &str) -> String {
        let results = self.search(query, Some(subject), DEFAULT_TOP_K);
        if results.is_empty() {
            return format!(
                "No specific information found in {subject} materials for: '{query}'\n\n\
                 Check whether this topic is covered in your textbook or ask your instructor."
            );
        }

        let mut listing = format!("**Found in {subject} materials:**\n\n");
        for (i, result) in results.iter().enumerate() {
            let _ = write!(
                listing,
                "**{}. {} (Page {})**\n{}\n\n",
                i + 1,
                result.source,
                result.page,
                result.text
            );
        }
        listing.push_str("*This information comes exclusively from your course materials.*");
        listing
    }

    /// Distinct subject tags currently stored.
    pub fn available_subjects(&self) -> BTreeSet<String> {
        self.read()
            .map(|state| state.passages.subjects())
            .unwrap_or_default()
    }

    /// Source documents ingested under `subject`, in first-ingested order.
    pub fn subject_sources(&self, subject: &str) -> Vec<String> {
        self.read()
            .map(|state| state.passages.sources_for(subject))
            .unwrap_or_default()
    }

    pub fn subject_description(&self, subject: &str) -> Option<String> {
        self.read()
            .ok()?
            .passages
            .description(subject)
            .map(str::to_string)
    }

    /// Re-write the full in-memory state to disk.
    pub fn flush(&self) -> Result<()> {
        self.read()?.save(&self.dir)
    }

    /// Flush and release the corpus.
    pub fn close(self) -> Result<()> {
        self.flush()
    }
}

impl std::fmt::Debug for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Corpus")
            .field("dir", &self.dir)
            .field("dimension", &self.embedder.dimension())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
