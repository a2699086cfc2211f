//! lectern - subject-scoped semantic retrieval over course documents.
//!
//! lectern ingests PDF, text and markdown documents under a subject tag,
//! splits every page into overlapping word windows, embeds each window with
//! a sentence-transformer model run locally through
//! [candle](https://github.com/huggingface/candle), and answers queries with
//! the nearest passages of the requested subject. The index and its passage
//! metadata are persisted together so ingestion is incremental.
//!
//! # Quick start
//!
//! ```no_run
//! use lectern::{Corpus, DataDir, SentenceEmbedder};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let embedder = SentenceEmbedder::new("sentence-transformers/all-MiniLM-L6-v2").unwrap();
//! let corpus = Corpus::open(&data_dir.corpus_dir().unwrap(), Box::new(embedder)).unwrap();
//!
//! corpus.ingest("histology.pdf".as_ref(), "histology", Some("Tissues and cells"));
//!
//! for r in corpus.search("cell membrane", Some("histology"), 3) {
//!     println!("{} (page {}) distance {:.3}", r.source, r.page, r.distance);
//! }
//! println!("{}", corpus.get_context("cell membrane", "histology", 3));
//! ```

pub mod assistant;
pub mod chunking;
pub mod config;
pub mod config_db;
pub mod corpus;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod mcp;
pub mod model_manager;
pub mod passages;
pub mod snapshot;
pub mod vector_index;
pub mod walker;

pub use config_db::ConfigDb;
pub use corpus::{Corpus, CorpusOptions, SearchResult};
pub use data_dir::DataDir;
pub use embedding::{Embedder, HashEmbedder};
pub use error::{Error, Result};
pub use model_manager::SentenceEmbedder;
pub use passages::{Passage, PassageStore};
pub use vector_index::VectorIndex;
