use std::path::{Path, PathBuf};

use lectern::{
    Corpus,
    HashEmbedder,
    snapshot::{INDEX_FILE, PASSAGES_FILE, Snapshot},
};
use proptest::prelude::*;

const DIMENSION: usize = 4096;

fn open(dir: &Path) -> Corpus {
    Corpus::open(dir, Box::new(HashEmbedder::new(DIMENSION))).unwrap()
}

fn write_doc(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// `count` distinct words sharing `prefix`.
fn words(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{i}")).collect()
}

#[test]
fn empty_corpus_returns_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = open(&tmp.path().join("corpus"));

    assert!(corpus.is_empty());
    assert!(corpus.search("anything at all", None, 5).is_empty());
    assert!(corpus.search("anything", Some("biology"), 5).is_empty());
    assert!(corpus.available_subjects().is_empty());
}

#[test]
fn five_hundred_twenty_words_make_two_passages() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = open(&tmp.path().join("corpus"));
    let words = words("w", 520);
    let doc = write_doc(tmp.path(), "chapter1.txt", &words.join(" "));

    assert!(corpus.ingest(&doc, "histology", None));
    assert_eq!(corpus.len(), 2);

    let chunk1 = words[0..500].join(" ");
    let chunk2 = words[450..520].join(" ");

    let query = words[10..15].join(" ");
    let results = corpus.search(&query, Some("histology"), 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, chunk1);
    assert_eq!(results[0].page, 1);
    assert_eq!(results[0].source, "chapter1.txt");

    let tail_query = words[510..515].join(" ");
    let results = corpus.search(&tail_query, Some("histology"), 1);
    assert_eq!(results[0].text, chunk2);
    assert_eq!(results[0].text.split_whitespace().count(), 70);
}

#[test]
fn nonexistent_subject_returns_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = open(&tmp.path().join("corpus"));
    let doc = write_doc(tmp.path(), "notes.txt", "Epithelium lines body surfaces.");
    assert!(corpus.ingest(&doc, "histology", None));

    assert!(
        corpus
            .search("epithelium", Some("nonexistent"), 3)
            .is_empty()
    );
}

#[test]
fn persisted_corpus_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("corpus");

    let docs = [
        ("anatomy.txt", "anatomy", words("bone", 40).join(" ")),
        ("histology.txt", "histology", words("cell", 900).join(" ")),
        (
            "physiology.md",
            "physiology",
            format!(
                "{}\x0c{}",
                words("heart", 30).join(" "),
                words("lung", 30).join(" ")
            ),
        ),
    ];

    let texts: Vec<String> = {
        let corpus = open(&dir);
        for (name, subject, content) in &docs {
            let path = write_doc(tmp.path(), name, content);
            assert!(corpus.ingest(&path, subject, None));
        }
        let snapshot = Snapshot::load(&dir).unwrap().unwrap();
        snapshot.passages.iter().map(|p| p.text().to_string()).collect()
    };
    // 1 + 2 (900 words) + 2 pages
    assert_eq!(texts.len(), 5);

    let reopened = open(&dir);
    assert_eq!(reopened.len(), texts.len());

    let snapshot = Snapshot::load(&dir).unwrap().unwrap();
    assert_eq!(snapshot.index.len(), snapshot.passages.len());

    for text in &texts {
        let results = reopened.search(text, None, 1);
        assert_eq!(&results[0].text, text);
        assert_eq!(results[0].distance, 0.0);
    }

    let lung = reopened.search(&words("lung", 30).join(" "), None, 1);
    assert_eq!(lung[0].page, 2);
    assert_eq!(lung[0].subject, "physiology");
}

#[test]
fn subject_filter_only_returns_that_subject() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = open(&tmp.path().join("corpus"));
    let shared = "membrane transport proteins channels";
    for subject in ["biology", "chemistry", "physiology"] {
        let doc = write_doc(
            tmp.path(),
            &format!("{subject}.txt"),
            &format!("{shared} {subject}"),
        );
        assert!(corpus.ingest(&doc, subject, None));
    }

    for subject in ["biology", "chemistry", "physiology"] {
        let results = corpus.search(shared, Some(subject), 3);
        assert_eq!(results.len(), 1);
        assert!(results.iter().all(|r| r.subject == subject));
    }
    assert_eq!(corpus.search(shared, None, 3).len(), 3);
}

#[test]
fn identical_passages_are_returned_once() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = open(&tmp.path().join("corpus"));
    let text = "The nephron is the functional unit of the kidney.";
    let first = write_doc(tmp.path(), "renal-a.txt", text);
    let second = write_doc(tmp.path(), "renal-b.txt", text);
    let other = write_doc(tmp.path(), "renal-c.txt", "Kidneys filter blood plasma.");

    assert!(corpus.ingest(&first, "physiology", None));
    assert!(corpus.ingest(&second, "physiology", None));
    assert!(corpus.ingest(&other, "physiology", None));
    assert_eq!(corpus.len(), 3);

    let results = corpus.search(text, Some("physiology"), 3);
    let matching = results.iter().filter(|r| r.text == text).count();
    assert_eq!(matching, 1);
    assert_eq!(results[0].source, "renal-a.txt");
    assert_eq!(results.len(), 2);
}

#[test]
fn failed_persistence_leaves_no_partial_document() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("corpus");
    let corpus = open(&dir);

    let first = write_doc(tmp.path(), "intro.txt", &words("intro", 30).join(" "));
    assert!(corpus.ingest(&first, "anatomy", None));
    let before = corpus.len();

    // Replace the index file with a non-empty directory so the final rename
    // of the next save fails.
    let index = dir.join(INDEX_FILE);
    std::fs::remove_file(&index).unwrap();
    std::fs::create_dir(&index).unwrap();
    std::fs::write(index.join("blocker"), b"x").unwrap();

    let big = write_doc(tmp.path(), "big.txt", &words("big", 1200).join(" "));
    assert!(!corpus.ingest(&big, "anatomy", None));
    assert_eq!(corpus.len(), before);
    assert!(corpus.search(&words("big", 5).join(" "), None, 10).iter().all(|r| r.source == "intro.txt"));
    assert!(!dir.join(format!("{PASSAGES_FILE}.tmp")).exists());

    // Once the obstruction is gone a full rewrite reconciles disk state.
    std::fs::remove_dir_all(&index).unwrap();
    corpus.flush().unwrap();
    let snapshot = Snapshot::load(&dir).unwrap().unwrap();
    assert_eq!(snapshot.index.len(), before);
    assert_eq!(snapshot.passages.len(), before);
}

#[test]
fn missing_document_changes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("corpus");
    let corpus = open(&dir);

    assert!(!corpus.ingest(&tmp.path().join("absent.pdf"), "anatomy", None));
    assert!(corpus.is_empty());
    assert!(Snapshot::load(&dir).unwrap().is_none());
}

#[test]
fn desynced_files_refuse_to_open() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("corpus");
    {
        let corpus = open(&dir);
        let doc = write_doc(tmp.path(), "notes.txt", "axons carry signals");
        assert!(corpus.ingest(&doc, "neuro", None));
    }

    let extra = r#"{"texts":["a","b"],"sources":["x","y"],"pages":[1,1],"subjects":["neuro","neuro"]}"#;
    std::fs::write(dir.join(PASSAGES_FILE), extra).unwrap();

    let err = Corpus::open(&dir, Box::new(HashEmbedder::new(DIMENSION))).unwrap_err();
    assert!(matches!(
        err,
        lectern::Error::Desync {
            vectors: 1,
            passages: 2
        }
    ));
}

#[test]
fn searches_run_alongside_ingestion() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = open(&tmp.path().join("corpus"));
    let seed = write_doc(tmp.path(), "seed.txt", "cartilage matrix chondrocytes");
    assert!(corpus.ingest(&seed, "histology", None));

    let docs: Vec<PathBuf> = (0..6)
        .map(|i| {
            write_doc(
                tmp.path(),
                &format!("doc{i}.txt"),
                &words(&format!("d{i}x"), 600).join(" "),
            )
        })
        .collect();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for doc in &docs {
                assert!(corpus.ingest(doc, "anatomy", None));
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..20 {
                    let results =
                        corpus.search("cartilage matrix", Some("histology"), 2);
                    assert_eq!(results.len(), 1);
                    assert_eq!(results[0].source, "seed.txt");
                }
            });
        }
    });

    // 1 seed passage + 2 passages per 600-word document
    assert_eq!(corpus.len(), 1 + 6 * 2);
    let snapshot = Snapshot::load(corpus.dir()).unwrap().unwrap();
    assert_eq!(snapshot.index.len(), corpus.len());
}

#[test]
fn concurrent_ingests_keep_each_document_contiguous() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = open(&tmp.path().join("corpus"));

    // Four writers, three documents each, three passages per document.
    let batches: Vec<Vec<PathBuf>> = (0..4)
        .map(|t| {
            (0..3)
                .map(|d| {
                    write_doc(
                        tmp.path(),
                        &format!("t{t}-d{d}.txt"),
                        &words(&format!("t{t}d{d}w"), 1200).join(" "),
                    )
                })
                .collect()
        })
        .collect();

    std::thread::scope(|scope| {
        for batch in &batches {
            let corpus = &corpus;
            scope.spawn(move || {
                for doc in batch {
                    assert!(corpus.ingest(doc, "histology", None));
                }
            });
        }
    });

    assert_eq!(corpus.len(), 4 * 3 * 3);
    let snapshot = Snapshot::load(corpus.dir()).unwrap().unwrap();
    assert_eq!(snapshot.index.len(), snapshot.passages.len());
    assert_eq!(snapshot.passages.len(), corpus.len());

    let sources: Vec<&str> = snapshot.passages.iter().map(|p| p.source()).collect();
    for batch in &batches {
        for doc in batch {
            let name = doc.file_name().unwrap().to_str().unwrap();
            let positions: Vec<usize> = sources
                .iter()
                .enumerate()
                .filter(|(_, s)| **s == name)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(positions.len(), 3, "{name}");
            assert_eq!(
                positions[2] - positions[0],
                2,
                "{name} passages were interleaved: {positions:?}"
            );
        }
    }

    // Every vector still lines up with its own passage text.
    for (position, passage) in snapshot.passages.iter().enumerate() {
        let hit = corpus.search(passage.text(), None, 1);
        assert_eq!(hit[0].text, passage.text());
        assert_eq!(hit[0].distance, 0.0, "position {position}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn filtered_results_match_subject(
        assignments in prop::collection::vec(0usize..3, 1..6),
        query_word in 0usize..40,
        top_k in 1usize..6,
    ) {
        let subjects = ["anatomy", "histology", "physiology"];
        let tmp = tempfile::tempdir().unwrap();
        let corpus = open(&tmp.path().join("corpus"));
        for (i, subject) in assignments.iter().enumerate() {
            let doc = write_doc(
                tmp.path(),
                &format!("doc{i}.txt"),
                &words("term", 40)[i * 5..i * 5 + 10].join(" "),
            );
            prop_assert!(corpus.ingest(&doc, subjects[*subject], None));
        }

        let query = format!("term{query_word}");
        for subject in subjects {
            let results = corpus.search(&query, Some(subject), top_k);
            prop_assert!(results.len() <= top_k);
            prop_assert!(results.iter().all(|r| r.subject == subject));
            prop_assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
        }
    }
}
