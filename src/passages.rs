//! The passage store: metadata records kept in lockstep with the vector
//! index.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One indexed unit of text.
///
/// Construct through [`Passage::new`], which rejects empty fields and
/// page zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Passage {
    text: String,
    source: String,
    page: u32,
    subject: String,
}

impl Passage {
    /// # Examples
    ///
    /// ```
    /// use lectern::Passage;
    ///
    /// let p = Passage::new("Cells divide.", "biology.pdf", 3, "biology").unwrap();
    /// assert_eq!(p.page(), 3);
    ///
    /// assert!(Passage::new("Cells divide.", "biology.pdf", 0, "biology").is_err());
    /// ```
    pub fn new(
        text: impl Into<String>,
        source: impl Into<String>,
        page: u32,
        subject: impl Into<String>,
    ) -> Result<Self> {
        let passage = Self {
            text: text.into(),
            source: source.into(),
            page,
            subject: subject.into(),
        };

        if passage.text.trim().is_empty() {
            return Err(Error::InvalidPassage("text is empty".to_string()));
        }
        if passage.source.is_empty() {
            return Err(Error::InvalidPassage("source is empty".to_string()));
        }
        if passage.subject.is_empty() {
            return Err(Error::InvalidPassage("subject is empty".to_string()));
        }
        if passage.page == 0 {
            return Err(Error::InvalidPassage(
                "page numbers start at 1".to_string(),
            ));
        }
        Ok(passage)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Passage records addressed by ordinal position, plus the optional
/// description recorded for each subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassageStore {
    passages: Vec<Passage>,
    descriptions: BTreeMap<String, String>,
}

impl PassageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Append a passage and return its ordinal.
    pub fn append(&mut self, passage: Passage) -> usize {
        self.passages.push(passage);
        self.passages.len() - 1
    }

    pub fn get(&self, position: usize) -> Result<&Passage> {
        self.passages.get(position).ok_or(Error::OutOfRange {
            position,
            len: self.passages.len(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Passage> {
        self.passages.iter()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.passages.truncate(len);
    }

    /// Distinct subject tags currently stored.
    pub fn subjects(&self) -> BTreeSet<String> {
        self.passages.iter().map(|p| p.subject.clone()).collect()
    }

    /// Distinct source documents of `subject`, in first-ingested order.
    pub fn sources_for(&self, subject: &str) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for passage in self.passages.iter().filter(|p| p.subject == subject) {
            if !sources.contains(&passage.source) {
                sources.push(passage.source.clone());
            }
        }
        sources
    }

    pub fn description(&self, subject: &str) -> Option<&str> {
        self.descriptions.get(subject).map(String::as_str)
    }

    /// Record a description for `subject`, returning the previous one.
    pub(crate) fn set_description(
        &mut self,
        subject: &str,
        description: &str,
    ) -> Option<String> {
        self.descriptions
            .insert(subject.to_string(), description.to_string())
    }

    pub(crate) fn restore_description(
        &mut self,
        subject: &str,
        previous: Option<String>,
    ) {
        match previous {
            Some(description) => {
                self.descriptions.insert(subject.to_string(), description);
            }
            None => {
                self.descriptions.remove(subject);
            }
        }
    }

    /// Serialize in column form.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let columns = ColumnsRef {
            texts: self.passages.iter().map(|p| p.text.as_str()).collect(),
            sources: self.passages.iter().map(|p| p.source.as_str()).collect(),
            pages: self.passages.iter().map(|p| p.page).collect(),
            subjects: self
                .passages
                .iter()
                .map(|p| p.subject.as_str())
                .collect(),
            descriptions: &self.descriptions,
        };
        Ok(serde_json::to_vec(&columns)?)
    }

    /// Deserialize the column form, validating that all four columns have
    /// the same length and that every record is a valid [`Passage`].
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let columns: Columns = serde_json::from_slice(bytes)?;
        let len = columns.texts.len();
        if columns.sources.len() != len
            || columns.pages.len() != len
            || columns.subjects.len() != len
        {
            return Err(Error::Config(format!(
                "passage columns have different lengths: texts={}, sources={}, pages={}, subjects={}",
                len,
                columns.sources.len(),
                columns.pages.len(),
                columns.subjects.len()
            )));
        }

        let passages = columns
            .texts
            .into_iter()
            .zip(columns.sources)
            .zip(columns.pages)
            .zip(columns.subjects)
            .map(|(((text, source), page), subject)| {
                Passage::new(text, source, page, subject)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            passages,
            descriptions: columns.descriptions,
        })
    }
}

#[derive(Serialize)]
struct ColumnsRef<'a> {
    texts: Vec<&'a str>,
    sources: Vec<&'a str>,
    pages: Vec<u32>,
    subjects: Vec<&'a str>,
    descriptions: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct Columns {
    texts: Vec<String>,
    sources: Vec<String>,
    pages: Vec<u32>,
    subjects: Vec<String>,
    #[serde(default)]
    descriptions: BTreeMap<String, String>,
}
