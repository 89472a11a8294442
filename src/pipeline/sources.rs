//! Local candidate sources: seed list, blocklist, keyword blocklist,
//! discovered-id cache and the previously published ranking.
//!
//! Every source is optional. A missing file contributes nothing.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::model::{Candidate, CandidateId, SourceTag};

const COMMENT_MARKER: char = '#';

/// Reads a file, mapping "not found" to `None`.
async fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "optional source file is absent");
            Ok(None)
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to read source file {}", path.display()))
        }
    }
}

fn content_lines(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
}

fn is_well_formed_id(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parses newline-delimited ids, keeping the first occurrence of each.
#[must_use]
pub fn parse_id_lines(contents: &str) -> Vec<CandidateId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for line in content_lines(contents) {
        if !is_well_formed_id(line) {
            debug!(line, "skipping malformed id line");
            continue;
        }
        let id = CandidateId::new(line);
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    ids
}

/// Loads an id list such as the seed list or the discovered-id cache.
///
/// # Errors
/// Fails only when the file exists but cannot be read.
pub async fn read_id_list(path: Option<&Path>) -> Result<Vec<CandidateId>> {
    Ok(read_optional(path)
        .await?
        .map(|contents| parse_id_lines(&contents))
        .unwrap_or_default())
}

/// Loads case-insensitive keyword substrings, lowercased and deduplicated.
///
/// # Errors
/// Fails only when the file exists but cannot be read.
pub async fn read_keyword_list(path: Option<&Path>) -> Result<Vec<String>> {
    let Some(contents) = read_optional(path).await? else {
        return Ok(Vec::new());
    };
    let mut keywords: Vec<String> = Vec::new();
    for line in content_lines(&contents) {
        let keyword = line.to_lowercase();
        if !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    Ok(keywords)
}

/// Reads the `channel_id` column of a previously published ranking.
///
/// An unreadable or headerless file contributes nothing; the previous ranking
/// is a convenience source, never a requirement.
///
/// # Errors
/// Fails only when the file exists but cannot be read.
pub async fn load_existing_ids(path: Option<&Path>) -> Result<Vec<CandidateId>> {
    let Some(contents) = read_optional(path).await? else {
        return Ok(Vec::new());
    };
    Ok(parse_existing_ids(&contents))
}

fn parse_existing_ids(contents: &str) -> Vec<CandidateId> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(contents.as_bytes());

    let column = match reader.headers() {
        Ok(headers) => headers.iter().position(|name| name.trim() == "channel_id"),
        Err(err) => {
            warn!(error = %err, "previous ranking has no readable header");
            None
        }
    };
    let Some(column) = column else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut skipped = 0_usize;
    for record in reader.records() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        let Some(raw) = record.get(column).map(str::trim) else {
            continue;
        };
        if !is_well_formed_id(raw) {
            continue;
        }
        let id = CandidateId::new(raw);
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    if skipped > 0 {
        warn!(skipped, "skipped unreadable rows in previous ranking");
    }
    ids
}

/// Ids that must never appear in the output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blocklist {
    ids: HashSet<CandidateId>,
}

impl Blocklist {
    #[must_use]
    pub fn new(ids: impl IntoIterator<Item = CandidateId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// # Errors
    /// Fails only when the file exists but cannot be read.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        Ok(Self::new(read_id_list(path).await?))
    }

    #[must_use]
    pub fn contains(&self, id: &CandidateId) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Ordered, duplicate-free candidate set. The first source tag seen for an id wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatePool {
    entries: Vec<Candidate>,
    index: HashMap<CandidateId, usize>,
}

impl CandidatePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a batch of ids into the pool, returning the extended pool.
    #[must_use]
    pub fn absorb(mut self, ids: impl IntoIterator<Item = CandidateId>, source: SourceTag) -> Self {
        for id in ids {
            self.insert(id, source);
        }
        self
    }

    /// Adds `id` unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, id: CandidateId, source: SourceTag) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push(Candidate { id, source });
        true
    }

    #[must_use]
    pub fn source_of(&self, id: &CandidateId) -> Option<SourceTag> {
        self.index.get(id).map(|&position| self.entries[position].source)
    }

    #[must_use]
    pub fn contains(&self, id: &CandidateId) -> bool {
        self.index.contains_key(id)
    }

    /// Keeps only candidates matching `keep`, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&Candidate) -> bool) {
        self.entries.retain(keep);
        self.reindex();
    }

    /// Drops everything after the first `cap` candidates.
    pub fn truncate(&mut self, cap: usize) {
        if self.entries.len() > cap {
            self.entries.truncate(cap);
            self.reindex();
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, candidate)| (candidate.id.clone(), position))
            .collect();
    }

    #[must_use]
    pub fn candidates(&self) -> &[Candidate] {
        &self.entries
    }

    #[must_use]
    pub fn ids(&self) -> Vec<CandidateId> {
        self.entries.iter().map(|candidate| candidate.id.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(raw: &[&str]) -> Vec<CandidateId> {
        raw.iter().map(|id| CandidateId::new(*id)).collect()
    }

    #[test]
    fn id_lines_skip_comments_blank_and_malformed() {
        let contents = "# seeds\nUC_one\n\n  UC-two  \nnot an id\nUC_one\nhttps://youtube.com/x\n";
        assert_eq!(parse_id_lines(contents), ids(&["UC_one", "UC-two"]));
    }

    #[tokio::test]
    async fn missing_file_is_empty_not_error() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("nope.txt");

        assert!(read_id_list(Some(&missing)).await.expect("read").is_empty());
        assert!(read_id_list(None).await.expect("read").is_empty());
        assert!(read_keyword_list(Some(&missing)).await.expect("read").is_empty());
        assert!(Blocklist::load(Some(&missing)).await.expect("read").is_empty());
    }

    #[tokio::test]
    async fn keyword_list_is_lowercased_and_deduplicated() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("blocked_keywords.txt");
        tokio::fs::write(&path, "# keywords\nPrank\nprank\nMorning Glory\n")
            .await
            .expect("write");

        let keywords = read_keyword_list(Some(&path)).await.expect("read");
        assert_eq!(keywords, vec!["prank".to_string(), "morning glory".to_string()]);
    }

    #[test]
    fn existing_ids_come_from_channel_id_column() {
        let contents = "rank,channel_id,channel_name\n1,UC_a,\"A, the show\"\n2,UC_b,B\n3,UC_a,dup\n4,,blank\n";
        assert_eq!(parse_existing_ids(contents), ids(&["UC_a", "UC_b"]));
    }

    #[test]
    fn existing_ids_without_column_are_empty() {
        assert!(parse_existing_ids("rank,name\n1,x\n").is_empty());
        assert!(parse_existing_ids("").is_empty());
    }

    #[test]
    fn pool_keeps_first_source_and_order() {
        let pool = CandidatePool::new()
            .absorb(ids(&["A", "B"]), SourceTag::Seed)
            .absorb(ids(&["B", "C"]), SourceTag::Cached)
            .absorb(ids(&["C", "D", "A"]), SourceTag::Discovered);

        assert_eq!(pool.ids(), ids(&["A", "B", "C", "D"]));
        assert_eq!(pool.source_of(&CandidateId::new("B")), Some(SourceTag::Seed));
        assert_eq!(pool.source_of(&CandidateId::new("C")), Some(SourceTag::Cached));
        assert_eq!(pool.source_of(&CandidateId::new("D")), Some(SourceTag::Discovered));
    }

    #[test]
    fn pool_absorb_is_idempotent() {
        let once = CandidatePool::new().absorb(ids(&["A", "B", "A"]), SourceTag::Seed);
        let twice = once.clone().absorb(ids(&["A", "B"]), SourceTag::Existing);
        assert_eq!(once, twice);
    }

    #[test]
    fn pool_retain_and_truncate_keep_index_consistent() {
        let mut pool = CandidatePool::new().absorb(ids(&["A", "B", "C", "D"]), SourceTag::Seed);
        let blocklist = Blocklist::new(ids(&["B"]));
        pool.retain(|candidate| !blocklist.contains(&candidate.id));
        pool.truncate(2);

        assert_eq!(pool.ids(), ids(&["A", "C"]));
        assert!(!pool.contains(&CandidateId::new("B")));
        assert!(!pool.contains(&CandidateId::new("D")));
        assert_eq!(pool.source_of(&CandidateId::new("C")), Some(SourceTag::Seed));
    }
}
