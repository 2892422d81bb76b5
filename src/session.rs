//! Explicit session state for interactive front-ends.
//!
//! A front-end typically extracts a document once, lets the user edit the
//! suggested context, then generates (and re-generates) JSON and tables.
//! [`Session`] caches those artifacts and owns the invalidation rules; the
//! pipeline functions in [`crate::convert`] stay stateless and receive
//! everything they need as arguments.
//!
//! - a different source document ([`SourceIdentity`] changes) drops everything
//! - [`Session::regenerate`] drops only the generated JSON and tables

use crate::convert::SuggestedContext;
use crate::output::NamedTable;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Identity of a source document: its name plus a digest of its bytes.
///
/// Two uploads with the same name but different content are different
/// sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub name: String,
    /// Lower-case hex SHA-256 of the file bytes.
    pub sha256: String,
}

impl SourceIdentity {
    pub fn of(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            sha256: format!("{:x}", Sha256::digest(bytes)),
        }
    }
}

/// Cached artifacts for the current source document.
#[derive(Debug, Clone, Default)]
pub struct Session {
    source: Option<SourceIdentity>,
    pages: Option<Vec<String>>,
    suggested: Option<SuggestedContext>,
    json: Option<String>,
    tables: Option<Vec<NamedTable>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `source` the current document.
    ///
    /// Returns `true` when it differs from the previous one, in which case
    /// every cached artifact has been dropped.
    pub fn load(&mut self, source: SourceIdentity) -> bool {
        if self.source.as_ref() == Some(&source) {
            return false;
        }
        debug!("Session: new source '{}', clearing cache", source.name);
        *self = Self {
            source: Some(source),
            ..Self::default()
        };
        true
    }

    /// Drop generated JSON and tables; keep pages and suggestions.
    pub fn regenerate(&mut self) {
        self.json = None;
        self.tables = None;
    }

    pub fn source(&self) -> Option<&SourceIdentity> {
        self.source.as_ref()
    }

    pub fn pages(&self) -> Option<&[String]> {
        self.pages.as_deref()
    }

    pub fn set_pages(&mut self, pages: Vec<String>) {
        self.pages = Some(pages);
    }

    pub fn suggested(&self) -> Option<&SuggestedContext> {
        self.suggested.as_ref()
    }

    pub fn set_suggested(&mut self, suggested: SuggestedContext) {
        self.suggested = Some(suggested);
    }

    pub fn json(&self) -> Option<&str> {
        self.json.as_deref()
    }

    /// Store new JSON; tables derived from the old JSON are dropped.
    pub fn set_json(&mut self, json: String) {
        self.json = Some(json);
        self.tables = None;
    }

    pub fn tables(&self) -> Option<&[NamedTable]> {
        self.tables.as_deref()
    }

    pub fn set_tables(&mut self, tables: Vec<NamedTable>) {
        self.tables = Some(tables);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::csv_reader::Table;

    fn filled(source: SourceIdentity) -> Session {
        let mut s = Session::new();
        s.load(source);
        s.set_pages(vec!["page one".into()]);
        s.set_suggested(SuggestedContext {
            context: "ctx".into(),
            relationships: "rel".into(),
        });
        s.set_json("{}".into());
        s.set_tables(vec![NamedTable {
            name: "T".into(),
            table: Table::default(),
            strategy: None,
        }]);
        s
    }

    #[test]
    fn identity_hashes_content() {
        let a = SourceIdentity::of("a.pdf", b"abc");
        assert_eq!(
            a.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(a, SourceIdentity::of("a.pdf", b"abd"));
        assert_ne!(a, SourceIdentity::of("b.pdf", b"abc"));
    }

    #[test]
    fn same_source_keeps_cache() {
        let id = SourceIdentity::of("a.pdf", b"1");
        let mut s = filled(id.clone());
        assert!(!s.load(id));
        assert!(s.pages().is_some());
        assert!(s.tables().is_some());
    }

    #[test]
    fn new_source_clears_everything() {
        let mut s = filled(SourceIdentity::of("a.pdf", b"1"));
        assert!(s.load(SourceIdentity::of("a.pdf", b"2")));
        assert!(s.pages().is_none());
        assert!(s.suggested().is_none());
        assert!(s.json().is_none());
        assert!(s.tables().is_none());
        assert_eq!(s.source().unwrap().name, "a.pdf");
    }

    #[test]
    fn regenerate_keeps_pages_and_suggestions() {
        let mut s = filled(SourceIdentity::of("a.pdf", b"1"));
        s.regenerate();
        assert_eq!(s.pages().unwrap(), ["page one".to_string()]);
        assert_eq!(s.suggested().unwrap().context, "ctx");
        assert!(s.json().is_none());
        assert!(s.tables().is_none());
    }

    #[test]
    fn new_json_drops_stale_tables() {
        let mut s = filled(SourceIdentity::of("a.pdf", b"1"));
        s.set_json("{\"entities\":[]}".into());
        assert!(s.tables().is_none());
    }
}
