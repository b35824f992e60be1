//! The statements uploaded during a session, in upload order.

use crate::model::Table;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One uploaded statement and the table parsed from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    path: PathBuf,
    table: Table,
}

impl Upload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &Table {
        &self.table
    }
}

/// An append-only stack of uploads. Nothing here outlives the process.
///
/// `undo` and `redo` both discard the most recent upload. A redo that restores a discarded upload
/// would need the discarded entries to be kept somewhere, and nothing keeps them.
// TODO: confirm with product whether redo should restore the last discarded upload.
#[derive(Debug, Clone, Default)]
pub struct Uploads {
    entries: Vec<Upload>,
}

impl Uploads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, path: impl Into<PathBuf>, table: Table) {
        let path = path.into();
        debug!("Appending upload #{} from {}", self.entries.len() + 1, path.display());
        self.entries.push(Upload { path, table });
    }

    /// Removes and returns the most recent upload, if any.
    pub fn discard_last(&mut self) -> Option<Upload> {
        let discarded = self.entries.pop();
        if let Some(upload) = &discarded {
            debug!("Discarded upload from {}", upload.path.display());
        }
        discarded
    }

    pub fn undo(&mut self) -> Option<Upload> {
        self.discard_last()
    }

    pub fn redo(&mut self) -> Option<Upload> {
        self.discard_last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|u| u.path())
    }

    /// All uploads concatenated in order, with rows numbered from 0.
    pub fn combined(&self) -> Table {
        let mut entries = self.entries.iter();
        let Some(first) = entries.next() else {
            return Table::transactions();
        };
        let mut combined = Table::new(first.table.columns().iter().cloned());
        combined.append(&first.table);
        for upload in entries {
            combined.append(&upload.table);
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, RowId};

    fn table(description: &str) -> Table {
        let mut table = Table::new(["Description", "Amount"]);
        table
            .push_row(vec![Cell::text(description), Cell::text("-1")])
            .unwrap();
        table
    }

    fn stack() -> Uploads {
        let mut uploads = Uploads::new();
        uploads.append("p1.csv", table("t1"));
        uploads.append("p2.csv", table("t2"));
        uploads
    }

    #[test]
    fn test_undo_and_redo_discard_the_same_entry() {
        let mut undone = stack();
        let mut redone = stack();

        let a = undone.undo().unwrap();
        let b = redone.redo().unwrap();

        assert_eq!(a, b);
        assert_eq!(a.path(), Path::new("p2.csv"));
        assert_eq!(a.table(), &table("t2"));
        assert_eq!(
            undone.paths().collect::<Vec<_>>(),
            redone.paths().collect::<Vec<_>>()
        );
        assert_eq!(undone.paths().collect::<Vec<_>>(), vec![Path::new("p1.csv")]);
    }

    #[test]
    fn test_discard_empty() {
        let mut uploads = Uploads::new();
        assert!(uploads.discard_last().is_none());
        assert!(uploads.redo().is_none());
        assert!(uploads.is_empty());
    }

    #[test]
    fn test_combined() {
        let uploads = stack();
        let combined = uploads.combined();
        assert_eq!(combined.len(), 2);
        assert_eq!(
            combined.cell(RowId::new(1), "Description").unwrap(),
            &Cell::text("t2")
        );
        assert_eq!(uploads.len(), 2);
    }

    #[test]
    fn test_combined_empty_has_standard_columns() {
        let combined = Uploads::new().combined();
        assert!(combined.is_empty());
        assert_eq!(combined.columns().len(), 6);
    }
}
