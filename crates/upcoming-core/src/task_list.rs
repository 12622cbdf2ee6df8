use crate::task::Task;

/// A change applied to the local list after the server confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalPatch {
    /// The row's `done` flag is now true, so the upcoming view no longer
    /// contains it.
    MarkedDone { id: String },
}

/// Local cache of the last known upcoming view.
///
/// Rows are kept in server order. The list is only ever replaced wholesale
/// by a load, or patched after a confirmed mutation.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    rows: Vec<Task>,
}

impl TaskList {
    pub fn new(rows: Vec<Task>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Task] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Task> {
        self.rows.get(index)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|t| t.id == id)
    }

    pub fn replace(&mut self, rows: Vec<Task>) {
        self.rows = rows;
    }

    /// Returns `true` if the patch changed the list.
    pub fn apply(&mut self, patch: &LocalPatch) -> bool {
        match patch {
            LocalPatch::MarkedDone { id } => {
                let before = self.rows.len();
                self.rows.retain(|t| &t.id != id);
                self.rows.len() != before
            }
        }
    }
}
