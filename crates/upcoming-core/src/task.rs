use std::fmt;

use serde::{Deserialize, Serialize};

/// Read-only view of not-yet-done tasks, pre-joined with event and activity.
pub const UPCOMING_VIEW: &str = "upcoming_tasks";

/// Underlying table that `done` updates are written to.
pub const TASKS_TABLE: &str = "tasks";

pub const TASK_COLUMNS: &[&str] = &[
    "id",
    "task_date",
    "start_time",
    "event",
    "activity_name",
    "task_text",
    "owner",
    "done",
];

/// Column headings as shown in the task table. The last column holds the
/// per-row "Done" action and has no heading.
pub const TABLE_HEADINGS: [&str; 7] = ["Date", "Time", "Event", "Activity", "Task", "Owner", ""];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub task_date: String,
    pub start_time: String,
    pub event: String,
    pub activity_name: String,
    #[serde(default)]
    pub task_text: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub done: bool,
}

impl Task {
    pub fn task_text_display(&self) -> &str {
        self.task_text.as_deref().unwrap_or("")
    }

    pub fn owner_display(&self) -> &str {
        self.owner.as_deref().unwrap_or("")
    }

    /// Display values for the six data columns, in heading order.
    pub fn cells(&self) -> [&str; 6] {
        [
            self.task_date.as_str(),
            self.start_time.as_str(),
            self.event.as_str(),
            self.activity_name.as_str(),
            self.task_text_display(),
            self.owner_display(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            direction: SortDirection::Asc,
        }
    }
}

/// A read against a view: which columns, in which order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQuery {
    pub view: String,
    pub columns: Vec<String>,
    pub order: Vec<OrderBy>,
}

impl TaskQuery {
    /// The one query the task list issues: every column of the upcoming
    /// view, sorted by date then start time. Rows are displayed in the
    /// order the server returns them.
    pub fn upcoming() -> Self {
        Self {
            view: UPCOMING_VIEW.to_string(),
            columns: TASK_COLUMNS.iter().map(|c| c.to_string()).collect(),
            order: vec![OrderBy::asc("task_date"), OrderBy::asc("start_time")],
        }
    }

    /// `select` parameter, e.g. `id,task_date,start_time`.
    pub fn select_param(&self) -> String {
        self.columns.join(",")
    }

    /// `order` parameter, e.g. `task_date.asc,start_time.asc`.
    pub fn order_param(&self) -> String {
        self.order
            .iter()
            .map(|o| format!("{}.{}", o.column, o.direction))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Partial update of a task row. Only fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl TaskUpdate {
    pub fn mark_done() -> Self {
        Self { done: Some(true) }
    }
}
