pub mod email;
pub mod error;
pub mod task;
pub mod task_list;

pub use error::UpcomingError;
pub use task::{Task, TaskQuery, TaskUpdate};
pub use task_list::{LocalPatch, TaskList};
