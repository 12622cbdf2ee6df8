pub mod login_form;
pub mod task_table;
