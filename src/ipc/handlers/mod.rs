pub mod assignments;
pub mod cache;
pub mod catalog;
pub mod core;
pub mod modal;
pub mod students;
pub mod teachers;
