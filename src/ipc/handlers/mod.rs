pub mod activity;
pub mod attendance;
pub mod classes;
pub mod core;
pub mod cv;
pub mod documents;
pub mod grades;
pub mod reports;
pub mod students;
pub mod subjects;
pub mod teachers;
