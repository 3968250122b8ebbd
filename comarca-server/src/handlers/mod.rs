pub mod jobs;
pub mod logs;
pub mod tribunals;
