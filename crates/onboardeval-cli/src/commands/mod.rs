pub mod daily;
pub mod grade;
pub mod init;
pub mod list_models;
pub mod start;
pub mod state;
pub mod validate;
pub mod warnings;
