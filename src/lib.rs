pub mod alert;
pub mod changes;
pub mod config;
pub mod error;
pub mod grades;
pub mod portal;
pub mod scheduler;
pub mod server;
pub mod types;
