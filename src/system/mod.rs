pub mod error;
pub mod process;
pub mod query;
pub mod reader;
pub mod registry;

mod layout;

#[cfg(windows)]
pub mod details;
