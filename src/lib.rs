pub mod app;
pub mod cli;
pub mod cli_handlers;
pub mod db;
pub mod error;
pub mod logging;
pub mod remote;
pub mod sql_constants;
pub mod sync;
pub mod tasks;

#[cfg(test)]
pub mod test_utils;
