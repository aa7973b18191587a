pub mod api;
pub mod chains;
pub mod config;
pub mod db;
pub mod error;
pub mod indexer;
pub mod pipeline;
pub mod rpc;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;
