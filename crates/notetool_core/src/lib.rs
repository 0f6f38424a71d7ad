pub mod config;
pub mod extract;
pub mod fetcher;
pub mod merge;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod urls;

#[cfg(test)]
mod testing;
