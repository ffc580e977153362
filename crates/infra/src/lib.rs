//! Infrastructure layer: extraction sessions, the search pipeline, job
//! execution and storage, result files, configuration.

pub mod adapter;
mod blocking;
pub mod config;
pub mod jobs;
pub mod orders;
pub mod pipeline;
pub mod sink;

#[cfg(test)]
mod integration_tests;
#[cfg(test)]
pub(crate) mod test_support;

pub use config::CrawlerConfig;
