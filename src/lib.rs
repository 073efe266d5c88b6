pub mod app;
pub mod assembly;
pub mod config;
pub mod domain;
pub mod error;
pub mod fasta;
pub mod ncbi;
pub mod output;
pub mod report;
pub mod sequence;
pub mod store;
