//! End-to-end tests for the pagehnsw index.

#[path = "../common/mod.rs"]
mod common;

mod build;
mod maintenance;
mod persistence;
mod scan;
