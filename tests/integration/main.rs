//! Integration tests for Doc-Harvester
//!
//! These tests use wiremock to serve small documentation sites and run
//! real jobs and batches against them end-to-end.

mod batch_tests;
mod common;
mod crawl_tests;
