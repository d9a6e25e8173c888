//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a miniature library and mirrors and
//! exercise the crawl and download stages end-to-end.

mod common;
mod crawl_tests;
mod download_tests;
