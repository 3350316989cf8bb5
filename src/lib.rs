//! Page Render Archiver library.
//!
//! Renders a batch of URLs in a headless browser, so that client-side and
//! scroll-triggered content is present, and uploads each document to S3 under
//! a key derived from its URL. Per-URL failures are isolated and reported.

pub mod config;
pub mod constants;
pub mod gate;
pub mod handler;
pub mod orchestrator;
pub mod render;
pub mod report;
pub mod request;
pub mod retry;
pub mod storage;
