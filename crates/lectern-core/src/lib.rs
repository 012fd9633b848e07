//! Lectern core - offline-first data layer for textbook content.
//!
//! This crate keeps a local copy of an interactive textbook (chapters,
//! sections, content blocks, glossary terms and quizzes) usable while
//! offline:
//!
//! - `cache`: timestamped key-value cache with live per-key observation
//! - `network`: connectivity monitoring
//! - `repository`: cache-first / network-first loading per dataset
//! - `sync`: periodic and on-demand full sync
//! - `store`: durable record storage
//! - `api`: HTTP client for the content service

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod models;
pub mod network;
pub mod repository;
pub mod store;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod test_support;
