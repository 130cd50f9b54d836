//! mbs - Metabase card sync
//!
//! This crate provides the core functionality for the `mbs` CLI tool: it
//! keeps Metabase questions ("cards") in a local repository of Jinja
//! templates and moves them back and forth.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Card document
//! - [`render`] - Template rendering (minijinja)
//! - [`remote`] - Metabase HTTP gateway
//! - [`sync`] - Pull, push and merge
//! - [`config`] - Repository marker and saved sessions
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod render;
pub mod sync;

pub use error::{Error, Result};
