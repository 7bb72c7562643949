//! screenlens - screenshot parsing into structured UI elements.
//!
//! Combines OCR, icon detection, and icon captioning into a single
//! coordinate-indexed element list, serves the pipeline over HTTP, and ships
//! an interactive capture client.

pub mod adapters;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod server;
pub mod storage;
