//! # synthgen-pipeline
//!
//! The generation pipeline that ties the engine, rig, and annotation layers
//! into a dataset producer: load random models, settle them on the surface,
//! randomize lights and camera, render, convert the segmentation map to
//! YOLO labels, and persist everything under a train/val/test layout.
//!
//! ## Features
//!
//! - Validated configuration tree with YAML load/save
//! - Class discovery from a models-by-directory catalog
//! - Bounded per-image retry loop that never aborts a batch
//! - Split bookkeeping that appends to existing output directories
//! - End-of-run class list, config snapshot, and JSON summary

pub mod catalog;
pub mod config;
pub mod dataset;
pub mod generator;
pub mod report;

pub use catalog::ModelCatalog;
pub use config::{ConfigError, GenerationConfig};
pub use dataset::{next_index, split_counts, OutputLayout, Split, SplitCounts};
pub use generator::{visualize_dataset, Generator};
pub use report::RunSummary;
