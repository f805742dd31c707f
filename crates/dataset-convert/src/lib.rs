//! dataset-convert: schema-version upgrade pipeline for recorded datasets
//!
//! Transforms a dataset recorded under the v2.1 schema (12-D arm-only
//! vectors, 3 cameras, episode-per-file storage) into the v3.0 schema
//! (15-D arm+base vectors, 4 cameras, size-consolidated storage). The
//! pipeline is a fixed stage sequence; any validation failure halts
//! before publish and nothing partial is ever published.

mod error;
pub use error::{ConvertError, Result};

pub mod expand;
pub mod cameras;
pub mod video;
pub mod consolidate;
pub mod merge;
pub mod hub;

mod pipeline;
pub use pipeline::{ConvertOptions, Converter};
