//! Streaming feature extraction.

mod segment;

pub use segment::{Features, SegmentAnalyzer};
