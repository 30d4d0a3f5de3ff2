pub mod count_ingest;
pub mod vision;

pub use count_ingest::{parse_count_batch, CountIngest, IngestedBatch, TrafficCountSnapshot};
pub use vision::{DetectionError, FallbackAnalyzer, SimulatedAnalyzer, VisionAnalyzer};
