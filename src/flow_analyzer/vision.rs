// Seam to the image-based vehicle counter. Detection itself happens outside
// this crate; these types only shape what comes back.

use crate::shared_data::Direction;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectionError {
    #[error("no image data supplied")]
    EmptyImage,

    #[error("detector unavailable: {0}")]
    Unavailable(String),

    #[error("detection failed: {0}")]
    Failed(String),
}

/// Counts vehicles in an image taken of one approach.
pub trait VisionAnalyzer: Send + Sync {
    fn count_vehicles(&self, image: &[u8], direction: Direction) -> Result<u32, DetectionError>;
}

/// Tries `primary` first and falls back to `secondary` when it fails.
/// If both fail the approach is reported as empty.
pub struct FallbackAnalyzer<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackAnalyzer<P, S>
where
    P: VisionAnalyzer,
    S: VisionAnalyzer,
{
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P, S> VisionAnalyzer for FallbackAnalyzer<P, S>
where
    P: VisionAnalyzer,
    S: VisionAnalyzer,
{
    fn count_vehicles(&self, image: &[u8], direction: Direction) -> Result<u32, DetectionError> {
        if image.is_empty() {
            return Err(DetectionError::EmptyImage);
        }
        match self.primary.count_vehicles(image, direction) {
            Ok(count) => Ok(count),
            Err(primary_err) => {
                log::warn!(
                    "Primary detector failed for {}: {}; trying fallback",
                    direction,
                    primary_err
                );
                match self.secondary.count_vehicles(image, direction) {
                    Ok(count) => Ok(count),
                    Err(secondary_err) => {
                        log::warn!(
                            "Fallback detector failed for {}: {}; reporting 0 vehicles",
                            direction,
                            secondary_err
                        );
                        Ok(0)
                    }
                }
            }
        }
    }
}

/// Produces seeded pseudo-random counts in `0..=max_count`. Stands in for the
/// real detector when driving the controller without cameras.
pub struct SimulatedAnalyzer {
    rng: Mutex<StdRng>,
    max_count: u32,
}

impl SimulatedAnalyzer {
    pub fn new(seed: u64, max_count: u32) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            max_count,
        }
    }
}

impl VisionAnalyzer for SimulatedAnalyzer {
    fn count_vehicles(&self, image: &[u8], _direction: Direction) -> Result<u32, DetectionError> {
        if image.is_empty() {
            return Err(DetectionError::EmptyImage);
        }
        Ok(self.rng.lock().random_range(0..=self.max_count))
    }
}
