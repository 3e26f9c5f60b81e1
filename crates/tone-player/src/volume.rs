//! Output level: the shared volume handle and the per-beat shaper.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::tone::ToneBuffer;

/// Live volume multiplier in `[0, 1]`, shared between the UI and the workers.
///
/// Stored as `f32` bits so readers never block; the playback worker reads it once
/// per beat.
#[derive(Clone, Debug)]
pub struct Volume {
    bits: Arc<AtomicU32>,
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Volume {
    pub fn new(level: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(clamp_level(level).to_bits())),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Store a new level, clamped to `[0, 1]` (NaN becomes silence).
    pub fn set(&self, level: f32) {
        self.bits
            .store(clamp_level(level).to_bits(), Ordering::Relaxed);
    }
}

fn clamp_level(level: f32) -> f32 {
    if level.is_nan() {
        0.0
    } else {
        level.clamp(0.0, 1.0)
    }
}

/// Return a copy of `buffer` with every sample scaled by `volume`.
///
/// The product is truncated toward zero. Levels outside `[0, 1]` are clamped
/// first, so the result can never leave the 16-bit range.
pub fn apply_volume(buffer: &ToneBuffer, volume: f32) -> ToneBuffer {
    let level = f64::from(clamp_level(volume));
    let samples = buffer
        .samples()
        .iter()
        .map(|s| (f64::from(*s) * level) as i16)
        .collect();
    ToneBuffer::from_samples(samples)
}
