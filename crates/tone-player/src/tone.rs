//! Beat synthesis.
//!
//! A beat is one sine beep followed by enough silence to fill the beat period, so
//! writing beats back to back to a blocking output line keeps time without a timer.

use std::f64::consts::PI;

use crate::config::{BEEP_MS, MAX_AMPLITUDE, SAMPLE_RATE_HZ};
use crate::error::ToneError;

/// Immutable mono buffer of signed 16-bit PCM samples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToneBuffer {
    samples: Vec<i16>,
}

impl ToneBuffer {
    pub fn from_samples(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples (frames, since the buffer is mono).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Size of the buffer in the 2-bytes-per-sample wire layout.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    /// Big-endian byte pairs, high byte first.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_be_bytes()).collect()
    }
}

/// Synthesises beat buffers at a fixed sample rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToneGenerator {
    sample_rate: u32,
    beep_ms: u32,
}

impl Default for ToneGenerator {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE_HZ,
            beep_ms: BEEP_MS,
        }
    }
}

impl ToneGenerator {
    pub fn new(sample_rate: u32) -> Result<Self, ToneError> {
        if sample_rate == 0 {
            return Err(ToneError::InvalidSampleRate);
        }
        Ok(Self {
            sample_rate,
            ..Self::default()
        })
    }

    pub fn with_beep_ms(mut self, beep_ms: u32) -> Self {
        self.beep_ms = beep_ms;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples in one beat period: `floor(sample_rate * 60 / tempo)`.
    ///
    /// The fractional sample is dropped rather than carried into the next beat, so
    /// very long sessions drift slightly fast. A tempo too fast for even one sample
    /// per beat is rejected: an empty beat would never block the output line.
    pub fn beat_len(&self, tempo_bpm: u32) -> Result<usize, ToneError> {
        if tempo_bpm == 0 {
            return Err(ToneError::InvalidTempo(tempo_bpm));
        }
        match u64::from(self.sample_rate) * 60 / u64::from(tempo_bpm) {
            0 => Err(ToneError::InvalidTempo(tempo_bpm)),
            len => Ok(len as usize),
        }
    }

    /// Samples carrying the sine part of a beat.
    pub fn beep_len(&self) -> usize {
        (u64::from(self.sample_rate) * u64::from(self.beep_ms)).div_ceil(1000) as usize
    }

    /// Build one beat: a full-scale sine beep at `freq_hz` padded with silence.
    ///
    /// No fade is applied, so the beep ends on whatever phase it reached.
    pub fn generate_beat(&self, tempo_bpm: u32, freq_hz: f32) -> Result<ToneBuffer, ToneError> {
        if !freq_hz.is_finite() || freq_hz <= 0.0 {
            return Err(ToneError::InvalidFrequency(freq_hz));
        }
        let len = self.beat_len(tempo_bpm)?;
        let beep_len = self.beep_len().min(len);
        let period = f64::from(self.sample_rate) / f64::from(freq_hz);

        let mut samples = vec![0i16; len];
        for (i, sample) in samples.iter_mut().take(beep_len).enumerate() {
            let angle = 2.0 * PI * i as f64 / period;
            *sample = (angle.sin() * MAX_AMPLITUDE).round() as i16;
        }
        Ok(ToneBuffer { samples })
    }
}

/// Build one beat at the reference sample rate and beep length.
pub fn generate_beat(tempo_bpm: u32, freq_hz: f32) -> Result<ToneBuffer, ToneError> {
    ToneGenerator::default().generate_beat(tempo_bpm, freq_hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_sample(i: usize, freq_hz: f32) -> i16 {
        let period = f64::from(SAMPLE_RATE_HZ) / f64::from(freq_hz);
        ((2.0 * PI * i as f64 / period).sin() * MAX_AMPLITUDE).round() as i16
    }

    #[test]
    fn beat_length_matches_tempo() {
        for bpm in [1, 7, 10, 60, 120, 133, 300, 500] {
            let beat = generate_beat(bpm, 880.0).unwrap();
            let samples = (44_100 * 60 / bpm) as usize;
            assert_eq!(beat.len(), samples, "bpm {bpm}");
            assert_eq!(beat.byte_len(), 2 * samples, "bpm {bpm}");
        }
    }

    #[test]
    fn beep_follows_sine_then_silence() {
        let beat = generate_beat(120, 1760.0).unwrap();
        let beep = ToneGenerator::default().beep_len();
        assert_eq!(beep, 4410);
        for (i, s) in beat.samples()[..beep].iter().enumerate() {
            assert_eq!(*s, expected_sample(i, 1760.0), "sample {i}");
        }
        assert!(beat.samples()[beep..].iter().all(|s| *s == 0));
    }

    #[test]
    fn beep_reaches_full_scale() {
        let beat = generate_beat(60, 441.0).unwrap();
        let peak = beat.samples().iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert_eq!(peak, i16::MAX as u16);
    }

    #[test]
    fn beep_is_clipped_to_short_beats() {
        let beat = generate_beat(1000, 880.0).unwrap();
        assert_eq!(beat.len(), 2646);
        assert_ne!(beat.samples()[beat.len() - 1], 0);
    }

    #[test]
    fn rejects_non_positive_arguments() {
        assert_eq!(generate_beat(0, 880.0), Err(ToneError::InvalidTempo(0)));
        assert_eq!(generate_beat(120, 0.0), Err(ToneError::InvalidFrequency(0.0)));
        assert_eq!(generate_beat(120, -5.0), Err(ToneError::InvalidFrequency(-5.0)));
        assert!(matches!(
            generate_beat(120, f32::NAN),
            Err(ToneError::InvalidFrequency(_))
        ));
        assert_eq!(ToneGenerator::new(0), Err(ToneError::InvalidSampleRate));
    }

    #[test]
    fn rejects_tempos_shorter_than_one_sample() {
        let generator = ToneGenerator::default();
        assert_eq!(generator.beat_len(2_646_000), Ok(1));
        assert_eq!(
            generator.beat_len(2_646_001),
            Err(ToneError::InvalidTempo(2_646_001))
        );
        assert_eq!(
            generate_beat(u32::MAX, 880.0),
            Err(ToneError::InvalidTempo(u32::MAX))
        );
    }

    #[test]
    fn generator_uses_its_own_rate() {
        let generator = ToneGenerator::new(48_000).unwrap().with_beep_ms(50);
        assert_eq!(generator.beep_len(), 2400);
        assert_eq!(generator.beat_len(120).unwrap(), 24_000);
    }

    #[test]
    fn be_bytes_put_high_byte_first() {
        let buf = ToneBuffer::from_samples(vec![0x1234, -2]);
        assert_eq!(buf.to_be_bytes(), vec![0x12, 0x34, 0xFF, 0xFE]);
        assert_eq!(buf.byte_len(), 4);
    }
}
