//! Audio properties exchanged with the probing and muxing collaborators.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Stream properties of a decoded track, as reported by an
/// [`AudioProbe`](crate::tools::AudioProbe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub channels: u32,
    pub sample_rate: u32,
    /// Sample frames per channel.
    pub samples: u64,
    pub bits_per_sample: u32,
}

impl AudioMetadata {
    /// Track length in seconds. Zero when the sample rate is unknown.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples as f32 / self.sample_rate as f32
    }
}

/// Loop region handed to the sound-bank muxer, in sample frames at the
/// target sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopPoints {
    pub start: u64,
    pub end: u64,
}

impl LoopPoints {
    /// Sentinel loop end meaning "one second before the end of the track".
    pub const TRACK_END: i64 = -1;

    /// Turn user-entered loop points for `original` into loop points for
    /// the converted track.
    ///
    /// `end == TRACK_END` resolves to the total sample count minus one
    /// second. Both points are rescaled by `target_sample_rate /
    /// original.sample_rate` (truncating) when the rates differ.
    pub fn resolve(
        start: i64,
        end: i64,
        original: &AudioMetadata,
        target_sample_rate: u32,
    ) -> Result<Self> {
        if original.sample_rate == 0 {
            return Err(Error::InvalidMetadata("original sample rate is zero"));
        }
        let end = if end == Self::TRACK_END {
            original.samples as i64 - original.sample_rate as i64
        } else {
            end
        };
        let (start, end) = match (u64::try_from(start), u64::try_from(end)) {
            (Ok(s), Ok(e)) => (s, e),
            _ => return Err(Error::InvalidMetadata("loop point is negative")),
        };
        if end < start {
            return Err(Error::InvalidMetadata("loop ends before it starts"));
        }

        if original.sample_rate == target_sample_rate {
            return Ok(Self { start, end });
        }
        let rescale = |v: u64| {
            (v as u128 * target_sample_rate as u128 / original.sample_rate as u128) as u64
        };
        Ok(Self {
            start: rescale(start),
            end: rescale(end),
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn track(sample_rate: u32, samples: u64) -> AudioMetadata {
        AudioMetadata {
            channels: 2,
            sample_rate,
            samples,
            bits_per_sample: 16,
        }
    }

    #[test]
    fn duration_is_samples_over_rate() {
        assert_abs_diff_eq!(track(48000, 96000).duration_secs(), 2.0, epsilon = 1e-5);
        assert_eq!(track(0, 96000).duration_secs(), 0.0);
    }

    #[test]
    fn loop_end_sentinel_is_one_second_early() {
        let lp = LoopPoints::resolve(0, LoopPoints::TRACK_END, &track(48000, 480000), 48000).unwrap();
        assert_eq!(lp, LoopPoints { start: 0, end: 432000 });
    }

    #[test]
    fn loop_points_follow_the_rate_change() {
        let lp = LoopPoints::resolve(44100, 88200, &track(44100, 441000), 48000).unwrap();
        assert_eq!(lp, LoopPoints { start: 48000, end: 96000 });

        let lp = LoopPoints::resolve(1, 3, &track(96000, 960000), 48000).unwrap();
        assert_eq!(lp, LoopPoints { start: 0, end: 1 });
    }

    #[test]
    fn bad_loop_points_are_rejected() {
        let t = track(48000, 1000);
        assert!(LoopPoints::resolve(-5, 10, &t, 48000).is_err());
        assert!(LoopPoints::resolve(0, LoopPoints::TRACK_END, &t, 48000).is_err());
        assert!(LoopPoints::resolve(10, 5, &t, 48000).is_err());
        assert!(LoopPoints::resolve(0, 5, &track(0, 10), 48000).is_err());
    }
}
