//! Frame rates, exact edit-unit arithmetic and SMPTE timecode
//!
//! Edit rates are kept as exact rationals so a sample count converted to edit
//! units and back is reproduced exactly, including at the NTSC rates
//! (24000/1001, 30000/1001, 60000/1001).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimecodeError {
    #[error("Unsupported frame rate '{0}' (expected one of {labels})", labels = RateSpec::LABELS.join(", "))]
    UnsupportedRate(String),

    #[error("Sample rate must be greater than zero")]
    ZeroSampleRate,

    #[error("Duration does not fit in 64-bit edit units")]
    Overflow,
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Exact fraction, always stored reduced with a positive denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub const ZERO: Rational = Rational { num: 0, den: 1 };

    /// Build a reduced fraction; `None` if the denominator is zero or the
    /// reduced value does not fit in 64 bits
    pub fn new(num: i128, den: i128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let sign = if den < 0 { -1 } else { 1 };
        let g = gcd(num, den).max(1);
        let num = i64::try_from(sign * num / g).ok()?;
        let den = i64::try_from(sign * den / g).ok()?;
        Some(Self { num, den })
    }

    pub const fn from_int(value: i64) -> Self {
        Self { num: value, den: 1 }
    }

    /// Largest integer not greater than the value
    pub fn floor(self) -> i64 {
        self.num.div_euclid(self.den)
    }

    /// Smallest integer not less than the value
    pub fn ceil(self) -> i64 {
        -((-self.num).div_euclid(self.den))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// A supported timeline frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateSpec {
    label: &'static str,
    rate: Rational,
    nominal_fps: u32,
}

impl RateSpec {
    /// Accepted labels, in menu order
    pub const LABELS: [&'static str; 9] = [
        "23.98", "23.976", "24", "25", "29.97", "30", "50", "59.94", "60",
    ];

    /// Resolve a label to its exact rate
    pub fn parse(label: &str) -> Result<Self, TimecodeError> {
        let label = label.trim();
        let (label, num, den, nominal_fps): (&'static str, i64, i64, u32) = match label {
            "23.98" => ("23.98", 24000, 1001, 24),
            "23.976" => ("23.976", 24000, 1001, 24),
            "24" => ("24", 24, 1, 24),
            "25" => ("25", 25, 1, 25),
            "29.97" => ("29.97", 30000, 1001, 30),
            "30" => ("30", 30, 1, 30),
            "50" => ("50", 50, 1, 50),
            "59.94" => ("59.94", 60000, 1001, 60),
            "60" => ("60", 60, 1, 60),
            other => return Err(TimecodeError::UnsupportedRate(other.to_string())),
        };
        Ok(Self {
            label,
            rate: Rational { num, den },
            nominal_fps,
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Exact frames per second
    pub fn rate(&self) -> Rational {
        self.rate
    }

    /// Integer frame base used for timecode (30 for 29.97)
    pub fn nominal_fps(&self) -> u32 {
        self.nominal_fps
    }

    /// Frames dropped per minute in drop-frame counting; zero if the rate
    /// has no drop-frame form
    pub fn dropped_frames_per_minute(&self) -> u32 {
        match (self.rate.den, self.nominal_fps) {
            (1001, 30) => 2,
            (1001, 60) => 4,
            _ => 0,
        }
    }

    pub fn supports_drop_frame(&self) -> bool {
        self.dropped_frames_per_minute() > 0
    }

    /// Exact duration in edit units: `samples * rate / sample_rate`
    pub fn samples_to_edit_units(&self, samples: u64, sample_rate: u32) -> Result<Rational, TimecodeError> {
        if sample_rate == 0 {
            return Err(TimecodeError::ZeroSampleRate);
        }
        Rational::new(
            samples as i128 * self.rate.num as i128,
            sample_rate as i128 * self.rate.den as i128,
        )
        .ok_or(TimecodeError::Overflow)
    }
}

impl FromStr for RateSpec {
    type Err = TimecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RateSpec::parse(s)
    }
}

impl fmt::Display for RateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fps ({})", self.label, self.rate)
    }
}

/// HH:MM:SS:FF, or HH:MM:SS;FF when drop-frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
    pub drop_frame: bool,
}

impl Timecode {
    pub const ZERO: Timecode = Timecode {
        hours: 0,
        minutes: 0,
        seconds: 0,
        frames: 0,
        drop_frame: false,
    };

    /// Label a frame count at the given rate
    ///
    /// `drop_frame` is ignored for rates without a drop-frame form.
    pub fn from_frames(frame_count: u64, rate: &RateSpec, drop_frame: bool) -> Self {
        let fps = rate.nominal_fps() as u64;
        let drop = rate.dropped_frames_per_minute() as u64;
        let drop_frame = drop_frame && drop > 0;

        let mut count = frame_count;
        if drop_frame {
            // Skip the labels that drop-frame counting never shows
            let per_ten_minutes = fps * 600 - drop * 9;
            let per_minute = fps * 60 - drop;
            let tens = count / per_ten_minutes;
            let rem = count % per_ten_minutes;
            count += drop * 9 * tens;
            if rem > drop {
                count += drop * ((rem - drop) / per_minute);
            }
        }

        Self {
            hours: (count / (fps * 3600)) as u32,
            minutes: ((count / (fps * 60)) % 60) as u32,
            seconds: ((count / fps) % 60) as u32,
            frames: (count % fps) as u32,
            drop_frame,
        }
    }

    /// Frame count this label denotes
    pub fn to_frames(&self, rate: &RateSpec) -> u64 {
        let fps = rate.nominal_fps() as u64;
        let total_minutes = self.hours as u64 * 60 + self.minutes as u64;
        let labelled = (total_minutes * 60 + self.seconds as u64) * fps + self.frames as u64;
        if self.drop_frame {
            let drop = rate.dropped_frames_per_minute() as u64;
            labelled - drop * (total_minutes - total_minutes / 10)
        } else {
            labelled
        }
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, sep, self.frames
        )
    }
}

/// Timecode fields for one file
#[derive(Debug, Clone, PartialEq)]
pub struct TimecodeInfo {
    pub rate: RateSpec,
    /// Exact duration in edit units
    pub duration: Rational,
    /// Whole frames covered by the duration
    pub duration_frames: u64,
    pub start: Timecode,
    pub end: Timecode,
}

impl TimecodeInfo {
    /// Resolve start/end timecode and duration for a sample count
    pub fn resolve(
        sample_frames: u64,
        sample_rate: u32,
        rate: &RateSpec,
        drop_frame: bool,
    ) -> Result<Self, TimecodeError> {
        let duration = rate.samples_to_edit_units(sample_frames, sample_rate)?;
        let duration_frames = duration.floor().max(0) as u64;
        let start = Timecode {
            drop_frame: drop_frame && rate.supports_drop_frame(),
            ..Timecode::ZERO
        };

        Ok(Self {
            rate: *rate,
            duration,
            duration_frames,
            start,
            end: Timecode::from_frames(duration_frames, rate, drop_frame),
        })
    }

    /// Duration as a timecode label
    pub fn duration_label(&self) -> String {
        Timecode::from_frames(self.duration_frames, &self.rate, self.start.drop_frame).to_string()
    }
}
