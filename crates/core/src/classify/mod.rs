use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowest heart rate (BPM) the monitor accepts.
pub const MIN_BPM: i64 = 26;
/// Highest heart rate (BPM) the monitor accepts.
pub const MAX_BPM: i64 = 250;

const NORMAL_UPPER: i64 = 110;
const ELEVATED_UPPER: i64 = 180;

/// Severity band a heart rate falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Normal,
    Elevated,
    High,
}

impl Band {
    /// Band for a value already known to be inside `[MIN_BPM, MAX_BPM]`.
    fn for_bpm(bpm: i64) -> Self {
        if bpm <= NORMAL_UPPER {
            Band::Normal
        } else if bpm <= ELEVATED_UPPER {
            Band::Elevated
        } else {
            Band::High
        }
    }

    /// Display color bound to this band.
    pub fn color(self) -> ColorToken {
        match self {
            Band::Normal => ColorToken::Green,
            Band::Elevated => ColorToken::Amber,
            Band::High => ColorToken::Red,
        }
    }

    /// Human-readable band name used in status text.
    pub fn label(self) -> &'static str {
        match self {
            Band::Normal => "Normal",
            Band::Elevated => "Elevated",
            Band::High => "High",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Symbolic fill color handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorToken {
    Green,
    Amber,
    Red,
}

impl ColorToken {
    /// CSS-style hex form of the token.
    pub fn hex(self) -> &'static str {
        match self {
            ColorToken::Green => "#4CAF50",
            ColorToken::Amber => "#FFC107",
            ColorToken::Red => "#F44336",
        }
    }
}

impl fmt::Display for ColorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

/// A heart rate that passed range validation, together with its derived band
/// and color. Only [`classify`] constructs one, so the three fields can never
/// disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidatedValue {
    bpm: i64,
    band: Band,
    color: ColorToken,
}

impl ValidatedValue {
    /// Heart rate in beats per minute.
    pub fn bpm(&self) -> i64 {
        self.bpm
    }

    /// Severity band derived from [`Self::bpm`].
    pub fn band(&self) -> Band {
        self.band
    }

    /// Fill color bound to [`Self::band`].
    pub fn color(&self) -> ColorToken {
        self.color
    }
}

/// Rejection produced when a candidate heart rate falls outside
/// `[MIN_BPM, MAX_BPM]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Heart rate must be between {min} and {max} BPM (current: {value})")]
pub struct RangeError {
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

/// Validates `bpm` and derives its band and color.
pub fn classify(bpm: i64) -> Result<ValidatedValue, RangeError> {
    if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return Err(RangeError {
            value: bpm,
            min: MIN_BPM,
            max: MAX_BPM,
        });
    }

    let band = Band::for_bpm(bpm);
    Ok(ValidatedValue {
        bpm,
        band,
        color: band.color(),
    })
}
