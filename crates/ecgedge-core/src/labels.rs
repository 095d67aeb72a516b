//! Diagnosis label set and categorical feature codes.
//!
//! The integer codes and the label order must match the encoders the
//! classifier was trained with.

use std::fmt;

use serde::{Serialize, Serializer};

/// Code used for any rhythm or T-wave string outside the known enumeration.
pub const DEFAULT_CODE: u8 = 0;

const RHYTHM_CODES: &[(&str, u8)] = &[
    ("Sinus", 0),
    ("Bradycardia", 1),
    ("Tachycardia", 2),
    ("Atrial Fibrillation", 3),
];

const T_WAVE_CODES: &[(&str, u8)] = &[
    ("Normal", 0),
    ("Inverted", 1),
    ("Peaked", 2),
    ("Flattened", 3),
];

/// Numeric code for a rhythm label. Unknown labels map to [`DEFAULT_CODE`].
pub fn rhythm_code(rhythm: &str) -> u8 {
    lookup(RHYTHM_CODES, rhythm)
}

/// Numeric code for a T-wave label. Unknown labels map to [`DEFAULT_CODE`].
pub fn t_wave_code(t_wave: &str) -> u8 {
    lookup(T_WAVE_CODES, t_wave)
}

fn lookup(table: &[(&str, u8)], value: &str) -> u8 {
    table
        .iter()
        .find(|(name, _)| *name == value)
        .map(|&(_, code)| code)
        .unwrap_or(DEFAULT_CODE)
}

/// Classifier output label, in model output index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagnosis {
    AtrialFibrillation,
    Bradycardia,
    HeartBlock,
    MyocardialInfarction,
    Normal,
    Tachycardia,
}

impl Diagnosis {
    /// All labels, indexed by classifier output position.
    pub const ALL: [Diagnosis; 6] = [
        Self::AtrialFibrillation,
        Self::Bradycardia,
        Self::HeartBlock,
        Self::MyocardialInfarction,
        Self::Normal,
        Self::Tachycardia,
    ];

    /// Number of classifier outputs.
    pub const COUNT: usize = Self::ALL.len();

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AtrialFibrillation => "Atrial Fibrillation",
            Self::Bradycardia => "Bradycardia",
            Self::HeartBlock => "Heart Block",
            Self::MyocardialInfarction => "Myocardial Infarction",
            Self::Normal => "Normal",
            Self::Tachycardia => "Tachycardia",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Diagnosis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
