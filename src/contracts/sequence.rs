use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::contracts::error::{AllocationError, StorageError};

/// One independent numbering stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlipKind {
    Transport,
    Freight,
}

impl SlipKind {
    pub const ALL: [SlipKind; 2] = [SlipKind::Transport, SlipKind::Freight];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlipKind::Transport => "transport",
            SlipKind::Freight => "freight",
        }
    }
}

impl fmt::Display for SlipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlipKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transport" => Ok(SlipKind::Transport),
            "freight" => Ok(SlipKind::Freight),
            other => Err(StorageError::InvalidInput(format!(
                "unknown slip type '{}', expected 'transport' or 'freight'",
                other
            ))),
        }
    }
}

/// Counter row for one sequence. Keyed by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlipNumberConfig {
    #[serde(rename = "type")]
    pub kind: SlipKind,
    pub prefix: String,
    pub current_number: u64,
}

impl SlipNumberConfig {
    /// A fresh row for `kind`, prefixed with `year`.
    pub fn initial(kind: SlipKind, year: i32) -> Self {
        Self {
            kind,
            prefix: year.to_string(),
            current_number: 0,
        }
    }
}

/// Human-readable slip number: `"{prefix} {sequence:04}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlipNumber {
    pub prefix: String,
    pub sequence: u64,
}

impl SlipNumber {
    pub fn new(prefix: impl Into<String>, sequence: u64) -> Self {
        Self {
            prefix: prefix.into(),
            sequence,
        }
    }
}

impl fmt::Display for SlipNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:04}", self.prefix, self.sequence)
    }
}

impl FromStr for SlipNumber {
    type Err = StorageError;

    /// Splits on the last space so prefixes may themselves contain spaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StorageError::InvalidInput(format!("malformed slip number '{}'", s));
        let (prefix, digits) = s.rsplit_once(' ').ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence = digits.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self::new(prefix, sequence))
    }
}

impl Serialize for SlipNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlipNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Source of the calendar year used when a counter row is first created.
pub trait Clock: Send + Sync {
    fn current_year(&self) -> i32;
}

/// Wall clock in local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_year(&self) -> i32 {
        chrono::Local::now().year()
    }
}

/// Always reports the same year.
#[derive(Debug, Clone, Copy)]
pub struct FixedYear(pub i32);

impl Clock for FixedYear {
    fn current_year(&self) -> i32 {
        self.0
    }
}

/// Issues slip numbers for the independent per-kind sequences.
///
/// # Invariants
/// - No two successful `allocate` calls for the same kind return the same number
/// - `current_number` grows by exactly one per successful allocation
/// - The prefix only changes through `reset`
pub trait SlipNumberAllocator: Send + Sync {
    /// Returns the next number for `kind`, creating the counter row on first use.
    fn allocate(&self, kind: SlipKind) -> Result<SlipNumber, AllocationError>;

    /// Returns the counter row without incrementing.
    fn current(&self, kind: SlipKind) -> Result<Option<SlipNumberConfig>, AllocationError>;

    /// Replaces the counter row. Administrative use only.
    ///
    /// Fails with `Rewind` when the prefix is unchanged and the number would
    /// go backwards; a new prefix may restart from any number.
    fn reset(&self, config: SlipNumberConfig) -> Result<(), AllocationError>;
}
