//! Snowflake-style identifier layout, section selection and candidate generation
//!
//! Identifiers are packed from **MSB to LSB**:
//!
//! ```text
//!  Bit Index:  63           32 31         22 21           0
//!              +---------------+-------------+--------------+
//!  Field:      | timestamp (32)| counter (10)| section (22) |
//!              +---------------+-------------+--------------+
//!              |<----------- MSB -- 64 bits -- LSB -------->|
//! ```
//!
//! Decoding is total over `u64`. Encoding masks each field to its width, so
//! callers are expected to pass values already in range.
//!
//! - [`section`] - majority section selection over a corpus of observed ids
//! - [`generator`] - lazy candidate sequence with deduplication

pub mod generator;
pub mod section;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::constants::id::{
    COUNTER_MASK, COUNTER_SHIFT, SECTION_BITS, SECTION_MASK, SECTION_SHIFT, TIMESTAMP_MASK,
    TIMESTAMP_SHIFT,
};
use crate::errors::{ConfigError, ConfigResult};

pub use generator::{IdGenerator, ProducerStats, SeenIdSet};
pub use section::{select_section, SectionHistogram};

/// A synthesized or observed 64-bit identifier
pub type CandidateId = u64;

/// The 22-bit section field
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Section(u32);

impl Section {
    /// Wrap a raw section value, masking it to 22 bits
    pub const fn new(raw: u32) -> Self {
        Self(raw & SECTION_MASK as u32)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Render as a zero-padded, MSB-first binary string of exactly 22 chars
    pub fn to_bit_string(&self) -> String {
        format!("{:0width$b}", self.0, width = SECTION_BITS as usize)
    }

    /// Parse a 22-character binary string
    pub fn from_bit_string(bits: &str) -> ConfigResult<Self> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "section".to_string(),
            value: bits.to_string(),
            reason: reason.to_string(),
        };

        if bits.len() != SECTION_BITS as usize {
            return Err(invalid("expected exactly 22 binary digits"));
        }
        if !bits.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(invalid("only '0' and '1' are allowed"));
        }

        u32::from_str_radix(bits, 2)
            .map(Self)
            .map_err(|e| invalid(&e.to_string()))
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.to_bit_string(), self.0)
    }
}

/// Decoded components of a [`CandidateId`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IdParts {
    /// Unix epoch seconds
    pub timestamp: u32,
    /// Sub-second counter in `0..=1023`
    pub sub_second_counter: u16,
    pub section: Section,
}

impl IdParts {
    /// Timestamp as a UTC datetime
    pub fn datetime(&self) -> DateTime<Utc> {
        // Every u32 second count is representable
        DateTime::from_timestamp(i64::from(self.timestamp), 0).unwrap_or_default()
    }

    /// Re-encode these parts
    pub fn encode(&self) -> CandidateId {
        encode(self.timestamp, self.sub_second_counter, self.section)
    }
}

impl fmt::Display for IdParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timestamp={} ({}) counter={} section={}",
            self.timestamp,
            self.datetime().to_rfc3339(),
            self.sub_second_counter,
            self.section
        )
    }
}

/// Split an identifier into its bit fields
pub const fn decode(id: CandidateId) -> IdParts {
    IdParts {
        timestamp: ((id >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK) as u32,
        sub_second_counter: ((id >> COUNTER_SHIFT) & COUNTER_MASK) as u16,
        section: Section(((id >> SECTION_SHIFT) & SECTION_MASK) as u32),
    }
}

/// Pack the bit fields into an identifier
///
/// `sub_second_counter` must fit in 10 bits; extra bits are masked off
/// (and flagged in debug builds).
pub fn encode(timestamp: u32, sub_second_counter: u16, section: Section) -> CandidateId {
    debug_assert!(
        u64::from(sub_second_counter) <= COUNTER_MASK,
        "counter overflow"
    );

    let t = (u64::from(timestamp) & TIMESTAMP_MASK) << TIMESTAMP_SHIFT;
    let c = (u64::from(sub_second_counter) & COUNTER_MASK) << COUNTER_SHIFT;
    let s = (u64::from(section.value()) & SECTION_MASK) << SECTION_SHIFT;
    t | c | s
}

/// Full 64-character MSB-first bit string of an identifier
pub fn to_bit_string(id: CandidateId) -> String {
    format!("{:064b}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_over_edge_values() {
        let samples = [
            0u64,
            1,
            u64::MAX,
            0x8000_0000_0000_0000,
            7_250_000_000_000_000_000,
            0x0000_0000_003F_FFFF,
            0xFFFF_FFFF_0000_0000,
            0x1234_5678_9ABC_DEF0,
        ];
        for id in samples {
            let parts = decode(id);
            assert_eq!(parts.encode(), id, "round trip failed for {id}");
            assert!(parts.sub_second_counter <= 1023);
            assert!(parts.section.value() < (1 << 22));
        }
    }

    #[test]
    fn test_field_positions_match_bit_string_slices() {
        // Same slicing as reading the 64-char binary string: [0,32), [32,42), [42,64)
        let id = 7_246_466_967_640_198_459u64;
        let bits = to_bit_string(id);
        let parts = decode(id);

        assert_eq!(
            u32::from_str_radix(&bits[0..32], 2).unwrap(),
            parts.timestamp
        );
        assert_eq!(
            u16::from_str_radix(&bits[32..42], 2).unwrap(),
            parts.sub_second_counter
        );
        assert_eq!(&bits[42..64], parts.section.to_bit_string());
    }

    #[test]
    fn test_encode_known_layout() {
        let section = Section::from_bit_string("0000000000000000000001").unwrap();
        let id = encode(1_700_000_000, 3, section);
        assert_eq!(id, (1_700_000_000u64 << 32) | (3 << 22) | 1);
        assert_eq!(
            decode(id),
            IdParts {
                timestamp: 1_700_000_000,
                sub_second_counter: 3,
                section,
            }
        );
    }

    #[test]
    fn test_section_bit_string_validation() {
        assert!(Section::from_bit_string("101").is_err());
        assert!(Section::from_bit_string("000000000000000000000x").is_err());

        let section = Section::from_bit_string("1111111111111111111111").unwrap();
        assert_eq!(section.value(), (1 << 22) - 1);
        assert_eq!(section.to_bit_string().len(), 22);
    }

    #[test]
    fn test_section_new_masks_high_bits() {
        assert_eq!(Section::new(u32::MAX).value(), (1 << 22) - 1);
    }

    #[test]
    fn test_parts_datetime() {
        let parts = decode(encode(1_700_000_000, 0, Section::new(0)));
        assert_eq!(parts.datetime().to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }
}
