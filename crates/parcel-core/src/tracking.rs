//! # Tracking Codes
//!
//! The public, human-readable parcel identifier used for anonymous lookup.
//!
//! ## Format
//!
//! ```text
//! TRK-YYYYMMDD-NNNNNN
//! ```
//!
//! The date is the UTC calendar day of creation; the suffix is a random
//! number in `100000..=999999`, so it never has a leading zero. Uniqueness
//! is not guaranteed by generation alone: the store enforces it and the
//! creator retries on collision.

use chrono::{NaiveDate, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const PREFIX: &str = "TRK-";
const SUFFIX_MIN: u32 = 100_000;
const SUFFIX_SPAN: u32 = 900_000;

/// A validated tracking code of the form `TRK-YYYYMMDD-NNNNNN`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingId(String);

impl TrackingId {
    /// Parse and validate a tracking code.
    ///
    /// The date segment must be a real calendar date and the suffix must
    /// lie in `100000..=999999`.
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        if Self::is_well_formed(&code) {
            Ok(Self(code))
        } else {
            Err(ValidationError::InvalidTrackingId(code))
        }
    }

    /// Generate a tracking code for the given date using the supplied RNG.
    pub fn generate_at(date: NaiveDate, rng: &mut impl RngCore) -> Self {
        let suffix = SUFFIX_MIN + uniform_below(rng, SUFFIX_SPAN);
        Self(format!("{PREFIX}{}-{suffix}", date.format("%Y%m%d")))
    }

    /// Generate a tracking code for today's UTC date from the OS RNG.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now().date_naive(), &mut OsRng)
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_well_formed(code: &str) -> bool {
        let Some(rest) = code.strip_prefix(PREFIX) else {
            return false;
        };
        let Some((date, suffix)) = rest.split_once('-') else {
            return false;
        };
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        if NaiveDate::parse_from_str(date, "%Y%m%d").is_err() {
            return false;
        }
        if suffix.len() != 6 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        suffix
            .parse::<u32>()
            .map(|n| n >= SUFFIX_MIN)
            .unwrap_or(false)
    }
}

/// Draw a value in `0..bound` without modulo bias.
fn uniform_below(rng: &mut impl RngCore, bound: u32) -> u32 {
    let zone = u32::MAX - (u32::MAX % bound);
    loop {
        let v = rng.next_u32();
        if v < zone {
            return v % bound;
        }
    }
}

impl std::fmt::Display for TrackingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrackingId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TrackingId> for String {
    fn from(id: TrackingId) -> Self {
        id.0
    }
}

impl std::str::FromStr for TrackingId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Deterministic RNG returning a fixed sequence.
    struct SeqRng(Vec<u32>);

    impl RngCore for SeqRng {
        fn next_u32(&mut self) -> u32 {
            self.0.remove(0)
        }
        fn next_u64(&mut self) -> u64 {
            u64::from(self.next_u32())
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest {
                *b = self.next_u32() as u8;
            }
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_well_formed_code() {
        let id = TrackingId::new("TRK-20240131-482913").unwrap();
        assert_eq!(id.as_str(), "TRK-20240131-482913");
    }

    #[test]
    fn rejects_malformed_codes() {
        for bad in [
            "",
            "TRK-",
            "trk-20240131-482913",
            "TRK-2024013-482913",
            "TRK-20240132-482913",
            "TRK-20240131-48291",
            "TRK-20240131-4829130",
            "TRK-20240131-012345",
            "TRK-20240131-48a913",
            "TRK20240131-482913",
            "XYZ-20240131-482913",
        ] {
            assert!(
                matches!(TrackingId::new(bad), Err(ValidationError::InvalidTrackingId(_))),
                "should reject {bad:?}"
            );
        }
    }

    #[test]
    fn generate_uses_date_and_suffix_range() {
        let mut rng = SeqRng(vec![0, 899_999]);
        let low = TrackingId::generate_at(date(2025, 3, 7), &mut rng);
        let high = TrackingId::generate_at(date(2025, 3, 7), &mut rng);
        assert_eq!(low.as_str(), "TRK-20250307-100000");
        assert_eq!(high.as_str(), "TRK-20250307-999999");
    }

    #[test]
    fn generate_rejects_biased_draws() {
        let mut rng = SeqRng(vec![u32::MAX, 5]);
        let id = TrackingId::generate_at(date(2025, 3, 7), &mut rng);
        assert_eq!(id.as_str(), "TRK-20250307-100005");
    }

    #[test]
    fn generate_today_is_valid() {
        let id = TrackingId::generate();
        assert!(TrackingId::new(id.as_str()).is_ok());
        let today = Utc::now().date_naive().format("%Y%m%d").to_string();
        assert_eq!(&id.as_str()[4..12], today);
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let id: TrackingId = serde_json::from_str("\"TRK-20240131-482913\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"TRK-20240131-482913\"");
        assert!(serde_json::from_str::<TrackingId>("\"TRK-nope\"").is_err());
    }

    proptest! {
        #[test]
        fn generated_codes_always_parse(
            days in 0i64..40_000,
            draws in proptest::collection::vec(any::<u32>(), 4),
        ) {
            let day = date(1970, 1, 1) + chrono::Duration::days(days);
            // Rejection sampling may consume more than one draw; pad with zeros.
            let mut seq = draws;
            seq.extend([0; 4]);
            let id = TrackingId::generate_at(day, &mut SeqRng(seq));
            let reparsed = TrackingId::new(id.as_str()).unwrap();
            let stamp = day.format("%Y%m%d").to_string();
            prop_assert_eq!(&reparsed.as_str()[4..12], stamp.as_str());
        }
    }
}
