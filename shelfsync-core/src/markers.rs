use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering as AtomicOrdering};

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

static SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// Totally ordered version tag, minted whenever document metadata is
/// rewritten by an author-side operation.
///
/// Freshly minted markers encode `{unix_millis:013x}-{seq:04x}-{entropy:08x}`
/// with fixed-width fields, so the lexicographic order of the string equals
/// the numeric order of (timestamp, sequence, entropy). Markers read back
/// from a store are treated as opaque: any string compares, replication
/// never re-mints.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionMarker(String);

impl VersionMarker {
    pub fn mint() -> Self {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let seq = SEQUENCE.fetch_add(1, AtomicOrdering::Relaxed);
        let entropy: u32 = rand::thread_rng().r#gen();
        Self(format!("{:013x}-{seq:04x}-{entropy:08x}", millis.max(0)))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_markers_are_strictly_increasing() {
        let first = VersionMarker::mint();
        let second = VersionMarker::mint();
        assert_eq!(first.compare(&second), Ordering::Less);
    }

    #[test]
    fn comparison_is_lexicographic_over_opaque_strings() {
        let older = VersionMarker::new("0000000000001-0000-00000000");
        let newer = VersionMarker::new("0000000000002-0000-00000000");
        assert_eq!(older.compare(&newer), Ordering::Less);
        assert_eq!(newer.compare(&older), Ordering::Greater);
        assert_eq!(older.compare(&older.clone()), Ordering::Equal);
    }

    #[test]
    fn serde_round_trip_is_transparent() {
        let marker = VersionMarker::mint();
        let json = serde_json::to_string(&marker).unwrap();
        assert_eq!(json, format!("\"{marker}\""));
        let parsed: VersionMarker = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, marker);
    }
}
