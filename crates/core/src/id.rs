//! Compact, sortable, typed binary identifiers.
//!
//! An [`Identifier`] is 13 raw bytes:
//!
//! ```text
//! [ kind (1) | unix seconds (4, big-endian) | instance tag (5) | counter (3, big-endian) ]
//! ```
//!
//! The instance tag is random per process and the counter is atomic, so two
//! identifiers generated by the same process never collide and identifiers
//! from different processes collide only with negligible probability. The
//! external text form is URL-safe base64 without padding (18 characters);
//! parsing rejects anything longer than 20 characters before decoding.

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;

use crate::error::DomainError;

/// Raw identifier width in bytes.
pub const RAW_LEN: usize = 13;

/// Maximum accepted length of the text form.
const MAX_TEXT_LEN: usize = 20;

/// Counter wraps modulo 2^24 (three bytes on the wire).
const COUNTER_MASK: u32 = 0x00FF_FFFF;

/// Entity kind baked into the identifier's first byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IdKind {
    Generic = 0,
    User = 1,
    Job = 2,
    Message = 3,
}

impl IdKind {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Binary identifier used as the primary key of every entity.
///
/// Compared, ordered and hashed byte-wise; immutable once generated.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier([u8; RAW_LEN]);

impl Identifier {
    /// Accept exactly [`RAW_LEN`] raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DomainError> {
        let raw: [u8; RAW_LEN] = bytes.try_into().map_err(|_| {
            DomainError::invalid_identifier(format!(
                "expected {RAW_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    /// Parse the URL-safe base64 text form.
    ///
    /// Strings longer than 20 characters are rejected before any decoding.
    pub fn from_text(s: &str) -> Result<Self, DomainError> {
        if s.len() > MAX_TEXT_LEN {
            return Err(DomainError::invalid_identifier(format!(
                "text form exceeds the limit of {MAX_TEXT_LEN} characters"
            )));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| DomainError::invalid_identifier(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// URL-safe base64 without padding; the canonical external form.
    pub fn to_text(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Lowercase hex rendering, for logs and diagnostics.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; RAW_LEN] {
        &self.0
    }

    /// The entity-kind tag byte.
    pub fn kind_tag(&self) -> u8 {
        self.0[0]
    }

    /// Creation time, unix seconds.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[1], self.0[2], self.0[3], self.0[4]])
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl std::fmt::Debug for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Identifier({})", self.to_text())
    }
}

impl FromStr for Identifier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

/// Process-scoped identifier factory.
///
/// Holds the per-process instance tag and the wrapping counter. Construct one
/// at startup and pass it by reference to call sites; there is deliberately no
/// module-level state. Two concurrent `generate` calls never observe the same
/// counter value, so identifiers are monotonically non-decreasing within a
/// fixed second. Monotonicity does not hold across process restarts.
#[derive(Debug)]
pub struct IdGenerator {
    instance_tag: [u8; 5],
    counter: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            instance_tag: rand::random(),
            counter: AtomicU32::new(rand::random::<u32>() & COUNTER_MASK),
        }
    }

    /// Mint a fresh identifier stamped with the current wall-clock second.
    pub fn generate(&self, kind: IdKind) -> Identifier {
        let seconds = (Utc::now().timestamp() & i64::from(u32::MAX)) as u32;
        let count = self
            .counter
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
            & COUNTER_MASK;

        let mut raw = [0u8; RAW_LEN];
        raw[0] = kind.tag();
        raw[1..5].copy_from_slice(&seconds.to_be_bytes());
        raw[5..10].copy_from_slice(&self.instance_tag);
        raw[10..13].copy_from_slice(&count.to_be_bytes()[1..4]);
        Identifier(raw)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trip() {
        let ids = IdGenerator::new();
        let id = ids.generate(IdKind::User);

        let text = id.to_text();
        assert_eq!(text.len(), 18);
        assert_eq!(Identifier::from_text(&text).unwrap(), id);
    }

    #[test]
    fn from_text_rejects_long_strings() {
        let err = Identifier::from_text("a".repeat(21).as_str()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidIdentifier(_)));
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        assert!(Identifier::from_bytes(&[0u8; 12]).is_err());
        assert!(Identifier::from_bytes(&[0u8; 14]).is_err());
        assert!(Identifier::from_bytes(&[0u8; 13]).is_ok());
    }

    #[test]
    fn generate_never_repeats_within_a_second() {
        let ids = IdGenerator::new();
        let a = ids.generate(IdKind::Job);
        let b = ids.generate(IdKind::Job);
        assert_ne!(a, b);
    }

    #[test]
    fn kind_and_timestamp_are_recoverable() {
        let ids = IdGenerator::new();
        let before = Utc::now().timestamp() as u32;
        let id = ids.generate(IdKind::Message);
        let after = Utc::now().timestamp() as u32;

        assert_eq!(id.kind_tag(), IdKind::Message.tag());
        assert!(id.timestamp() >= before && id.timestamp() <= after);
    }

    #[test]
    fn hex_form_is_26_chars() {
        let ids = IdGenerator::new();
        assert_eq!(ids.generate(IdKind::Generic).to_hex().len(), RAW_LEN * 2);
    }
}
