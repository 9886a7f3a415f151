//! Certificate serials and content hashes.
//!
//! Serials are derived, not random: hashing the enrollment id together with
//! the issue instant keeps retries within one issuance attempt stable, while
//! the unique index on `certificates.enrollment_id` remains the actual
//! once-only guarantee. The content hash binds the printable fields so a
//! holder (or employer) can verify a certificate was not altered.

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

const SERIAL_PREFIX: &str = "AULA";
const SERIAL_GROUPS: usize = 4;
const SERIAL_GROUP_LEN: usize = 4;

/// Hash-input field separator; keeps `("ab", "c")` and `("a", "bc")` apart.
const FIELD_SEPARATOR: [u8; 1] = [0x1f];

/// Truncate an instant to whole microseconds. Postgres stores microsecond
/// precision, so hashing a nanosecond-precision instant would break
/// verification after a storage round trip.
pub fn canonical_issue_instant(now: OffsetDateTime) -> OffsetDateTime {
    let micros = now.nanosecond() / 1_000;
    now.replace_nanosecond(micros * 1_000).unwrap_or(now)
}

/// Derive the printable serial, e.g. `AULA-9F04-11D2-8C3A-0B77`.
pub fn derive_serial(enrollment_id: Uuid, issued_at: OffsetDateTime) -> String {
    let mut hasher = Sha256::new();
    hasher.update(enrollment_id.as_bytes());
    hasher.update(issued_at.unix_timestamp().to_be_bytes());
    hasher.update(issued_at.nanosecond().to_be_bytes());
    let encoded = hex::encode_upper(hasher.finalize());

    let mut serial =
        String::with_capacity(SERIAL_PREFIX.len() + SERIAL_GROUPS * (SERIAL_GROUP_LEN + 1));
    serial.push_str(SERIAL_PREFIX);
    for group in 0..SERIAL_GROUPS {
        serial.push('-');
        let start = group * SERIAL_GROUP_LEN;
        serial.push_str(&encoded[start..start + SERIAL_GROUP_LEN]);
    }
    serial
}

/// SHA-256 over the printable certificate fields, hex-encoded.
pub fn content_hash(
    learner_name: &str,
    course_title: &str,
    issued_at: OffsetDateTime,
    serial: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(learner_name.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(course_title.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(issued_at.unix_timestamp().to_be_bytes());
    hasher.update(issued_at.nanosecond().to_be_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(serial.as_bytes());
    hex::encode(hasher.finalize())
}
