//! Utility functions for Klinika

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use ring::{digest, pbkdf2, rand::SecureRandom};
use std::num::NonZeroU32;

use crate::{Error, Result};

/// `Mon DD, YYYY`, the format tables use for date columns
pub const DISPLAY_DATE_FORMAT: &str = "%b %d, %Y";

/// Field names rendered as dates by list views
pub const DATE_FIELDS: &[&str] = &["creationDate", "birthDate", "appointmentDate"];

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_PREFIX: &str = "pbkdf2-sha256";

/// Format a timestamp for display, e.g. `Mar 05, 2024`
#[must_use]
pub fn format_display_date(value: &DateTime<Utc>) -> String {
    value.format(DISPLAY_DATE_FORMAT).to_string()
}

/// Format a calendar date for display
#[must_use]
pub fn format_display_day(value: NaiveDate) -> String {
    value.format(DISPLAY_DATE_FORMAT).to_string()
}

/// Parse a date as it appears in JSON and format it for display
///
/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM:SS[.f]` timestamps
/// and plain `YYYY-MM-DD` dates. Returns `None` for anything else.
#[must_use]
pub fn format_date_value(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(format_display_date(&ts.with_timezone(&Utc)));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(format_display_day(ts.date()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(format_display_day)
}

/// Whether a list column holds a date
#[must_use]
pub fn is_date_field(field: &str) -> bool {
    DATE_FIELDS.contains(&field)
}

fn iterations() -> Result<NonZeroU32> {
    NonZeroU32::new(PBKDF2_ITERATIONS)
        .ok_or_else(|| Error::Credentials("iteration count must be non-zero".to_string()))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

/// Hash a password with PBKDF2-HMAC-SHA256 and a random salt
///
/// The result is `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`.
///
/// # Errors
///
/// Returns an error if the system random source fails.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    ring::rand::SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| Error::Credentials("random source unavailable".to_string()))?;

    let mut hash = [0u8; digest::SHA256_OUTPUT_LEN];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations()?, &salt, password.as_bytes(), &mut hash);

    Ok(format!(
        "{HASH_PREFIX}${PBKDF2_ITERATIONS}${}${}",
        to_hex(&salt),
        to_hex(&hash)
    ))
}

/// Check a password against a hash produced by [`hash_password`]
///
/// Malformed hashes never verify.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(HASH_PREFIX), Some(rounds), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Some(rounds) = rounds.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Some(salt), Some(hash)) = (from_hex(salt), from_hex(hash)) else {
        return false;
    };

    pbkdf2::verify(pbkdf2::PBKDF2_HMAC_SHA256, rounds, &salt, password.as_bytes(), &hash).is_ok()
}
