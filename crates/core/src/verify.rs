use std::io::Cursor;

use chrono::{Duration, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use thiserror::Error;

/// EXIF datetime wire format, e.g. `2026:08:30 14:05:09`.
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Capture-timestamp fields in priority order. A field that is present but
/// unparseable falls through to the next one rather than failing the photo.
const TIMESTAMP_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerificationFailure {
    /// The payload is not a metadata-preserving image container. Raised
    /// before any extraction is attempted, typically because the photo was
    /// sent through a recompressing transport that strips EXIF.
    #[error("payload is not a metadata-preserving image; resend the photo as a file")]
    WrongTransportMode,
    #[error("no parseable capture timestamp found in the image metadata")]
    NoTimestampMetadata,
    #[error("photo was taken {age_secs}s ago, outside the freshness window")]
    PhotoTooOld { age_secs: i64 },
}

/// A photo that passed the freshness check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedPhoto {
    pub taken_at: NaiveDateTime,
    /// Seconds elapsed between capture and verification. May be negative
    /// when the camera clock runs ahead; see the acceptance policy below.
    pub age_secs: i64,
}

/// Decides whether a photo proves on-site presence right now.
///
/// Acceptance policy for clock skew: a capture timestamp is accepted iff its
/// absolute distance from `now` is within the window. Future timestamps are
/// therefore tolerated up to the same bound as past ones and rejected beyond
/// it, so a skewed device clock does not lock an agent out while arbitrarily
/// future timestamps still fail.
#[derive(Clone, Debug)]
pub struct FreshnessVerifier {
    max_age: Duration,
}

impl FreshnessVerifier {
    pub fn new(max_age_secs: u32) -> Self {
        Self { max_age: Duration::seconds(i64::from(max_age_secs)) }
    }

    pub fn max_age_secs(&self) -> i64 {
        self.max_age.num_seconds()
    }

    pub fn verify(
        &self,
        bytes: &[u8],
        now: NaiveDateTime,
    ) -> Result<VerifiedPhoto, VerificationFailure> {
        if !looks_like_image(bytes) {
            return Err(VerificationFailure::WrongTransportMode);
        }

        let taken_at = extract_capture_time(bytes)?;
        let age = now - taken_at;
        let age_secs = age.num_seconds();

        if age.abs() > self.max_age {
            return Err(VerificationFailure::PhotoTooOld { age_secs });
        }

        Ok(VerifiedPhoto { taken_at, age_secs })
    }
}

/// Magic-number sniff for the containers the EXIF reader understands.
fn looks_like_image(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"II\x2a\x00")
        || bytes.starts_with(b"MM\x00\x2a")
        || bytes.starts_with(&[0x89, b'P', b'N', b'G'])
}

fn extract_capture_time(bytes: &[u8]) -> Result<NaiveDateTime, VerificationFailure> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .map_err(|_| VerificationFailure::NoTimestampMetadata)?;

    for tag in TIMESTAMP_TAGS {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        let Some(raw) = ascii_value(&field.value) else {
            continue;
        };
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw.trim(), EXIF_DATETIME_FORMAT) {
            return Ok(parsed);
        }
    }

    Err(VerificationFailure::NoTimestampMetadata)
}

fn ascii_value(value: &Value) -> Option<&str> {
    match value {
        Value::Ascii(chunks) => chunks.first().and_then(|chunk| std::str::from_utf8(chunk).ok()),
        _ => None,
    }
}
