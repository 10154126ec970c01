//! Pose metadata embedding.
//!
//! Splices GPS position, altitude and heading into a JPEG's EXIF container;
//! pitch and roll have no native EXIF fields and are packed into the image
//! description. Embedding is best-effort: a recognized transient codec
//! failure is retried with linear backoff, and after the attempts are
//! exhausted the photo is uploaded with its original bytes rather than
//! abandoned.

use std::sync::Arc;
use std::time::Duration;

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use img_parts::jpeg::{Jpeg, JpegSegment, markers};
use img_parts::{Bytes, ImageEXIF};
use tracing::warn;

use panovault_protocol::types::Pose;

use crate::error::EmbedError;
use crate::progress::{GlobalPatch, ProgressSink, ProgressUpdate};

/// Total embed attempts for a transient codec failure.
pub const EMBED_ATTEMPTS: u32 = 3;

/// Backoff unit; attempt `n` waits `n` units before the next try.
const EMBED_BACKOFF_UNIT: Duration = Duration::from_millis(1000);

/// Rewrites image bytes with positional metadata.
///
/// The production implementation is [`JpegExifCodec`]; tests substitute
/// failing stubs to exercise the retry policy.
pub trait ExifCodec: Send + Sync {
    fn embed(&self, image: &[u8], pose: &Pose) -> Result<Vec<u8>, EmbedError>;
}

/// EXIF codec for JPEG containers.
///
/// Preserves existing primary-IFD fields, replacing only the positional tags
/// being written.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegExifCodec;

impl ExifCodec for JpegExifCodec {
    fn embed(&self, image: &[u8], pose: &Pose) -> Result<Vec<u8>, EmbedError> {
        let mut jpeg =
            Jpeg::from_bytes(Bytes::copy_from_slice(image)).map_err(|e| classify(e.to_string()))?;

        let pose_fields = pose_fields(pose);
        let replaced: Vec<Tag> = pose_fields.iter().map(|f| f.tag).collect();

        let mut fields: Vec<Field> = Vec::new();
        if let Some(raw) = jpeg.exif() {
            let existing = exif::Reader::new()
                .read_raw(raw.to_vec())
                .map_err(|e| classify(e.to_string()))?;
            for field in existing.fields() {
                if field.ifd_num == In::PRIMARY && !replaced.contains(&field.tag) {
                    fields.push(Field {
                        tag: field.tag,
                        ifd_num: field.ifd_num,
                        value: field.value.clone(),
                    });
                }
            }
        }
        fields.extend(pose_fields);

        let mut writer = Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        let mut cursor = std::io::Cursor::new(Vec::new());
        writer
            .write(&mut cursor, false)
            .map_err(|e| EmbedError::Write(e.to_string()))?;

        replace_exif_segment(&mut jpeg, cursor.into_inner());
        Ok(jpeg.encoder().bytes().to_vec())
    }
}

const EXIF_SEGMENT_PREFIX: &[u8] = b"Exif\0\0";

/// Splices the raw EXIF blob into the JPEG as an APP1 segment.
///
/// `ImageEXIF::set_exif` inserts at a fixed segment index and panics when
/// the file carries fewer segments than that, so the insertion point is
/// clamped to the segment list we actually have.
fn replace_exif_segment(jpeg: &mut Jpeg, raw: Vec<u8>) {
    let mut contents = Vec::with_capacity(EXIF_SEGMENT_PREFIX.len() + raw.len());
    contents.extend_from_slice(EXIF_SEGMENT_PREFIX);
    contents.extend_from_slice(&raw);

    let segments = jpeg.segments_mut();
    segments.retain(|s| {
        !(s.marker() == markers::APP1 && s.contents().starts_with(EXIF_SEGMENT_PREFIX))
    });
    let at = segments.len().min(3);
    segments.insert(
        at,
        JpegSegment::new_with_contents(markers::APP1, Bytes::from(contents)),
    );
}

/// Runs the codec with the retry/fallback policy.
///
/// Transient failures are retried up to [`EMBED_ATTEMPTS`] times with linear
/// backoff (1 s, 2 s). After exhaustion the original bytes are returned and a
/// warning is surfaced through the sink so the photo still gets uploaded.
/// Any other error propagates immediately.
pub async fn embed_with_retry(
    codec: &dyn ExifCodec,
    image: Vec<u8>,
    pose: &Pose,
    photo_id: &str,
    sink: &Arc<dyn ProgressSink>,
) -> Result<Vec<u8>, EmbedError> {
    for attempt in 1..=EMBED_ATTEMPTS {
        match codec.embed(&image, pose) {
            Ok(out) => return Ok(out),
            Err(EmbedError::Transient(reason)) => {
                warn!(photo = photo_id, attempt, %reason, "transient embed failure");
                if attempt < EMBED_ATTEMPTS {
                    tokio::time::sleep(EMBED_BACKOFF_UNIT * attempt).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    sink.report(ProgressUpdate::Global(GlobalPatch::message(format!(
        "Could not embed position metadata into {photo_id}.jpg; uploading original bytes"
    ))));
    Ok(image)
}

/// Classifies a codec error message: truncated-input signatures are the
/// recognized transient condition, everything else is unsupported input.
fn classify(message: String) -> EmbedError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("truncated") || lower.contains("unexpected end") || lower.contains("eof") {
        EmbedError::Transient(message)
    } else {
        EmbedError::Unsupported(message)
    }
}

/// Builds the EXIF fields for a pose.
///
/// Latitude/longitude become reference ("N"/"S", "E"/"W") plus unsigned
/// degree-minute-second rationals; altitude and heading are single
/// rationals; pitch/roll go into the image description.
fn pose_fields(pose: &Pose) -> Vec<Field> {
    let mut fields = Vec::new();

    let lat_ref = if pose.latitude < 0.0 { "S" } else { "N" };
    fields.push(ascii(Tag::GPSLatitudeRef, lat_ref));
    fields.push(Field {
        tag: Tag::GPSLatitude,
        ifd_num: In::PRIMARY,
        value: Value::Rational(to_dms(pose.latitude.abs())),
    });

    let lng_ref = if pose.longitude < 0.0 { "W" } else { "E" };
    fields.push(ascii(Tag::GPSLongitudeRef, lng_ref));
    fields.push(Field {
        tag: Tag::GPSLongitude,
        ifd_num: In::PRIMARY,
        value: Value::Rational(to_dms(pose.longitude.abs())),
    });

    if let Some(altitude) = pose.altitude {
        fields.push(Field {
            tag: Tag::GPSAltitudeRef,
            ifd_num: In::PRIMARY,
            value: Value::Byte(vec![if altitude < 0.0 { 1 } else { 0 }]),
        });
        fields.push(Field {
            tag: Tag::GPSAltitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![to_rational(altitude.abs())]),
        });
    }

    if let Some(heading) = pose.heading {
        fields.push(ascii(Tag::GPSImgDirectionRef, "T"));
        fields.push(Field {
            tag: Tag::GPSImgDirection,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![to_rational(heading)]),
        });
    }

    if pose.pitch.is_some() || pose.roll.is_some() {
        let pitch = pose.pitch.unwrap_or(0.0);
        let roll = pose.roll.unwrap_or(0.0);
        fields.push(ascii(
            Tag::ImageDescription,
            &format!("pitch={pitch:.2};roll={roll:.2}"),
        ));
    }

    fields
}

fn ascii(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

fn to_dms(degrees: f64) -> Vec<Rational> {
    let total_seconds = degrees * 3600.0;
    let d = (total_seconds / 3600.0).floor();
    let m = ((total_seconds - d * 3600.0) / 60.0).floor();
    let s = total_seconds - d * 3600.0 - m * 60.0;
    vec![
        Rational {
            num: d as u32,
            denom: 1,
        },
        Rational {
            num: m as u32,
            denom: 1,
        },
        Rational {
            num: (s * 1000.0).round() as u32,
            denom: 1000,
        },
    ]
}

fn to_rational(value: f64) -> Rational {
    Rational {
        num: (value * 1000.0).round() as u32,
        denom: 1000,
    }
}
