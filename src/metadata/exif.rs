//! EXIF capture date and GPS position for images

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use exif::{Exif, In, Rational, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::trace;

/// Shortest accepted "YYYY:MM:DD HH:MM:SS" value
const DATETIME_LEN: usize = 19;

/// Parse the EXIF block of an image container
pub fn read_exif(path: &Path) -> Result<Exif> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| Error::ExifRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Original capture time (`DateTimeOriginal`), if present and well formed
pub fn capture_time(exif: &Exif) -> Option<NaiveDateTime> {
    let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)?;
    let raw = match &field.value {
        Value::Ascii(values) => values.first()?,
        _ => return None,
    };
    let datetime = parse_exif_datetime(raw);
    trace!(?datetime, "Read DateTimeOriginal");
    datetime
}

/// Parse a fixed-position "YYYY:MM:DD HH:MM:SS" field.
///
/// Digits are read by position, so the separator characters themselves are
/// not checked. Anything shorter than 19 bytes or with out-of-range parts is
/// rejected.
fn parse_exif_datetime(raw: &[u8]) -> Option<NaiveDateTime> {
    if raw.len() < DATETIME_LEN {
        return None;
    }
    let s = std::str::from_utf8(&raw[..DATETIME_LEN]).ok()?;
    let part = |range: std::ops::Range<usize>| s.get(range)?.parse::<u32>().ok();

    let year = part(0..4)? as i32;
    let date = chrono::NaiveDate::from_ymd_opt(year, part(5..7)?, part(8..10)?)?;
    date.and_hms_opt(part(11..13)?, part(14..16)?, part(17..19)?)
}

/// GPS position as signed decimal degrees `(lat, lon)`.
///
/// All four of latitude, latitude ref, longitude and longitude ref must be
/// present; south and west negate.
pub fn gps_position(exif: &Exif) -> Option<(f64, f64)> {
    let lat = gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)?;
    let lon = gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef)?;
    Some((lat, lon))
}

fn gps_coordinate(exif: &Exif, coord_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let coord = exif.get_field(coord_tag, In::PRIMARY)?;
    let reference = exif.get_field(ref_tag, In::PRIMARY)?;

    let degrees = match &coord.value {
        Value::Rational(parts) if parts.len() >= 3 => dms_to_decimal(&parts[0], &parts[1], &parts[2]),
        _ => return None,
    };

    let hemisphere = match &reference.value {
        Value::Ascii(values) => values.first().and_then(|v| v.first()).copied()?,
        _ => return None,
    };

    if matches!(hemisphere, b'S' | b'W') {
        Some(-degrees)
    } else {
        Some(degrees)
    }
}

/// `deg + min/60 + sec/3600`
fn dms_to_decimal(deg: &Rational, min: &Rational, sec: &Rational) -> f64 {
    rational_to_f64(deg) + rational_to_f64(min) / 60.0 + rational_to_f64(sec) / 3600.0
}

/// A zero denominator counts as 0.0
fn rational_to_f64(r: &Rational) -> f64 {
    if r.denom == 0 {
        0.0
    } else {
        r.num as f64 / r.denom as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ExifFixture, write_jpeg};
    use chrono::{Datelike, Timelike};
    use tempfile::tempdir;

    #[test]
    fn test_parse_exif_datetime() {
        let dt = parse_exif_datetime(b"2023:10:15 14:30:05").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2023, 10, 15));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (14, 30, 5));

        // Trailing sub-second or zone data is ignored
        assert!(parse_exif_datetime(b"2023:10:15 14:30:05.123").is_some());

        assert!(parse_exif_datetime(b"2023:10:15").is_none());
        assert!(parse_exif_datetime(b"0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime(b"2023:13:15 14:30:05").is_none());
        assert!(parse_exif_datetime(b"    :  :     :  :  ").is_none());
    }

    #[test]
    fn test_zero_denominator_term_is_zero() {
        let deg = Rational { num: 48, denom: 1 };
        let min = Rational { num: 30, denom: 0 };
        let sec = Rational { num: 36, denom: 1 };
        assert!((dms_to_decimal(&deg, &min, &sec) - 48.01).abs() < 1e-9);
    }

    #[test]
    fn test_reads_date_and_gps_from_jpeg() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        write_jpeg(
            &path,
            &ExifFixture {
                datetime: Some("2023:10:15 14:30:05"),
                gps: Some((48.8566, -2.3522)),
            },
        );

        let exif = read_exif(&path).unwrap();
        let dt = capture_time(&exif).unwrap();
        assert_eq!(dt.to_string(), "2023-10-15 14:30:05");

        let (lat, lon) = gps_position(&exif).unwrap();
        assert!((lat - 48.8566).abs() < 1e-4, "lat = {lat}");
        assert!((lon + 2.3522).abs() < 1e-4, "lon = {lon}");
    }

    #[test]
    fn test_missing_gps_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        write_jpeg(
            &path,
            &ExifFixture {
                datetime: Some("2023:10:15 14:30:05"),
                gps: None,
            },
        );

        let exif = read_exif(&path).unwrap();
        assert!(gps_position(&exif).is_none());
    }

    #[test]
    fn test_non_image_fails_to_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();
        assert!(matches!(read_exif(&path), Err(Error::ExifRead { .. })));
    }
}
