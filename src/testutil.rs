//! Fixture builders shared by unit tests

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;

/// Tags to embed in a generated JPEG
pub struct ExifFixture<'a> {
    pub datetime: Option<&'a str>,
    pub gps: Option<(f64, f64)>,
}

fn ascii_field(tag: Tag, text: &[u8]) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.to_vec()]),
    }
}

/// Degrees, minutes and seconds (to 1/1000 s) of the magnitude of `value`
fn dms_field(tag: Tag, value: f64) -> Field {
    let value = value.abs();
    let deg = value.floor();
    let minutes = ((value - deg) * 60.0).floor();
    let seconds = ((value - deg) * 60.0 - minutes) * 60.0;
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Rational(vec![
            Rational { num: deg as u32, denom: 1 },
            Rational { num: minutes as u32, denom: 1 },
            Rational { num: (seconds * 1000.0).round() as u32, denom: 1000 },
        ]),
    }
}

/// Big-endian TIFF block with the fixture's date and GPS tags
fn tiff_block(fixture: &ExifFixture<'_>) -> Vec<u8> {
    // IFD0 must not be empty even when the fixture carries no tags
    let mut fields = vec![ascii_field(Tag::Software, b"media-sorter tests")];
    if let Some(datetime) = fixture.datetime {
        fields.push(ascii_field(Tag::DateTimeOriginal, datetime.as_bytes()));
    }
    if let Some((lat, lon)) = fixture.gps {
        fields.push(ascii_field(Tag::GPSLatitudeRef, if lat < 0.0 { b"S" } else { b"N" }));
        fields.push(dms_field(Tag::GPSLatitude, lat));
        fields.push(ascii_field(Tag::GPSLongitudeRef, if lon < 0.0 { b"W" } else { b"E" }));
        fields.push(dms_field(Tag::GPSLongitude, lon));
    }

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false).unwrap();
    buf.into_inner()
}

/// Minimal JPEG stream: SOI, APP1 with the EXIF block, EOI
pub fn jpeg_bytes(fixture: &ExifFixture<'_>) -> Vec<u8> {
    let tiff = tiff_block(fixture);
    let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

pub fn write_jpeg(path: &Path, fixture: &ExifFixture<'_>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, jpeg_bytes(fixture)).unwrap();
}

pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Pin a file's modification time to a UTC unix timestamp
pub fn set_mtime(path: &Path, unix_secs: i64) {
    filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(unix_secs, 0)).unwrap();
}
