//! Minimal NRRD reader for the 3D scalar volumes produced by CT exporters.
//!
//! Supports attached and detached payloads, `raw` and `gzip` encodings, both
//! endiannesses and the integer/float scalar types. Geometry comes from
//! `space directions` and `space origin` (or `spacings` when those are
//! absent). Volumes in LPS space are converted to RAS.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::{Array3, ShapeBuilder};

use crate::error::{Error, Result};
use crate::volume::{PixelKind, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Result<ScalarType> {
        let ty = match name {
            "signed char" | "int8" | "int8_t" => ScalarType::I8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => ScalarType::U8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
                ScalarType::I16
            }
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
                ScalarType::U16
            }
            "int" | "signed int" | "int32" | "int32_t" => ScalarType::I32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => ScalarType::U32,
            "longlong" | "long long" | "long long int" | "signed long long"
            | "signed long long int" | "int64" | "int64_t" => ScalarType::I64,
            "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64"
            | "uint64_t" => ScalarType::U64,
            "float" => ScalarType::F32,
            "double" => ScalarType::F64,
            other => return Err(Error::Nrrd(format!("unsupported type '{other}'"))),
        };
        Ok(ty)
    }

    fn width(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => 8,
        }
    }

    fn decode(self, bytes: &[u8], big_endian: bool) -> f64 {
        macro_rules! read {
            ($t:ty) => {{
                let raw = bytes.try_into().unwrap_or([0; std::mem::size_of::<$t>()]);
                if big_endian {
                    <$t>::from_be_bytes(raw) as f64
                } else {
                    <$t>::from_le_bytes(raw) as f64
                }
            }};
        }
        match self {
            ScalarType::I8 => read!(i8),
            ScalarType::U8 => read!(u8),
            ScalarType::I16 => read!(i16),
            ScalarType::U16 => read!(u16),
            ScalarType::I32 => read!(i32),
            ScalarType::U32 => read!(u32),
            ScalarType::I64 => read!(i64),
            ScalarType::U64 => read!(u64),
            ScalarType::F32 => read!(f32),
            ScalarType::F64 => read!(f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Raw,
    Gzip,
}

#[derive(Debug)]
struct Header {
    fields: HashMap<String, String>,
}

impl Header {
    fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::Nrrd(format!("missing required field '{key}'")))
    }
}

/// Reads the header lines, leaving `reader` at the start of the payload.
fn read_header<R: BufRead>(reader: &mut R) -> Result<Header> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if !line.starts_with("NRRD") {
        return Err(Error::Nrrd("missing NRRD magic".to_string()));
    }
    let mut fields = HashMap::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        // key/value pairs (`key:=value`) are free-form metadata
        if trimmed.contains(":=") {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once(": ") {
            fields.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    Ok(Header { fields })
}

fn parse_numbers(text: &str) -> Result<Vec<f64>> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| Error::Nrrd(format!("invalid number '{t}'")))
        })
        .collect()
}

/// Parses `(x,y,z) (x,y,z) (x,y,z)`, one vector per axis.
fn parse_vectors(text: &str) -> Result<Vec<Vector3<f64>>> {
    text.split_whitespace()
        .filter(|t| *t != "none")
        .map(|t| {
            let v = parse_numbers(t)?;
            if v.len() != 3 {
                return Err(Error::Nrrd(format!("expected a 3-vector, got '{t}'")));
            }
            Ok(Vector3::new(v[0], v[1], v[2]))
        })
        .collect()
}

/// Whether `space` names a left-posterior-superior frame.
fn is_lps(space: &str) -> bool {
    matches!(
        space.to_ascii_lowercase().as_str(),
        "left-posterior-superior" | "lps" | "left-posterior-superior-time" | "lpst"
    )
}

fn geometry(header: &Header) -> Result<(Point3<f64>, Vector3<f64>, Matrix3<f64>)> {
    let mut origin = match header.get("space origin") {
        Some(text) => {
            let v = parse_numbers(text)?;
            if v.len() != 3 {
                return Err(Error::Nrrd(format!("invalid space origin '{text}'")));
            }
            Point3::new(v[0], v[1], v[2])
        }
        None => Point3::origin(),
    };
    let (spacing, mut direction) = match header.get("space directions") {
        Some(text) => {
            let vectors = parse_vectors(text)?;
            if vectors.len() != 3 {
                return Err(Error::Nrrd(format!("expected 3 space directions, got {}", vectors.len())));
            }
            let mut spacing = Vector3::zeros();
            let mut direction = Matrix3::identity();
            for (axis, v) in vectors.iter().enumerate() {
                spacing[axis] = v.norm();
                if spacing[axis] > 0.0 {
                    direction.set_column(axis, &(v / spacing[axis]));
                }
            }
            (spacing, direction)
        }
        None => {
            let spacing = match header.get("spacings") {
                Some(text) => {
                    let v = parse_numbers(text)?;
                    if v.len() != 3 {
                        return Err(Error::Nrrd(format!("invalid spacings '{text}'")));
                    }
                    Vector3::new(v[0], v[1], v[2])
                }
                None => Vector3::new(1.0, 1.0, 1.0),
            };
            (spacing, Matrix3::identity())
        }
    };
    if header.get("space").map(is_lps).unwrap_or(false) {
        origin.x = -origin.x;
        origin.y = -origin.y;
        for axis in 0..3 {
            direction[(0, axis)] = -direction[(0, axis)];
            direction[(1, axis)] = -direction[(1, axis)];
        }
    }
    Ok((origin, spacing, direction))
}

fn read_payload<R: Read>(reader: R, encoding: Encoding) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match encoding {
        Encoding::Raw => {
            let mut reader = reader;
            reader.read_to_end(&mut bytes)?;
        }
        Encoding::Gzip => {
            GzDecoder::new(reader).read_to_end(&mut bytes)?;
        }
    }
    Ok(bytes)
}

/// Offset of the first sample in a payload of `len` bytes holding `needed`
/// bytes of samples. `byte skip: -1` places the samples at the end of the
/// payload; otherwise they start `byte skip` bytes in (default 0) and any
/// trailing bytes are ignored.
fn payload_start(header: &Header, len: usize, needed: usize) -> Result<usize> {
    let skip = match header.get("byte skip").or_else(|| header.get("byteskip")) {
        Some(text) => text
            .parse::<i64>()
            .map_err(|_| Error::Nrrd(format!("invalid byte skip '{text}'")))?,
        None => 0,
    };
    let start = match skip {
        -1 => len.checked_sub(needed),
        n if n >= 0 => Some(n as usize),
        n => return Err(Error::Nrrd(format!("invalid byte skip {n}"))),
    };
    match start {
        Some(start) if start + needed <= len => Ok(start),
        _ => Err(Error::Nrrd(format!(
            "payload holds {len} bytes, expected {needed} after a skip of {skip}"
        ))),
    }
}

/// Reads a 3D scalar NRRD volume.
///
/// Samples come back as [`PixelKind::Float`] whatever the stored type, so
/// Hounsfield units survive; callers cast.
pub fn read_nrrd<P: AsRef<Path>>(path: P) -> Result<Volume> {
    let path = path.as_ref();
    let mut reader = BufReader::new(fs::File::open(path)?);
    let header = read_header(&mut reader)?;

    let dimension: usize = header
        .require("dimension")?
        .parse()
        .map_err(|_| Error::Nrrd("invalid dimension".to_string()))?;
    if dimension != 3 {
        return Err(Error::Nrrd(format!("expected 3 dimensions, found {dimension}")));
    }
    let sizes = parse_numbers(header.require("sizes")?)?;
    if sizes.len() != 3 || sizes.iter().any(|s| *s < 1.0) {
        return Err(Error::Nrrd(format!("invalid sizes {sizes:?}")));
    }
    let size = [sizes[0] as usize, sizes[1] as usize, sizes[2] as usize];
    let scalar = ScalarType::parse(header.require("type")?)?;
    let encoding = match header.require("encoding")? {
        "raw" => Encoding::Raw,
        "gzip" | "gz" => Encoding::Gzip,
        other => return Err(Error::Nrrd(format!("unsupported encoding '{other}'"))),
    };
    let big_endian = header.get("endian") == Some("big");

    let bytes = match header.get("data file").or_else(|| header.get("datafile")) {
        Some(name) => {
            let data_path = path.parent().unwrap_or_else(|| Path::new(".")).join(name);
            read_payload(fs::File::open(data_path)?, encoding)?
        }
        None => read_payload(reader, encoding)?,
    };

    let count = size[0] * size[1] * size[2];
    let width = scalar.width();
    let start = payload_start(&header, bytes.len(), count * width)?;
    let values: Vec<f64> = bytes[start..start + count * width]
        .chunks_exact(width)
        .map(|chunk| scalar.decode(chunk, big_endian))
        .collect();

    // NRRD stores the first axis fastest
    let samples = Array3::from_shape_vec((size[0], size[1], size[2]).f(), values)
        .map_err(|e| Error::Nrrd(e.to_string()))?;
    let (origin, spacing, direction) = geometry(&header)?;
    log::debug!(
        "NRRD {}: type {:?}, encoding {:?}, space {:?}",
        path.display(),
        scalar,
        encoding,
        header.get("space")
    );
    Volume::new(samples, origin, spacing, direction, PixelKind::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn nrrd_bytes(encoding: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "NRRD0004\n\
             # Complete NRRD file format specification at:\n\
             type: short\n\
             dimension: 3\n\
             space: left-posterior-superior\n\
             sizes: 2 3 4\n\
             space directions: (0.5,0,0) (0,0.5,0) (0,0,2)\n\
             kinds: domain domain domain\n\
             endian: little\n\
             encoding: {encoding}\n\
             space origin: (10,-20,30)\n\
             \n"
        )
        .into_bytes();
        out.extend_from_slice(payload);
        out
    }

    fn ramp() -> Vec<u8> {
        (0..24i16).flat_map(|v| (v - 1000).to_le_bytes()).collect()
    }

    #[test]
    fn raw_lps_volume_is_converted_to_ras() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ct.nrrd");
        fs::write(&path, nrrd_bytes("raw", &ramp())).unwrap();
        let volume = read_nrrd(&path).unwrap();
        assert_eq!(volume.size(), [2, 3, 4]);
        assert_eq!(volume.origin(), &Point3::new(-10.0, 20.0, 30.0));
        assert_eq!(volume.spacing(), &Vector3::new(0.5, 0.5, 2.0));
        assert_eq!(
            volume.direction(),
            &Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0))
        );
        // first axis fastest
        assert_eq!(volume.samples()[[0, 0, 0]], -1000.0);
        assert_eq!(volume.samples()[[1, 0, 0]], -999.0);
        assert_eq!(volume.samples()[[0, 1, 0]], -998.0);
        assert_eq!(volume.samples()[[0, 0, 1]], -994.0);
    }

    #[test]
    fn gzip_payload_matches_raw() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&ramp()).unwrap();
        let compressed = encoder.finish().unwrap();
        let raw_path = dir.path().join("raw.nrrd");
        let gz_path = dir.path().join("gz.nrrd");
        fs::write(&raw_path, nrrd_bytes("raw", &ramp())).unwrap();
        fs::write(&gz_path, nrrd_bytes("gzip", &compressed)).unwrap();
        assert_eq!(read_nrrd(&raw_path).unwrap(), read_nrrd(&gz_path).unwrap());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.nrrd");
        fs::write(&path, nrrd_bytes("raw", &ramp()[..10])).unwrap();
        assert!(matches!(read_nrrd(&path), Err(Error::Nrrd(_))));
    }

    fn nrrd_with(fields: &[&str], payload: &[u8]) -> Vec<u8> {
        let mut out = format!("NRRD0005\n{}\n\n", fields.join("\n")).into_bytes();
        out.extend_from_slice(payload);
        out
    }

    const UCHAR_2X2X1: [&str; 4] = ["type: uchar", "dimension: 3", "sizes: 2 2 1", "encoding: raw"];

    #[test]
    fn trailing_bytes_after_the_samples_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.nrrd");
        fs::write(&path, nrrd_with(&UCHAR_2X2X1, &[10, 20, 30, 40, b'\n'])).unwrap();
        let volume = read_nrrd(&path).unwrap();
        assert_eq!(volume.samples()[[0, 0, 0]], 10.0);
        assert_eq!(volume.samples()[[1, 0, 0]], 20.0);
        assert_eq!(volume.samples()[[0, 1, 0]], 30.0);
        assert_eq!(volume.samples()[[1, 1, 0]], 40.0);
    }

    #[test]
    fn byte_skip_moves_the_first_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skip.nrrd");
        let mut fields = UCHAR_2X2X1.to_vec();
        fields.push("byte skip: 3");
        fs::write(&path, nrrd_with(&fields, &[7, 7, 7, 10, 20, 30, 40, 0])).unwrap();
        assert_eq!(read_nrrd(&path).unwrap().samples()[[0, 0, 0]], 10.0);

        let mut fields = UCHAR_2X2X1.to_vec();
        fields.push("byte skip: -1");
        fs::write(&path, nrrd_with(&fields, &[7, 7, 10, 20, 30, 40])).unwrap();
        assert_eq!(read_nrrd(&path).unwrap().samples()[[0, 0, 0]], 10.0);

        let mut fields = UCHAR_2X2X1.to_vec();
        fields.push("byte skip: 4");
        fs::write(&path, nrrd_with(&fields, &[7, 7, 10, 20, 30, 40])).unwrap();
        assert!(matches!(read_nrrd(&path), Err(Error::Nrrd(_))));
    }

    #[test]
    fn detached_big_endian_payload() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("ct.nhdr");
        let fields = [
            "type: short",
            "dimension: 3",
            "sizes: 2 3 4",
            "endian: big",
            "encoding: raw",
            "data file: ct.raw",
        ];
        fs::write(&header, nrrd_with(&fields, b"")).unwrap();
        let payload: Vec<u8> = (0..24i16).flat_map(|v| (v - 1000).to_be_bytes()).collect();
        fs::write(dir.path().join("ct.raw"), payload).unwrap();
        let volume = read_nrrd(&header).unwrap();
        assert_eq!(volume.size(), [2, 3, 4]);
        assert_eq!(volume.samples()[[0, 0, 0]], -1000.0);
        assert_eq!(volume.samples()[[1, 2, 3]], -977.0);
    }

    #[test]
    fn spacings_stand_in_for_missing_directions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spacings.nrrd");
        let mut fields = UCHAR_2X2X1.to_vec();
        fields.push("spacings: 0.5 0.75 2");
        fs::write(&path, nrrd_with(&fields, &[1, 2, 3, 4])).unwrap();
        let volume = read_nrrd(&path).unwrap();
        assert_eq!(volume.spacing(), &Vector3::new(0.5, 0.75, 2.0));
        assert_eq!(volume.direction(), &Matrix3::identity());
        assert_eq!(volume.origin(), &Point3::origin());
    }

    #[test]
    fn ras_space_is_taken_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ras.nrrd");
        let mut fields = UCHAR_2X2X1.to_vec();
        fields.extend([
            "space: right-anterior-superior",
            "space directions: (0.5,0,0) (0,0.5,0) (0,0,2)",
            "space origin: (10,-20,30)",
        ]);
        fs::write(&path, nrrd_with(&fields, &[1, 2, 3, 4])).unwrap();
        let volume = read_nrrd(&path).unwrap();
        assert_eq!(volume.origin(), &Point3::new(10.0, -20.0, 30.0));
        assert_eq!(volume.direction(), &Matrix3::identity());
        assert_eq!(volume.spacing(), &Vector3::new(0.5, 0.5, 2.0));
    }

    #[test]
    fn not_an_nrrd_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.nrrd");
        fs::write(&path, b"P6\n1 1\n255\n").unwrap();
        assert!(matches!(read_nrrd(&path), Err(Error::Nrrd(_))));
    }
}
