//! Encoded polyline codec (precision 1e5), as returned by the directions API.

use thiserror::Error;

use crate::models::Coordinate;

const PRECISION: f64 = 1e5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolylineError {
    #[error("polyline truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("invalid polyline character {found:?} at byte {offset}")]
    InvalidCharacter { offset: usize, found: char },

    #[error("polyline value overflows at byte {offset}")]
    Overflow { offset: usize },
}

/// Decode an encoded polyline into coordinates.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;
    let mut path = Vec::with_capacity(bytes.len() / 4);

    while index < bytes.len() {
        lat += next_delta(bytes, &mut index)?;
        if index >= bytes.len() {
            return Err(PolylineError::Truncated { offset: index });
        }
        lon += next_delta(bytes, &mut index)?;
        path.push(Coordinate::new(lat as f64 / PRECISION, lon as f64 / PRECISION));
    }

    Ok(path)
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64, PolylineError> {
    let mut result: i64 = 0;
    let mut shift = 0u32;

    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(PolylineError::Truncated { offset: *index });
        };
        if !(63..=126).contains(&byte) {
            return Err(PolylineError::InvalidCharacter {
                offset: *index,
                found: byte as char,
            });
        }
        if shift > 60 {
            return Err(PolylineError::Overflow { offset: *index });
        }

        let chunk = (byte - 63) as i64;
        *index += 1;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }

    Ok(if result & 1 != 0 { !(result >> 1) } else { result >> 1 })
}

/// Encode coordinates into a polyline string.
pub fn encode(path: &[Coordinate]) -> String {
    let mut out = String::with_capacity(path.len() * 8);
    let mut prev_lat: i64 = 0;
    let mut prev_lon: i64 = 0;

    for coord in path {
        let lat = (coord.lat * PRECISION).round() as i64;
        let lon = (coord.lon * PRECISION).round() as i64;
        push_delta(&mut out, lat - prev_lat);
        push_delta(&mut out, lon - prev_lon);
        prev_lat = lat;
        prev_lon = lon;
    }

    out
}

fn push_delta(out: &mut String, delta: i64) {
    let mut value = if delta < 0 { !(delta << 1) } else { delta << 1 };
    while value >= 0x20 {
        out.push(((0x20 | (value & 0x1f)) + 63) as u8 as char);
        value >>= 5;
    }
    out.push((value + 63) as u8 as char);
}
