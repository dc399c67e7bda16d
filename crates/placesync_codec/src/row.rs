//! Local store row encoding.
//!
//! Rows are CBOR maps holding a format version and every field of the
//! place, including the photo bytes and the remote record name.

use crate::error::{CodecError, CodecResult};
use crate::place::Place;
use serde::{Deserialize, Serialize};

/// Current row format version.
pub const ROW_FORMAT_VERSION: u16 = 1;

#[derive(Serialize)]
struct RowRef<'a> {
    version: u16,
    place: &'a Place,
}

#[derive(Deserialize)]
struct Row {
    version: u16,
    place: Place,
}

/// Encodes a place into row bytes.
pub fn encode_row(place: &Place) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(
        &RowRef {
            version: ROW_FORMAT_VERSION,
            place,
        },
        &mut out,
    )
    .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(out)
}

/// Decodes a place from row bytes.
pub fn decode_row(bytes: &[u8]) -> CodecResult<Place> {
    let row: Row =
        ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    if row.version != ROW_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(row.version));
    }
    Ok(row.place)
}
