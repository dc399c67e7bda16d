//! Mapping between [`Place`] and [`RemoteRecord`].

use crate::error::{CodecError, CodecResult};
use crate::place::{Place, PlaceId};
use crate::record::{keys, AssetHandle, FieldValue, RemoteRecord, PLACE_RECORD_TYPE};
use chrono::Utc;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::OnceLock;

/// Edge length of the generated placeholder image.
const PLACEHOLDER_SIZE: u32 = 8;

/// Resolves an asset handle to bytes that are already available locally.
///
/// Implementations must not block on a network download; returning `None`
/// makes the codec fall back to the placeholder image.
pub trait AssetResolver {
    /// Returns the bytes behind `handle` if they can be read without a transfer.
    fn resolve(&self, handle: &AssetHandle) -> Option<Vec<u8>>;
}

/// Resolver that never has asset bytes at hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInlineAssets;

impl AssetResolver for NoInlineAssets {
    fn resolve(&self, _handle: &AssetHandle) -> Option<Vec<u8>> {
        None
    }
}

/// Resolver that reads handles pointing at local files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileAssetResolver;

impl AssetResolver for FileAssetResolver {
    fn resolve(&self, handle: &AssetHandle) -> Option<Vec<u8>> {
        match std::fs::read(handle.to_path()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(asset = %handle, error = %e, "asset not readable locally");
                None
            }
        }
    }
}

/// Returns the PNG shown until a place's real photo has been fetched.
pub fn placeholder_image() -> Vec<u8> {
    static PLACEHOLDER: OnceLock<Vec<u8>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| {
            let img = RgbaImage::from_pixel(
                PLACEHOLDER_SIZE,
                PLACEHOLDER_SIZE,
                Rgba([0xC8, 0xC8, 0xC8, 0xFF]),
            );
            let mut out = Cursor::new(Vec::new());
            match DynamicImage::ImageRgba8(img).write_to(&mut out, ImageOutputFormat::Png) {
                Ok(()) => out.into_inner(),
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode placeholder image");
                    Vec::new()
                }
            }
        })
        .clone()
}

/// Builds the remote record for a place.
///
/// The record name is carried over when the place has already been saved.
/// `image` is the staged photo, if any; photo bytes are never inlined.
pub fn to_remote(place: &Place, image: Option<AssetHandle>) -> RemoteRecord {
    let mut record = RemoteRecord::new(PLACE_RECORD_TYPE);
    record.record_name = place.remote_record_name.clone();
    record.set(keys::PLACE_ID, FieldValue::Text(place.place_id.to_string()));
    record.set(
        keys::CREATED_AT,
        FieldValue::Timestamp(place.created_at),
    );
    overlay(&mut record, place, image);
    record
}

/// Writes the user-editable fields of `place` onto an existing record.
///
/// Absent optional fields are removed from the record. The photo is only
/// replaced when `image` is given.
pub fn overlay(record: &mut RemoteRecord, place: &Place, image: Option<AssetHandle>) {
    record.set(keys::NAME, FieldValue::Text(place.name.clone()));
    record.set_optional_text(keys::LOCATION, place.location.as_deref());
    record.set_optional_text(keys::TYPE, place.place_type.as_deref());
    record.set(keys::RATING, FieldValue::Double(place.rating));
    if let Some(handle) = image {
        record.set(keys::IMAGE_DATA, FieldValue::Asset(handle));
    }
}

/// Decodes a place from a remote record.
///
/// # Errors
///
/// Returns [`CodecError::MalformedRecord`] when `placeID`, `name` or `rating`
/// is missing or has the wrong type.
pub fn from_remote(record: &RemoteRecord, assets: &dyn AssetResolver) -> CodecResult<Place> {
    let place_id: PlaceId = record
        .text(keys::PLACE_ID)
        .ok_or_else(|| missing(record, keys::PLACE_ID))?
        .parse()
        .map_err(|_| CodecError::malformed(record.display_name(), keys::PLACE_ID, "is not a UUID"))?;

    let name = record
        .text(keys::NAME)
        .ok_or_else(|| missing(record, keys::NAME))?
        .to_string();

    let rating = record
        .double(keys::RATING)
        .ok_or_else(|| missing(record, keys::RATING))?;

    let image_data = record
        .asset(keys::IMAGE_DATA)
        .and_then(|handle| assets.resolve(handle))
        .unwrap_or_else(placeholder_image);

    let mut place = Place::new(
        name,
        record.text(keys::LOCATION).map(str::to_owned),
        record.text(keys::TYPE).map(str::to_owned),
        Some(image_data),
        rating,
    )
    .with_id(place_id);
    place.remote_record_name = record.record_name.clone();
    place.created_at = record.timestamp(keys::CREATED_AT).unwrap_or_else(Utc::now);

    Ok(place)
}

fn missing(record: &RemoteRecord, field: &'static str) -> CodecError {
    let reason = if record.get(field).is_some() {
        "has the wrong type"
    } else {
        "is missing"
    };
    CodecError::malformed(record.display_name(), field, reason)
}
