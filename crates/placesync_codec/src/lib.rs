//! # placesync codec
//!
//! Data model and codecs shared by the placesync crates.
//!
//! This crate provides:
//! - [`Place`], the synchronized entity, with its [`PlaceId`] dedup key
//! - [`RemoteRecord`], the flat key/value form a remote record store keeps
//! - The record codec ([`to_remote`], [`from_remote`], [`overlay`])
//! - The local row codec ([`encode_row`], [`decode_row`])
//!
//! This is a pure data crate with no I/O beyond what an [`AssetResolver`]
//! chooses to do.
//!
//! ## Usage
//!
//! ```
//! use placesync_codec::{from_remote, to_remote, NoInlineAssets, Place, RecordName};
//!
//! let place = Place::new("Cafe Central", Some("Vienna".into()), Some("Cafe".into()), None, 4.5);
//! let mut record = to_remote(&place, None);
//! record.record_name = Some(RecordName::new("rec-1"));
//!
//! let decoded = from_remote(&record, &NoInlineAssets).unwrap();
//! assert_eq!(decoded.place_id, place.place_id);
//! assert_eq!(decoded.remote_record_name, Some(RecordName::new("rec-1")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod place;
mod record;
mod row;

pub use codec::{
    from_remote, overlay, placeholder_image, to_remote, AssetResolver, FileAssetResolver,
    NoInlineAssets,
};
pub use error::{CodecError, CodecResult};
pub use place::{Place, PlaceId, RecordName, MAX_RATING};
pub use record::{keys, AssetHandle, FieldValue, RemoteRecord, PLACE_RECORD_TYPE};
pub use row::{decode_row, encode_row, ROW_FORMAT_VERSION};
