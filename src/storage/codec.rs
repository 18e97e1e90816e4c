//! Snapshot payload encoding.
//!
//! Delta payloads are a bincode encoded list of [`ChangeRecord`]s. Any payload may
//! additionally be gzip compressed; the artifact key records whether it is.

use std::io::Read;
use std::io::Write;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::ChangeRecord;
use crate::Result;
use crate::Snapshot;
use crate::StorageError;

pub fn encode_changes(changes: &[ChangeRecord]) -> Result<Vec<u8>> {
    Ok(bincode::serialize(changes)?)
}

pub fn decode_changes(data: &[u8]) -> Result<Vec<ChangeRecord>> {
    Ok(bincode::deserialize(data)?)
}

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(StorageError::IoError)?;
    Ok(encoder.finish().map_err(StorageError::IoError)?)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(StorageError::IoError)?;
    Ok(out)
}

/// Prepares a payload for storage under `snapshot`'s key.
pub fn seal_payload(
    snapshot: &Snapshot,
    data: Vec<u8>,
) -> Result<Vec<u8>> {
    if snapshot.compressed {
        compress(&data)
    } else {
        Ok(data)
    }
}

/// Reverses [`seal_payload`] for a fetched artifact.
pub fn open_payload(
    snapshot: &Snapshot,
    data: Vec<u8>,
) -> Result<Vec<u8>> {
    if snapshot.compressed {
        decompress(&data)
    } else {
        Ok(data)
    }
}
