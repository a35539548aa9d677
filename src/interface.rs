//! (De)serialization of escrow terms and engine state.
//!
//! Terms documents travel between the parties preparing an escrow as JSON;
//! engine state snapshots persist as compact bincode.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Reads a JSON file into any deserializable type, typically a
/// [`FungibleTerms`](crate::FungibleTerms) or
/// [`NonFungibleTerms`](crate::NonFungibleTerms) document.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be read or parsed.
pub fn load_json<P, T>(path: P) -> anyhow::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).with_context(|| format!("loading terms: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parsing JSON from {:?}", path))
}

/// Writes `data` as pretty-printed JSON to `path`.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be created or the data
/// cannot be serialized.
pub fn save_json<P, T>(path: P, data: &T) -> anyhow::Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("creating file {:?}", path))?;
    serde_json::to_writer_pretty(file, data)
        .with_context(|| format!("serializing JSON to {:?}", path))
}

/// Encodes an engine state snapshot (or any encodable value) with the
/// standard bincode configuration.
pub fn encode_state<T: bincode::Encode>(value: &T) -> anyhow::Result<Vec<u8>> {
    bincode::encode_to_vec(value, bincode::config::standard()).context("encoding state")
}

/// Decodes a snapshot produced by [`encode_state`]. Trailing bytes are
/// rejected.
pub fn decode_state<T: bincode::Decode<()>>(bytes: &[u8]) -> anyhow::Result<T> {
    let (value, read) =
        bincode::decode_from_slice(bytes, bincode::config::standard()).context("decoding state")?;
    anyhow::ensure!(read == bytes.len(), "trailing bytes after state");
    Ok(value)
}
