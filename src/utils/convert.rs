use crate::StorageError;

/// Encode a change-feed sequence number as a big-endian sled key so that the
/// tree's byte order matches numeric order.
pub(crate) fn seq_to_key(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

/// Decode a big-endian sequence key back into a number.
pub(crate) fn key_to_seq(key: &[u8]) -> Result<u64, StorageError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| StorageError::DataCorruption {
            location: format!("sequence key of length {}", key.len()),
        })?;
    Ok(u64::from_be_bytes(bytes))
}
