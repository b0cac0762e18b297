use crate::error::IngestError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const READ_BUFFER_BYTES: usize = 1 << 20;

/// Lowercase hex SHA-256 of the whole file, streamed.
pub fn fingerprint(path: &Path) -> Result<String, IngestError> {
    let file = File::open(path).map_err(|err| IngestError::io(path, err))?;
    fingerprint_reader(BufReader::with_capacity(READ_BUFFER_BYTES, file))
        .map_err(|err| IngestError::io(path, err))
}

pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
