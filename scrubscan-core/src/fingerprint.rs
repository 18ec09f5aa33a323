// scrubscan-core/src/fingerprint.rs
use std::io::{self, Read};

use sha2::{Digest, Sha256};

/// Content-derived identity token for backends that have no native ETag.
/// Changes if and only if the content changes.
pub fn content_fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Same token as [`content_fingerprint`], hashed from a reader without
/// buffering the whole content.
pub fn reader_fingerprint<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}
