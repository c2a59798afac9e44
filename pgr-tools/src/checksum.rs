//! Checksum helpers, in the style of `pbs-tools::sha`.

use std::io::Read;

use anyhow::Error;

/// Calculate the SHA-1 checksum (and byte count) of a readable object.
///
/// SHA-1 is what the manifest's `checksum_sha1` field records; this is not a
/// security boundary (the manifest is trusted, loaded from the local
/// repository) so SHA-1's known weaknesses are not a concern here.
pub fn sha1(reader: &mut dyn Read) -> Result<([u8; 20], u64), Error> {
    let mut hasher = openssl::sha::Sha1::new();
    let mut buffer = vec![0u8; 256 * 1024];
    let mut size: u64 = 0;

    loop {
        let count = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(count) => count,
            Err(ref err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        size += count as u64;
        hasher.update(&buffer[..count]);
    }

    Ok((hasher.finish(), size))
}

/// Fixed-size block fingerprint used by the delta-map filter (§4.B).
///
/// The manifest's block-hash list uses the same 20-byte SHA-1 digest per
/// block so that a locally computed fingerprint can be compared directly
/// against `BlockRef::checksum`.
pub fn sha1_block(data: &[u8]) -> [u8; 20] {
    let mut hasher = openssl::sha::Sha1::new();
    hasher.update(data);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_matches_known_vector() {
        let (digest, size) = sha1(&mut "abc".as_bytes()).unwrap();
        assert_eq!(size, 3);
        assert_eq!(hex::encode(digest), "a9993e364706816aba3e25717850c26c9cd0d89");
    }

    #[test]
    fn sha1_block_matches_streaming() {
        let data = b"hello world, this is a test block";
        let (whole, _) = sha1(&mut &data[..]).unwrap();
        assert_eq!(sha1_block(data), whole);
    }
}
