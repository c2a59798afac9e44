//! Decompression filters (§6): `none`, `gzip`, `lz4`, `zstd`, `bzip2`.
//!
//! Grounded on `pbs-datastore::data_blob::DataBlob`'s zstd usage for the
//! `zstd` case; `gzip`/`lz4`/`bzip2` aren't exercised anywhere in the corpus
//! (PBS only ever writes zstd blobs), so those three lean on the `flate2`,
//! `lz4`, and `bzip2` crates directly, wired the same one-shot-buffer way.

use std::io::Read;

use anyhow::{Context, Error};
use pgr_api_types::CompressionKind;

pub trait Decompressor: Send {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, Error>;
}

struct NoneDecompressor;

impl Decompressor for NoneDecompressor {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        Ok(input.to_vec())
    }
}

struct GzipDecompressor;

impl Decompressor for GzipDecompressor {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        let mut decoder = flate2::read::GzDecoder::new(input);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .context("gzip decompression failed")?;
        Ok(out)
    }
}

struct Lz4Decompressor;

impl Decompressor for Lz4Decompressor {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        let mut decoder = lz4::Decoder::new(input).context("failed to open lz4 stream")?;
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .context("lz4 decompression failed")?;
        Ok(out)
    }
}

struct ZstdDecompressor;

impl Decompressor for ZstdDecompressor {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        zstd::stream::decode_all(input).context("zstd decompression failed")
    }
}

struct Bz2Decompressor;

impl Decompressor for Bz2Decompressor {
    fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        let mut decoder = bzip2::read::BzDecoder::new(input);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .context("bzip2 decompression failed")?;
        Ok(out)
    }
}

pub fn new_decompressor(kind: CompressionKind) -> Box<dyn Decompressor> {
    match kind {
        CompressionKind::None => Box::new(NoneDecompressor),
        CompressionKind::Gzip => Box::new(GzipDecompressor),
        CompressionKind::Lz4 => Box::new(Lz4Decompressor),
        CompressionKind::Zstd => Box::new(ZstdDecompressor),
        CompressionKind::Bz2 => Box::new(Bz2Decompressor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn none_is_passthrough() {
        let d = new_decompressor(CompressionKind::None);
        assert_eq!(d.decompress(b"plain").unwrap(), b"plain");
    }

    #[test]
    fn gzip_round_trips() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"hello gzip").unwrap();
        let compressed = enc.finish().unwrap();

        let d = new_decompressor(CompressionKind::Gzip);
        assert_eq!(d.decompress(&compressed).unwrap(), b"hello gzip");
    }

    #[test]
    fn zstd_round_trips() {
        let compressed = zstd::stream::encode_all(&b"hello zstd"[..], 0).unwrap();
        let d = new_decompressor(CompressionKind::Zstd);
        assert_eq!(d.decompress(&compressed).unwrap(), b"hello zstd");
    }

    #[test]
    fn lz4_round_trips() {
        let mut enc = lz4::EncoderBuilder::new().build(Vec::new()).unwrap();
        enc.write_all(b"hello lz4").unwrap();
        let (compressed, result) = enc.finish();
        result.unwrap();

        let d = new_decompressor(CompressionKind::Lz4);
        assert_eq!(d.decompress(&compressed).unwrap(), b"hello lz4");
    }

    #[test]
    fn bzip2_round_trips() {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        enc.write_all(b"hello bzip2").unwrap();
        let compressed = enc.finish().unwrap();

        let d = new_decompressor(CompressionKind::Bz2);
        assert_eq!(d.decompress(&compressed).unwrap(), b"hello bzip2");
    }
}
