//! Transparent decompression of input streams.
//!
//! Objects handed to the engine may be compressed. Detection follows two steps:
//!
//! 1. the object key's extension (`.gz`, `.zst`, `.bz2`, `.xz`), checked first
//!    because it costs nothing;
//! 2. otherwise the magic bytes at the start of the stream, peeked through a
//!    [`BufReader`] without consuming them.
//!
//! If neither matches, the stream is passed through unchanged. Each codec is
//! behind its own cargo feature (`compression-gzip`, `compression-zstd`,
//! `compression-bzip2`, `compression-xz`); all are enabled by default.
//!
//! ```
//! use ironsieve::io::compression::open_input;
//! use std::io::BufRead;
//! # fn main() -> std::io::Result<()> {
//! let mut lines = open_input(&b"no,name,created_date\n"[..], "plain.csv")?.lines();
//! assert_eq!(lines.next().transpose()?.as_deref(), Some("no,name,created_date"));
//! # Ok(())
//! # }
//! ```

use std::io::{self, BufRead, BufReader, Read};

/// A decompression codec the input path can recognise.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g. `"gzip"`).
    fn name(&self) -> &'static str;

    /// Lowercase extensions including the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Signature at the start of a stream, if the format has one.
    fn magic_bytes(&self) -> Option<&'static [u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>>;
}

/// Codecs compiled into this build.
#[must_use]
pub fn builtin_codecs() -> Vec<&'static dyn CompressionCodec> {
    vec![
        #[cfg(feature = "compression-gzip")]
        &GzipCodec,
        #[cfg(feature = "compression-zstd")]
        &ZstdCodec,
        #[cfg(feature = "compression-bzip2")]
        &Bzip2Codec,
        #[cfg(feature = "compression-xz")]
        &XzCodec,
    ]
}

/// Codec whose extension matches `name_hint`, case-insensitively.
#[must_use]
pub fn detect_from_name(name_hint: &str) -> Option<&'static dyn CompressionCodec> {
    let lower = name_hint.to_lowercase();
    builtin_codecs()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| lower.ends_with(ext)))
}

/// Codec whose magic bytes prefix `head`.
#[must_use]
pub fn detect_from_magic(head: &[u8]) -> Option<&'static dyn CompressionCodec> {
    builtin_codecs().into_iter().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| !head.is_empty() && head.starts_with(magic))
    })
}

/// Wrap `reader` in a buffered, decompressing reader if it looks compressed.
///
/// # Errors
/// Fails if peeking at the stream or initialising a decoder fails.
pub fn open_input<R: Read + 'static>(reader: R, name_hint: &str) -> io::Result<Box<dyn BufRead>> {
    if let Some(codec) = detect_from_name(name_hint) {
        tracing::debug!(codec = codec.name(), source = name_hint, "decompressing by extension");
        let inner = codec.wrap_reader(Box::new(reader))?;
        return Ok(Box::new(BufReader::new(inner)));
    }

    let mut buffered = BufReader::new(reader);
    let codec = detect_from_magic(buffered.fill_buf()?);
    match codec {
        Some(codec) => {
            tracing::debug!(codec = codec.name(), source = name_hint, "decompressing by magic bytes");
            let inner = codec.wrap_reader(Box::new(buffered))?;
            Ok(Box::new(BufReader::new(inner)))
        }
        None => Ok(Box::new(buffered)),
    }
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        // Multi-member files are common for concatenated exports.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(b"BZh")
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &'static str {
        "xz"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }
}
