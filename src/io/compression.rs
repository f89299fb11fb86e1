//! Transparent decompression of input files.
//!
//! Sequence inputs frequently arrive compressed. Rather than asking the
//! caller to say so, readers are wrapped automatically:
//!
//! 1. the file name extension is checked against each built-in codec;
//! 2. failing that, the first bytes of the stream are compared to each
//!    codec's magic signature;
//! 3. otherwise the stream is passed through unchanged.
//!
//! Built-in codecs are enabled by feature flags:
//! - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//!
//! Per-batch files written for the external tool are always plain text; only
//! the run input and test fixtures go through this module.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// A streaming compression format.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// Lowercase file extensions including the leading dot.
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a compressed stream.
    fn magic_bytes(&self) -> &[u8];

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>>;
}

static BUILTIN_CODECS: &[&dyn CompressionCodec] = &[
    #[cfg(feature = "compression-gzip")]
    &GzipCodec,
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
];

fn builtin_codecs() -> &'static [&'static dyn CompressionCodec] {
    BUILTIN_CODECS
}

fn detect_from_extension(path: &Path) -> Option<&'static dyn CompressionCodec> {
    let name = path.to_string_lossy().to_lowercase();
    builtin_codecs()
        .iter()
        .copied()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
}

fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<&'static dyn CompressionCodec> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    builtin_codecs()
        .iter()
        .copied()
        .find(|codec| buf.starts_with(codec.magic_bytes()))
}

/// Wrap `reader` with a decompressor if `path_hint` or the stream content
/// identifies a known codec.
///
/// # Errors
///
/// Returns an error if the codec fails to initialise on the stream.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read>> {
    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        log::debug!("decompressing {} as {}", path_hint.as_ref().display(), codec.name());
        return codec
            .wrap_reader(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buffered = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buffered) {
        log::debug!(
            "decompressing {} as {} (magic bytes)",
            path_hint.as_ref().display(),
            codec.name()
        );
        return codec
            .wrap_reader(Box::new(buffered))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    Ok(Box::new(buffered))
}

/// Wrap `writer` with a compressor chosen from the extension of `path_hint`.
///
/// # Errors
///
/// Returns an error if the codec fails to initialise.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Write>> {
    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        return codec
            .wrap_writer(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

/// Drop a recognised compression extension, so `reads.fasta.gz` becomes `reads.fasta`.
#[must_use]
pub fn strip_codec_extension(path: &Path) -> PathBuf {
    match detect_from_extension(path) {
        Some(_) => path.with_extension(""),
        None => path.to_path_buf(),
    }
}

// ============================================================================
// Built-in codecs
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0x1f, 0x8b]
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        // Multi-member streams are common for concatenated gzip FASTA.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> &[u8] {
        &[0x28, 0xb5, 0x2f, 0xfd]
    }

    fn wrap_reader(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}
