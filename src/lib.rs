//! # xcf-rs - GIMP XCF layered images
//!
//! `xcf-rs` reads and writes the native layered image format of GIMP:
//!
//! - **Versions 0 through 11**, including 64-bit pointers from version 11
//! - **Layer trees** with groups, masks and text layers
//! - **Uncompressed and RLE tiles**, decoded and encoded on worker threads
//! - **Document metadata**: guides, sample points, parasites, legacy paths and vectors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use xcf_rs::{ColorMode, Document, LayerNode, PixelLayout, Raster, Result};
//!
//! # fn main() -> Result<()> {
//! let background = Raster::filled(64, 64, PixelLayout::Rgb, &[255, 255, 255])?;
//! let doc = Document::new(64, 64, ColorMode::Rgb)
//!     .with_layer(LayerNode::image("Background", background));
//!
//! xcf_rs::save("white.xcf", &doc, Default::default())?;
//!
//! let loaded = xcf_rs::open("white.xcf")?;
//! assert_eq!(loaded.layers.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Encoder Options
//!
//! ```rust,no_run
//! use xcf_rs::{Compression, EncoderBuilder, Result, Version};
//!
//! # fn main() -> Result<()> {
//! # let doc = xcf_rs::Document::new(1, 1, xcf_rs::ColorMode::Rgb);
//! let bytes = EncoderBuilder::new()
//!     .version(Version::V11)
//!     .compression(Compression::None)
//!     .workers(4)
//!     .encode(&doc)?;
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use core::{
    channel, config, decoder, encoder, error, header, io, layer, model, parasite, paths, property,
    rle, text, tile, tree,
};

pub use crate::core::{
    config::{DecodeOptions, EncodeOptions, XcfConfig, DEFAULT_PARALLEL_THRESHOLD},
    decoder::Decoder,
    encoder::Encoder,
    error::{Result, XcfError},
    header::{Compression, PointerWidth, Precision, Version, MAX_IMAGE_SIZE},
    model::{
        BlendMode, Channel, ColorMode, ColorTag, Document, GroupLayer, ImageLayer, LayerImage,
        LayerNode, LayerProps, Mask, PixelLayout, Raster, Resolution, Rgb,
    },
    parasite::{Parasite, Tag, Value},
    paths::{Guide, GuideOrientation, LegacyPaths, SamplePoint, UserUnit, Vectors},
    text::{TextLayer, TextRun, TextStyle},
    tile::TILE_SIZE,
};

use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, info};

/// Decode a document from any seekable source with default options
pub fn decode<R: Read + Seek>(source: R) -> Result<Document> {
    decode_with(source, DecodeOptions::default())
}

pub fn decode_with<R: Read + Seek>(source: R, options: DecodeOptions) -> Result<Document> {
    Decoder::with_options(source, options)?.decode()
}

/// Decode a document held in memory
pub fn decode_bytes(bytes: &[u8]) -> Result<Document> {
    decode(Cursor::new(bytes))
}

/// Map `path` into memory and decode it
pub fn open<P: AsRef<Path>>(path: P) -> Result<Document> {
    open_with(path, DecodeOptions::default())
}

pub fn open_with<P: AsRef<Path>>(path: P, options: DecodeOptions) -> Result<Document> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(XcfError::MalformedHeader(format!(
            "{} is empty",
            path.display()
        )));
    }

    // SAFETY: the map is read-only and dropped before this function returns.
    // Truncating the file while it is mapped is outside what we support.
    let mmap = unsafe { Mmap::map(&file)? };
    debug!("Mapped {} ({} bytes)", path.display(), mmap.len());
    decode_with(Cursor::new(&mmap[..]), options)
}

/// Encode into a seekable sink and hand it back
pub fn encode<W: Write + Seek>(sink: W, doc: &Document) -> Result<W> {
    encode_with(sink, doc, EncodeOptions::default())
}

pub fn encode_with<W: Write + Seek>(sink: W, doc: &Document, options: EncodeOptions) -> Result<W> {
    Encoder::with_options(sink, options).encode(doc)
}

/// Encode into a fresh byte buffer
pub fn encode_to_vec(doc: &Document, options: EncodeOptions) -> Result<Vec<u8>> {
    Ok(encode_with(Cursor::new(Vec::new()), doc, options)?.into_inner())
}

/// Encode `doc` to a file at `path`, replacing any existing file
pub fn save<P: AsRef<Path>>(path: P, doc: &Document, options: EncodeOptions) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let writer = encode_with(BufWriter::new(file), doc, options)?;
    writer
        .into_inner()
        .map_err(|e| XcfError::Io(e.into_error()))?
        .sync_all()?;
    info!("Saved {}", path.display());
    Ok(())
}

/// Builder over [`EncodeOptions`]
///
/// # Examples
///
/// ```rust,no_run
/// use xcf_rs::EncoderBuilder;
///
/// # let doc = xcf_rs::Document::new(1, 1, xcf_rs::ColorMode::Rgb);
/// EncoderBuilder::new()
///     .sequential()
///     .save("out.xcf", &doc)?;
/// # Ok::<(), xcf_rs::XcfError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct EncoderBuilder {
    options: EncodeOptions,
}

impl EncoderBuilder {
    pub fn new() -> Self {
        EncoderBuilder::default()
    }

    /// Start from options loaded elsewhere, e.g. [`XcfConfig`]
    pub fn from_options(options: EncodeOptions) -> Self {
        EncoderBuilder { options }
    }

    /// Format version to write instead of the document's own
    pub fn version(mut self, version: Version) -> Self {
        self.options.version = Some(version);
        self
    }

    /// Tile compression to use instead of the document's own
    pub fn compression(mut self, compression: Compression) -> Self {
        self.options.compression = Some(compression);
        self
    }

    /// Worker threads for tile encoding; 0 means one per CPU
    pub fn workers(mut self, count: usize) -> Self {
        self.options.parallel_tiles = true;
        self.options.worker_threads = count;
        self
    }

    pub fn parallel_threshold(mut self, tiles: usize) -> Self {
        self.options.parallel_threshold = tiles;
        self
    }

    /// Encode every tile on the calling thread
    pub fn sequential(mut self) -> Self {
        self.options.parallel_tiles = false;
        self
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    pub fn build<W: Write + Seek>(self, sink: W) -> Encoder<W> {
        Encoder::with_options(sink, self.options)
    }

    pub fn encode(self, doc: &Document) -> Result<Vec<u8>> {
        encode_to_vec(doc, self.options)
    }

    pub fn save<P: AsRef<Path>>(self, path: P, doc: &Document) -> Result<()> {
        save(path, doc, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let pixels = (0..20 * 10 * 3).map(|i| (i % 251) as u8).collect();
        let raster = Raster::from_pixels(20, 10, PixelLayout::Rgb, pixels).unwrap();
        Document::new(20, 10, ColorMode::Rgb).with_layer(LayerNode::image("Background", raster))
    }

    #[test]
    fn test_save_and_open() -> Result<()> {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("sample.xcf");

        let doc = sample();
        save(&path, &doc, EncodeOptions::default())?;
        let loaded = open(&path)?;
        assert_eq!(loaded, doc);

        Ok(())
    }

    #[test]
    fn test_open_empty_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.xcf");
        File::create(&path).unwrap();

        assert!(matches!(open(&path), Err(XcfError::MalformedHeader(_))));
    }

    #[test]
    fn test_open_missing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            open(temp_dir.path().join("missing.xcf")),
            Err(XcfError::Io(_))
        ));
    }

    #[test]
    fn test_builder() -> Result<()> {
        let builder = EncoderBuilder::new()
            .version(Version::V11)
            .compression(Compression::None)
            .workers(2)
            .parallel_threshold(1);
        assert_eq!(builder.options().version, Some(Version::V11));
        assert_eq!(builder.options().worker_threads, 2);

        let bytes = builder.encode(&sample())?;
        assert_eq!(&bytes[..14], b"gimp xcf v011\0");

        let loaded = decode_bytes(&bytes)?;
        assert_eq!(loaded.version, Version::V11);
        assert_eq!(loaded.compression, Compression::None);
        assert_eq!(loaded.layers, sample().layers);

        Ok(())
    }

    #[test]
    fn test_builder_from_config() -> Result<()> {
        let config = XcfConfig::from_toml_str("[encode]\nversion = 1\nparallel_tiles = false")?;
        let bytes = EncoderBuilder::from_options(config.encode).encode(&sample())?;
        assert_eq!(&bytes[..14], b"gimp xcf v001\0");
        Ok(())
    }
}
