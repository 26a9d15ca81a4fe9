//! Decode and encode options
//!
//! Both option sets deserialize from TOML:
//!
//! ```toml
//! [decode]
//! parallel_tiles = true
//! worker_threads = 4
//!
//! [encode]
//! version = 11
//! compression = "rle"
//! ```

use crate::error::{Result, XcfError};
use crate::header::{Compression, Version};
use serde::{Deserialize, Serialize};

/// Tile counts at or below this are always decoded on the calling thread
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Decompress tiles on worker threads once all tile pointers are known
    pub parallel_tiles: bool,

    /// Worker count; 0 means one per available CPU
    pub worker_threads: usize,

    /// Minimum tiles in one hierarchy before workers are used
    pub parallel_threshold: usize,

    /// Parse `gimp-text-layer` parasites into text metadata.
    /// When off, the parasite stays in the layer's parasite list untouched.
    pub decode_text: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            parallel_tiles: true,
            worker_threads: 0,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            decode_text: true,
        }
    }
}

impl DecodeOptions {
    /// Everything on the calling thread
    pub fn sequential() -> Self {
        DecodeOptions {
            parallel_tiles: false,
            ..Default::default()
        }
    }

    pub(crate) fn tile_workers(&self, tiles: usize) -> usize {
        worker_count(
            self.parallel_tiles,
            self.worker_threads,
            self.parallel_threshold,
            tiles,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Format version to write; `None` keeps the document's own version
    pub version: Option<Version>,

    /// Tile compression; `None` keeps the document's own mode
    pub compression: Option<Compression>,

    pub parallel_tiles: bool,

    /// Worker count; 0 means one per available CPU
    pub worker_threads: usize,

    pub parallel_threshold: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            version: None,
            compression: None,
            parallel_tiles: true,
            worker_threads: 0,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl EncodeOptions {
    /// RLE tiles regardless of the document's setting
    pub fn rle() -> Self {
        EncodeOptions {
            compression: Some(Compression::Rle),
            ..Default::default()
        }
    }

    /// Raw tiles regardless of the document's setting
    pub fn uncompressed() -> Self {
        EncodeOptions {
            compression: Some(Compression::None),
            ..Default::default()
        }
    }

    /// Newest version, which stores 64-bit pointers
    pub fn wide_pointers() -> Self {
        EncodeOptions {
            version: Some(Version::LATEST),
            ..Default::default()
        }
    }

    pub(crate) fn tile_workers(&self, tiles: usize) -> usize {
        worker_count(
            self.parallel_tiles,
            self.worker_threads,
            self.parallel_threshold,
            tiles,
        )
    }
}

fn worker_count(parallel: bool, configured: usize, threshold: usize, tiles: usize) -> usize {
    if !parallel || tiles <= threshold.max(1) {
        return 1;
    }
    let base = if configured == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        configured
    };
    base.max(1).min(tiles)
}

/// Options file contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XcfConfig {
    pub decode: DecodeOptions,
    pub encode: EncodeOptions,
}

impl XcfConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: XcfConfig =
            toml::from_str(source).map_err(|e| XcfError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| XcfError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.decode.parallel_tiles && self.decode.parallel_threshold == 0 {
            return Err(XcfError::InvalidConfig(
                "decode.parallel_threshold must be at least 1".to_string(),
            ));
        }
        if self.encode.parallel_tiles && self.encode.parallel_threshold == 0 {
            return Err(XcfError::InvalidConfig(
                "encode.parallel_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DecodeOptions::default();
        assert!(options.parallel_tiles);
        assert!(options.decode_text);
        assert_eq!(options.tile_workers(1), 1);
        assert_eq!(DecodeOptions::sequential().tile_workers(10_000), 1);
    }

    #[test]
    fn test_worker_count_is_capped_by_tiles() {
        let options = DecodeOptions {
            worker_threads: 8,
            parallel_threshold: 2,
            ..Default::default()
        };
        assert_eq!(options.tile_workers(2), 1);
        assert_eq!(options.tile_workers(3), 3);
        assert_eq!(options.tile_workers(100), 8);
    }

    #[test]
    fn test_named_constructors() {
        assert_eq!(EncodeOptions::rle().compression, Some(Compression::Rle));
        assert_eq!(EncodeOptions::uncompressed().compression, Some(Compression::None));
        assert_eq!(EncodeOptions::wide_pointers().version, Some(Version::LATEST));
        assert_eq!(EncodeOptions::default().version, None);
    }

    #[test]
    fn test_from_toml() {
        let config = XcfConfig::from_toml_str(
            r#"
            [decode]
            parallel_tiles = false
            decode_text = false

            [encode]
            version = 11
            compression = "none"
            worker_threads = 2
            "#,
        )
        .unwrap();
        assert!(!config.decode.parallel_tiles);
        assert!(!config.decode.decode_text);
        assert_eq!(config.decode.parallel_threshold, DEFAULT_PARALLEL_THRESHOLD);
        assert_eq!(config.encode.version, Some(Version::V11));
        assert_eq!(config.encode.compression, Some(Compression::None));
        assert_eq!(config.encode.worker_threads, 2);

        let text = config.to_toml_string().unwrap();
        assert_eq!(XcfConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_rejected_toml() {
        assert!(matches!(
            XcfConfig::from_toml_str("[encode]\nversion = 12"),
            Err(XcfError::InvalidConfig(_))
        ));
        assert!(matches!(
            XcfConfig::from_toml_str("[decode]\nparallel_threshold = 0"),
            Err(XcfError::InvalidConfig(_))
        ));
        assert!(matches!(
            XcfConfig::from_toml_str("[encode]\ncompression = \"zip\""),
            Err(XcfError::InvalidConfig(_))
        ));
    }
}
