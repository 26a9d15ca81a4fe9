//! The decoded document

use super::layer::{Channel, LayerNode};
use super::raster::{ColorMode, Rgb};
use crate::header::{Compression, PointerWidth, Precision, Version};
use crate::parasite::Parasite;
use crate::paths::{Guide, LegacyPaths, SamplePoint, UserUnit, Vectors};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Pixels per inch, horizontal and vertical
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: f32,
    pub y: f32,
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution { x: 72.0, y: 72.0 }
    }
}

/// A layered image.
///
/// Produced once by the decoder and consumed once by the encoder; file offsets
/// never appear here, the layer tree owns its children directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub version: Version,
    pub precision: Precision,
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    /// Present exactly when `color_mode` is indexed
    pub palette: Option<Vec<Rgb>>,
    pub compression: Compression,
    pub resolution: Resolution,
    pub unit: u32,
    pub user_unit: Option<UserUnit>,
    /// Highest tattoo handed out in this image
    pub tattoo: u32,
    pub parasites: Vec<Parasite>,
    pub guides: Vec<Guide>,
    pub sample_points: Vec<SamplePoint>,
    pub paths: Option<LegacyPaths>,
    pub vectors: Option<Vectors>,
    /// Top of the stack first
    pub layers: Vec<LayerNode>,
    pub channels: Vec<Channel>,
}

impl Document {
    pub fn new(width: u32, height: u32, color_mode: ColorMode) -> Self {
        Document {
            version: Version::default(),
            precision: Precision::default(),
            width,
            height,
            color_mode,
            palette: None,
            compression: Compression::Rle,
            resolution: Resolution::default(),
            unit: 0,
            user_unit: None,
            tattoo: 0,
            parasites: Vec::new(),
            guides: Vec::new(),
            sample_points: Vec::new(),
            paths: None,
            vectors: None,
            layers: Vec::new(),
            channels: Vec::new(),
        }
    }

    pub fn with_palette(mut self, palette: Vec<Rgb>) -> Self {
        self.palette = Some(palette);
        self
    }

    pub fn with_layer(mut self, layer: LayerNode) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn pointer_width(&self) -> PointerWidth {
        self.version.pointer_width()
    }

    /// Total number of layers, groups included
    pub fn layer_count(&self) -> usize {
        self.layers.iter().map(LayerNode::count).sum()
    }

    /// Depth-first search by layer name
    pub fn find_layer(&self, name: &str) -> Option<&LayerNode> {
        self.layers.iter().find_map(|layer| layer.find(name))
    }

    pub fn parasite(&self, name: &str) -> Option<&Parasite> {
        self.parasites.iter().find(|p| p.name == name)
    }

    /// Metadata summary of the document and its layer tree (no pixel data)
    pub fn describe(&self) -> serde_json::Value {
        json!({
            "version": self.version,
            "width": self.width,
            "height": self.height,
            "color_mode": self.color_mode,
            "precision": self.precision,
            "compression": self.compression,
            "resolution": self.resolution,
            "palette_entries": self.palette.as_ref().map(Vec::len),
            "guides": self.guides,
            "parasites": self.parasites.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            "channels": self.channels.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "layers": self.layers.iter().map(LayerNode::outline).collect::<Vec<_>>(),
        })
    }
}
