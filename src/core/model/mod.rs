//! Plain value types produced by the decoder and consumed by the encoder

pub mod document;
pub mod layer;
pub mod raster;

pub use document::{Document, Resolution};
pub use layer::{
    BlendMode, Channel, ColorTag, GroupLayer, ImageLayer, LayerImage, LayerNode, LayerProps, Mask,
};
pub use raster::{ColorMode, PixelLayout, Raster, Rgb};
