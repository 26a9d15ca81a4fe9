//! Pixel storage for decoded layers and channels

use crate::error::{Result, XcfError};
use serde::{Deserialize, Serialize};

/// Document color mode (the image "base type")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum ColorMode {
    Rgb = 0,
    Grayscale = 1,
    Indexed = 2,
}

impl ColorMode {
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(ColorMode::Rgb),
            1 => Ok(ColorMode::Grayscale),
            2 => Ok(ColorMode::Indexed),
            _ => Err(XcfError::InvalidBaseType(value)),
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

/// 8-bit RGB triple (palette entries, channel colors, text colors)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Parse `#rrggbb` (an `#rrggbbaa` alpha suffix is accepted and dropped)
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if (digits.len() != 6 && digits.len() != 8) || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Per-pixel layout of a stored raster.
///
/// The discriminant is the wire "layer type": `mode << 1 | has_alpha`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum PixelLayout {
    Rgb = 0,
    Rgba = 1,
    Gray = 2,
    GrayAlpha = 3,
    Indexed = 4,
    IndexedAlpha = 5,
}

impl PixelLayout {
    pub fn from_type_code(value: u32) -> Result<Self> {
        match value {
            0 => Ok(PixelLayout::Rgb),
            1 => Ok(PixelLayout::Rgba),
            2 => Ok(PixelLayout::Gray),
            3 => Ok(PixelLayout::GrayAlpha),
            4 => Ok(PixelLayout::Indexed),
            5 => Ok(PixelLayout::IndexedAlpha),
            _ => Err(XcfError::InvalidBaseType(value)),
        }
    }

    pub fn for_mode(mode: ColorMode, alpha: bool) -> Self {
        match (mode, alpha) {
            (ColorMode::Rgb, false) => PixelLayout::Rgb,
            (ColorMode::Rgb, true) => PixelLayout::Rgba,
            (ColorMode::Grayscale, false) => PixelLayout::Gray,
            (ColorMode::Grayscale, true) => PixelLayout::GrayAlpha,
            (ColorMode::Indexed, false) => PixelLayout::Indexed,
            (ColorMode::Indexed, true) => PixelLayout::IndexedAlpha,
        }
    }

    pub fn type_code(self) -> u32 {
        self as u32
    }

    /// Bytes per pixel (one byte per channel)
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Rgb => 3,
            PixelLayout::Rgba => 4,
            PixelLayout::Gray | PixelLayout::Indexed => 1,
            PixelLayout::GrayAlpha | PixelLayout::IndexedAlpha => 2,
        }
    }

    pub fn has_alpha(self) -> bool {
        self.type_code() & 1 == 1
    }

    pub fn color_mode(self) -> ColorMode {
        match self {
            PixelLayout::Rgb | PixelLayout::Rgba => ColorMode::Rgb,
            PixelLayout::Gray | PixelLayout::GrayAlpha => ColorMode::Grayscale,
            PixelLayout::Indexed | PixelLayout::IndexedAlpha => ColorMode::Indexed,
        }
    }
}

/// A decoded image plane set, stored pixel-major (all channels of a pixel are adjacent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    layout: PixelLayout,
    data: Vec<u8>,
}

impl Raster {
    /// Create a zero-filled raster
    pub fn new(width: u32, height: u32, layout: PixelLayout) -> Self {
        let len = width as usize * height as usize * layout.channels();
        Raster {
            width,
            height,
            layout,
            data: vec![0; len],
        }
    }

    /// Wrap existing pixel-major bytes, checking the length against the layout
    pub fn from_pixels(width: u32, height: u32, layout: PixelLayout, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(XcfError::InconsistentData(format!(
                "{}x{} {:?} raster needs {} bytes, got {}",
                width,
                height,
                layout,
                expected,
                data.len()
            )));
        }
        Ok(Raster {
            width,
            height,
            layout,
            data,
        })
    }

    /// Fill every pixel with the same channel values
    pub fn filled(width: u32, height: u32, layout: PixelLayout, pixel: &[u8]) -> Result<Self> {
        if pixel.len() != layout.channels() {
            return Err(XcfError::InconsistentData(format!(
                "{:?} pixels have {} channels, got {}",
                layout,
                layout.channels(),
                pixel.len()
            )));
        }
        let data = pixel.repeat(width as usize * height as usize);
        Raster::from_pixels(width, height, layout, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Bytes of one row
    pub fn stride(&self) -> usize {
        self.width as usize * self.layout.channels()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.layout.channels();
        let start = y as usize * self.stride() + x as usize * bpp;
        Some(&self.data[start..start + bpp])
    }

    /// Expand to straight (non-premultiplied) RGBA8.
    ///
    /// Indexed layouts resolve through `palette`; a missing palette or an index
    /// past its end is reported as `InconsistentData`.
    pub fn to_rgba8(&self, palette: Option<&[Rgb]>) -> Result<Vec<u8>> {
        let pixels = self.width as usize * self.height as usize;
        let mut out = Vec::with_capacity(pixels * 4);
        let bpp = self.layout.channels();

        let lookup = |index: u8| -> Result<Rgb> {
            let palette = palette.ok_or_else(|| {
                XcfError::InconsistentData("indexed raster without a palette".to_string())
            })?;
            palette.get(index as usize).copied().ok_or_else(|| {
                XcfError::InconsistentData(format!(
                    "palette index {} out of range ({} entries)",
                    index,
                    palette.len()
                ))
            })
        };

        for px in self.data.chunks_exact(bpp) {
            match self.layout {
                PixelLayout::Rgb => out.extend_from_slice(&[px[0], px[1], px[2], 255]),
                PixelLayout::Rgba => out.extend_from_slice(px),
                PixelLayout::Gray => out.extend_from_slice(&[px[0], px[0], px[0], 255]),
                PixelLayout::GrayAlpha => out.extend_from_slice(&[px[0], px[0], px[0], px[1]]),
                PixelLayout::Indexed => {
                    let c = lookup(px[0])?;
                    out.extend_from_slice(&[c.r, c.g, c.b, 255]);
                }
                PixelLayout::IndexedAlpha => {
                    let c = lookup(px[0])?;
                    out.extend_from_slice(&[c.r, c.g, c.b, px[1]]);
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_type_codes() {
        for code in 0..6 {
            let layout = PixelLayout::from_type_code(code).unwrap();
            assert_eq!(layout.type_code(), code);
            assert_eq!(layout.has_alpha(), code % 2 == 1);
            assert_eq!(
                PixelLayout::for_mode(layout.color_mode(), layout.has_alpha()),
                layout
            );
        }
        assert!(matches!(
            PixelLayout::from_type_code(6),
            Err(XcfError::InvalidBaseType(6))
        ));
    }

    #[test]
    fn test_channel_counts() {
        assert_eq!(PixelLayout::Rgb.channels(), 3);
        assert_eq!(PixelLayout::Rgba.channels(), 4);
        assert_eq!(PixelLayout::Gray.channels(), 1);
        assert_eq!(PixelLayout::GrayAlpha.channels(), 2);
        assert_eq!(PixelLayout::Indexed.channels(), 1);
        assert_eq!(PixelLayout::IndexedAlpha.channels(), 2);
    }

    #[test]
    fn test_from_pixels_length_check() {
        assert!(Raster::from_pixels(2, 2, PixelLayout::Rgb, vec![0; 12]).is_ok());
        assert!(matches!(
            Raster::from_pixels(2, 2, PixelLayout::Rgb, vec![0; 11]),
            Err(XcfError::InconsistentData(_))
        ));
    }

    #[test]
    fn test_gray_alpha_to_rgba() {
        let raster = Raster::from_pixels(2, 1, PixelLayout::GrayAlpha, vec![10, 20, 30, 40]).unwrap();
        assert_eq!(
            raster.to_rgba8(None).unwrap(),
            vec![10, 10, 10, 20, 30, 30, 30, 40]
        );
    }

    #[test]
    fn test_indexed_to_rgba() {
        let palette = [Rgb::new(1, 2, 3), Rgb::new(4, 5, 6)];
        let raster = Raster::from_pixels(2, 1, PixelLayout::Indexed, vec![1, 0]).unwrap();
        assert_eq!(
            raster.to_rgba8(Some(&palette)).unwrap(),
            vec![4, 5, 6, 255, 1, 2, 3, 255]
        );

        let out_of_range = Raster::from_pixels(1, 1, PixelLayout::Indexed, vec![2]).unwrap();
        assert!(out_of_range.to_rgba8(Some(&palette)).is_err());
        assert!(out_of_range.to_rgba8(None).is_err());
    }

    #[test]
    fn test_hex_colors() {
        assert_eq!(Rgb::from_hex("#ff8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(Rgb::from_hex("#ff8000cc"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(Rgb::from_hex("ff8000"), None);
        assert_eq!(Rgb::from_hex("#ff80"), None);
        assert_eq!(Rgb::new(1, 171, 255).to_hex(), "#01abff");
    }

    #[test]
    fn test_pixel_access() {
        let raster = Raster::filled(3, 2, PixelLayout::Rgb, &[7, 8, 9]).unwrap();
        assert_eq!(raster.pixel(2, 1), Some(&[7u8, 8, 9][..]));
        assert_eq!(raster.pixel(3, 0), None);
    }
}
