//! File header: magic, version token, image size and mode, pixel precision

use crate::error::{Result, XcfError};
use crate::io::XcfReader;
use crate::model::ColorMode;
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek};

pub const MAGIC: [u8; 8] = *b"gimp xcf";

/// Largest width or height accepted in a header
pub const MAX_IMAGE_SIZE: u32 = 524_288;

/// Serialized header length for versions without a precision field
pub const HEADER_LEN: usize = 26;

/// Format version, selected by the 4-byte token after the magic.
///
/// `file` is version 0, `v001`..`v011` are versions 1 through 11.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Version(u8);

impl Version {
    pub const V0: Version = Version(0);
    pub const V1: Version = Version(1);
    pub const V3: Version = Version(3);
    pub const V11: Version = Version(11);

    /// Newest version this crate reads and writes
    pub const LATEST: Version = Version(11);

    pub fn new(number: u8) -> Result<Self> {
        if number > Self::LATEST.0 {
            return Err(XcfError::UnsupportedVersion(format!("v{:03}", number)));
        }
        Ok(Version(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn parse_token(token: &[u8; 4]) -> Result<Self> {
        if token == b"file" {
            return Ok(Version::V0);
        }
        let unsupported = || XcfError::UnsupportedVersion(String::from_utf8_lossy(token).into_owned());
        if token[0] != b'v' || !token[1..].iter().all(u8::is_ascii_digit) {
            return Err(unsupported());
        }
        let number = token[1..]
            .iter()
            .fold(0u32, |acc, digit| acc * 10 + u32::from(digit - b'0'));
        if number == 0 || number > u32::from(Self::LATEST.0) {
            return Err(unsupported());
        }
        Ok(Version(number as u8))
    }

    pub fn token(self) -> [u8; 4] {
        if self.0 == 0 {
            return *b"file";
        }
        let mut token = *b"v000";
        token[2] = b'0' + self.0 / 10;
        token[3] = b'0' + self.0 % 10;
        token
    }

    pub fn pointer_width(self) -> PointerWidth {
        if self.0 >= 11 {
            PointerWidth::Bits64
        } else {
            PointerWidth::Bits32
        }
    }

    /// Versions 4 and later store a precision word after the color mode
    pub fn has_precision(self) -> bool {
        self.0 >= 4
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::V3
    }
}

impl TryFrom<u8> for Version {
    type Error = XcfError;

    fn try_from(value: u8) -> Result<Self> {
        Version::new(value)
    }
}

impl From<Version> for u8 {
    fn from(version: Version) -> u8 {
        version.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.token()))
    }
}

/// Width of every stored file offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    pub fn bytes(self) -> u64 {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }
}

/// Pixel precision. Only 8-bit integer storage is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    U8Linear,
    #[default]
    U8NonLinear,
    U8Perceptual,
}

impl Precision {
    pub fn from_code(version: Version, code: u32) -> Result<Self> {
        let precision = match (version.0, code) {
            (4, 0) => Some(Precision::U8Linear),
            (5 | 6, 100) => Some(Precision::U8Linear),
            (5 | 6, 150) => Some(Precision::U8NonLinear),
            (7.., 100) => Some(Precision::U8Linear),
            (7.., 150) => Some(Precision::U8NonLinear),
            (7.., 175) => Some(Precision::U8Perceptual),
            _ => None,
        };
        precision.ok_or(XcfError::UnsupportedPrecision {
            version: version.0,
            precision: code,
        })
    }

    pub fn code(self, version: Version) -> Result<u32> {
        let code = match (version.0, self) {
            (4, Precision::U8Linear) => Some(0),
            (5.., Precision::U8Linear) => Some(100),
            (5.., Precision::U8NonLinear) => Some(150),
            (7.., Precision::U8Perceptual) => Some(175),
            _ => None,
        };
        code.ok_or_else(|| {
            XcfError::InvalidDocument(format!(
                "precision {:?} cannot be stored in version {}",
                self, version
            ))
        })
    }
}

/// Tile compression mode, stored in the COMPRESSION property
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Compression {
    None = 0,
    #[default]
    Rle = 1,
}

impl Compression {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Rle),
            _ => Err(XcfError::UnknownCompression(value)),
        }
    }
}

/// Fixed-position file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: Version,
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    pub precision: Precision,
}

impl Header {
    pub fn new(version: Version, width: u32, height: u32, color_mode: ColorMode) -> Self {
        Header {
            version,
            width,
            height,
            color_mode,
            precision: Precision::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (what, value) in [("width", self.width), ("height", self.height)] {
            if value == 0 || value > MAX_IMAGE_SIZE {
                return Err(XcfError::MalformedHeader(format!(
                    "image {} {} outside 1..={}",
                    what, value, MAX_IMAGE_SIZE
                )));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + 4);

        bytes.extend_from_slice(&MAGIC);
        bytes.push(b' ');
        bytes.extend_from_slice(&self.version.token());
        bytes.push(0);
        bytes.extend_from_slice(&self.width.to_be_bytes());
        bytes.extend_from_slice(&self.height.to_be_bytes());
        bytes.extend_from_slice(&self.color_mode.code().to_be_bytes());
        if self.version.has_precision() {
            bytes.extend_from_slice(&self.precision.code(self.version)?.to_be_bytes());
        }

        Ok(bytes)
    }

    /// Read and validate the header from the start of the stream
    pub fn read_from<R: Read + Seek>(reader: &mut XcfReader<R>) -> Result<Self> {
        if reader.len() < HEADER_LEN as u64 {
            return Err(XcfError::MalformedHeader(format!(
                "stream is {} bytes, shorter than a header",
                reader.len()
            )));
        }
        reader.seek_absolute(0)?;

        let mut magic = [0u8; 9];
        reader.read_exact(&mut magic)?;
        if magic[..8] != MAGIC || magic[8] != b' ' {
            return Err(XcfError::MalformedHeader("bad magic".to_string()));
        }

        let mut token = [0u8; 4];
        reader.read_exact(&mut token)?;
        let version = Version::parse_token(&token)?;

        if reader.read_u8()? != 0 {
            return Err(XcfError::MalformedHeader(
                "version token is not NUL-terminated".to_string(),
            ));
        }

        let width = reader.read_u32()?;
        let height = reader.read_u32()?;
        let color_mode = ColorMode::from_u32(reader.read_u32()?)?;
        let precision = if version.has_precision() {
            Precision::from_code(version, reader.read_u32()?)?
        } else {
            Precision::U8NonLinear
        };

        let header = Header {
            version,
            width,
            height,
            color_mode,
            precision,
        };
        header.validate()?;
        reader.set_version(version);
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read(bytes: Vec<u8>) -> Result<Header> {
        let mut reader = XcfReader::new(Cursor::new(bytes))?;
        Header::read_from(&mut reader)
    }

    #[test]
    fn test_version_tokens() {
        assert_eq!(Version::parse_token(b"file").unwrap(), Version::V0);
        assert_eq!(Version::parse_token(b"v003").unwrap(), Version::V3);
        assert_eq!(Version::parse_token(b"v011").unwrap(), Version::V11);
        assert_eq!(&Version::V11.token(), b"v011");
        assert_eq!(&Version::V0.token(), b"file");
        assert_eq!(Version::new(7).unwrap().to_string(), "v007");

        for bad in [b"v000", b"v012", b"v1a1", b"FILE", b"x003"] {
            assert!(matches!(
                Version::parse_token(bad),
                Err(XcfError::UnsupportedVersion(_))
            ));
        }
    }

    #[test]
    fn test_pointer_width_by_version() {
        assert_eq!(Version::V3.pointer_width(), PointerWidth::Bits32);
        assert_eq!(Version::new(10).unwrap().pointer_width(), PointerWidth::Bits32);
        assert_eq!(Version::V11.pointer_width(), PointerWidth::Bits64);
        assert_eq!(PointerWidth::Bits64.bytes(), 8);
    }

    #[test]
    fn test_header_serialization() {
        let header = Header::new(Version::V3, 640, 480, ColorMode::Grayscale);
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[..14], b"gimp xcf v003\0");

        let decoded = read(bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_precision_word() {
        let mut header = Header::new(Version::V11, 8, 8, ColorMode::Rgb);
        header.precision = Precision::U8Perceptual;
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 4);
        assert_eq!(read(bytes).unwrap().precision, Precision::U8Perceptual);
    }

    #[test]
    fn test_unsupported_precision() {
        let header = Header::new(Version::V11, 8, 8, ColorMode::Rgb);
        let mut bytes = header.to_bytes().unwrap();
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&200u32.to_be_bytes());
        let err = read(bytes).unwrap_err();
        assert!(err.is_unsupported());
        assert!(matches!(
            err,
            XcfError::UnsupportedPrecision { version: 11, precision: 200 }
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = Header::new(Version::V3, 1, 1, ColorMode::Rgb).to_bytes().unwrap();
        bytes[0] = b'G';
        assert!(matches!(read(bytes), Err(XcfError::MalformedHeader(_))));
    }

    #[test]
    fn test_invalid_base_type() {
        let mut bytes = Header::new(Version::V3, 1, 1, ColorMode::Rgb).to_bytes().unwrap();
        bytes[22..26].copy_from_slice(&3u32.to_be_bytes());
        assert!(matches!(read(bytes), Err(XcfError::InvalidBaseType(3))));
    }

    #[test]
    fn test_missing_nul_after_token() {
        let mut bytes = Header::new(Version::V3, 1, 1, ColorMode::Rgb).to_bytes().unwrap();
        bytes[13] = b'x';
        assert!(matches!(read(bytes), Err(XcfError::MalformedHeader(_))));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            read(b"gimp xcf v003\0".to_vec()),
            Err(XcfError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let header = Header::new(Version::V3, 0, 10, ColorMode::Rgb);
        assert!(matches!(
            header.validate(),
            Err(XcfError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_compression_from_u8() {
        assert_eq!(Compression::from_u8(0).unwrap(), Compression::None);
        assert_eq!(Compression::from_u8(1).unwrap(), Compression::Rle);
        assert!(matches!(
            Compression::from_u8(2),
            Err(XcfError::UnknownCompression(2))
        ));
    }
}
