//! Property lists: `(id, length, payload)` records terminated by an END record
//!
//! Document, layer and channel headers all carry a property list. The loop is
//! shared; each header supplies its own [`PropertyTarget`] deciding which ids it
//! understands. Ids a target does not accept are skipped by length.

use crate::error::{Result, XcfError};
use crate::header::{PointerWidth, Version};
use crate::io::{encoded_string_len, XcfReader, MAX_STRING_LEN};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{Read, Seek};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PropertyId {
    End = 0,
    Colormap = 1,
    ActiveLayer = 2,
    ActiveChannel = 3,
    Selection = 4,
    FloatingSelection = 5,
    Opacity = 6,
    Mode = 7,
    Visible = 8,
    Linked = 9,
    LockAlpha = 10,
    ApplyMask = 11,
    EditMask = 12,
    ShowMask = 13,
    ShowMasked = 14,
    Offsets = 15,
    Color = 16,
    Compression = 17,
    Guides = 18,
    Resolution = 19,
    Tattoo = 20,
    Parasites = 21,
    Unit = 22,
    Paths = 23,
    UserUnit = 24,
    Vectors = 25,
    TextLayerFlags = 26,
    OldSamplePoints = 27,
    LockContent = 28,
    GroupItem = 29,
    ItemPath = 30,
    GroupItemFlags = 31,
    LockPosition = 32,
    FloatOpacity = 33,
    ColorTag = 34,
    CompositeMode = 35,
    CompositeSpace = 36,
    BlendSpace = 37,
    FloatColor = 38,
    SamplePoints = 39,
}

impl PropertyId {
    pub fn from_u32(value: u32) -> Option<Self> {
        use PropertyId::*;
        const ALL: [PropertyId; 40] = [
            End, Colormap, ActiveLayer, ActiveChannel, Selection, FloatingSelection, Opacity,
            Mode, Visible, Linked, LockAlpha, ApplyMask, EditMask, ShowMask, ShowMasked, Offsets,
            Color, Compression, Guides, Resolution, Tattoo, Parasites, Unit, Paths, UserUnit,
            Vectors, TextLayerFlags, OldSamplePoints, LockContent, GroupItem, ItemPath,
            GroupItemFlags, LockPosition, FloatOpacity, ColorTag, CompositeMode, CompositeSpace,
            BlendSpace, FloatColor, SamplePoints,
        ];
        ALL.get(value as usize).copied()
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Bounded view over one property's payload
pub struct Payload<'a> {
    id: u32,
    data: &'a [u8],
    pos: usize,
    version: Version,
}

impl<'a> Payload<'a> {
    pub fn new(id: u32, data: &'a [u8], version: Version) -> Self {
        Payload {
            id,
            data,
            pos: 0,
            version,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(XcfError::InvalidPropertyList(format!(
                "property {} payload is {} bytes, needed {} more at byte {}",
                self.id,
                self.data.len(),
                n,
                self.pos
            )));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    pub fn read_pointer(&mut self) -> Result<u64> {
        match self.version.pointer_width() {
            PointerWidth::Bits32 => Ok(u64::from(self.read_u32()?)),
            PointerWidth::Bits64 => Ok(BigEndian::read_u64(self.take(8)?)),
        }
    }

    /// Booleans are a 4-byte 0 or 1; anything else is `InvalidState`
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(XcfError::InvalidState {
                property: self.id,
                value,
            }),
        }
    }

    /// OPACITY: a u32 in 0..=255
    pub fn read_opacity(&mut self) -> Result<u8> {
        let value = self.read_u32()?;
        u8::try_from(value)
            .map_err(|_| XcfError::InvalidOpacity(format!("{} is above 255", value)))
    }

    /// FLOAT_OPACITY: an f32 in 0..=1, scaled to 0..=255
    pub fn read_float_opacity(&mut self) -> Result<u8> {
        let value = self.read_f32()?;
        if !(0.0..=1.0).contains(&value) {
            return Err(XcfError::InvalidOpacity(format!("{} is outside 0..1", value)));
        }
        Ok((value * 255.0).round() as u8)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        if len as u64 > MAX_STRING_LEN {
            return Err(XcfError::StringTooLong {
                len: len as u64,
                max: MAX_STRING_LEN,
            });
        }
        let bytes = self.take(len)?;
        let invalid = || XcfError::InvalidString {
            offset: self.pos as u64,
        };
        match bytes.split_last() {
            Some((0, text)) => String::from_utf8(text.to_vec()).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    /// A decoder must consume its payload exactly
    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(XcfError::InvalidPropertyList(format!(
                "property {} left {} of {} payload bytes unread",
                self.id,
                self.remaining(),
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// One header's dispatch table
pub(crate) trait PropertyTarget {
    fn accepts(&self, id: PropertyId) -> bool;

    fn apply(&mut self, id: PropertyId, payload: &mut Payload<'_>) -> Result<()>;
}

/// Run the property loop at the reader's position until the END record
pub(crate) fn read_property_list<R, T>(reader: &mut XcfReader<R>, target: &mut T) -> Result<()>
where
    R: Read + Seek,
    T: PropertyTarget,
{
    let version = reader.version();
    loop {
        let offset = reader.position();
        let raw_id = reader.read_u32()?;
        let length = reader.read_u32()?;

        if raw_id == PropertyId::End.code() {
            if length != 0 {
                return Err(XcfError::InvalidPropertyList(format!(
                    "END record at offset {} has length {}",
                    offset, length
                )));
            }
            return Ok(());
        }

        let Some(id) = PropertyId::from_u32(raw_id).filter(|id| target.accepts(*id)) else {
            debug!(
                "Skipping property {} ({} bytes) at offset {}",
                raw_id, length, offset
            );
            reader.skip(u64::from(length))?;
            continue;
        };

        let data = if id == PropertyId::Colormap && version == Version::V0 {
            // Version 0 writers stored a bogus length here; trust the entry count
            let count = reader.read_u32()?;
            let mut data = count.to_be_bytes().to_vec();
            data.extend(reader.read_bytes(u64::from(count) * 3)?);
            data
        } else {
            reader.read_bytes(u64::from(length))?
        };

        let mut payload = Payload::new(raw_id, &data, version);
        target.apply(id, &mut payload)?;
        payload.finish()?;
    }
}

/// Serializes one property payload
pub struct PayloadWriter {
    buf: Vec<u8>,
    version: Version,
}

impl PayloadWriter {
    pub fn new(version: Version) -> Self {
        PayloadWriter {
            buf: Vec::new(),
            version,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.buf.write_u8(value)?;
        Ok(())
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.buf.write_i8(value)?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.buf.write_u32::<BigEndian>(value)?;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.buf.write_i32::<BigEndian>(value)?;
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.buf.write_f32::<BigEndian>(value)?;
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u32(u32::from(value))
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_u32(encoded_string_len(value)?)?;
        self.buf.extend_from_slice(value.as_bytes());
        self.write_u8(0)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Builds a serialized property list in memory
pub struct PropertyListWriter {
    buf: Vec<u8>,
    version: Version,
}

impl PropertyListWriter {
    pub fn new(version: Version) -> Self {
        PropertyListWriter {
            buf: Vec::new(),
            version,
        }
    }

    /// Append a record with an already serialized payload
    pub fn raw(&mut self, id: u32, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            XcfError::InvalidDocument(format!(
                "property {} payload of {} bytes is too large",
                id,
                payload.len()
            ))
        })?;
        self.buf.write_u32::<BigEndian>(id)?;
        self.buf.write_u32::<BigEndian>(len)?;
        self.buf.extend_from_slice(payload);
        Ok(())
    }

    /// Append a record whose payload is produced by `fill`
    pub fn with<F>(&mut self, id: PropertyId, fill: F) -> Result<()>
    where
        F: FnOnce(&mut PayloadWriter) -> Result<()>,
    {
        let mut payload = PayloadWriter::new(self.version);
        fill(&mut payload)?;
        self.raw(id.code(), &payload.into_bytes())
    }

    /// Zero-length marker record
    pub fn flag(&mut self, id: PropertyId) -> Result<()> {
        self.raw(id.code(), &[])
    }

    pub fn bool(&mut self, id: PropertyId, value: bool) -> Result<()> {
        self.with(id, |p| p.write_bool(value))
    }

    pub fn u32(&mut self, id: PropertyId, value: u32) -> Result<()> {
        self.with(id, |p| p.write_u32(value))
    }

    /// Terminate with END and hand back the bytes
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.raw(PropertyId::End.code(), &[])?;
        Ok(self.buf)
    }
}
