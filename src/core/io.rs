//! Random-access cursor and back-patching writer over the wire format

use crate::error::{Result, XcfError};
use crate::header::{PointerWidth, Version};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Longest string accepted from a stream (names, parasite names, unit strings)
pub const MAX_STRING_LEN: u64 = 16 * 1024 * 1024;

/// Seekable big-endian reader.
///
/// Every read returns a `Result`; the caller stops at the first failure.
/// The reader tracks its own position so errors can report where they happened.
pub struct XcfReader<R> {
    inner: R,
    version: Version,
    pos: u64,
    len: u64,
}

impl<R: Read + Seek> XcfReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(XcfReader {
            inner,
            version: Version::default(),
            pos: 0,
            len,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    fn eof(&self) -> XcfError {
        XcfError::UnexpectedEof { offset: self.pos }
    }

    fn map_err(&self, err: io::Error) -> XcfError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            self.eof()
        } else {
            XcfError::Io(err)
        }
    }

    /// Jump to an absolute file offset
    pub fn seek_absolute(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(XcfError::UnexpectedEof { offset });
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        let target = self.pos.checked_add(n).ok_or_else(|| self.eof())?;
        self.seek_absolute(target)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() as u64 > self.remaining() {
            return Err(self.eof());
        }
        self.inner.read_exact(buf).map_err(|e| self.map_err(e))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: u64) -> Result<Vec<u8>> {
        if n > self.remaining() {
            return Err(self.eof());
        }
        let mut buf = vec![0u8; n as usize];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.inner.read_u8().map_err(|e| self.map_err(e))?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let value = self
            .inner
            .read_u16::<BigEndian>()
            .map_err(|e| self.map_err(e))?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self
            .inner
            .read_u32::<BigEndian>()
            .map_err(|e| self.map_err(e))?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let value = self
            .inner
            .read_i32::<BigEndian>()
            .map_err(|e| self.map_err(e))?;
        self.pos += 4;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self
            .inner
            .read_u64::<BigEndian>()
            .map_err(|e| self.map_err(e))?;
        self.pos += 8;
        Ok(value)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let value = self
            .inner
            .read_f32::<BigEndian>()
            .map_err(|e| self.map_err(e))?;
        self.pos += 4;
        Ok(value)
    }

    /// Length-prefixed, NUL-terminated UTF-8 string. A zero length is the empty string.
    pub fn read_string(&mut self) -> Result<String> {
        let offset = self.pos;
        let len = u64::from(self.read_u32()?);
        if len == 0 {
            return Ok(String::new());
        }
        if len > MAX_STRING_LEN {
            return Err(XcfError::StringTooLong {
                len,
                max: MAX_STRING_LEN,
            });
        }
        let mut bytes = self.read_bytes(len)?;
        if bytes.pop() != Some(0) {
            return Err(XcfError::InvalidString { offset });
        }
        String::from_utf8(bytes).map_err(|_| XcfError::InvalidString { offset })
    }

    /// File offset stored at the width selected by the format version
    pub fn read_pointer(&mut self) -> Result<u64> {
        match self.version.pointer_width() {
            PointerWidth::Bits32 => Ok(u64::from(self.read_u32()?)),
            PointerWidth::Bits64 => self.read_u64(),
        }
    }

    /// Zero-terminated pointer table
    pub fn read_pointer_table(&mut self) -> Result<Vec<u64>> {
        let mut pointers = Vec::new();
        loop {
            let pointer = self.read_pointer()?;
            if pointer == 0 {
                return Ok(pointers);
            }
            if pointer >= self.len {
                return Err(XcfError::UnexpectedEof { offset: pointer });
            }
            pointers.push(pointer);
        }
    }

    /// Copy up to `max_len` bytes starting at `offset`, clipped to the end of the stream
    pub fn read_span(&mut self, offset: u64, max_len: u64) -> Result<Vec<u8>> {
        self.seek_absolute(offset)?;
        let len = max_len.min(self.remaining());
        self.read_bytes(len)
    }
}

/// A reserved pointer slot, patched once the pointed-to data has been written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerSlot(u64);

/// Append-only big-endian writer with pointer back-patching
pub struct XcfWriter<W> {
    inner: W,
    version: Version,
    pos: u64,
}

impl<W: Write + Seek> XcfWriter<W> {
    /// The writer assumes `inner` is positioned at offset 0
    pub fn new(inner: W, version: Version) -> Self {
        XcfWriter {
            inner,
            version,
            pos: 0,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.inner.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.inner.write_u32::<BigEndian>(value)?;
        self.pos += 4;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.inner.write_i32::<BigEndian>(value)?;
        self.pos += 4;
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let len = encoded_string_len(value)?;
        self.write_u32(len)?;
        self.write_bytes(value.as_bytes())?;
        self.write_u8(0)
    }

    pub fn write_pointer(&mut self, pointer: u64) -> Result<()> {
        match self.version.pointer_width() {
            PointerWidth::Bits32 => {
                let narrow = u32::try_from(pointer).map_err(|_| XcfError::PointerOverflow(pointer))?;
                self.write_u32(narrow)
            }
            PointerWidth::Bits64 => {
                self.inner.write_u64::<BigEndian>(pointer)?;
                self.pos += 8;
                Ok(())
            }
        }
    }

    /// Write a zero placeholder pointer and remember where it went
    pub fn reserve_pointer(&mut self) -> Result<PointerSlot> {
        let slot = PointerSlot(self.pos);
        self.write_pointer(0)?;
        Ok(slot)
    }

    /// Reserve `count` slots followed by the zero terminator
    pub fn reserve_pointer_table(&mut self, count: usize) -> Result<Vec<PointerSlot>> {
        let slots = (0..count)
            .map(|_| self.reserve_pointer())
            .collect::<Result<Vec<_>>>()?;
        self.write_pointer(0)?;
        Ok(slots)
    }

    /// Fill a reserved slot, then return to the end of the output
    pub fn patch_pointer(&mut self, slot: PointerSlot, pointer: u64) -> Result<()> {
        let end = self.pos;
        self.inner.seek(SeekFrom::Start(slot.0))?;
        self.pos = slot.0;
        self.write_pointer(pointer)?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.pos = end;
        Ok(())
    }

    /// Patch `slot` with the current position
    pub fn patch_here(&mut self, slot: PointerSlot) -> Result<u64> {
        let here = self.pos;
        self.patch_pointer(slot, here)?;
        Ok(here)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Wire length of a string: bytes plus the terminating NUL
pub(crate) fn encoded_string_len(value: &str) -> Result<u32> {
    let len = value.len() as u64 + 1;
    if len > MAX_STRING_LEN {
        return Err(XcfError::StringTooLong {
            len,
            max: MAX_STRING_LEN,
        });
    }
    Ok(len as u32)
}
