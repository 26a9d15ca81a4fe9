//! Run-length codec for tile byte planes
//!
//! Each opcode byte `m` starts a run:
//! - `0..=126`: repeat the next byte `m + 1` times
//! - `127`: repeat the byte after a big-endian u16 count
//! - `128`: copy a big-endian u16 count of literal bytes
//! - `129..=255`: copy `256 - m` literal bytes
//!
//! The encoder only has to round-trip through [`decode`]; it does not try to
//! reproduce any particular writer byte for byte.

use crate::error::{Result, XcfError};

/// Runs shorter than this are folded into literal runs
const MIN_REPEAT: usize = 3;

/// Longest run a single opcode can describe
const MAX_RUN: usize = 0xFFFF;

/// Longest run the one-byte opcode forms can describe
const SHORT_RUN: usize = 127;

/// Streaming decoder state: current run kind, its byte, and bytes left in it
pub struct RleDecoder<'a> {
    input: &'a [u8],
    pos: usize,
    origin: u64,
    repeat: bool,
    value: u8,
    remaining: u16,
}

impl<'a> RleDecoder<'a> {
    /// `origin` is the file offset of `input`, used in error reports
    pub fn new(input: &'a [u8], origin: u64) -> Self {
        RleDecoder {
            input,
            pos: 0,
            origin,
            repeat: false,
            value: 0,
            remaining: 0,
        }
    }

    /// Compressed bytes consumed so far
    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn take(&mut self) -> Result<u8> {
        let byte = *self.input.get(self.pos).ok_or(XcfError::UnexpectedEof {
            offset: self.origin + self.pos as u64,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn take_u16(&mut self) -> Result<u16> {
        let hi = self.take()?;
        let lo = self.take()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn start_run(&mut self) -> Result<()> {
        let opcode = self.take()?;
        match opcode {
            0..=126 => {
                self.repeat = true;
                self.remaining = u16::from(opcode) + 1;
                self.value = self.take()?;
            }
            127 => {
                self.repeat = true;
                self.remaining = self.take_u16()?;
                self.value = self.take()?;
            }
            128 => {
                self.repeat = false;
                self.remaining = self.take_u16()?;
            }
            129..=255 => {
                self.repeat = false;
                self.remaining = 256 - u16::from(opcode);
            }
        }
        Ok(())
    }

    pub fn next_byte(&mut self) -> Result<u8> {
        // A long-form count of zero is an empty run; move on to the next opcode
        while self.remaining == 0 {
            self.start_run()?;
        }
        self.remaining -= 1;
        if self.repeat {
            Ok(self.value)
        } else {
            self.take()
        }
    }

    /// Fill `out` completely from the stream
    pub fn decode_into(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < out.len() {
            if self.remaining == 0 {
                self.start_run()?;
                continue;
            }
            let run = (self.remaining as usize).min(out.len() - filled);
            if self.repeat {
                out[filled..filled + run].fill(self.value);
            } else {
                let end = self.pos + run;
                if end > self.input.len() {
                    return Err(XcfError::UnexpectedEof {
                        offset: self.origin + self.input.len() as u64,
                    });
                }
                out[filled..filled + run].copy_from_slice(&self.input[self.pos..end]);
                self.pos = end;
            }
            self.remaining -= run as u16;
            filled += run;
        }
        Ok(())
    }
}

/// Decode exactly `len` bytes from `input`
pub fn decode(input: &[u8], len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; len];
    RleDecoder::new(input, 0).decode_into(&mut out)?;
    Ok(out)
}

/// Length of the run of identical bytes at the start of `data`, capped at `MAX_RUN`
fn run_length(data: &[u8]) -> usize {
    match data.first() {
        Some(&first) => data
            .iter()
            .take(MAX_RUN)
            .take_while(|&&b| b == first)
            .count(),
        None => 0,
    }
}

fn push_repeat(out: &mut Vec<u8>, value: u8, count: usize) {
    if count <= SHORT_RUN {
        out.push((count - 1) as u8);
    } else {
        out.push(127);
        out.extend_from_slice(&(count as u16).to_be_bytes());
    }
    out.push(value);
}

fn push_literal(out: &mut Vec<u8>, bytes: &[u8]) {
    let count = bytes.len();
    if count <= SHORT_RUN {
        out.push((256 - count) as u8);
    } else {
        out.push(128);
        out.extend_from_slice(&(count as u16).to_be_bytes());
    }
    out.extend_from_slice(bytes);
}

/// Append the encoding of `data` to `out`
pub fn encode_into(data: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < data.len() {
        let run = run_length(&data[i..]);
        if run >= MIN_REPEAT {
            push_repeat(out, data[i], run);
            i += run;
            continue;
        }

        let start = i;
        while i < data.len() && i - start < MAX_RUN && run_length(&data[i..]) < MIN_REPEAT {
            i += 1;
        }
        push_literal(out, &data[start..i]);
    }
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 + 8);
    encode_into(data, &mut out);
    out
}

/// Upper bound on the encoded size of `len` bytes for any conforming writer
pub fn max_encoded_len(len: usize) -> usize {
    len * 2 + 16
}
