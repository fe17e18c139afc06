//! Bounds-checked little-endian access to a fixed byte buffer.
//!
//! Every structure in the image is decoded through [`SliceReader`]; a read
//! that would pass the end of the buffer returns
//! [`DecodeError::OutOfBounds`] instead of panicking, which callers treat as
//! "drop this record and move on".

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};

use crate::error::{DecodeError, DecodeResult};
use crate::types::filetime_to_datetime;

pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Starts reading at `offset` into the buffer.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, pos: offset }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Takes `len` bytes or fails without advancing.
    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::OutOfBounds {
            offset: self.pos,
            len,
            max: self.buf.len(),
        })?;
        if end > self.buf.len() {
            return Err(DecodeError::OutOfBounds {
                offset: self.pos,
                len,
                max: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> DecodeResult<u64> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    pub fn read_u128(&mut self) -> DecodeResult<u128> {
        Ok(LittleEndian::read_u128(self.read_bytes(16)?))
    }

    /// Reads a fixed-length byte array, e.g. a signature field.
    pub fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads `units` UTF-16LE code units; unpaired surrogates become U+FFFD.
    pub fn read_utf16(&mut self, units: usize) -> DecodeResult<String> {
        let raw = self.read_bytes(units * 2)?;
        let code_units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&code_units))
    }

    /// Reads a u16 length prefix followed by that many UTF-16 code units.
    pub fn read_utf16_prefixed(&mut self) -> DecodeResult<String> {
        let units = self.read_u16()? as usize;
        self.read_utf16(units)
    }

    /// Reads a 64-bit FILETIME tick count as calendar time.
    pub fn read_filetime(&mut self) -> DecodeResult<DateTime<Utc>> {
        Ok(filetime_to_datetime(self.read_u64()?))
    }
}
