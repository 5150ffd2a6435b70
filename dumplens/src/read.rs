// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Bounds-checked primitive reads over the dump blob.
//!
//! Every helper here returns `None` instead of panicking when a read would
//! leave the blob, and all offset arithmetic is overflow-checked. String
//! decoding degrades to an empty string on malformed UTF-16 so that a bad
//! name never fails an otherwise-healthy record.

use dumplens_common::format::MINIDUMP_LOCATION_DESCRIPTOR;
use encoding::all::UTF_16LE;
use encoding::{DecoderTrap, Encoding};
use scroll::{Pread, LE};

/// The slice of `bytes` described by `loc`, if it lies entirely within
/// `bytes`.
pub fn location_slice<'a>(
    bytes: &'a [u8],
    loc: &MINIDUMP_LOCATION_DESCRIPTOR,
) -> Option<&'a [u8]> {
    slice_at(bytes, loc.rva as usize, loc.data_size as usize)
}

/// `bytes[offset..offset + len]`, if that range lies entirely within
/// `bytes`.
pub fn slice_at(bytes: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    offset.checked_add(len).and_then(|end| bytes.get(offset..end))
}

/// Read a u32 length-prefixed UTF-16LE string from `bytes` at `*offset`,
/// advancing the offset past it.
///
/// Returns `None` when the length prefix or the string bytes leave the
/// blob; malformed UTF-16 decodes to an empty string instead.
pub fn read_string_utf16(offset: &mut usize, bytes: &[u8]) -> Option<String> {
    let byte_len: u32 = bytes.gread_with(offset, LE).ok()?;
    let size = byte_len as usize;
    if size % 2 != 0 {
        return None;
    }
    let raw = slice_at(bytes, *offset, size)?;
    *offset += size;
    Some(UTF_16LE.decode(raw, DecoderTrap::Strict).unwrap_or_default())
}

/// Decode at most `max_bytes` bytes of UTF-16LE at `offset`, stopping at
/// the first 16-bit zero pair.
pub fn read_string_utf16_fixed(bytes: &[u8], offset: usize, max_bytes: usize) -> Option<String> {
    let max = max_bytes.min(bytes.len().checked_sub(offset)?);
    let raw = &bytes[offset..offset + max];
    let mut end = 0;
    while end + 2 <= raw.len() {
        if raw[end] == 0 && raw[end + 1] == 0 {
            break;
        }
        end += 2;
    }
    Some(
        UTF_16LE
            .decode(&raw[..end], DecoderTrap::Strict)
            .unwrap_or_default(),
    )
}

/// Read a NUL-terminated UTF-8 string from `bytes` at `*offset`, advancing
/// the offset past the terminator.
pub fn read_cstring_utf8(offset: &mut usize, bytes: &[u8]) -> Option<String> {
    let initial_offset = *offset;
    loop {
        let byte: u8 = bytes.gread(offset).ok()?;
        if byte == 0 {
            break;
        }
    }
    std::str::from_utf8(&bytes[initial_offset..*offset - 1])
        .map(String::from)
        .ok()
}

/// A stateful little-endian reader over a byte slice.
///
/// `seek` clamps to `[0, len]`; typed reads advance the position only on
/// success.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Cursor<'a> {
        Cursor { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.data.gread_with(&mut self.pos, LE).ok()
    }

    pub fn u16(&mut self) -> Option<u16> {
        self.data.gread_with(&mut self.pos, LE).ok()
    }

    pub fn u32(&mut self) -> Option<u32> {
        self.data.gread_with(&mut self.pos, LE).ok()
    }

    pub fn u64(&mut self) -> Option<u64> {
        self.data.gread_with(&mut self.pos, LE).ok()
    }

    pub fn i32(&mut self) -> Option<i32> {
        self.data.gread_with(&mut self.pos, LE).ok()
    }

    pub fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let taken = slice_at(self.data, self.pos, len)?;
        self.pos += len;
        Some(taken)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_slice_at_bounds() {
        let bytes = [0u8; 8];
        assert!(slice_at(&bytes, 0, 8).is_some());
        assert!(slice_at(&bytes, 8, 0).is_some());
        assert!(slice_at(&bytes, 1, 8).is_none());
        assert!(slice_at(&bytes, usize::MAX, 2).is_none());
    }

    #[test]
    fn test_read_string_utf16() {
        // "hi" with a 4-byte length prefix.
        let bytes = [4u8, 0, 0, 0, b'h', 0, b'i', 0];
        let mut offset = 0;
        assert_eq!(read_string_utf16(&mut offset, &bytes).unwrap(), "hi");
        assert_eq!(offset, 8);

        // Length runs past the end of the buffer.
        let bytes = [200u8, 0, 0, 0, b'h', 0];
        let mut offset = 0;
        assert!(read_string_utf16(&mut offset, &bytes).is_none());

        // An unpaired surrogate decodes as empty rather than failing.
        let bytes = [2u8, 0, 0, 0, 0x00, 0xd8];
        let mut offset = 0;
        assert_eq!(read_string_utf16(&mut offset, &bytes).unwrap(), "");
    }

    #[test]
    fn test_read_string_utf16_fixed() {
        let mut bytes = vec![b'o', 0, b'k', 0, 0, 0];
        bytes.extend_from_slice(&[b'x', 0]);
        assert_eq!(
            read_string_utf16_fixed(&bytes, 0, bytes.len()).unwrap(),
            "ok"
        );
        // No terminator: decode up to max_bytes.
        assert_eq!(read_string_utf16_fixed(&bytes, 0, 4).unwrap(), "ok");
        assert!(read_string_utf16_fixed(&bytes, 100, 4).is_none());
    }

    #[test]
    fn test_cursor_seek_clamps() {
        let bytes = [1u8, 2, 3, 4];
        let mut cursor = Cursor::new(&bytes);
        cursor.seek(100);
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.u8(), None);
        cursor.seek(0);
        assert_eq!(cursor.u32(), Some(0x04030201));
        assert_eq!(cursor.remaining(), 0);
    }
}
