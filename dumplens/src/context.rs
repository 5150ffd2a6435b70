// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! CPU context decoding.
//!
//! Only the AMD64 context is decoded register-by-register; contexts of
//! other widths are left undecoded and surface only through the owning
//! record's location descriptor.

use dumplens_common::format as md;
use scroll::ctx::SizeWith;
use scroll::{Pread, LE};

use crate::read::location_slice;

/// Decode an AMD64 thread context from the location `loc` within the dump.
///
/// Returns `None` when the location is empty, leaves the blob, or is too
/// small to hold a full 1232-byte AMD64 context.
pub fn read_context(all: &[u8], loc: &md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<md::CONTEXT_AMD64> {
    if loc.data_size == 0 {
        return None;
    }
    let bytes = location_slice(all, loc)?;
    if bytes.len() < md::CONTEXT_AMD64::size_with(&LE) {
        return None;
    }
    bytes.pread_with(0, LE).ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use scroll::ctx::SizeWith;

    fn synth_context() -> Vec<u8> {
        let size = md::CONTEXT_AMD64::size_with(&LE);
        let mut bytes = vec![0u8; size];
        // context_flags at +48, eflags at +68, rsp at +152, rbp at +160,
        // rip at +248.
        bytes[48..52].copy_from_slice(&0x0010_000bu32.to_le_bytes());
        bytes[68..72].copy_from_slice(&0x0000_0245u32.to_le_bytes());
        bytes[152..160].copy_from_slice(&0x7fff_1000u64.to_le_bytes());
        bytes[160..168].copy_from_slice(&0x7fff_2000u64.to_le_bytes());
        bytes[248..256].copy_from_slice(&0x1400_0123u64.to_le_bytes());
        bytes
    }

    #[test]
    fn test_read_context() {
        let bytes = synth_context();
        let loc = md::MINIDUMP_LOCATION_DESCRIPTOR {
            data_size: bytes.len() as u32,
            rva: 0,
        };
        let ctx = read_context(&bytes, &loc).unwrap();
        assert_eq!(ctx.rip, 0x1400_0123);
        assert_eq!(ctx.rsp, 0x7fff_1000);
        assert_eq!(ctx.rbp, 0x7fff_2000);
        assert_eq!(ctx.eflags_bits().names(), vec!["CF", "PF", "ZF", "IF"]);
    }

    #[test]
    fn test_short_context_is_rejected() {
        let bytes = synth_context();
        let loc = md::MINIDUMP_LOCATION_DESCRIPTOR {
            data_size: 100,
            rva: 0,
        };
        assert!(read_context(&bytes, &loc).is_none());
        let empty = md::MINIDUMP_LOCATION_DESCRIPTOR {
            data_size: 0,
            rva: 0,
        };
        assert!(read_context(&bytes, &empty).is_none());
    }

    #[test]
    fn test_xmm_extraction_gated_on_flags() {
        let mut bytes = synth_context();
        // xmm1 lives at float_save offset 176, context offset 256 + 176.
        bytes[432..448].copy_from_slice(&0xdead_beef_u128.to_le_bytes());
        let loc = md::MINIDUMP_LOCATION_DESCRIPTOR {
            data_size: bytes.len() as u32,
            rva: 0,
        };
        let ctx = read_context(&bytes, &loc).unwrap();
        assert_eq!(ctx.xmm(1), Some(0xdead_beef));
        assert_eq!(ctx.xmm(16), None);

        // Clear CONTEXT_FLOATING_POINT and the registers disappear.
        bytes[48..52].copy_from_slice(&0x0010_0003u32.to_le_bytes());
        let ctx = read_context(&bytes, &loc).unwrap();
        assert_eq!(ctx.xmm(1), None);
    }
}
