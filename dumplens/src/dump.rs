// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The parsed view of a whole minidump.

use std::io::{self, Write};
use std::path::Path;

use num_traits::FromPrimitive;
use scroll::ctx::SizeWith;
use scroll::{Pread, LE};
use tracing::warn;

use dumplens_common::format as md;
use dumplens_common::format::MINIDUMP_STREAM_TYPE;

use crate::read::{location_slice, read_string_utf16};
use crate::streams::*;

/// Fatal problems with the minidump container itself.
///
/// These are the only three ways parsing can fail; anything wrong with an
/// individual stream leaves that stream absent instead.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The blob is shorter than a header or does not start with the
    /// `MDMP` magic.
    #[error("Missing minidump signature (not a minidump?)")]
    InvalidSignature,
    /// The header could not be decoded after the magic validated.
    #[error("Unreadable minidump header")]
    InvalidHeader,
    /// The stream directory is truncated, out of range, or claims an
    /// implausible number of entries.
    #[error("Unreadable stream directory (heavily truncated minidump?)")]
    InvalidStreamDirectory,
}

/// A parsed, immutable view of a minidump.
///
/// Every stream is optional: a missing or undecodable stream is `None`,
/// and the rest of the dump remains usable. The dump borrows the caller's
/// byte blob for its lifetime; all derived values either own their data or
/// are resolved against the blob on demand.
#[derive(Debug)]
pub struct ParsedDump<'a> {
    data: &'a [u8],
    /// The raw minidump header.
    pub header: md::MINIDUMP_HEADER,
    /// Every directory entry, in file order, including types we do not
    /// decode.
    pub directory: Vec<md::MINIDUMP_DIRECTORY>,
    pub system_info: Option<SystemInfo>,
    pub misc_info: Option<MiscInfo>,
    pub exception: Option<Exception>,
    pub thread_list: Option<ThreadList>,
    pub module_list: Option<ModuleList>,
    pub memory_list: Option<MemoryList>,
    pub memory64_list: Option<Memory64List>,
    pub memory_info_list: Option<MemoryInfoList>,
    pub handle_data: Option<HandleData>,
    pub unloaded_module_list: Option<UnloadedModuleList>,
    pub thread_names: Option<ThreadNames>,
}

impl<'a> ParsedDump<'a> {
    /// Parse a minidump from `data`.
    pub fn parse(data: &'a [u8]) -> Result<ParsedDump<'a>, Error> {
        let header_size = md::MINIDUMP_HEADER::size_with(&LE);
        if data.len() < header_size {
            return Err(Error::InvalidSignature);
        }
        let magic: u32 = data.pread_with(0, LE).map_err(|_| Error::InvalidSignature)?;
        if magic != md::MINIDUMP_SIGNATURE {
            return Err(Error::InvalidSignature);
        }
        let header: md::MINIDUMP_HEADER =
            data.pread_with(0, LE).map_err(|_| Error::InvalidHeader)?;

        if header.stream_count > MAX_DIRECTORY_ENTRIES {
            return Err(Error::InvalidStreamDirectory);
        }
        let entry_size = md::MINIDUMP_DIRECTORY::size_with(&LE);
        let mut offset = header.stream_directory_rva as usize;
        let directory_end = (header.stream_count as usize)
            .checked_mul(entry_size)
            .and_then(|size| size.checked_add(offset))
            .ok_or(Error::InvalidStreamDirectory)?;
        if directory_end > data.len() {
            return Err(Error::InvalidStreamDirectory);
        }
        let mut directory = Vec::with_capacity(header.stream_count as usize);
        for _ in 0..header.stream_count {
            let entry: md::MINIDUMP_DIRECTORY = data
                .gread_with(&mut offset, LE)
                .map_err(|_| Error::InvalidStreamDirectory)?;
            directory.push(entry);
        }

        let mut dump = ParsedDump {
            data,
            header,
            directory,
            system_info: None,
            misc_info: None,
            exception: None,
            thread_list: None,
            module_list: None,
            memory_list: None,
            memory64_list: None,
            memory_info_list: None,
            handle_data: None,
            unloaded_module_list: None,
            thread_names: None,
        };

        for entry in &dump.directory {
            let location = entry.location;
            let Some(stream_type) = MINIDUMP_STREAM_TYPE::from_u32(entry.stream_type) else {
                continue;
            };
            match stream_type {
                MINIDUMP_STREAM_TYPE::SystemInfoStream => {
                    read_into(data, location, &mut dump.system_info)
                }
                MINIDUMP_STREAM_TYPE::MiscInfoStream => {
                    read_into(data, location, &mut dump.misc_info)
                }
                MINIDUMP_STREAM_TYPE::ExceptionStream => {
                    read_into(data, location, &mut dump.exception)
                }
                MINIDUMP_STREAM_TYPE::ThreadListStream => {
                    read_into(data, location, &mut dump.thread_list)
                }
                MINIDUMP_STREAM_TYPE::ModuleListStream => {
                    read_into(data, location, &mut dump.module_list)
                }
                MINIDUMP_STREAM_TYPE::MemoryListStream => {
                    read_into(data, location, &mut dump.memory_list)
                }
                MINIDUMP_STREAM_TYPE::Memory64ListStream => {
                    read_into(data, location, &mut dump.memory64_list)
                }
                MINIDUMP_STREAM_TYPE::MemoryInfoListStream => {
                    read_into(data, location, &mut dump.memory_info_list)
                }
                MINIDUMP_STREAM_TYPE::HandleDataStream => {
                    read_into(data, location, &mut dump.handle_data)
                }
                MINIDUMP_STREAM_TYPE::UnloadedModuleListStream => {
                    read_into(data, location, &mut dump.unloaded_module_list)
                }
                MINIDUMP_STREAM_TYPE::ThreadNamesStream => {
                    read_into(data, location, &mut dump.thread_names)
                }
                MINIDUMP_STREAM_TYPE::UnusedStream => {}
            }
        }

        // Attach the service-pack string to the system info.
        if let Some(info) = &mut dump.system_info {
            if info.raw.csd_version_rva != 0 {
                let mut offset = info.raw.csd_version_rva as usize;
                info.csd_version = read_string_utf16(&mut offset, data);
            }
        }

        // Attach thread names to their threads.
        if let (Some(threads), Some(names)) = (&mut dump.thread_list, &dump.thread_names) {
            for thread in &mut threads.threads {
                thread.name = names.get_name(thread.raw.thread_id).map(String::from);
            }
        }

        Ok(dump)
    }

    /// The blob this dump was parsed from.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The raw contents of the stream with type `stream_type`, decoded or
    /// not.
    pub fn raw_stream(&self, stream_type: u32) -> Option<&'a [u8]> {
        self.directory
            .iter()
            .find(|entry| entry.stream_type == stream_type)
            .and_then(|entry| location_slice(self.data, &entry.location))
    }

    /// The thread that raised the exception, if both streams are present.
    pub fn faulting_thread(&self) -> Option<&Thread> {
        let exception = self.exception.as_ref()?;
        self.thread_list
            .as_ref()?
            .get_thread(exception.thread_id())
    }

    /// The name of thread `thread_id`, if the dump recorded one.
    pub fn thread_name(&self, thread_id: u32) -> Option<&str> {
        self.thread_names.as_ref()?.get_name(thread_id)
    }

    /// The loaded module whose address range contains `addr`.
    pub fn module_containing(&self, addr: u64) -> Option<&Module> {
        self.module_list.as_ref()?.module_at_address(addr)
    }

    /// A display token for `addr`: `"<module>+0x<offset>"` when a loaded
    /// module contains it, a zero-padded hex address otherwise.
    pub fn resolve(&self, addr: u64) -> String {
        match self.module_containing(addr) {
            Some(module) => format!(
                "{}+0x{:x}",
                module.short_name(),
                addr - module.base_address()
            ),
            None => format!("0x{addr:016x}"),
        }
    }

    /// The largest available slice of captured memory starting at `addr`,
    /// at most `n` bytes. Tries the Memory64 list first, then the memory
    /// list.
    pub fn read_at(&self, addr: u64, n: usize) -> Option<&'a [u8]> {
        if let Some(list) = &self.memory64_list {
            if let Some(bytes) = list.read_at(self.data, addr, n) {
                return Some(bytes);
            }
        }
        self.memory_list
            .as_ref()
            .and_then(|list| list.read_at(self.data, addr, n))
    }

    /// Write a human-readable header/directory summary to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MINIDUMP_HEADER")?;
        writeln!(f, "  version             = {:#x}", self.header.version)?;
        writeln!(f, "  stream_count        = {}", self.header.stream_count)?;
        writeln!(
            f,
            "  time_date_stamp     = {:#x}",
            self.header.time_date_stamp
        )?;
        writeln!(f, "  flags               = {:#x}\n", self.header.flags)?;
        for (i, entry) in self.directory.iter().enumerate() {
            let name = match MINIDUMP_STREAM_TYPE::from_u32(entry.stream_type) {
                Some(known) => format!("{known:?}"),
                None => format!("{:#x}", entry.stream_type),
            };
            writeln!(
                f,
                "  stream[{}] = {} ({} bytes at {:#x})",
                i, name, entry.location.data_size, entry.location.rva
            )?;
        }
        writeln!(f)
    }
}

/// Decode one stream, warning when a duplicate overwrites an earlier one.
fn read_into<S: DumpStream + std::fmt::Debug>(
    data: &[u8],
    location: md::MINIDUMP_LOCATION_DESCRIPTOR,
    slot: &mut Option<S>,
) {
    if slot.is_some() {
        warn!(
            "duplicate {:?} stream, keeping the later one",
            S::STREAM_TYPE
        );
    }
    match S::read(data, location) {
        Some(stream) => *slot = Some(stream),
        None => warn!("failed to read {:?} stream", S::STREAM_TYPE),
    }
}

/// Map the file at `path` into memory for parsing.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mapping = dumplens::map_file("crash.dmp")?;
/// let dump = dumplens::ParsedDump::parse(&mapping)?;
/// # Ok(())
/// # }
/// ```
pub fn map_file<P: AsRef<Path>>(path: P) -> io::Result<memmap2::Mmap> {
    let file = std::fs::File::open(path)?;
    // Safety: the mapping is read-only and we never hand out mutable
    // access to it.
    unsafe { memmap2::Mmap::map(&file) }
}
