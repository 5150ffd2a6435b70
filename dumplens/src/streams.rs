// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Typed decoders for the individual minidump streams.
//!
//! Every decoder takes the full dump blob plus the stream's directory
//! location and returns `None` on any invariant violation: an out-of-range
//! RVA, a count above its documented cap, a record that does not fit.
//! Stream-level failure never fails the dump; the orchestrator records the
//! stream as absent and moves on.

use std::borrow::Cow;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::io::{self, Write};

use debugid::DebugId;
use num_traits::FromPrimitive;
use range_map::{Range, RangeMap};
use scroll::ctx::SizeWith;
use scroll::{Pread, LE};
use tracing::warn;
use uuid::Uuid;

use dumplens_common::format as md;
use dumplens_common::format::MINIDUMP_STREAM_TYPE;
use dumplens_common::nt_status;
use dumplens_common::traits::IntoRangeMapSafe;

use crate::context::read_context;
use crate::read::{
    location_slice, read_string_utf16, read_string_utf16_fixed, slice_at, Cursor,
};

/// Caps applied to untrusted counts before any allocation. A count above
/// its cap fails the stream, never the dump.
pub const MAX_DIRECTORY_ENTRIES: u32 = 1_000;
pub const MAX_THREADS: u32 = 10_000;
pub const MAX_MODULES: u32 = 50_000;
pub const MAX_UNLOADED_MODULES: u32 = 10_000;
pub const MAX_HANDLES: u32 = 100_000;
pub const MAX_MEMORY_REGIONS: u64 = 100_000;
pub const MAX_MEMORY_INFOS: u64 = 1_000_000;
pub const MAX_THREAD_NAMES: u32 = 50_000;
/// `EXCEPTION_MAXIMUM_PARAMETERS`.
pub const MAX_EXCEPTION_PARAMS: u32 = 15;

/// A typed minidump stream.
///
/// `read` decodes the stream from the full dump blob and the stream's
/// directory location; it returns `None` on any failure.
pub trait DumpStream: Sized {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self>;
}

/// Read a `u32`-count-prefixed list of fixed-size records, capping the
/// count before allocating.
fn read_stream_list<'a, T>(bytes: &'a [u8], cap: u32) -> Option<Vec<T>>
where
    T: scroll::ctx::TryFromCtx<'a, scroll::Endian, Error = scroll::Error>
        + SizeWith<scroll::Endian>,
{
    let mut offset = 0;
    let count: u32 = bytes.gread_with(&mut offset, LE).ok()?;
    if count > cap {
        warn!("stream claims {} entries, cap is {}", count, cap);
        return None;
    }
    let expected = (count as usize)
        .checked_mul(T::size_with(&LE))?
        .checked_add(offset)?;
    if bytes.len() < expected {
        return None;
    }
    (0..count)
        .map(|_| bytes.gread_with(&mut offset, LE).ok())
        .collect()
}

fn format_time_t(t: u32) -> String {
    time::OffsetDateTime::from_unix_timestamp(t as i64)
        .ok()
        .and_then(|datetime| {
            datetime
                .format(&time::format_description::well_known::Rfc3339)
                .ok()
        })
        .unwrap_or_default()
}

/// The file-name part of a module path: everything after the last `\` or
/// `/`.
pub fn short_module_name(name: &str) -> &str {
    name.rsplit(|c| c == '\\' || c == '/').next().unwrap_or(name)
}

//======================================================
// SystemInfo

/// Information about the system that wrote the minidump.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// The raw stream contents.
    pub raw: md::MINIDUMP_SYSTEM_INFO,
    /// The decoded processor architecture, `PROCESSOR_ARCHITECTURE_UNKNOWN`
    /// for values outside the closed set.
    pub arch: md::ProcessorArchitecture,
    /// The decoded platform id; `None` for anything but the three
    /// canonical Win32 ids.
    pub platform: Option<md::PlatformId>,
    pub product: Option<md::ProductType>,
    /// The service-pack string, attached by the orchestrator from
    /// `csd_version_rva`.
    pub csd_version: Option<String>,
}

impl DumpStream for SystemInfo {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::SystemInfoStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let raw: md::MINIDUMP_SYSTEM_INFO = bytes.pread_with(0, LE).ok()?;
        let arch = md::ProcessorArchitecture::from_u16(raw.processor_architecture)
            .unwrap_or(md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_UNKNOWN);
        let platform = md::PlatformId::from_u32(raw.platform_id);
        let product = md::ProductType::from_u8(raw.product_type);
        Some(SystemInfo {
            raw,
            arch,
            platform,
            product,
            csd_version: None,
        })
    }
}

impl SystemInfo {
    /// Whether the CPU union carries the x86-style vendor/version layout.
    pub fn is_x86_family(&self) -> bool {
        use md::ProcessorArchitecture::*;
        matches!(
            self.arch,
            PROCESSOR_ARCHITECTURE_INTEL
                | PROCESSOR_ARCHITECTURE_AMD64
                | PROCESSOR_ARCHITECTURE_IA32_ON_WIN64
                | PROCESSOR_ARCHITECTURE_IA32_ON_ARM64
        )
    }

    /// A marketing name for the OS version, derived from
    /// major/minor/build.
    pub fn os_name(&self) -> String {
        let (major, minor, build) = (
            self.raw.major_version,
            self.raw.minor_version,
            self.raw.build_number,
        );
        match (major, minor) {
            (10, 0) if build >= 22000 => "Windows 11".to_string(),
            (10, 0) => "Windows 10".to_string(),
            (6, 3) => "Windows 8.1".to_string(),
            (6, 2) => "Windows 8".to_string(),
            (6, 1) => "Windows 7".to_string(),
            (6, 0) => "Windows Vista".to_string(),
            (5, 2) => "Windows Server 2003/XP x64".to_string(),
            (5, 1) => "Windows XP".to_string(),
            (5, 0) => "Windows 2000".to_string(),
            _ => format!("Windows {major}.{minor}"),
        }
    }

    /// The CPUID vendor string ("GenuineIntel", "AuthenticAMD", ...), for
    /// x86-family dumps.
    pub fn cpu_vendor(&self) -> Option<String> {
        if !self.is_x86_family() {
            return None;
        }
        let info = self.raw.cpu.as_x86();
        let mut bytes = Vec::with_capacity(12);
        for word in info.vendor_id {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Display (family, model, stepping), using the CPUID extended fields
    /// the way Intel documents them: the extended family is added when the
    /// base family is 15, and the extended model is prepended when the
    /// base family is 6 or 15.
    pub fn cpu_version(&self) -> Option<(u32, u32, u32)> {
        if !self.is_x86_family() {
            return None;
        }
        let eax = self.raw.cpu.as_x86().version_information;
        let stepping = eax & 0xf;
        let base_model = (eax >> 4) & 0xf;
        let base_family = (eax >> 8) & 0xf;
        let ext_model = (eax >> 16) & 0xf;
        let ext_family = (eax >> 20) & 0xff;
        let family = if base_family == 15 {
            base_family + ext_family
        } else {
            base_family
        };
        let model = if base_family == 6 || base_family == 15 {
            (ext_model << 4) + base_model
        } else {
            base_model
        };
        Some((family, model, stepping))
    }

    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MINIDUMP_SYSTEM_INFO")?;
        writeln!(f, "  processor_architecture = {:?}", self.arch)?;
        writeln!(f, "  number_of_processors   = {}", self.raw.number_of_processors)?;
        writeln!(
            f,
            "  os                     = {} ({}.{}.{})",
            self.os_name(),
            self.raw.major_version,
            self.raw.minor_version,
            self.raw.build_number
        )?;
        writeln!(f, "  platform_id            = {:?}", self.platform)?;
        if let Some(vendor) = self.cpu_vendor() {
            let (family, model, stepping) = self.cpu_version().unwrap();
            writeln!(
                f,
                "  cpu                    = {vendor} family {family} model {model} stepping {stepping}"
            )?;
        }
        if let Some(csd) = &self.csd_version {
            writeln!(f, "  csd_version            = \"{csd}\"")?;
        }
        writeln!(f)
    }
}

//======================================================
// MiscInfo

/// Miscellaneous information about the dumped process.
///
/// Every field after `flags` is gated by a bit in `flags`; fields whose
/// gate is clear are `None`.
#[derive(Debug, Clone, Default)]
pub struct MiscInfo {
    pub size_of_info: u32,
    pub flags: md::MiscInfoFlags,
    pub process_id: Option<u32>,
    /// Process creation time, seconds since the unix epoch.
    pub process_create_time: Option<u32>,
    pub process_user_time: Option<u32>,
    pub process_kernel_time: Option<u32>,
    pub processor_max_mhz: Option<u32>,
    pub processor_current_mhz: Option<u32>,
    pub processor_mhz_limit: Option<u32>,
    pub processor_max_idle_state: Option<u32>,
    pub processor_current_idle_state: Option<u32>,
    pub process_integrity_level: Option<u32>,
    pub process_execute_flags: Option<u32>,
    pub protected_process: Option<u32>,
    pub time_zone_id: Option<u32>,
    pub time_zone_bias: Option<i32>,
    pub standard_name: Option<String>,
    pub daylight_name: Option<String>,
    pub build_string: Option<String>,
    pub dbg_build_string: Option<String>,
}

impl DumpStream for MiscInfo {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::MiscInfoStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let rva = location.rva as usize;
        let size_of_info: u32 = all.pread_with(rva, LE).ok()?;
        if size_of_info < 24 {
            return None;
        }
        // The directory entry's size is not always trustworthy here;
        // size_of_info is authoritative as long as it stays in the blob.
        let bytes = slice_at(all, rva, size_of_info as usize)?;
        let flags = md::MiscInfoFlags::from_bits_truncate(bytes.pread_with(4, LE).ok()?);
        let mut info = MiscInfo {
            size_of_info,
            flags,
            ..MiscInfo::default()
        };
        use md::MiscInfoFlags as F;
        if flags.contains(F::MINIDUMP_MISC1_PROCESS_ID) {
            info.process_id = bytes.pread_with(8, LE).ok();
        }
        if flags.contains(F::MINIDUMP_MISC1_PROCESS_TIMES) {
            info.process_create_time = bytes.pread_with(12, LE).ok();
            info.process_user_time = bytes.pread_with(16, LE).ok();
            info.process_kernel_time = bytes.pread_with(20, LE).ok();
        }
        if flags.contains(F::MINIDUMP_MISC1_PROCESSOR_POWER_INFO) && size_of_info >= 44 {
            info.processor_max_mhz = bytes.pread_with(24, LE).ok();
            info.processor_current_mhz = bytes.pread_with(28, LE).ok();
            info.processor_mhz_limit = bytes.pread_with(32, LE).ok();
            info.processor_max_idle_state = bytes.pread_with(36, LE).ok();
            info.processor_current_idle_state = bytes.pread_with(40, LE).ok();
        }
        if flags.contains(F::MINIDUMP_MISC3_PROCESS_INTEGRITY) && size_of_info >= 232 {
            info.process_integrity_level = bytes.pread_with(44, LE).ok();
        }
        if flags.contains(F::MINIDUMP_MISC3_PROCESS_EXECUTE_FLAGS) {
            info.process_execute_flags = bytes.pread_with(48, LE).ok();
        }
        if flags.contains(F::MINIDUMP_MISC3_PROTECTED_PROCESS) {
            info.protected_process = bytes.pread_with(52, LE).ok();
        }
        if flags.contains(F::MINIDUMP_MISC3_TIMEZONE) {
            info.time_zone_id = bytes.pread_with(56, LE).ok();
            info.time_zone_bias = bytes.pread_with(60, LE).ok();
            info.standard_name = read_string_utf16_fixed(bytes, 64, 64);
            info.daylight_name = read_string_utf16_fixed(bytes, 196, 64);
        }
        if flags.contains(F::MINIDUMP_MISC4_BUILDSTRING) && size_of_info >= 1128 {
            info.build_string = read_string_utf16_fixed(bytes, 232, 520);
            info.dbg_build_string = read_string_utf16_fixed(bytes, 752, 80);
        }
        Some(info)
    }
}

impl MiscInfo {
    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MINIDUMP_MISC_INFO")?;
        writeln!(f, "  size_of_info = {}", self.size_of_info)?;
        writeln!(f, "  flags1       = {:#x}", self.flags.bits())?;
        if let Some(pid) = self.process_id {
            writeln!(f, "  process_id   = {pid}")?;
        }
        if let Some(t) = self.process_create_time {
            writeln!(f, "  create_time  = {:#x} {}", t, format_time_t(t))?;
        }
        if let Some(level) = self.process_integrity_level {
            writeln!(f, "  integrity    = {level:#x}")?;
        }
        if let Some(tz) = &self.standard_name {
            writeln!(f, "  time_zone    = \"{tz}\"")?;
        }
        if let Some(build) = &self.build_string {
            writeln!(f, "  build_string = \"{build}\"")?;
        }
        writeln!(f)
    }
}

//======================================================
// Exception

/// The exception that caused this dump to be written.
#[derive(Debug, Clone)]
pub struct Exception {
    pub raw: md::MINIDUMP_EXCEPTION_STREAM,
    /// The CPU context at the point of the exception, when it decodes as
    /// AMD64. Prefer this over the faulting thread's own context: it
    /// points at the faulting instruction rather than the exception
    /// handling machinery.
    pub context: Option<md::CONTEXT_AMD64>,
}

impl DumpStream for Exception {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::ExceptionStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let raw: md::MINIDUMP_EXCEPTION_STREAM = bytes.pread_with(0, LE).ok()?;
        let context = read_context(all, &raw.thread_context);
        Some(Exception { raw, context })
    }
}

impl Exception {
    pub fn thread_id(&self) -> u32 {
        self.raw.thread_id
    }

    pub fn code(&self) -> u32 {
        self.raw.exception_record.exception_code
    }

    pub fn address(&self) -> u64 {
        self.raw.exception_record.exception_address
    }

    /// The valid exception parameters, with the count clamped to
    /// [`MAX_EXCEPTION_PARAMS`].
    pub fn parameters(&self) -> &[u64] {
        let n = (self.raw.exception_record.number_parameters as usize)
            .min(MAX_EXCEPTION_PARAMS as usize);
        &self.raw.exception_record.exception_information[..n]
    }

    /// The symbolic name of the exception code.
    pub fn code_name(&self) -> Cow<'static, str> {
        nt_status::name(self.code())
    }

    /// The reference description of the exception code.
    pub fn code_description(&self) -> &'static str {
        nt_status::description(self.code())
    }

    /// For access violations with both parameters present, a
    /// human-readable sentence naming the operation and the fault address.
    pub fn access_violation_details(&self) -> Option<String> {
        if self.code() != nt_status::NtStatus::STATUS_ACCESS_VIOLATION as u32 {
            return None;
        }
        let params = self.parameters();
        if params.len() < 2 {
            return None;
        }
        let operation = match params[0] {
            0 => "reading from",
            1 => "writing to",
            8 => "executing",
            _ => "accessing",
        };
        Some(format!(
            "The instruction at 0x{:016X} tried {} address 0x{:016X}",
            self.address(),
            operation,
            params[1]
        ))
    }

    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MINIDUMP_EXCEPTION_STREAM")?;
        writeln!(f, "  thread_id         = {:#x}", self.thread_id())?;
        writeln!(
            f,
            "  exception_code    = {:#x} ({})",
            self.code(),
            self.code_name()
        )?;
        writeln!(
            f,
            "  exception_flags   = {:#x}",
            self.raw.exception_record.exception_flags
        )?;
        writeln!(f, "  exception_address = {:#018x}", self.address())?;
        for (i, param) in self.parameters().iter().enumerate() {
            writeln!(f, "  parameter[{i}]      = {param:#x}")?;
        }
        if let Some(details) = self.access_violation_details() {
            writeln!(f, "  ({details})")?;
        }
        writeln!(f)
    }
}

//======================================================
// Threads

/// The state of a single thread at the time of the dump.
#[derive(Debug, Clone)]
pub struct Thread {
    pub raw: md::MINIDUMP_THREAD,
    /// The thread's CPU context, when it decodes as AMD64.
    pub context: Option<md::CONTEXT_AMD64>,
    /// The thread's name, attached by the orchestrator from the
    /// thread-names stream.
    pub name: Option<String>,
}

impl Thread {
    pub fn id(&self) -> u32 {
        self.raw.thread_id
    }

    /// The lowest address of the captured stack memory.
    pub fn stack_base(&self) -> u64 {
        self.raw.stack.start_of_memory_range
    }

    /// One past the highest address of the captured stack memory
    /// (saturating).
    pub fn stack_end(&self) -> u64 {
        self.raw
            .stack
            .start_of_memory_range
            .saturating_add(self.raw.stack.memory.data_size as u64)
    }

    /// Whether the thread record pointed at a context at all, decoded or
    /// not. Contexts of non-AMD64 widths are noted but not decoded.
    pub fn has_context_location(&self) -> bool {
        self.raw.thread_context.data_size > 0
    }
}

/// The list of threads from the dumped process.
#[derive(Debug, Clone, Default)]
pub struct ThreadList {
    /// The threads, in the order they appear in the dump.
    pub threads: Vec<Thread>,
    /// Map of thread id to index in `threads`.
    thread_ids: HashMap<u32, usize>,
}

impl DumpStream for ThreadList {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::ThreadListStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let raw_threads: Vec<md::MINIDUMP_THREAD> = read_stream_list(bytes, MAX_THREADS)?;
        let threads: Vec<_> = raw_threads
            .into_iter()
            .map(|raw| {
                // An unreadable context leaves the thread in place.
                let context = read_context(all, &raw.thread_context);
                Thread {
                    raw,
                    context,
                    name: None,
                }
            })
            .collect();
        let thread_ids = threads
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id(), i))
            .collect();
        Some(ThreadList {
            threads,
            thread_ids,
        })
    }
}

impl ThreadList {
    /// The thread with id `id`, if present.
    pub fn get_thread(&self, id: u32) -> Option<&Thread> {
        self.thread_ids.get(&id).map(|&idx| &self.threads[idx])
    }

    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MinidumpThreadList")?;
        writeln!(f, "  thread_count = {}\n", self.threads.len())?;
        for (i, thread) in self.threads.iter().enumerate() {
            writeln!(f, "thread[{i}]")?;
            writeln!(f, "  thread_id     = {:#x}", thread.id())?;
            if let Some(name) = &thread.name {
                writeln!(f, "  name          = \"{name}\"")?;
            }
            writeln!(f, "  suspend_count = {}", thread.raw.suspend_count)?;
            writeln!(f, "  priority      = {}", thread.raw.priority)?;
            writeln!(f, "  teb           = {:#x}", thread.raw.teb)?;
            writeln!(
                f,
                "  stack         = {:#x}..{:#x}",
                thread.stack_base(),
                thread.stack_end()
            )?;
            if let Some(ctx) = &thread.context {
                writeln!(f, "  rip           = {:#018x}", ctx.rip)?;
                writeln!(f, "  rsp           = {:#018x}", ctx.rsp)?;
                writeln!(f, "  rbp           = {:#018x}", ctx.rbp)?;
                writeln!(
                    f,
                    "  eflags        = {:#x} [{}]",
                    ctx.eflags,
                    ctx.eflags_bits().names().join(" ")
                )?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

//======================================================
// Modules

/// CodeView debug information attached to a module.
#[derive(Debug, Clone)]
pub enum CodeView {
    /// PDB 7.0 ("RSDS") data, the common case.
    Pdb70(md::CV_INFO_PDB70),
    /// PDB 2.0 ("NB10") data from older toolchains.
    Pdb20(md::CV_INFO_PDB20),
}

/// An executable or shared library loaded in the process.
#[derive(Debug, Clone)]
pub struct Module {
    pub raw: md::MINIDUMP_MODULE,
    /// The module's path, stored separately in the dump. Empty when the
    /// name RVA does not resolve.
    pub name: String,
    pub codeview: Option<CodeView>,
}

impl Module {
    pub fn base_address(&self) -> u64 {
        self.raw.base_of_image
    }

    pub fn size(&self) -> u64 {
        self.raw.size_of_image as u64
    }

    /// One past the last address of the module (saturating on overflow).
    pub fn end_address(&self) -> u64 {
        self.base_address().saturating_add(self.size())
    }

    /// The file-name part of the module path.
    pub fn short_name(&self) -> &str {
        short_module_name(&self.name)
    }

    /// The file version from the embedded `VS_FIXEDFILEINFO`, when its
    /// signature validates.
    pub fn version(&self) -> Option<String> {
        let vi = &self.raw.version_info;
        if vi.signature != md::VS_FFI_SIGNATURE || vi.struct_version != md::VS_FFI_STRUCVERSION {
            return None;
        }
        Some(format!(
            "{}.{}.{}.{}",
            vi.file_version_hi >> 16,
            vi.file_version_hi & 0xffff,
            vi.file_version_lo >> 16,
            vi.file_version_lo & 0xffff
        ))
    }

    /// The PDB filename from the CodeView record.
    pub fn debug_file(&self) -> Option<String> {
        let name_bytes = match &self.codeview {
            Some(CodeView::Pdb70(raw)) => &raw.pdb_file_name,
            Some(CodeView::Pdb20(raw)) => &raw.pdb_file_name,
            None => return None,
        };
        let end = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        Some(String::from_utf8_lossy(&name_bytes[..end]).into_owned())
    }

    /// The debug identifier matching this module's PDB.
    pub fn debug_identifier(&self) -> Option<DebugId> {
        match &self.codeview {
            Some(CodeView::Pdb70(raw)) => {
                let uuid = Uuid::from_fields(
                    raw.signature.data1,
                    raw.signature.data2,
                    raw.signature.data3,
                    &raw.signature.data4,
                );
                (!uuid.is_nil()).then(|| DebugId::from_parts(uuid, raw.age))
            }
            Some(CodeView::Pdb20(raw)) => Some(DebugId::from_pdb20(raw.signature, raw.age)),
            None => None,
        }
    }

    fn memory_range(&self) -> Option<Range<u64>> {
        if self.size() == 0 {
            return None;
        }
        Some(Range::new(self.base_address(), self.end_address() - 1))
    }
}

/// Attempt to read a CodeView record for `raw`.
fn read_codeview(all: &[u8], raw: &md::MINIDUMP_MODULE) -> Option<CodeView> {
    // Records smaller than an RSDS header can't carry anything we decode.
    if raw.cv_record.data_size < 24 {
        return None;
    }
    let bytes = location_slice(all, &raw.cv_record)?;
    let signature: u32 = bytes.pread_with(0, LE).ok()?;
    match md::CvSignature::from_u32(signature) {
        Some(md::CvSignature::Pdb70) => Some(CodeView::Pdb70(bytes.pread_with(0, LE).ok()?)),
        Some(md::CvSignature::Pdb20) => Some(CodeView::Pdb20(bytes.pread_with(0, LE).ok()?)),
        None => None,
    }
}

/// The list of loaded modules, with an address index.
#[derive(Debug, Clone)]
pub struct ModuleList {
    /// The modules, in the order they appear in the dump.
    pub modules: Vec<Module>,
    modules_by_addr: RangeMap<u64, usize>,
}

impl DumpStream for ModuleList {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::ModuleListStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let raw_modules: Vec<md::MINIDUMP_MODULE> = read_stream_list(bytes, MAX_MODULES)?;
        let modules: Vec<_> = raw_modules
            .into_iter()
            .map(|raw| {
                let mut offset = raw.module_name_rva as usize;
                let name = read_string_utf16(&mut offset, all).unwrap_or_default();
                let codeview = read_codeview(all, &raw);
                Module {
                    raw,
                    name,
                    codeview,
                }
            })
            .collect();
        Some(ModuleList::from_modules(modules))
    }
}

impl Default for ModuleList {
    fn default() -> ModuleList {
        ModuleList::from_modules(vec![])
    }
}

impl ModuleList {
    pub fn from_modules(modules: Vec<Module>) -> ModuleList {
        let modules_by_addr = modules
            .iter()
            .enumerate()
            .map(|(i, module)| (module.memory_range(), i))
            .into_rangemap_safe();
        ModuleList {
            modules,
            modules_by_addr,
        }
    }

    /// The module whose address range contains `addr`.
    pub fn module_at_address(&self, addr: u64) -> Option<&Module> {
        self.modules_by_addr.get(addr).map(|&idx| &self.modules[idx])
    }

    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MinidumpModuleList")?;
        writeln!(f, "  module_count = {}\n", self.modules.len())?;
        for (i, module) in self.modules.iter().enumerate() {
            writeln!(f, "module[{i}]")?;
            writeln!(f, "  base_of_image   = {:#018x}", module.base_address())?;
            writeln!(f, "  size_of_image   = {:#x}", module.size())?;
            writeln!(
                f,
                "  time_date_stamp = {:#x} {}",
                module.raw.time_date_stamp,
                format_time_t(module.raw.time_date_stamp)
            )?;
            writeln!(f, "  name            = \"{}\"", module.name)?;
            if let Some(version) = module.version() {
                writeln!(f, "  version         = {version}")?;
            }
            if let Some(debug_file) = module.debug_file() {
                writeln!(f, "  debug_file      = \"{debug_file}\"")?;
            }
            if let Some(id) = module.debug_identifier() {
                writeln!(f, "  debug_id        = {}", id.breakpad())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

//======================================================
// Memory

/// A region of the process' memory captured in the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// The base address in the process' address space.
    pub base: u64,
    /// The region size in bytes.
    pub size: u64,
    /// Where the region's bytes live in the dump file.
    pub file_offset: u64,
}

impl MemoryRegion {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base.saturating_add(self.size)
    }

    /// The largest slice of this region's bytes starting at `addr`, at
    /// most `n` bytes, clamped to both the region and the blob.
    fn read_at<'a>(&self, all: &'a [u8], addr: u64, n: usize) -> Option<&'a [u8]> {
        let offset_in_region = addr.checked_sub(self.base)?;
        let remaining = self.size.checked_sub(offset_in_region)?;
        let take = (n as u64).min(remaining);
        let file_start = usize::try_from(self.file_offset.checked_add(offset_in_region)?).ok()?;
        let file_end = file_start
            .checked_add(usize::try_from(take).ok()?)?
            .min(all.len());
        all.get(file_start..file_end)
    }
}

/// The list of small memory excerpts from the MemoryList stream.
#[derive(Debug, Clone, Default)]
pub struct MemoryList {
    pub regions: Vec<MemoryRegion>,
}

impl DumpStream for MemoryList {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::MemoryListStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let raw: Vec<md::MINIDUMP_MEMORY_DESCRIPTOR> =
            read_stream_list(bytes, MAX_MEMORY_REGIONS as u32)?;
        let regions = raw
            .into_iter()
            .map(|desc| MemoryRegion {
                base: desc.start_of_memory_range,
                size: desc.memory.data_size as u64,
                file_offset: desc.memory.rva as u64,
            })
            .collect();
        Some(MemoryList { regions })
    }
}

impl MemoryList {
    pub fn read_at<'a>(&self, all: &'a [u8], addr: u64, n: usize) -> Option<&'a [u8]> {
        self.regions
            .iter()
            .find(|r| r.contains(addr))
            .and_then(|r| r.read_at(all, addr, n))
    }
}

/// The list of full memory ranges from the Memory64List stream.
///
/// Region bytes are stored back-to-back starting at the stream's base RVA;
/// the file offset of region `k` is the base RVA plus the sizes of the
/// regions before it. Offset accumulation is overflow-checked: on overflow
/// the iteration stops and the regions parsed so far are kept.
#[derive(Debug, Clone)]
pub struct Memory64List {
    pub regions: Vec<MemoryRegion>,
    regions_by_addr: RangeMap<u64, usize>,
}

impl DumpStream for Memory64List {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::Memory64ListStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let mut cursor = Cursor::new(bytes);
        let count = cursor.u64()?;
        if count > MAX_MEMORY_REGIONS {
            warn!("Memory64List claims {} regions, cap is {}", count, MAX_MEMORY_REGIONS);
            return None;
        }
        let base_rva = cursor.u64()?;
        let descriptor_size = md::MINIDUMP_MEMORY_DESCRIPTOR64::size_with(&LE);
        let expected = (count as usize)
            .checked_mul(descriptor_size)?
            .checked_add(cursor.position())?;
        if bytes.len() < expected {
            return None;
        }

        let mut regions = Vec::with_capacity(count as usize);
        let mut file_offset = base_rva;
        for _ in 0..count {
            let desc: md::MINIDUMP_MEMORY_DESCRIPTOR64 = cursor
                .bytes(descriptor_size)?
                .pread_with(0, LE)
                .ok()?;
            regions.push(MemoryRegion {
                base: desc.start_of_memory_range,
                size: desc.data_size,
                file_offset,
            });
            file_offset = match file_offset.checked_add(desc.data_size) {
                Some(next) => next,
                None => {
                    warn!("Memory64List file offsets overflow, keeping {} regions", regions.len());
                    break;
                }
            };
        }
        Some(Memory64List::from_regions(regions))
    }
}

impl Default for Memory64List {
    fn default() -> Memory64List {
        Memory64List::from_regions(vec![])
    }
}

impl Memory64List {
    pub fn from_regions(regions: Vec<MemoryRegion>) -> Memory64List {
        let regions_by_addr = regions
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let range = (r.size > 0)
                    .then(|| Range::new(r.base, r.base.saturating_add(r.size) - 1));
                (range, i)
            })
            .into_rangemap_safe();
        Memory64List {
            regions,
            regions_by_addr,
        }
    }

    /// The region containing `addr`.
    pub fn region_containing(&self, addr: u64) -> Option<&MemoryRegion> {
        self.regions_by_addr.get(addr).map(|&idx| &self.regions[idx])
    }

    /// The largest available slice of dump memory starting at `addr`, at
    /// most `n` bytes.
    pub fn read_at<'a>(&self, all: &'a [u8], addr: u64, n: usize) -> Option<&'a [u8]> {
        self.region_containing(addr)
            .and_then(|r| r.read_at(all, addr, n))
    }

    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MinidumpMemory64List")?;
        writeln!(f, "  region_count = {}\n", self.regions.len())?;
        for (i, region) in self.regions.iter().enumerate() {
            writeln!(
                f,
                "  region[{}] = {:#018x}..{:#018x} ({} bytes at file offset {:#x})",
                i,
                region.base,
                region.base.saturating_add(region.size),
                region.size,
                region.file_offset
            )?;
        }
        writeln!(f)
    }
}

//======================================================
// MemoryInfo

/// Metadata about one region of the process' address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryInfo {
    pub raw: md::MINIDUMP_MEMORY_INFO,
    pub allocation_protection: md::MemoryProtection,
    pub state: md::MemoryState,
    pub protection: md::MemoryProtection,
    pub ty: md::MemoryType,
}

impl MemoryInfo {
    pub fn is_committed(&self) -> bool {
        self.state.contains(md::MemoryState::MEM_COMMIT)
    }

    /// The compact protection string, e.g. `"RWX+G"`.
    pub fn protection_shortform(&self) -> String {
        self.protection.shortform()
    }
}

/// The memory-info list stream.
#[derive(Debug, Clone, Default)]
pub struct MemoryInfoList {
    pub infos: Vec<MemoryInfo>,
}

impl DumpStream for MemoryInfoList {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::MemoryInfoListStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let header: md::MINIDUMP_MEMORY_INFO_LIST = bytes.pread_with(0, LE).ok()?;
        let entry_size = md::MINIDUMP_MEMORY_INFO::size_with(&LE);
        if (header.size_of_header as usize) < md::MINIDUMP_MEMORY_INFO_LIST::size_with(&LE)
            || (header.size_of_entry as usize) < entry_size
        {
            return None;
        }
        if header.number_of_entries > MAX_MEMORY_INFOS {
            warn!(
                "MemoryInfoList claims {} entries, cap is {}",
                header.number_of_entries, MAX_MEMORY_INFOS
            );
            return None;
        }
        let count = header.number_of_entries as usize;
        let expected = count
            .checked_mul(header.size_of_entry as usize)?
            .checked_add(header.size_of_header as usize)?;
        if bytes.len() < expected {
            return None;
        }
        let infos = (0..count)
            .map(|i| {
                let offset = header.size_of_header as usize + i * header.size_of_entry as usize;
                let raw: md::MINIDUMP_MEMORY_INFO = bytes.pread_with(offset, LE).ok()?;
                Some(MemoryInfo {
                    allocation_protection: md::MemoryProtection::from_bits_truncate(
                        raw.allocation_protection,
                    ),
                    state: md::MemoryState::from_bits_truncate(raw.state),
                    protection: md::MemoryProtection::from_bits_truncate(raw.protection),
                    ty: md::MemoryType::from_bits_truncate(raw._type),
                    raw,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(MemoryInfoList { infos })
    }
}

impl MemoryInfoList {
    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MinidumpMemoryInfoList")?;
        writeln!(f, "  info_count = {}\n", self.infos.len())?;
        for info in &self.infos {
            writeln!(
                f,
                "  {:#018x} +{:#10x} state={:?} type={:?} protect={}",
                info.raw.base_address,
                info.raw.region_size,
                info.state,
                info.ty,
                info.protection_shortform()
            )?;
        }
        writeln!(f)
    }
}

//======================================================
// Handles

/// The raw descriptor behind a [`HandleEntry`], in whichever of the two
/// layouts the dump used.
#[derive(Debug, Clone)]
pub enum RawHandleDescriptor {
    V1(md::MINIDUMP_HANDLE_DESCRIPTOR),
    V2(md::MINIDUMP_HANDLE_DESCRIPTOR_2),
}

impl RawHandleDescriptor {
    pub fn handle(&self) -> u64 {
        match self {
            RawHandleDescriptor::V1(raw) => raw.handle,
            RawHandleDescriptor::V2(raw) => raw.handle,
        }
    }

    pub fn type_name_rva(&self) -> u32 {
        match self {
            RawHandleDescriptor::V1(raw) => raw.type_name_rva,
            RawHandleDescriptor::V2(raw) => raw.type_name_rva,
        }
    }

    pub fn object_name_rva(&self) -> u32 {
        match self {
            RawHandleDescriptor::V1(raw) => raw.object_name_rva,
            RawHandleDescriptor::V2(raw) => raw.object_name_rva,
        }
    }

    pub fn handle_count(&self) -> u32 {
        match self {
            RawHandleDescriptor::V1(raw) => raw.handle_count,
            RawHandleDescriptor::V2(raw) => raw.handle_count,
        }
    }
}

/// One open OS handle, with its names resolved.
#[derive(Debug, Clone)]
pub struct HandleEntry {
    pub raw: RawHandleDescriptor,
    /// The handle's type name ("File", "Event", ...); empty when absent or
    /// unreadable.
    pub type_name: String,
    /// The named object the handle refers to; empty when absent or
    /// unreadable.
    pub object_name: String,
}

/// The handle-data stream.
#[derive(Debug, Clone, Default)]
pub struct HandleData {
    pub handles: Vec<HandleEntry>,
}

impl DumpStream for HandleData {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::HandleDataStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let header: md::MINIDUMP_HANDLE_DATA_STREAM = bytes.pread_with(0, LE).ok()?;
        let header_size = md::MINIDUMP_HANDLE_DATA_STREAM::size_with(&LE);
        let v1_size = md::MINIDUMP_HANDLE_DESCRIPTOR::size_with(&LE);
        let v2_size = md::MINIDUMP_HANDLE_DESCRIPTOR_2::size_with(&LE);
        if (header.size_of_header as usize) < header_size
            || (header.size_of_descriptor as usize) < v1_size
        {
            return None;
        }
        if header.number_of_descriptors > MAX_HANDLES {
            warn!(
                "HandleData claims {} handles, cap is {}",
                header.number_of_descriptors, MAX_HANDLES
            );
            return None;
        }
        let is_v2 = header.size_of_descriptor as usize >= v2_size;
        let count = header.number_of_descriptors as usize;
        let expected = count
            .checked_mul(header.size_of_descriptor as usize)?
            .checked_add(header.size_of_header as usize)?;
        if bytes.len() < expected {
            return None;
        }

        let resolve_name = |rva: u32| -> String {
            if rva == 0 {
                return String::new();
            }
            let mut offset = rva as usize;
            read_string_utf16(&mut offset, all).unwrap_or_default()
        };

        let handles = (0..count)
            .map(|i| {
                let offset =
                    header.size_of_header as usize + i * header.size_of_descriptor as usize;
                let raw = if is_v2 {
                    RawHandleDescriptor::V2(bytes.pread_with(offset, LE).ok()?)
                } else {
                    RawHandleDescriptor::V1(bytes.pread_with(offset, LE).ok()?)
                };
                let type_name = resolve_name(raw.type_name_rva());
                let object_name = resolve_name(raw.object_name_rva());
                Some(HandleEntry {
                    raw,
                    type_name,
                    object_name,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(HandleData { handles })
    }
}

impl HandleData {
    /// A histogram of handle type names, sorted by descending count with
    /// ties broken by name.
    pub fn type_summary(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in &self.handles {
            *counts.entry(&entry.type_name).or_default() += 1;
        }
        let mut summary: Vec<_> = counts
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        summary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        summary
    }

    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MinidumpHandleData")?;
        writeln!(f, "  handle_count = {}\n", self.handles.len())?;
        for (name, count) in self.type_summary() {
            let name = if name.is_empty() { "<unknown>" } else { name.as_str() };
            writeln!(f, "  {count:6}  {name}")?;
        }
        writeln!(f)
    }
}

//======================================================
// Unloaded modules

/// A module that had been unloaded before the dump was written.
#[derive(Debug, Clone)]
pub struct UnloadedModule {
    pub raw: md::MINIDUMP_UNLOADED_MODULE,
    /// The module's path; empty when the name RVA does not resolve.
    pub name: String,
}

impl UnloadedModule {
    pub fn base_address(&self) -> u64 {
        self.raw.base_of_image
    }

    pub fn size(&self) -> u64 {
        self.raw.size_of_image as u64
    }

    pub fn short_name(&self) -> &str {
        short_module_name(&self.name)
    }
}

/// The unloaded-module list stream.
#[derive(Debug, Clone, Default)]
pub struct UnloadedModuleList {
    pub modules: Vec<UnloadedModule>,
}

impl DumpStream for UnloadedModuleList {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::UnloadedModuleListStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let header: md::MINIDUMP_UNLOADED_MODULE_LIST = bytes.pread_with(0, LE).ok()?;
        let header_size = md::MINIDUMP_UNLOADED_MODULE_LIST::size_with(&LE);
        let entry_size = md::MINIDUMP_UNLOADED_MODULE::size_with(&LE);
        if (header.size_of_header as usize) < header_size
            || (header.size_of_entry as usize) < entry_size
        {
            return None;
        }
        if header.number_of_entries > MAX_UNLOADED_MODULES {
            warn!(
                "UnloadedModuleList claims {} entries, cap is {}",
                header.number_of_entries, MAX_UNLOADED_MODULES
            );
            return None;
        }
        let count = header.number_of_entries as usize;
        let expected = count
            .checked_mul(header.size_of_entry as usize)?
            .checked_add(header.size_of_header as usize)?;
        if bytes.len() < expected {
            return None;
        }
        let modules = (0..count)
            .map(|i| {
                let offset = header.size_of_header as usize + i * header.size_of_entry as usize;
                let raw: md::MINIDUMP_UNLOADED_MODULE = bytes.pread_with(offset, LE).ok()?;
                let mut name_offset = raw.module_name_rva as usize;
                let name = read_string_utf16(&mut name_offset, all).unwrap_or_default();
                Some(UnloadedModule { raw, name })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(UnloadedModuleList { modules })
    }
}

impl UnloadedModuleList {
    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MinidumpUnloadedModuleList")?;
        writeln!(f, "  module_count = {}\n", self.modules.len())?;
        for module in &self.modules {
            writeln!(
                f,
                "  {:#018x} +{:#10x} \"{}\"",
                module.base_address(),
                module.size(),
                module.name
            )?;
        }
        writeln!(f)
    }
}

//======================================================
// Thread names

/// A mapping of thread ids to their names.
#[derive(Debug, Clone, Default)]
pub struct ThreadNames {
    names: HashMap<u32, String>,
}

impl DumpStream for ThreadNames {
    const STREAM_TYPE: MINIDUMP_STREAM_TYPE = MINIDUMP_STREAM_TYPE::ThreadNamesStream;

    fn read(all: &[u8], location: md::MINIDUMP_LOCATION_DESCRIPTOR) -> Option<Self> {
        let bytes = location_slice(all, &location)?;
        let mut cursor = Cursor::new(bytes);
        let count = cursor.u32()?;
        if count > MAX_THREAD_NAMES {
            warn!("ThreadNames claims {} entries, cap is {}", count, MAX_THREAD_NAMES);
            return None;
        }
        let entry_size = md::MINIDUMP_THREAD_NAME::size_with(&LE);
        let mut names = HashMap::new();
        for _ in 0..count {
            // Some writers pad entries to 16 bytes and the count can then
            // over-read the stream; stop at the last entry that fits.
            let entry = match cursor.bytes(entry_size) {
                Some(entry) => entry,
                None => break,
            };
            let raw: md::MINIDUMP_THREAD_NAME = entry.pread_with(0, LE).ok()?;
            if raw.thread_name_rva == 0 || raw.thread_name_rva > u32::MAX as u64 {
                continue;
            }
            let mut offset = raw.thread_name_rva as usize;
            match read_string_utf16(&mut offset, all) {
                Some(name) => {
                    names.insert(raw.thread_id, name);
                }
                None => {
                    warn!("couldn't read thread name for thread id {}", raw.thread_id);
                }
            }
        }
        Some(ThreadNames { names })
    }
}

impl ThreadNames {
    pub fn get_name(&self, thread_id: u32) -> Option<&str> {
        self.names.get(&thread_id).map(|name| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().map(|(&id, name)| (id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Write a human-readable description of this stream to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        writeln!(f, "MinidumpThreadNames")?;
        writeln!(f, "  name_count = {}\n", self.names.len())?;
        for (id, name) in &self.names {
            writeln!(f, "  {id:#10x} \"{name}\"")?;
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_short_module_name() {
        assert_eq!(short_module_name(r"C:\Windows\System32\ntdll.dll"), "ntdll.dll");
        assert_eq!(short_module_name("/usr/lib/libfoo.so"), "libfoo.so");
        assert_eq!(short_module_name("bare.dll"), "bare.dll");
        assert_eq!(short_module_name(""), "");
    }

    #[test]
    fn test_os_name_table() {
        fn info(major: u32, minor: u32, build: u32) -> SystemInfo {
            SystemInfo {
                raw: md::MINIDUMP_SYSTEM_INFO {
                    major_version: major,
                    minor_version: minor,
                    build_number: build,
                    ..Default::default()
                },
                arch: md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_AMD64,
                platform: Some(md::PlatformId::VER_PLATFORM_WIN32_NT),
                product: None,
                csd_version: None,
            }
        }
        assert_eq!(info(10, 0, 22631).os_name(), "Windows 11");
        assert_eq!(info(10, 0, 22000).os_name(), "Windows 11");
        assert_eq!(info(10, 0, 19045).os_name(), "Windows 10");
        assert_eq!(info(6, 3, 9600).os_name(), "Windows 8.1");
        assert_eq!(info(6, 2, 9200).os_name(), "Windows 8");
        assert_eq!(info(6, 1, 7601).os_name(), "Windows 7");
        assert_eq!(info(6, 0, 6000).os_name(), "Windows Vista");
        assert_eq!(info(5, 2, 3790).os_name(), "Windows Server 2003/XP x64");
        assert_eq!(info(5, 1, 2600).os_name(), "Windows XP");
        assert_eq!(info(5, 0, 2195).os_name(), "Windows 2000");
        assert_eq!(info(4, 10, 0).os_name(), "Windows 4.10");
    }

    #[test]
    fn test_cpu_version_extended_fields() {
        fn info(eax: u32) -> SystemInfo {
            let mut cpu = md::CPU_INFORMATION::default();
            cpu.data[12..16].copy_from_slice(&eax.to_le_bytes());
            SystemInfo {
                raw: md::MINIDUMP_SYSTEM_INFO {
                    cpu,
                    ..Default::default()
                },
                arch: md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_AMD64,
                platform: None,
                product: None,
                csd_version: None,
            }
        }
        // Family 6: extended model applies but not extended family.
        // eax = ext_model=0xA, family=6, model=0xE, stepping=3.
        assert_eq!(info(0x000a_06e3).cpu_version(), Some((6, 0xae, 3)));
        // Family 15: both extended fields apply.
        assert_eq!(info(0x0012_0f42).cpu_version(), Some((0x10, 0x24, 2)));
        // Family 5: base fields only.
        assert_eq!(info(0x0012_0542).cpu_version(), Some((5, 4, 2)));
    }

    #[test]
    fn test_access_violation_details() {
        fn exception(code: u32, params: &[u64], address: u64) -> Exception {
            let mut raw = md::MINIDUMP_EXCEPTION_STREAM::default();
            raw.exception_record.exception_code = code;
            raw.exception_record.exception_address = address;
            raw.exception_record.number_parameters = params.len() as u32;
            raw.exception_record.exception_information[..params.len()].copy_from_slice(params);
            Exception { raw, context: None }
        }

        assert_eq!(
            exception(0xC000_0005, &[0, 0xDEADBEEF], 0x1_4000_1234)
                .access_violation_details()
                .unwrap(),
            "The instruction at 0x0000000140001234 tried reading from address 0x00000000DEADBEEF"
        );
        assert_eq!(
            exception(0xC000_0005, &[1, 0x10], 0x2000)
                .access_violation_details()
                .unwrap(),
            "The instruction at 0x0000000000002000 tried writing to address 0x0000000000000010"
        );
        assert!(exception(0xC000_0005, &[0], 0x2000)
            .access_violation_details()
            .is_none());
        assert!(exception(0xC000_0094, &[0, 1], 0x2000)
            .access_violation_details()
            .is_none());
        // Operation 8 is a DEP execute fault.
        assert!(exception(0xC000_0005, &[8, 0x40], 0x2000)
            .access_violation_details()
            .unwrap()
            .contains("tried executing address"));
    }

    #[test]
    fn test_exception_parameter_clamp() {
        let mut raw = md::MINIDUMP_EXCEPTION_STREAM::default();
        raw.exception_record.number_parameters = 0xffff_ffff;
        let exception = Exception { raw, context: None };
        assert_eq!(exception.parameters().len(), 15);
    }

    #[test]
    fn test_handle_type_summary_ordering() {
        let entry = |type_name: &str| HandleEntry {
            raw: RawHandleDescriptor::V1(Default::default()),
            type_name: type_name.to_string(),
            object_name: String::new(),
        };
        let data = HandleData {
            handles: vec![
                entry("File"),
                entry("Event"),
                entry("File"),
                entry("Mutant"),
                entry("Event"),
                entry("File"),
            ],
        };
        assert_eq!(
            data.type_summary(),
            vec![
                ("File".to_string(), 3),
                ("Event".to_string(), 2),
                ("Mutant".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_module_end_address_saturates() {
        let module = Module {
            raw: md::MINIDUMP_MODULE {
                base_of_image: 0xffff_ffff_ffff_ffff,
                size_of_image: 0xffff_ffff,
                ..Default::default()
            },
            name: String::new(),
            codeview: None,
        };
        assert_eq!(module.end_address(), u64::MAX);
    }
}
