// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Raw minidump structure definitions.
//!
//! Types defined here match the layouts in [Microsoft's headers][msdn].
//! All values are little-endian on disk; decoding is done with [`scroll`]
//! using the endian context supplied by the parser.
//!
//! [msdn]: https://docs.microsoft.com/en-us/windows/desktop/api/minidumpapiset/

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

use bitflags::bitflags;
use enum_primitive_derive::Primitive;
use scroll::{Endian, Pread, SizeWith};
use smart_default::SmartDefault;

/// An offset from the start of the minidump file.
pub type RVA = u32;
/// A 64-bit offset from the start of the minidump file.
///
/// Only the thread-names stream uses this width.
pub type RVA64 = u64;

/// The 4-byte magic number at the start of a minidump file.
///
/// In little endian this spells 'MDMP'.
pub const MINIDUMP_SIGNATURE: u32 = 0x504d444d;

/// The header at the start of a minidump file.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_HEADER {
    /// This should be [`MINIDUMP_SIGNATURE`].
    pub signature: u32,
    /// Low 16 bits are the format version, high 16 bits are
    /// implementation-specific.
    pub version: u32,
    /// The number of entries in the stream directory.
    pub stream_count: u32,
    /// The offset of the stream directory within the minidump.
    ///
    /// The directory is an array of `stream_count`
    /// [`MINIDUMP_DIRECTORY`] entries.
    pub stream_directory_rva: RVA,
    pub checksum: u32,
    /// Seconds since the unix epoch at which this dump was written.
    pub time_date_stamp: u32,
    pub flags: u64,
}

/// A location within a minidump file comprised of a size and an offset.
#[derive(Debug, Copy, Default, Clone, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_LOCATION_DESCRIPTOR {
    /// The size of this data.
    pub data_size: u32,
    /// The offset of this data within the minidump file.
    pub rva: RVA,
}

/// A range of memory contained within a minidump.
#[derive(Debug, Copy, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_MEMORY_DESCRIPTOR {
    /// The base address of this memory range in the process' address space.
    pub start_of_memory_range: u64,
    /// The offset and size of the actual bytes of memory in this dump.
    pub memory: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// A large range of memory contained within a minidump.
///
/// Entries of the Memory64List stream. The file offset is implicit: region
/// `k` starts at the list's `base_rva` plus the sizes of the `k` preceding
/// regions.
#[derive(Debug, Copy, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_MEMORY_DESCRIPTOR64 {
    pub start_of_memory_range: u64,
    pub data_size: u64,
}

/// An entry in the stream directory.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_DIRECTORY {
    /// One of the values in [`MINIDUMP_STREAM_TYPE`], but user streams can
    /// carry arbitrary values.
    pub stream_type: u32,
    /// The location of the stream contents within the dump.
    pub location: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// The known minidump data stream types.
///
/// Streams whose type is not in this set are preserved as raw directory
/// entries and never decoded.
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Primitive)]
pub enum MINIDUMP_STREAM_TYPE {
    /// An unused stream directory entry
    UnusedStream = 0,
    /// The list of threads from the process
    ///
    /// See [`MINIDUMP_THREAD`].
    ThreadListStream = 3,
    /// The list of executable modules from the process
    ///
    /// See [`MINIDUMP_MODULE`].
    ModuleListStream = 4,
    /// The list of small memory ranges captured in the dump
    MemoryListStream = 5,
    /// Information about the exception that caused the process to exit
    ///
    /// See [`MINIDUMP_EXCEPTION_STREAM`].
    ExceptionStream = 6,
    /// System information
    ///
    /// See [`MINIDUMP_SYSTEM_INFO`].
    SystemInfoStream = 7,
    /// Full memory ranges, stored back-to-back at the end of the dump
    Memory64ListStream = 9,
    /// Open OS handles at the time of the dump
    HandleDataStream = 12,
    /// Modules that were unloaded before the dump was written
    ///
    /// See [`MINIDUMP_UNLOADED_MODULE`].
    UnloadedModuleListStream = 14,
    /// Miscellaneous process and system information
    MiscInfoStream = 15,
    /// Metadata about the process' memory regions
    ///
    /// See [`MINIDUMP_MEMORY_INFO`].
    MemoryInfoListStream = 16,
    /// Names of threads
    ///
    /// See [`MINIDUMP_THREAD_NAME`].
    ThreadNamesStream = 24,
}

impl From<MINIDUMP_STREAM_TYPE> for u32 {
    fn from(ty: MINIDUMP_STREAM_TYPE) -> Self {
        ty as u32
    }
}

/// Information about a single thread from the thread-list stream.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_THREAD {
    pub thread_id: u32,
    pub suspend_count: u32,
    pub priority_class: u32,
    pub priority: u32,
    /// The address of the thread environment block.
    pub teb: u64,
    /// The captured stack memory of this thread.
    pub stack: MINIDUMP_MEMORY_DESCRIPTOR,
    /// The location of a CPU context record for this thread.
    pub thread_context: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// The name of a thread, found in the thread-names stream.
///
/// Natural size is 12 bytes; some writers pad entries to 16. The parser
/// probes with 12 and treats over-reading as a soft failure.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_THREAD_NAME {
    pub thread_id: u32,
    /// Where the name of the thread is stored (the one genuine RVA64 in
    /// the format).
    pub thread_name_rva: RVA64,
}

/// Information about a single module (executable or shared library).
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_MODULE {
    /// The base address of the executable image in memory.
    pub base_of_image: u64,
    /// The size of the executable image in memory, in bytes.
    pub size_of_image: u32,
    /// The checksum value from the PE headers.
    pub checksum: u32,
    /// The timestamp value from the PE headers in `time_t` format.
    pub time_date_stamp: u32,
    /// An offset to a length-prefixed UTF-16LE string containing the name
    /// of the module.
    pub module_name_rva: RVA,
    /// Version information for this module.
    pub version_info: VS_FIXEDFILEINFO,
    /// The location of a CodeView record describing debug information for
    /// this module, one of [`CV_INFO_PDB70`] or [`CV_INFO_PDB20`].
    pub cv_record: MINIDUMP_LOCATION_DESCRIPTOR,
    /// The location of an `IMAGE_DEBUG_MISC` record.
    pub misc_record: MINIDUMP_LOCATION_DESCRIPTOR,
    pub reserved0: [u32; 2],
    pub reserved1: [u32; 2],
}

/// A module that was once loaded into the process but had been unloaded by
/// the time the dump was written.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_UNLOADED_MODULE {
    pub base_of_image: u64,
    pub size_of_image: u32,
    pub checksum: u32,
    pub time_date_stamp: u32,
    pub module_name_rva: RVA,
}

/// The extended-style list header used by the unloaded-module stream.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_UNLOADED_MODULE_LIST {
    pub size_of_header: u32,
    pub size_of_entry: u32,
    pub number_of_entries: u32,
}

/// The signature for [`VS_FIXEDFILEINFO`].
pub const VS_FFI_SIGNATURE: u32 = 0xfeef04bd;
/// The struct version for [`VS_FIXEDFILEINFO`].
pub const VS_FFI_STRUCVERSION: u32 = 0x00010000;

/// The fixed portion of a Windows version-information resource, embedded
/// in each [`MINIDUMP_MODULE`].
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct VS_FIXEDFILEINFO {
    /// Should be [`VS_FFI_SIGNATURE`]; the other fields are meaningless
    /// otherwise.
    pub signature: u32,
    pub struct_version: u32,
    pub file_version_hi: u32,
    pub file_version_lo: u32,
    pub product_version_hi: u32,
    pub product_version_lo: u32,
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date_hi: u32,
    pub file_date_lo: u32,
}

/// Signatures of CodeView debug-information records.
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Debug, Primitive)]
pub enum CvSignature {
    /// PDB 7.0 ("RSDS"), the common format.
    Pdb70 = 0x5344_5352,
    /// PDB 2.0 ("NB10"), the older format.
    Pdb20 = 0x3031_424e,
}

/// A Windows GUID, as stored in an RSDS CodeView record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// A PDB 7.0 ("RSDS") CodeView record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CV_INFO_PDB70 {
    /// This will always be [`CvSignature::Pdb70`].
    pub cv_signature: u32,
    /// A unique identifier for the module, created on first build.
    pub signature: GUID,
    /// Incremented for each rebuild that updates the PDB file.
    pub age: u32,
    /// The PDB filename as a zero-terminated byte string, extending to the
    /// end of the record.
    pub pdb_file_name: Vec<u8>,
}

impl<'a> scroll::ctx::TryFromCtx<'a, Endian> for CV_INFO_PDB70 {
    type Error = scroll::Error;

    fn try_from_ctx(src: &'a [u8], endian: Endian) -> Result<(Self, usize), Self::Error> {
        let offset = &mut 0;
        Ok((
            CV_INFO_PDB70 {
                cv_signature: src.gread_with(offset, endian)?,
                signature: src.gread_with(offset, endian)?,
                age: src.gread_with(offset, endian)?,
                pdb_file_name: {
                    let size = src.len() - *offset;
                    src.gread_with::<&[u8]>(offset, size)?.to_owned()
                },
            },
            *offset,
        ))
    }
}

/// A PDB 2.0 ("NB10") CodeView record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CV_INFO_PDB20 {
    /// This will always be [`CvSignature::Pdb20`].
    pub cv_signature: u32,
    pub cv_offset: u32,
    pub signature: u32,
    pub age: u32,
    /// The PDB filename as a zero-terminated byte string.
    pub pdb_file_name: Vec<u8>,
}

impl<'a> scroll::ctx::TryFromCtx<'a, Endian> for CV_INFO_PDB20 {
    type Error = scroll::Error;

    fn try_from_ctx(src: &'a [u8], endian: Endian) -> Result<(Self, usize), Self::Error> {
        let offset = &mut 0;
        Ok((
            CV_INFO_PDB20 {
                cv_signature: src.gread_with(offset, endian)?,
                cv_offset: src.gread_with(offset, endian)?,
                signature: src.gread_with(offset, endian)?,
                age: src.gread_with(offset, endian)?,
                pdb_file_name: {
                    let size = src.len() - *offset;
                    src.gread_with::<&[u8]>(offset, size)?.to_owned()
                },
            },
            *offset,
        ))
    }
}

/// Processor-specific information, a 24-byte union in the C headers.
///
/// For x86 and AMD64 dumps interpret this with [`CPU_INFORMATION::as_x86`],
/// otherwise with [`CPU_INFORMATION::as_other`].
#[derive(Clone, Copy, SmartDefault, Pread, SizeWith)]
pub struct CPU_INFORMATION {
    #[default([0; 24])]
    pub data: [u8; 24],
}

impl std::fmt::Debug for CPU_INFORMATION {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CPU_INFORMATION")
            .field("data", &&self.data[..])
            .finish()
    }
}

/// The x86/AMD64 arm of [`CPU_INFORMATION`].
#[derive(Debug, Clone, Copy, Default, Pread, SizeWith)]
pub struct X86CpuInfo {
    /// The CPUID vendor string as three little-endian words
    /// (e.g. "GenuineIntel").
    pub vendor_id: [u32; 3],
    /// CPUID leaf 1 EAX: stepping/model/family with the extended fields.
    pub version_information: u32,
    /// CPUID leaf 1 EDX.
    pub feature_information: u32,
    /// CPUID leaf 0x80000001 EDX (AMD only).
    pub amd_extended_cpu_features: u32,
}

/// The non-x86 arm of [`CPU_INFORMATION`].
#[derive(Debug, Clone, Copy, Default, Pread, SizeWith)]
pub struct OtherCpuInfo {
    pub processor_features: [u64; 2],
}

impl CPU_INFORMATION {
    pub fn as_x86(&self) -> X86CpuInfo {
        // 24 bytes always decode as 6 little-endian words; unwrap is fine.
        self.data.pread_with(0, scroll::LE).unwrap()
    }

    pub fn as_other(&self) -> OtherCpuInfo {
        self.data.pread_with(0, scroll::LE).unwrap()
    }
}

/// Information about the system that wrote the minidump.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_SYSTEM_INFO {
    /// The system's processor architecture; known values are in
    /// [`ProcessorArchitecture`].
    pub processor_architecture: u16,
    /// x86 (5 = 586, 6 = 686 ...) or ARM (6 = ARMv6, 7 = ARMv7 ...) CPU level
    pub processor_level: u16,
    /// For x86, 0xMMSS where MM=model, SS=stepping
    pub processor_revision: u16,
    pub number_of_processors: u8,
    /// Known values are in [`ProductType`].
    pub product_type: u8,
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
    /// The operating system platform; known values are in [`PlatformId`].
    pub platform_id: u32,
    /// RVA of a length-prefixed UTF-16LE service-pack string, or 0.
    pub csd_version_rva: RVA,
    pub suite_mask: u16,
    pub reserved2: u16,
    pub cpu: CPU_INFORMATION,
}

/// Known values of [`MINIDUMP_SYSTEM_INFO::processor_architecture`].
#[repr(u16)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum ProcessorArchitecture {
    PROCESSOR_ARCHITECTURE_INTEL = 0,
    PROCESSOR_ARCHITECTURE_MIPS = 1,
    PROCESSOR_ARCHITECTURE_ALPHA = 2,
    PROCESSOR_ARCHITECTURE_PPC = 3,
    PROCESSOR_ARCHITECTURE_SHX = 4,
    PROCESSOR_ARCHITECTURE_ARM = 5,
    PROCESSOR_ARCHITECTURE_IA64 = 6,
    PROCESSOR_ARCHITECTURE_ALPHA64 = 7,
    /// Microsoft Intermediate Language
    PROCESSOR_ARCHITECTURE_MSIL = 8,
    PROCESSOR_ARCHITECTURE_AMD64 = 9,
    /// WoW64: 32-bit x86 code on 64-bit Windows
    PROCESSOR_ARCHITECTURE_IA32_ON_WIN64 = 10,
    PROCESSOR_ARCHITECTURE_NEUTRAL = 11,
    PROCESSOR_ARCHITECTURE_ARM64 = 12,
    PROCESSOR_ARCHITECTURE_ARM32_ON_WIN64 = 13,
    PROCESSOR_ARCHITECTURE_IA32_ON_ARM64 = 14,
    PROCESSOR_ARCHITECTURE_UNKNOWN = 0xffff,
}

/// Known values of [`MINIDUMP_SYSTEM_INFO::platform_id`].
///
/// Only the three canonical Win32 platform ids exist in the SDK; anything
/// else decodes as unknown.
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum PlatformId {
    VER_PLATFORM_WIN32s = 0,
    VER_PLATFORM_WIN32_WINDOWS = 1,
    VER_PLATFORM_WIN32_NT = 2,
}

/// Known values of [`MINIDUMP_SYSTEM_INFO::product_type`].
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum ProductType {
    /// Workstation, Home, Professional and similar editions.
    VER_NT_WORKSTATION = 1,
    VER_NT_DOMAIN_CONTROLLER = 2,
    VER_NT_SERVER = 3,
}

/// Detailed information about an exception.
#[derive(Debug, Clone, SmartDefault, Pread, SizeWith)]
pub struct MINIDUMP_EXCEPTION {
    /// The reason the exception occurred, an NTSTATUS-style code.
    pub exception_code: u32,
    /// 1 for noncontinuable exceptions, otherwise 0.
    pub exception_flags: u32,
    /// The address of an associated [`MINIDUMP_EXCEPTION`] for a nested
    /// exception, in the dumped process' address space.
    pub exception_record: u64,
    /// The address where the exception occurred.
    pub exception_address: u64,
    /// The number of valid elements in
    /// [`MINIDUMP_EXCEPTION::exception_information`].
    pub number_parameters: u32,
    pub __align: u32,
    /// Additional arguments that describe the exception. For access
    /// violations element 0 is the operation (read/write/execute) and
    /// element 1 is the faulting address.
    #[default([0; 15])]
    pub exception_information: [u64; 15],
}

/// The exception stream.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_EXCEPTION_STREAM {
    /// The identifier of the thread that encountered the exception.
    pub thread_id: u32,
    pub __align: u32,
    pub exception_record: MINIDUMP_EXCEPTION,
    /// The location of a CPU context record from the time the thread
    /// encountered the exception.
    pub thread_context: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// The header of the memory-info list stream.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_MEMORY_INFO_LIST {
    pub size_of_header: u32,
    pub size_of_entry: u32,
    pub number_of_entries: u64,
}

/// Metadata about a region of the dumped process' address space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Pread, SizeWith)]
pub struct MINIDUMP_MEMORY_INFO {
    /// The base address of the region of pages.
    pub base_address: u64,
    /// The base address of the allocation containing this region.
    pub allocation_base: u64,
    /// The protection when the region was initially allocated; see
    /// [`MemoryProtection`].
    pub allocation_protection: u32,
    pub __alignment1: u32,
    /// The size of the region in which all pages have identical
    /// attributes, in bytes.
    pub region_size: u64,
    /// The state of the pages in the region; see [`MemoryState`].
    pub state: u32,
    /// The access protection of the pages in the region; see
    /// [`MemoryProtection`].
    pub protection: u32,
    /// The kind of pages in the region; see [`MemoryType`].
    pub _type: u32,
    pub __alignment2: u32,
}

bitflags! {
    /// Page protection of a memory region, a `PAGE_*` bitmask.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct MemoryProtection: u32 {
        const PAGE_NOACCESS           = 0x01;
        const PAGE_READONLY           = 0x02;
        const PAGE_READWRITE          = 0x04;
        const PAGE_WRITECOPY          = 0x08;
        const PAGE_EXECUTE            = 0x10;
        const PAGE_EXECUTE_READ       = 0x20;
        const PAGE_EXECUTE_READWRITE  = 0x40;
        const PAGE_EXECUTE_WRITECOPY  = 0x80;
        const ACCESS_MASK             = 0xff;
        const PAGE_GUARD              = 0x100;
        const PAGE_NOCACHE            = 0x200;
        const PAGE_WRITECOMBINE       = 0x400;
    }
}

impl MemoryProtection {
    /// A compact human-readable protection string: the access part
    /// ("R", "RW", "RWX", ...) followed by "+G"/"+NC"/"+WC" modifiers.
    pub fn shortform(&self) -> String {
        let access = match (*self & Self::ACCESS_MASK).bits() {
            0x01 => "NA",
            0x02 => "R",
            0x04 => "RW",
            0x08 => "WC",
            0x10 => "X",
            0x20 => "RX",
            0x40 => "RWX",
            0x80 => "WCX",
            _ => "?",
        };
        let mut s = String::from(access);
        if self.contains(Self::PAGE_GUARD) {
            s.push_str("+G");
        }
        if self.contains(Self::PAGE_NOCACHE) {
            s.push_str("+NC");
        }
        if self.contains(Self::PAGE_WRITECOMBINE) {
            s.push_str("+WC");
        }
        s
    }
}

bitflags! {
    /// State of the pages in a memory region, a `MEM_*` bitmask.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct MemoryState: u32 {
        const MEM_COMMIT  = 0x01000;
        const MEM_RESERVE = 0x02000;
        const MEM_FREE    = 0x10000;
    }
}

bitflags! {
    /// Kind of the pages in a memory region, a `MEM_*` bitmask.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct MemoryType: u32 {
        const MEM_PRIVATE = 0x0002_0000;
        const MEM_MAPPED  = 0x0004_0000;
        const MEM_IMAGE   = 0x0100_0000;
    }
}

/// The header of the handle-data stream.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_HANDLE_DATA_STREAM {
    pub size_of_header: u32,
    pub size_of_descriptor: u32,
    pub number_of_descriptors: u32,
    pub reserved: u32,
}

/// A single open OS handle (original 32-byte layout).
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_HANDLE_DESCRIPTOR {
    /// The handle value.
    pub handle: u64,
    /// RVA of a length-prefixed UTF-16LE type name, or 0.
    pub type_name_rva: RVA,
    /// RVA of a length-prefixed UTF-16LE object name, or 0.
    pub object_name_rva: RVA,
    pub attributes: u32,
    pub granted_access: u32,
    pub handle_count: u32,
    pub pointer_count: u32,
}

/// A single open OS handle (40-byte V2 layout).
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_HANDLE_DESCRIPTOR_2 {
    pub handle: u64,
    pub type_name_rva: RVA,
    pub object_name_rva: RVA,
    pub attributes: u32,
    pub granted_access: u32,
    pub handle_count: u32,
    pub pointer_count: u32,
    /// RVA of a `MINIDUMP_HANDLE_OBJECT_INFORMATION`, or 0.
    pub object_info_rva: RVA,
    pub reserved0: u32,
}

bitflags! {
    /// Flags gating which fields of the misc-info stream are valid.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct MiscInfoFlags: u32 {
        const MINIDUMP_MISC1_PROCESS_ID            = 0x001;
        const MINIDUMP_MISC1_PROCESS_TIMES         = 0x002;
        const MINIDUMP_MISC1_PROCESSOR_POWER_INFO  = 0x004;
        const MINIDUMP_MISC3_PROCESS_INTEGRITY     = 0x010;
        const MINIDUMP_MISC3_PROCESS_EXECUTE_FLAGS = 0x020;
        const MINIDUMP_MISC3_TIMEZONE              = 0x040;
        const MINIDUMP_MISC3_PROTECTED_PROCESS     = 0x080;
        const MINIDUMP_MISC4_BUILDSTRING           = 0x100;
    }
}

bitflags! {
    /// The low, architecture-independent bits of
    /// [`CONTEXT_AMD64::context_flags`].
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ContextFlags: u32 {
        const CONTEXT_CONTROL         = 0x01;
        const CONTEXT_INTEGER         = 0x02;
        const CONTEXT_SEGMENTS        = 0x04;
        const CONTEXT_FLOATING_POINT  = 0x08;
        const CONTEXT_DEBUG_REGISTERS = 0x10;
    }
}

bitflags! {
    /// The individually-meaningful bits of the x86/x64 EFLAGS register.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct EflagsBits: u32 {
        const CF = 1 << 0;
        const PF = 1 << 2;
        const AF = 1 << 4;
        const ZF = 1 << 6;
        const SF = 1 << 7;
        const TF = 1 << 8;
        const IF = 1 << 9;
        const DF = 1 << 10;
        const OF = 1 << 11;
    }
}

impl EflagsBits {
    /// The names of every set flag, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        [
            (Self::CF, "CF"),
            (Self::PF, "PF"),
            (Self::AF, "AF"),
            (Self::ZF, "ZF"),
            (Self::SF, "SF"),
            (Self::TF, "TF"),
            (Self::IF, "IF"),
            (Self::DF, "DF"),
            (Self::OF, "OF"),
        ]
        .iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|&(_, name)| name)
        .collect()
    }
}

/// An x86-64 CPU context, 1232 bytes on disk.
#[derive(Debug, Clone, SmartDefault, Pread, SizeWith)]
pub struct CONTEXT_AMD64 {
    pub p1_home: u64,
    pub p2_home: u64,
    pub p3_home: u64,
    pub p4_home: u64,
    pub p5_home: u64,
    pub p6_home: u64,
    /// Which register groups in this context are valid; see
    /// [`ContextFlags`].
    pub context_flags: u32,
    pub mx_csr: u32,
    pub cs: u16,
    pub ds: u16,
    pub es: u16,
    pub fs: u16,
    pub gs: u16,
    pub ss: u16,
    pub eflags: u32,
    pub dr0: u64,
    pub dr1: u64,
    pub dr2: u64,
    pub dr3: u64,
    pub dr6: u64,
    pub dr7: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rbx: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    /// The 512-byte FXSAVE area. The XMM registers live at offset 160
    /// within it when [`ContextFlags::CONTEXT_FLOATING_POINT`] is set.
    #[default([0; 512])]
    pub float_save: [u8; 512],
    #[default([0; 26])]
    pub vector_register: [u128; 26],
    pub vector_control: u64,
    pub debug_control: u64,
    pub last_branch_to_rip: u64,
    pub last_branch_from_rip: u64,
    pub last_exception_to_rip: u64,
    pub last_exception_from_rip: u64,
}

/// Byte offset of the XMM registers within
/// [`CONTEXT_AMD64::float_save`].
pub const FXSAVE_XMM_OFFSET: usize = 160;

impl CONTEXT_AMD64 {
    /// The decoded [`ContextFlags`] of this context, ignoring the
    /// architecture-selector bits.
    pub fn flags(&self) -> ContextFlags {
        ContextFlags::from_bits_truncate(self.context_flags)
    }

    /// XMM register `i` (0..=15) from the FXSAVE area, if the
    /// floating-point group is valid.
    pub fn xmm(&self, i: usize) -> Option<u128> {
        if i >= 16 || !self.flags().contains(ContextFlags::CONTEXT_FLOATING_POINT) {
            return None;
        }
        self.float_save
            .pread_with(FXSAVE_XMM_OFFSET + 16 * i, scroll::LE)
            .ok()
    }

    /// The decoded EFLAGS bits of this context.
    pub fn eflags_bits(&self) -> EflagsBits {
        EflagsBits::from_bits_truncate(self.eflags)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use scroll::ctx::SizeWith;

    #[test]
    fn test_sizes_match_the_wire_format() {
        let le = scroll::Endian::Little;
        assert_eq!(MINIDUMP_HEADER::size_with(&le), 32);
        assert_eq!(MINIDUMP_DIRECTORY::size_with(&le), 12);
        assert_eq!(MINIDUMP_LOCATION_DESCRIPTOR::size_with(&le), 8);
        assert_eq!(MINIDUMP_MEMORY_DESCRIPTOR::size_with(&le), 16);
        assert_eq!(MINIDUMP_MEMORY_DESCRIPTOR64::size_with(&le), 16);
        assert_eq!(MINIDUMP_THREAD::size_with(&le), 48);
        assert_eq!(MINIDUMP_THREAD_NAME::size_with(&le), 12);
        assert_eq!(MINIDUMP_MODULE::size_with(&le), 108);
        assert_eq!(VS_FIXEDFILEINFO::size_with(&le), 52);
        assert_eq!(MINIDUMP_UNLOADED_MODULE::size_with(&le), 24);
        assert_eq!(MINIDUMP_SYSTEM_INFO::size_with(&le), 56);
        assert_eq!(MINIDUMP_EXCEPTION_STREAM::size_with(&le), 168);
        assert_eq!(MINIDUMP_MEMORY_INFO::size_with(&le), 48);
        assert_eq!(MINIDUMP_HANDLE_DESCRIPTOR::size_with(&le), 32);
        assert_eq!(MINIDUMP_HANDLE_DESCRIPTOR_2::size_with(&le), 40);
        assert_eq!(CONTEXT_AMD64::size_with(&le), 1232);
    }

    #[test]
    fn test_protection_shortform() {
        let p = MemoryProtection::PAGE_EXECUTE_READWRITE;
        assert_eq!(p.shortform(), "RWX");
        let p = MemoryProtection::PAGE_EXECUTE_READWRITE
            | MemoryProtection::PAGE_GUARD
            | MemoryProtection::PAGE_NOCACHE;
        assert_eq!(p.shortform(), "RWX+G+NC");
        let p = MemoryProtection::PAGE_READONLY | MemoryProtection::PAGE_WRITECOMBINE;
        assert_eq!(p.shortform(), "R+WC");
    }

    #[test]
    fn test_eflags_names() {
        let fl = EflagsBits::from_bits_truncate(0b1100_0101);
        assert_eq!(fl.names(), vec!["CF", "PF", "ZF", "SF"]);
        assert!(EflagsBits::from_bits_truncate(0).names().is_empty());
    }
}
