// Copyright 2016 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Synthetic minidumps for testing.
//!
//! This crate deliberately hand-writes byte layouts instead of reusing
//! `dumplens-common`'s structs, so that an incorrect change to the shared
//! layouts shows up as a test failure rather than being round-tripped
//! invisibly.
//!
//! Basic usage is to build up a [`SynthDump`], add streams to it, and call
//! `finish()` to produce the bytes, which can be fed straight to the
//! parser.

#![allow(missing_debug_implementations)]

use std::marker::PhantomData;
use std::mem;

use dumplens_common::format as md;
use scroll::ctx::SizeWith;
use scroll::LE;
use test_assembler::*;

/// A writer of synthetic minidumps.
pub struct SynthDump {
    /// The `Section` containing the minidump contents.
    section: Section,
    /// The minidump flags, for the header.
    flags: Label,
    /// The number of streams.
    stream_count: u32,
    /// The number of streams, as a label for the header.
    stream_count_label: Label,
    /// The directory's file offset, for the header.
    stream_directory_rva: Label,
    /// The contents of the stream directory.
    stream_directory: Section,
    system_info: Option<SystemInfo>,
    misc_info: Option<MiscStream>,
    exception: Option<Exception>,
    module_list: Option<ListStream<Module>>,
    unloaded_module_list: Option<UnloadedListStream>,
    thread_list: Option<ListStream<Thread>>,
    thread_names_list: Option<ListStream<ThreadName>>,
    memory_list: Option<ListStream<Section>>,
    memory64_list: Option<Memory64ListStream>,
    memory_info_list: Option<MemoryInfoListStream>,
    handle_data: Option<HandleDataStream>,
    /// Contiguous memory used by the `Memory64List` stream.
    memory64_section: Option<Section>,
}

/// A block of data contained in a minidump.
pub trait DumpSection {
    /// A label for this section's offset in bytes from the start of the
    /// minidump.
    fn file_offset(&self) -> Label;
    /// A label for this section's size in bytes.
    fn file_size(&self) -> Label;
}

impl DumpSection for Section {
    fn file_offset(&self) -> Label {
        self.start()
    }

    fn file_size(&self) -> Label {
        self.final_size()
    }
}

macro_rules! impl_dumpsection {
    ( $x:ty ) => {
        impl DumpSection for $x {
            fn file_offset(&self) -> Label {
                self.section.file_offset()
            }
            fn file_size(&self) -> Label {
                self.section.file_size()
            }
        }
    };
}

/// A list item with optional out-of-band data.
pub trait ListItem: DumpSection {
    /// Returns a pair of sections for in-band and out-of-band data.
    fn into_sections(self) -> (Section, Option<Section>);
}

impl<T> ListItem for T
where
    T: Into<Section> + DumpSection,
{
    fn into_sections(self) -> (Section, Option<Section>) {
        (self.into(), None)
    }
}

pub trait CiteLocation {
    /// Append a `MINIDUMP_LOCATION_DESCRIPTOR` for this section to
    /// `section`.
    fn cite_location_in(&self, section: Section) -> Section;
}

impl<T: DumpSection> CiteLocation for T {
    fn cite_location_in(&self, section: Section) -> Section {
        section.D32(self.file_size()).D32(self.file_offset())
    }
}

impl CiteLocation for (Label, Label) {
    fn cite_location_in(&self, section: Section) -> Section {
        section.D32(&self.0).D32(&self.1)
    }
}

impl<T: CiteLocation> CiteLocation for Option<T> {
    fn cite_location_in(&self, section: Section) -> Section {
        match *self {
            Some(ref inner) => inner.cite_location_in(section),
            None => section.D32(0).D32(0),
        }
    }
}

/// Additional methods to make working with `Section`s simpler.
pub trait SectionExtra {
    /// A chainable version of `CiteLocation::cite_location_in`.
    fn cite_location<T: CiteLocation>(self, thing: &T) -> Self;
    /// A chainable version of `Memory::cite_memory_in`.
    fn cite_memory(self, memory: &Memory) -> Self;
}

impl SectionExtra for Section {
    fn cite_location<T: CiteLocation>(self, thing: &T) -> Self {
        thing.cite_location_in(self)
    }

    fn cite_memory(self, memory: &Memory) -> Self {
        memory.cite_memory_in(self)
    }
}

/// A minidump stream.
pub trait Stream: DumpSection + Into<Section> {
    /// The stream type, used in the stream directory.
    fn stream_type(&self) -> u32;

    /// Append a directory entry for this stream to `section`.
    fn cite_stream_in(&self, section: Section) -> Section {
        section.D32(self.stream_type()).cite_location(self)
    }
}

impl SynthDump {
    /// Create a `SynthDump` with default endianness.
    pub fn new() -> SynthDump {
        SynthDump::with_endian(DEFAULT_ENDIAN)
    }

    /// Create a `SynthDump` with `endian` endianness.
    pub fn with_endian(endian: Endian) -> SynthDump {
        let flags = Label::new();
        let stream_count_label = Label::new();
        let stream_directory_rva = Label::new();
        let section = Section::with_endian(endian)
            .D32(md::MINIDUMP_SIGNATURE)
            .D32(0xa793u32) // version, arbitrary
            .D32(&stream_count_label)
            .D32(&stream_directory_rva)
            .D32(0) // checksum
            .D32(1262805309) // time_date_stamp, arbitrary
            .D64(&flags);
        section.start().set_const(0);
        assert_eq!(
            section.size(),
            md::MINIDUMP_HEADER::size_with(&LE) as u64
        );
        let memory64_section = Section::with_endian(endian);

        SynthDump {
            section,
            flags,
            stream_count: 0,
            stream_count_label,
            stream_directory_rva,
            stream_directory: Section::with_endian(endian),
            system_info: None,
            misc_info: None,
            exception: None,
            module_list: Some(ListStream::new(
                md::MINIDUMP_STREAM_TYPE::ModuleListStream,
                endian,
            )),
            unloaded_module_list: Some(UnloadedListStream::new(endian)),
            thread_list: Some(ListStream::new(
                md::MINIDUMP_STREAM_TYPE::ThreadListStream,
                endian,
            )),
            thread_names_list: Some(ListStream::new(
                md::MINIDUMP_STREAM_TYPE::ThreadNamesStream,
                endian,
            )),
            memory_list: Some(ListStream::new(
                md::MINIDUMP_STREAM_TYPE::MemoryListStream,
                endian,
            )),
            memory64_list: Some(Memory64ListStream::new(
                endian,
                &memory64_section.file_offset(),
            )),
            memory_info_list: Some(MemoryInfoListStream::new(endian)),
            handle_data: Some(HandleDataStream::new(endian)),
            memory64_section: Some(memory64_section),
        }
    }

    /// Set the minidump flags to `flags`.
    pub fn flags(self, flags: u64) -> SynthDump {
        self.flags.set_const(flags);
        self
    }

    /// Append `section` to `self`, setting its location appropriately.
    #[allow(clippy::should_implement_trait)]
    pub fn add<T>(mut self, section: T) -> SynthDump
    where
        T: DumpSection + Into<Section>,
    {
        let offset = section.file_offset();
        self.section = self.section.mark(&offset).append_section(section);
        self
    }

    /// Add `module` to the module list stream.
    pub fn add_module(mut self, module: Module) -> SynthDump {
        self.module_list = self.module_list.take().map(|list| list.add(module));
        self
    }

    /// Add `module` to the unloaded module list stream.
    pub fn add_unloaded_module(mut self, module: UnloadedModule) -> SynthDump {
        self.unloaded_module_list = self
            .unloaded_module_list
            .take()
            .map(|list| list.add(module));
        self
    }

    /// Add `memory` to the (small) memory list stream and to the dump.
    pub fn add_memory(mut self, memory: Memory) -> SynthDump {
        let descriptor = memory.cite_memory_in(Section::with_endian(self.section.endian));
        self.memory_list = self.memory_list.take().map(|list| list.add(descriptor));
        self.add(memory)
    }

    /// Add `memory` to the Memory64List stream; its bytes land in the
    /// contiguous region block at the end of the dump.
    pub fn add_memory64(mut self, memory: Memory) -> SynthDump {
        self.memory64_list = self
            .memory64_list
            .take()
            .map(|list| list.add_memory(&memory));
        self.memory64_section = self
            .memory64_section
            .take()
            .map(|section| section.append_section(memory.section));
        self
    }

    /// Add `info` to the memory info list stream.
    pub fn add_memory_info(mut self, info: MemoryInfo) -> SynthDump {
        self.memory_info_list = self.memory_info_list.take().map(|list| list.add(info));
        self
    }

    /// Add `handle` to the handle data stream.
    pub fn add_handle(mut self, handle: HandleDescriptor) -> SynthDump {
        self.handle_data = self.handle_data.take().map(|list| list.add(handle));
        self
    }

    /// Add `thread` to the thread list stream.
    pub fn add_thread(mut self, thread: Thread) -> SynthDump {
        self.thread_list = self.thread_list.take().map(|list| list.add(thread));
        self
    }

    /// Add `thread_name` to the thread names stream.
    pub fn add_thread_name(mut self, thread_name: ThreadName) -> SynthDump {
        self.thread_names_list = self
            .thread_names_list
            .take()
            .map(|list| list.add(thread_name));
        self
    }

    /// Set the SystemInfo stream.
    pub fn add_system_info(mut self, system_info: SystemInfo) -> Self {
        self.system_info = Some(system_info);
        self
    }

    /// Set the MiscInfo stream.
    pub fn add_misc_info(mut self, misc_info: MiscStream) -> Self {
        self.misc_info = Some(misc_info);
        self
    }

    /// Set the Exception stream.
    pub fn add_exception(mut self, exception: Exception) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Append `stream` to `self`, adding it to the stream directory.
    pub fn add_stream<T: Stream>(mut self, stream: T) -> SynthDump {
        self.stream_directory = stream.cite_stream_in(self.stream_directory);
        self.stream_count += 1;
        self.add(stream)
    }

    fn finish_list<T: ListItem>(self, list: Option<ListStream<T>>) -> SynthDump {
        match list {
            Some(l) if !l.is_empty() => self.add_stream(l),
            _ => self,
        }
    }

    /// Finish generating the minidump and return the contents.
    pub fn finish(mut self) -> Option<Vec<u8>> {
        let modules = self.module_list.take();
        self = self.finish_list(modules);
        if let Some(unloaded) = self.unloaded_module_list.take() {
            if !unloaded.is_empty() {
                self = self.add_stream(unloaded);
            }
        }
        let memories = self.memory_list.take();
        self = self.finish_list(memories);
        if let Some(memories64) = self.memory64_list.take() {
            if !memories64.is_empty() {
                self = self.add_stream(memories64);
            }
        }
        if let Some(memory_infos) = self.memory_info_list.take() {
            if !memory_infos.is_empty() {
                self = self.add_stream(memory_infos);
            }
        }
        if let Some(handles) = self.handle_data.take() {
            if !handles.is_empty() {
                self = self.add_stream(handles);
            }
        }
        let threads = self.thread_list.take();
        self = self.finish_list(threads);
        let thread_names = self.thread_names_list.take();
        self = self.finish_list(thread_names);
        if let Some(stream) = self.system_info.take() {
            self = self.add_stream(stream);
        }
        if let Some(stream) = self.misc_info.take() {
            self = self.add_stream(stream);
        }
        if let Some(stream) = self.exception.take() {
            self = self.add_stream(stream);
        }
        if let Some(memory64_section) = self.memory64_section.take() {
            self = self.add(memory64_section);
        }

        let SynthDump {
            section,
            flags,
            stream_count,
            stream_count_label,
            stream_directory_rva,
            stream_directory,
            ..
        } = self;
        if flags.value().is_none() {
            flags.set_const(0);
        }
        stream_count_label.set_const(stream_count as u64);
        section
            .mark(&stream_directory_rva)
            .append_section(stream_directory)
            .get_contents()
    }
}

impl Default for SynthDump {
    fn default() -> Self {
        Self::new()
    }
}

/// A stream of arbitrary data.
pub struct SimpleStream {
    /// The stream type.
    pub stream_type: u32,
    /// The stream's contents.
    pub section: Section,
}

impl From<SimpleStream> for Section {
    fn from(stream: SimpleStream) -> Self {
        stream.section
    }
}

impl_dumpsection!(SimpleStream);

impl Stream for SimpleStream {
    fn stream_type(&self) -> u32 {
        self.stream_type
    }
}

/// A `u32`-count-prefixed list stream.
pub struct ListStream<T: ListItem> {
    stream_type: u32,
    section: Section,
    count: u32,
    count_label: Label,
    out_of_band: Section,
    _type: PhantomData<T>,
}

impl<T: ListItem> ListStream<T> {
    pub fn new<S: Into<u32>>(stream_type: S, endian: Endian) -> Self {
        let count_label = Label::new();
        ListStream {
            stream_type: stream_type.into(),
            section: Section::with_endian(endian).D32(&count_label),
            count: 0,
            count_label,
            out_of_band: Section::with_endian(endian),
            _type: PhantomData,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, entry: T) -> Self {
        self.count += 1;
        let (section, out_of_band_opt) = entry.into_sections();
        self.section = self
            .section
            .mark(&section.file_offset())
            .append_section(section);
        if let Some(out_of_band) = out_of_band_opt {
            self.out_of_band = self
                .out_of_band
                .mark(&out_of_band.file_offset())
                .append_section(out_of_band);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<T: ListItem> From<ListStream<T>> for Section {
    fn from(list: ListStream<T>) -> Self {
        list.count_label.set_const(list.count as u64);
        list.section
            .mark(&list.out_of_band.file_offset())
            .append_section(list.out_of_band)
    }
}

impl<T: ListItem> DumpSection for ListStream<T> {
    fn file_offset(&self) -> Label {
        self.section.file_offset()
    }

    fn file_size(&self) -> Label {
        // The out-of-band data is not part of the stream proper.
        self.section.final_size()
    }
}

impl<T: ListItem> Stream for ListStream<T> {
    fn stream_type(&self) -> u32 {
        self.stream_type
    }
}

/// The Memory64List stream: `u64` count, base RVA, then packed
/// `(start, size)` descriptors.
pub struct Memory64ListStream {
    section: Section,
    count: u64,
    count_label: Label,
}

impl Memory64ListStream {
    pub fn new(endian: Endian, memory64_rva: &Label) -> Self {
        let count_label = Label::new();
        let section = Section::with_endian(endian)
            .D64(&count_label)
            .D64(memory64_rva);
        Self {
            section,
            count: 0,
            count_label,
        }
    }

    pub fn add_memory(mut self, memory: &Memory) -> Self {
        self.count += 1;
        self.section = self.section.D64(memory.address).D64(memory.section.size());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl From<Memory64ListStream> for Section {
    fn from(list: Memory64ListStream) -> Self {
        list.count_label.set_const(list.count);
        list.section
    }
}

impl DumpSection for Memory64ListStream {
    fn file_offset(&self) -> Label {
        self.section.file_offset()
    }

    fn file_size(&self) -> Label {
        self.section.file_size()
    }
}

impl Stream for Memory64ListStream {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::Memory64ListStream as u32
    }
}

macro_rules! ex_list_stream {
    ($name:ident, $stream_type:expr, $doc:literal) => {
        #[doc = $doc]
        pub struct $name {
            section: Section,
            count: u32,
            count_label: Label,
            out_of_band: Section,
        }

        impl $name {
            #[allow(clippy::should_implement_trait)]
            pub fn add<T: ListItem>(mut self, entry: T) -> Self {
                self.count += 1;
                let (section, out_of_band_opt) = entry.into_sections();
                self.section = self
                    .section
                    .mark(&section.file_offset())
                    .append_section(section);
                if let Some(out_of_band) = out_of_band_opt {
                    self.out_of_band = self
                        .out_of_band
                        .mark(&out_of_band.file_offset())
                        .append_section(out_of_band);
                }
                self
            }

            pub fn is_empty(&self) -> bool {
                self.count == 0
            }
        }

        impl From<$name> for Section {
            fn from(list: $name) -> Self {
                list.count_label.set_const(list.count as u64);
                list.section
                    .mark(&list.out_of_band.file_offset())
                    .append_section(list.out_of_band)
            }
        }

        impl DumpSection for $name {
            fn file_offset(&self) -> Label {
                self.section.file_offset()
            }

            fn file_size(&self) -> Label {
                self.section.final_size()
            }
        }

        impl Stream for $name {
            fn stream_type(&self) -> u32 {
                $stream_type as u32
            }
        }
    };
}

ex_list_stream!(
    UnloadedListStream,
    md::MINIDUMP_STREAM_TYPE::UnloadedModuleListStream,
    "The unloaded-module list stream (12-byte extended header)."
);

impl UnloadedListStream {
    pub fn new(endian: Endian) -> Self {
        let count_label = Label::new();
        UnloadedListStream {
            section: Section::with_endian(endian)
                .D32(12)
                .D32(mem::size_of::<md::MINIDUMP_UNLOADED_MODULE>() as u32)
                .D32(&count_label),
            count: 0,
            count_label,
            out_of_band: Section::with_endian(endian),
        }
    }
}

ex_list_stream!(
    MemoryInfoListStream,
    md::MINIDUMP_STREAM_TYPE::MemoryInfoListStream,
    "The memory-info list stream (16-byte header with a u64 count)."
);

impl MemoryInfoListStream {
    pub fn new(endian: Endian) -> Self {
        let count_label = Label::new();
        MemoryInfoListStream {
            section: Section::with_endian(endian)
                .D32(16)
                .D32(mem::size_of::<md::MINIDUMP_MEMORY_INFO>() as u32)
                .D64(&count_label),
            count: 0,
            count_label,
            out_of_band: Section::with_endian(endian),
        }
    }
}

ex_list_stream!(
    HandleDataStream,
    md::MINIDUMP_STREAM_TYPE::HandleDataStream,
    "The handle-data stream (16-byte header)."
);

impl HandleDataStream {
    pub fn new(endian: Endian) -> Self {
        Self::with_descriptor_size(endian, HandleDescriptor::V2_SIZE)
    }

    pub fn with_descriptor_size(endian: Endian, descriptor_size: u32) -> Self {
        let count_label = Label::new();
        HandleDataStream {
            section: Section::with_endian(endian)
                .D32(16)
                .D32(descriptor_size)
                .D32(&count_label)
                .D32(0),
            count: 0,
            count_label,
            out_of_band: Section::with_endian(endian),
        }
    }
}

/// A `MINIDUMP_STRING`: UTF-16 preceded by a 4-byte byte length.
pub struct DumpString {
    section: Section,
}

impl DumpString {
    pub fn new(s: &str, endian: Endian) -> DumpString {
        let u16_s = s
            .encode_utf16()
            .fold(Vec::with_capacity(s.len() * 2), |mut v, unit| {
                match endian {
                    Endian::Little => {
                        v.push((unit & 0xff) as u8);
                        v.push((unit >> 8) as u8);
                    }
                    Endian::Big => {
                        v.push((unit >> 8) as u8);
                        v.push((unit & 0xff) as u8);
                    }
                }
                v
            });
        let section = Section::with_endian(endian)
            .D32(u16_s.len() as u32)
            .append_bytes(&u16_s);
        DumpString { section }
    }
}

impl From<DumpString> for Section {
    fn from(string: DumpString) -> Self {
        string.section
    }
}

impl_dumpsection!(DumpString);

/// A fixed set of version info to use for tests.
pub const STOCK_VERSION_INFO: md::VS_FIXEDFILEINFO = md::VS_FIXEDFILEINFO {
    signature: md::VS_FFI_SIGNATURE,
    struct_version: md::VS_FFI_STRUCVERSION,
    file_version_hi: 0x11111111,
    file_version_lo: 0x22222222,
    product_version_hi: 0x33333333,
    product_version_lo: 0x44444444,
    file_flags_mask: 1,
    file_flags: 1,
    file_os: 0x40004,
    file_type: 1,
    file_subtype: 0,
    file_date_hi: 0,
    file_date_lo: 0,
};

/// A minidump module.
pub struct Module {
    section: Section,
    cv_record: Option<(Label, Label)>,
    misc_record: Option<(Label, Label)>,
}

impl Module {
    pub fn new<'a, T: Into<Option<&'a md::VS_FIXEDFILEINFO>>>(
        endian: Endian,
        base_of_image: u64,
        size_of_image: u32,
        name: &DumpString,
        time_date_stamp: u32,
        checksum: u32,
        version_info: T,
    ) -> Module {
        let version_info = version_info.into().unwrap_or(&STOCK_VERSION_INFO);
        let section = Section::with_endian(endian)
            .D64(base_of_image)
            .D32(size_of_image)
            .D32(checksum)
            .D32(time_date_stamp)
            .D32(name.file_offset())
            .D32(version_info.signature)
            .D32(version_info.struct_version)
            .D32(version_info.file_version_hi)
            .D32(version_info.file_version_lo)
            .D32(version_info.product_version_hi)
            .D32(version_info.product_version_lo)
            .D32(version_info.file_flags_mask)
            .D32(version_info.file_flags)
            .D32(version_info.file_os)
            .D32(version_info.file_type)
            .D32(version_info.file_subtype)
            .D32(version_info.file_date_hi)
            .D32(version_info.file_date_lo);
        Module {
            section,
            cv_record: None,
            misc_record: None,
        }
    }

    pub fn cv_record<T: DumpSection>(mut self, cv_record: &T) -> Module {
        self.cv_record = Some((cv_record.file_size(), cv_record.file_offset()));
        self
    }

    pub fn misc_record<T: DumpSection>(mut self, misc_record: &T) -> Module {
        self.misc_record = Some((misc_record.file_size(), misc_record.file_offset()));
        self
    }
}

impl_dumpsection!(Module);

impl From<Module> for Section {
    fn from(module: Module) -> Self {
        let Module {
            section,
            cv_record,
            misc_record,
        } = module;
        section
            .cite_location(&cv_record)
            .cite_location(&misc_record)
            // reserved0
            .D64(0)
            // reserved1
            .D64(0)
    }
}

/// An RSDS (PDB 7.0) CodeView record.
pub fn rsds_record(endian: Endian, guid: md::GUID, age: u32, pdb_name: &str) -> Section {
    let mut section = Section::with_endian(endian)
        .D32(md::CvSignature::Pdb70 as u32)
        .D32(guid.data1)
        .D16(guid.data2)
        .D16(guid.data3);
    section = section.append_bytes(&guid.data4);
    section.D32(age).append_bytes(pdb_name.as_bytes()).D8(0)
}

/// An NB10 (PDB 2.0) CodeView record.
pub fn nb10_record(endian: Endian, timestamp: u32, age: u32, pdb_name: &str) -> Section {
    Section::with_endian(endian)
        .D32(md::CvSignature::Pdb20 as u32)
        .D32(0) // cv_offset
        .D32(timestamp)
        .D32(age)
        .append_bytes(pdb_name.as_bytes())
        .D8(0)
}

/// A minidump unloaded module.
pub struct UnloadedModule {
    section: Section,
}

impl UnloadedModule {
    pub fn new(
        endian: Endian,
        base_of_image: u64,
        size_of_image: u32,
        name: &DumpString,
        time_date_stamp: u32,
        checksum: u32,
    ) -> UnloadedModule {
        let section = Section::with_endian(endian)
            .D64(base_of_image)
            .D32(size_of_image)
            .D32(checksum)
            .D32(time_date_stamp)
            .D32(name.file_offset());
        UnloadedModule { section }
    }
}

impl_dumpsection!(UnloadedModule);

impl From<UnloadedModule> for Section {
    fn from(module: UnloadedModule) -> Self {
        module.section
    }
}

/// A minidump thread.
pub struct Thread {
    section: Section,
}

impl Thread {
    pub fn new<T>(endian: Endian, id: u32, stack: &Memory, context: &T) -> Thread
    where
        T: DumpSection,
    {
        let section = Section::with_endian(endian)
            .D32(id)
            .D32(0) // suspend_count
            .D32(0) // priority_class
            .D32(0) // priority
            .D64(0) // teb
            .cite_memory(stack)
            .cite_location(context);
        Thread { section }
    }

    /// A thread with no context location, for testing absence.
    pub fn without_context(endian: Endian, id: u32, stack: &Memory) -> Thread {
        let section = Section::with_endian(endian)
            .D32(id)
            .D32(0)
            .D32(0)
            .D32(0)
            .D64(0)
            .cite_memory(stack)
            .D32(0)
            .D32(0);
        Thread { section }
    }
}

impl_dumpsection!(Thread);

impl From<Thread> for Section {
    fn from(thread: Thread) -> Self {
        thread.section
    }
}

/// A minidump thread name.
pub struct ThreadName {
    section: Section,
}

impl ThreadName {
    pub fn new(endian: Endian, id: u32, name: Option<&DumpString>) -> Self {
        let section = Section::with_endian(endian).D32(id);
        // Name is optional to test corrupt entries easily.
        let section = match name {
            Some(name) => section.D64(name.file_offset()),
            None => section.D64(0xFFFF_FFFF_FFFF_FFFF),
        };
        ThreadName { section }
    }
}

impl_dumpsection!(ThreadName);

impl From<ThreadName> for Section {
    fn from(name: ThreadName) -> Self {
        name.section
    }
}

/// A range of memory contents.
pub struct Memory {
    section: Section,
    pub address: u64,
}

impl Memory {
    /// Memory starting at `address` containing the contents of `section`.
    pub fn with_section(section: Section, address: u64) -> Memory {
        Memory { section, address }
    }

    /// Append a `MINIDUMP_MEMORY_DESCRIPTOR` for this range to `section`.
    pub fn cite_memory_in(&self, section: Section) -> Section {
        section.D64(self.address).cite_location(self)
    }
}

impl_dumpsection!(Memory);

impl From<Memory> for Section {
    fn from(memory: Memory) -> Self {
        memory.section
    }
}

/// A memory-info list entry.
pub struct MemoryInfo {
    section: Section,
}

impl MemoryInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endian: Endian,
        base_address: u64,
        allocation_base: u64,
        allocation_protection: u32,
        region_size: u64,
        state: u32,
        protection: u32,
        ty: u32,
    ) -> MemoryInfo {
        let section = Section::with_endian(endian)
            .D64(base_address)
            .D64(allocation_base)
            .D32(allocation_protection)
            .D32(0) // __alignment1
            .D64(region_size)
            .D32(state)
            .D32(protection)
            .D32(ty)
            .D32(0); // __alignment2
        MemoryInfo { section }
    }
}

impl_dumpsection!(MemoryInfo);

impl From<MemoryInfo> for Section {
    fn from(info: MemoryInfo) -> Self {
        info.section
    }
}

/// A handle-data descriptor, in either the 32-byte or 40-byte layout.
pub struct HandleDescriptor {
    section: Section,
}

impl HandleDescriptor {
    pub const V1_SIZE: u32 = 32;
    pub const V2_SIZE: u32 = 40;

    pub fn v1(
        endian: Endian,
        handle: u64,
        type_name: Option<&DumpString>,
        object_name: Option<&DumpString>,
        handle_count: u32,
    ) -> HandleDescriptor {
        let section = Self::common(endian, handle, type_name, object_name, handle_count);
        HandleDescriptor { section }
    }

    pub fn v2(
        endian: Endian,
        handle: u64,
        type_name: Option<&DumpString>,
        object_name: Option<&DumpString>,
        handle_count: u32,
    ) -> HandleDescriptor {
        let section = Self::common(endian, handle, type_name, object_name, handle_count)
            .D32(0) // object_info_rva
            .D32(0); // reserved0
        HandleDescriptor { section }
    }

    fn common(
        endian: Endian,
        handle: u64,
        type_name: Option<&DumpString>,
        object_name: Option<&DumpString>,
        handle_count: u32,
    ) -> Section {
        let cite = |section: Section, name: Option<&DumpString>| match name {
            Some(name) => section.D32(name.file_offset()),
            None => section.D32(0),
        };
        let mut section = Section::with_endian(endian).D64(handle);
        section = cite(section, type_name);
        section = cite(section, object_name);
        section
            .D32(0) // attributes
            .D32(0x1f01ff) // granted_access
            .D32(handle_count)
            .D32(1) // pointer_count
    }
}

impl_dumpsection!(HandleDescriptor);

impl From<HandleDescriptor> for Section {
    fn from(handle: HandleDescriptor) -> Self {
        handle.section
    }
}

/// The SystemInfo stream.
pub struct SystemInfo {
    section: Section,
}

impl SystemInfo {
    pub fn new(
        endian: Endian,
        processor_architecture: u16,
        major_version: u32,
        minor_version: u32,
        build_number: u32,
        platform_id: u32,
        csd_version: Option<&DumpString>,
    ) -> SystemInfo {
        Self::with_cpu_info(
            endian,
            processor_architecture,
            major_version,
            minor_version,
            build_number,
            platform_id,
            csd_version,
            &[0; 24],
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_cpu_info(
        endian: Endian,
        processor_architecture: u16,
        major_version: u32,
        minor_version: u32,
        build_number: u32,
        platform_id: u32,
        csd_version: Option<&DumpString>,
        cpu_info: &[u8; 24],
    ) -> SystemInfo {
        let section = Section::with_endian(endian)
            .D16(processor_architecture)
            .D16(6) // processor_level
            .D16(0x100) // processor_revision
            .D8(4) // number_of_processors
            .D8(1) // product_type (workstation)
            .D32(major_version)
            .D32(minor_version)
            .D32(build_number)
            .D32(platform_id);
        let section = match csd_version {
            Some(csd) => section.D32(csd.file_offset()),
            None => section.D32(0),
        };
        let section = section
            .D16(0) // suite_mask
            .D16(0) // reserved2
            .append_bytes(cpu_info);
        SystemInfo { section }
    }
}

impl_dumpsection!(SystemInfo);

impl From<SystemInfo> for Section {
    fn from(info: SystemInfo) -> Self {
        info.section
    }
}

impl Stream for SystemInfo {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::SystemInfoStream as u32
    }
}

/// The Exception stream, citing an out-of-line context section.
pub struct Exception {
    section: Section,
}

impl Exception {
    pub fn new<T>(
        endian: Endian,
        thread_id: u32,
        exception_code: u32,
        exception_address: u64,
        parameters: &[u64],
        context: &T,
    ) -> Exception
    where
        T: DumpSection,
    {
        assert!(parameters.len() <= 15);
        let mut section = Section::with_endian(endian)
            .D32(thread_id)
            .D32(0) // __align
            .D32(exception_code)
            .D32(0) // exception_flags
            .D64(0) // nested exception_record
            .D64(exception_address)
            .D32(parameters.len() as u32)
            .D32(0); // __align
        for i in 0..15 {
            section = section.D64(parameters.get(i).copied().unwrap_or(0));
        }
        let section = section.cite_location(context);
        Exception { section }
    }

    /// An exception with a fabricated parameter count but no parameter
    /// payload problems (the record always carries 15 slots on disk).
    pub fn with_raw_parameter_count<T>(
        endian: Endian,
        thread_id: u32,
        exception_code: u32,
        exception_address: u64,
        number_parameters: u32,
        context: &T,
    ) -> Exception
    where
        T: DumpSection,
    {
        let mut section = Section::with_endian(endian)
            .D32(thread_id)
            .D32(0)
            .D32(exception_code)
            .D32(0)
            .D64(0)
            .D64(exception_address)
            .D32(number_parameters)
            .D32(0);
        for _ in 0..15 {
            section = section.D64(0);
        }
        let section = section.cite_location(context);
        Exception { section }
    }
}

impl_dumpsection!(Exception);

impl From<Exception> for Section {
    fn from(exception: Exception) -> Self {
        exception.section
    }
}

impl Stream for Exception {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::ExceptionStream as u32
    }
}

/// An AMD64 context section builder.
///
/// Builds the full 1232-byte record with the registers the dumplens tests
/// care about; everything else stays zero.
pub struct Amd64Context {
    context_flags: u32,
    eflags: u32,
    rip: u64,
    rsp: u64,
    rbp: u64,
}

impl Amd64Context {
    pub const SIZE: usize = 1232;

    pub fn new() -> Amd64Context {
        Amd64Context {
            // CONTEXT_CONTROL | CONTEXT_INTEGER | CONTEXT_SEGMENTS
            context_flags: 0x0010_0007,
            eflags: 0x202,
            rip: 0,
            rsp: 0,
            rbp: 0,
        }
    }

    pub fn context_flags(mut self, flags: u32) -> Self {
        self.context_flags = flags;
        self
    }

    pub fn eflags(mut self, eflags: u32) -> Self {
        self.eflags = eflags;
        self
    }

    pub fn rip(mut self, rip: u64) -> Self {
        self.rip = rip;
        self
    }

    pub fn rsp(mut self, rsp: u64) -> Self {
        self.rsp = rsp;
        self
    }

    pub fn rbp(mut self, rbp: u64) -> Self {
        self.rbp = rbp;
        self
    }

    pub fn build(self, endian: Endian) -> Section {
        let mut bytes = vec![0u8; Self::SIZE];
        bytes[48..52].copy_from_slice(&self.context_flags.to_le_bytes());
        bytes[68..72].copy_from_slice(&self.eflags.to_le_bytes());
        bytes[152..160].copy_from_slice(&self.rsp.to_le_bytes());
        bytes[160..168].copy_from_slice(&self.rbp.to_le_bytes());
        bytes[248..256].copy_from_slice(&self.rip.to_le_bytes());
        Section::with_endian(endian).append_bytes(&bytes)
    }
}

impl Default for Amd64Context {
    fn default() -> Self {
        Self::new()
    }
}

/// The MiscInfo stream.
///
/// Fields left `None` have their gate bit clear.
pub struct MiscStream {
    section: Section,
    pub process_id: Option<u32>,
    /// (create, user, kernel) times, in seconds.
    pub process_times: Option<(u32, u32, u32)>,
    /// (max mhz, current mhz, mhz limit, max idle, current idle).
    pub power_info: Option<(u32, u32, u32, u32, u32)>,
    pub process_integrity_level: Option<u32>,
    pub process_execute_flags: Option<u32>,
    pub protected_process: Option<u32>,
    /// (time zone id, bias, standard name, daylight name).
    pub time_zone: Option<(u32, i32, String, String)>,
    /// (build string, dbg build string).
    pub build_strings: Option<(String, String)>,
    pub pad_to_size: Option<usize>,
}

impl MiscStream {
    pub fn new(endian: Endian) -> MiscStream {
        MiscStream {
            section: Section::with_endian(endian),
            process_id: None,
            process_times: None,
            power_info: None,
            process_integrity_level: None,
            process_execute_flags: None,
            protected_process: None,
            time_zone: None,
            build_strings: None,
            pad_to_size: None,
        }
    }

    fn flags(&self) -> u32 {
        let mut flags = 0u32;
        if self.process_id.is_some() {
            flags |= 0x1;
        }
        if self.process_times.is_some() {
            flags |= 0x2;
        }
        if self.power_info.is_some() {
            flags |= 0x4;
        }
        if self.process_integrity_level.is_some() {
            flags |= 0x10;
        }
        if self.process_execute_flags.is_some() {
            flags |= 0x20;
        }
        if self.time_zone.is_some() {
            flags |= 0x40;
        }
        if self.protected_process.is_some() {
            flags |= 0x80;
        }
        if self.build_strings.is_some() {
            flags |= 0x100;
        }
        flags
    }

    fn size(&self) -> usize {
        let mut size = 24;
        if self.power_info.is_some() {
            size = 44;
        }
        if self.process_integrity_level.is_some()
            || self.process_execute_flags.is_some()
            || self.protected_process.is_some()
        {
            size = 232;
        }
        if self.time_zone.is_some() {
            size = size.max(260);
        }
        if self.build_strings.is_some() {
            size = 1128;
        }
        size.max(self.pad_to_size.unwrap_or(0))
    }
}

fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_utf16(bytes: &mut [u8], offset: usize, max_bytes: usize, value: &str) {
    let mut pos = offset;
    for unit in value.encode_utf16().take(max_bytes / 2 - 1) {
        bytes[pos..pos + 2].copy_from_slice(&unit.to_le_bytes());
        pos += 2;
    }
}

impl From<MiscStream> for Section {
    fn from(stream: MiscStream) -> Self {
        let size = stream.size();
        let mut bytes = vec![0u8; size];
        put_u32(&mut bytes, 0, size as u32);
        put_u32(&mut bytes, 4, stream.flags());
        if let Some(pid) = stream.process_id {
            put_u32(&mut bytes, 8, pid);
        }
        if let Some((create, user, kernel)) = stream.process_times {
            put_u32(&mut bytes, 12, create);
            put_u32(&mut bytes, 16, user);
            put_u32(&mut bytes, 20, kernel);
        }
        if let Some((max, current, limit, max_idle, current_idle)) = stream.power_info {
            put_u32(&mut bytes, 24, max);
            put_u32(&mut bytes, 28, current);
            put_u32(&mut bytes, 32, limit);
            put_u32(&mut bytes, 36, max_idle);
            put_u32(&mut bytes, 40, current_idle);
        }
        if let Some(level) = stream.process_integrity_level {
            put_u32(&mut bytes, 44, level);
        }
        if let Some(flags) = stream.process_execute_flags {
            put_u32(&mut bytes, 48, flags);
        }
        if let Some(protected) = stream.protected_process {
            put_u32(&mut bytes, 52, protected);
        }
        if let Some((id, bias, standard, daylight)) = &stream.time_zone {
            put_u32(&mut bytes, 56, *id);
            put_u32(&mut bytes, 60, *bias as u32);
            put_utf16(&mut bytes, 64, 64, standard);
            put_utf16(&mut bytes, 196, 64, daylight);
        }
        if let Some((build, dbg)) = &stream.build_strings {
            put_utf16(&mut bytes, 232, 520, build);
            put_utf16(&mut bytes, 752, 80, dbg);
        }
        stream.section.append_bytes(&bytes)
    }
}

impl_dumpsection!(MiscStream);

impl Stream for MiscStream {
    fn stream_type(&self) -> u32 {
        md::MINIDUMP_STREAM_TYPE::MiscInfoStream as u32
    }
}
