// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! End-to-end triage tests over synthesized minidumps.

use dumplens::ParsedDump;
use dumplens_synth::{
    Amd64Context, DumpString, Exception, Memory, Module, SynthDump, Thread,
};
use dumplens_triage::{
    analyze, AnalysisConfidence, BlameReason, FrameConfidence, FrameKind, ModuleCategory,
};
use test_assembler::{Endian, Section};

const APP_BASE: u64 = 0x1_4000_0000;
const HELPER_BASE: u64 = 0x7ff8_0000_0000;
const NTDLL_BASE: u64 = 0x7ffb_0000_0000;
const NVOGL_BASE: u64 = 0x7ff9_0000_0000;
const MODULE_SIZE: u32 = 0x1_0000;

const STACK_BASE: u64 = 0x7fff_e000;

/// Adds the standard module fixture: an application EXE, an application
/// DLL, ntdll, and an NVIDIA GL driver.
fn with_modules(dump: SynthDump) -> SynthDump {
    let mut dump = dump;
    for (name, base) in [
        (r"C:\Program Files\TestApp\app.exe", APP_BASE),
        (r"C:\Program Files\TestApp\helper.dll", HELPER_BASE),
        (r"C:\Windows\System32\ntdll.dll", NTDLL_BASE),
        (
            r"C:\Windows\System32\DriverStore\FileRepository\nv.inf_amd64\nvoglv64.dll",
            NVOGL_BASE,
        ),
    ] {
        let name = DumpString::new(name, Endian::Little);
        let module = Module::new(Endian::Little, base, MODULE_SIZE, &name, 0, 0, None);
        dump = dump.add_module(module).add(name);
    }
    dump
}

/// A stack image: 8-byte words starting at [`STACK_BASE`].
fn stack_from_words(words: &[u64]) -> Memory {
    let mut section = Section::with_endian(Endian::Little);
    for &word in words {
        section = section.D64(word);
    }
    Memory::with_section(section, STACK_BASE)
}

fn parse(bytes: &[u8]) -> ParsedDump<'_> {
    ParsedDump::parse(bytes).unwrap()
}

#[test]
fn test_frame_pointer_chain() {
    // Two well-formed frame records: rbp -> 0x...e030 -> 0x...e050 -> end.
    let stack = stack_from_words(&[
        0,
        0,
        STACK_BASE + 0x30,  // 0x10: saved rbp
        APP_BASE + 0x2000,  // 0x18: return into app.exe
        0,
        0,
        STACK_BASE + 0x50,  // 0x30: saved rbp
        HELPER_BASE + 0x3000, // 0x38: return into helper.dll
        0,
        0,
        0, // 0x50: chain terminates
        0,
    ]);
    let context = Amd64Context::new()
        .rip(APP_BASE + 0x1000)
        .rsp(STACK_BASE)
        .rbp(STACK_BASE + 0x10)
        .build(Endian::Little);
    let thread = Thread::new(Endian::Little, 0x42, &stack, &context);
    let exception = Exception::new(
        Endian::Little,
        0x42,
        0xC000_0005,
        APP_BASE + 0x1000,
        &[1, 0x10],
        &context,
    );
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .add_thread(thread)
        .add_memory(stack)
        .add_exception(exception)
        .add(context)
        .finish()
        .unwrap();
    let dump = parse(&bytes);
    let analysis = analyze(&dump).unwrap();

    // The exception frame, then the two chain frames, in walk order.
    assert_eq!(analysis.frames.len(), 3);
    assert_eq!(analysis.frames[0].address, APP_BASE + 0x1000);
    assert_eq!(analysis.frames[0].kind, FrameKind::InstructionPointer);
    assert_eq!(analysis.frames[1].address, APP_BASE + 0x2000);
    assert_eq!(analysis.frames[1].kind, FrameKind::FramePointer);
    assert_eq!(analysis.frames[1].confidence, FrameConfidence::High);
    assert_eq!(analysis.frames[2].address, HELPER_BASE + 0x3000);
    assert_eq!(analysis.frames[2].kind, FrameKind::FramePointer);
    assert!(analysis.confidence >= AnalysisConfidence::Medium);
    assert_eq!(analysis.notes.frame_pointer_frames, 2);

    // Addresses are unique across the frame list.
    let mut addresses: Vec<_> = analysis.frames.iter().map(|f| f.address).collect();
    addresses.sort_unstable();
    addresses.dedup();
    assert_eq!(addresses.len(), analysis.frames.len());

    // Frame 0 is in the application, so the crash is blamed directly.
    let blame = analysis.blame.as_ref().unwrap();
    assert_eq!(blame.short_name, "app.exe");
    assert_eq!(blame.category, ModuleCategory::Application);
    assert_eq!(blame.reason, BlameReason::DirectCrash);
    assert_eq!(blame.frame_index, 0);
    assert_eq!(
        analysis.summary.probable_cause,
        "The instruction at 0x0000000140001000 tried writing to address 0x0000000000000010"
    );
    assert!(analysis.summary.recommendation.contains("bug in the application"));
}

#[test]
fn test_high_confidence_needs_a_deep_chain() {
    let stack = stack_from_words(&[
        0,
        0,
        STACK_BASE + 0x30,
        APP_BASE + 0x2000,
        0,
        0,
        STACK_BASE + 0x50,
        HELPER_BASE + 0x3000,
        0,
        0,
        STACK_BASE + 0x70,
        APP_BASE + 0x3000,
        0,
        0,
        0,
        0,
    ]);
    let context = Amd64Context::new()
        // RIP differs from the exception address, so both emit frames.
        .rip(APP_BASE + 0x1080)
        .rsp(STACK_BASE)
        .rbp(STACK_BASE + 0x10)
        .build(Endian::Little);
    let thread = Thread::new(Endian::Little, 7, &stack, &context);
    let exception = Exception::new(
        Endian::Little,
        7,
        0xC000_0094,
        APP_BASE + 0x1000,
        &[],
        &context,
    );
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .add_thread(thread)
        .add_memory(stack)
        .add_exception(exception)
        .add(context)
        .finish()
        .unwrap();
    let dump = parse(&bytes);
    let analysis = analyze(&dump).unwrap();

    assert_eq!(analysis.frames.len(), 5);
    assert!(analysis.notes.used_exception_frame);
    assert!(analysis.notes.used_instruction_pointer);
    assert_eq!(analysis.notes.frame_pointer_frames, 3);
    assert_eq!(analysis.confidence, AnalysisConfidence::High);
    assert_eq!(
        analysis.summary.probable_cause,
        "Division by zero in integer arithmetic"
    );
}

#[test]
fn test_graphics_driver_blame() {
    let context = Amd64Context::new()
        .rip(NVOGL_BASE + 0x5000)
        .rsp(STACK_BASE)
        .build(Endian::Little);
    let exception = Exception::new(
        Endian::Little,
        1,
        0xC000_0005,
        NVOGL_BASE + 0x5000,
        &[0, 0x0],
        &context,
    );
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .add_exception(exception)
        .add(context)
        .finish()
        .unwrap();
    let dump = parse(&bytes);
    let analysis = analyze(&dump).unwrap();

    let blame = analysis.blame.as_ref().unwrap();
    assert_eq!(blame.short_name, "nvoglv64.dll");
    assert_eq!(blame.category, ModuleCategory::GraphicsDriver);
    assert_eq!(blame.reason, BlameReason::GraphicsDriver);
    assert!(analysis
        .summary
        .recommendation
        .to_lowercase()
        .contains("graphics drivers"));
}

#[test]
fn test_first_non_system_frame_blame() {
    // The crash site is in ntdll; the first application frame comes from
    // the frame-pointer chain.
    let stack = stack_from_words(&[
        0,
        0,
        STACK_BASE + 0x30, // 0x10
        NTDLL_BASE + 0x2000,
        0,
        0,
        STACK_BASE + 0x50, // 0x30
        APP_BASE + 0x4000,
        0,
        0,
        0,
        0,
    ]);
    let context = Amd64Context::new()
        .rip(NTDLL_BASE + 0x5000)
        .rsp(STACK_BASE)
        .rbp(STACK_BASE + 0x10)
        .build(Endian::Little);
    let thread = Thread::new(Endian::Little, 5, &stack, &context);
    let exception = Exception::new(
        Endian::Little,
        5,
        0xC000_0374,
        NTDLL_BASE + 0x5000,
        &[],
        &context,
    );
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .add_thread(thread)
        .add_memory(stack)
        .add_exception(exception)
        .add(context)
        .finish()
        .unwrap();
    let dump = parse(&bytes);
    let analysis = analyze(&dump).unwrap();

    let blame = analysis.blame.as_ref().unwrap();
    assert_eq!(blame.short_name, "app.exe");
    assert_eq!(blame.reason, BlameReason::FirstNonSystemFrame);
    // The heap corruption code is not special-cased, so the cause names
    // the blamed module.
    assert!(analysis.summary.probable_cause.contains("app.exe"));
}

#[test]
fn test_fallback_blame_is_the_faulting_module() {
    let context = Amd64Context::new()
        .rip(NTDLL_BASE + 0x5000)
        .rsp(STACK_BASE)
        .build(Endian::Little);
    let exception = Exception::new(
        Endian::Little,
        1,
        0xC000_0096,
        NTDLL_BASE + 0x5000,
        &[],
        &context,
    );
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .add_exception(exception)
        .add(context)
        .finish()
        .unwrap();
    let dump = parse(&bytes);
    let analysis = analyze(&dump).unwrap();

    let blame = analysis.blame.as_ref().unwrap();
    assert_eq!(blame.short_name, "ntdll.dll");
    assert_eq!(blame.category, ModuleCategory::System);
    assert_eq!(blame.reason, BlameReason::DirectCrash);
    assert!(analysis
        .summary
        .recommendation
        .contains("Windows updates or hardware"));
    assert_eq!(analysis.confidence, AnalysisConfidence::Low);
}

#[test]
fn test_scan_frames_and_confidence_levels() {
    // No usable frame chain (rbp = 0); the stack holds two plausible
    // return addresses and one module-header address that must be
    // skipped.
    let stack = stack_from_words(&[
        NTDLL_BASE + 0x2000,  // system: Medium confidence
        NTDLL_BASE + 0x800,   // within the first page: skipped
        HELPER_BASE + 0x3000, // non-system: Low confidence
        0x1234,               // not a module address
    ]);
    let context = Amd64Context::new()
        .rip(APP_BASE + 0x1000)
        .rsp(STACK_BASE)
        .rbp(0)
        .build(Endian::Little);
    let thread = Thread::new(Endian::Little, 9, &stack, &context);
    let exception = Exception::new(
        Endian::Little,
        9,
        0xC000_001D,
        APP_BASE + 0x1000,
        &[],
        &context,
    );
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .add_thread(thread)
        .add_memory(stack)
        .add_exception(exception)
        .add(context)
        .finish()
        .unwrap();
    let dump = parse(&bytes);
    let analysis = analyze(&dump).unwrap();

    let scanned: Vec<_> = analysis
        .frames
        .iter()
        .filter(|f| f.kind == FrameKind::ReturnAddress)
        .collect();
    assert_eq!(scanned.len(), 2);
    assert_eq!(scanned[0].address, NTDLL_BASE + 0x2000);
    assert_eq!(scanned[0].confidence, FrameConfidence::Medium);
    assert_eq!(scanned[1].address, HELPER_BASE + 0x3000);
    assert_eq!(scanned[1].confidence, FrameConfidence::Low);
    assert_eq!(analysis.notes.scanned_frames, 2);
}

#[test]
fn test_stack_overflow_cause() {
    let context = Amd64Context::new()
        .rip(APP_BASE + 0x1000)
        .build(Endian::Little);
    let exception = Exception::new(
        Endian::Little,
        1,
        0xC000_00FD,
        APP_BASE + 0x1000,
        &[],
        &context,
    );
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .add_exception(exception)
        .add(context)
        .finish()
        .unwrap();
    let dump = parse(&bytes);
    let analysis = analyze(&dump).unwrap();
    assert_eq!(
        analysis.summary.probable_cause,
        "Stack overflow – excessive recursion or large stack allocations"
    );
    assert_eq!(analysis.summary.exception_name, "STATUS_STACK_OVERFLOW");
}

#[test]
fn test_analyze_requires_exception_and_context() {
    // No exception stream at all.
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .finish()
        .unwrap();
    assert!(analyze(&parse(&bytes)).is_none());

    // An exception whose context is too small to decode, and no thread
    // to fall back to.
    let bogus_context = Section::with_endian(Endian::Little).append_repeated(0, 16);
    let exception = Exception::new(
        Endian::Little,
        1,
        0xC000_0005,
        APP_BASE + 0x1000,
        &[],
        &bogus_context,
    );
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .add_exception(exception)
        .add(bogus_context)
        .finish()
        .unwrap();
    assert!(analyze(&parse(&bytes)).is_none());
}

#[test]
fn test_analysis_is_deterministic() {
    let context = Amd64Context::new()
        .rip(APP_BASE + 0x1000)
        .build(Endian::Little);
    let exception = Exception::new(
        Endian::Little,
        1,
        0xE06D_7363,
        APP_BASE + 0x1000,
        &[],
        &context,
    );
    let bytes = with_modules(SynthDump::with_endian(Endian::Little))
        .add_exception(exception)
        .add(context)
        .finish()
        .unwrap();
    let dump = parse(&bytes);
    let first = analyze(&dump).unwrap();
    let second = analyze(&dump).unwrap();
    assert_eq!(first.frames.len(), second.frames.len());
    assert_eq!(first.summary.probable_cause, second.summary.probable_cause);
    assert_eq!(first.summary.probable_cause, "Unhandled C++ exception");
    assert_eq!(first.confidence, second.confidence);
}
