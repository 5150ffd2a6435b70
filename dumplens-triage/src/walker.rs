// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Best-effort stack reconstruction for the faulting thread.
//!
//! Without symbols or unwind tables there are three usable signals: the
//! exception record, the frame-pointer chain (when the crashing code kept
//! one), and return-address-shaped values sitting on the stack. The walk
//! runs all three in order, deduplicates by address, and caps the result,
//! so a damaged stack degrades the output instead of breaking it.

use std::collections::HashSet;
use std::convert::TryInto;

use dumplens::format::CONTEXT_AMD64;
use dumplens::{Exception, ParsedDump, Thread};
use tracing::debug;

use crate::classify::{categorize, ModuleCategory};

/// Hard cap on the reconstructed stack depth.
pub const MAX_FRAMES: usize = 100;
/// Maximum frame-pointer links to follow.
const MAX_CHAIN_STEPS: usize = 100;
/// Bytes of stack inspected by the heuristic scan.
const MAX_SCAN_BYTES: u64 = 8192;
/// Maximum frames the heuristic scan may contribute.
const MAX_SCAN_FRAMES: usize = 20;
/// Return addresses this close to a module base are unlikely to be real
/// call sites (headers, thunk tables).
const MIN_RETURN_OFFSET: u64 = 0x1000;

/// How a frame was discovered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// The faulting instruction itself (exception address or RIP).
    InstructionPointer,
    /// A return address found by walking the frame-pointer chain.
    FramePointer,
    /// A return-address-shaped value found by scanning the stack.
    ReturnAddress,
}

/// How much to trust a frame's address.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameConfidence {
    Low,
    Medium,
    High,
}

/// One reconstructed stack frame.
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// The code address of this frame.
    pub address: u64,
    /// The full name of the module containing the address, if any.
    pub module: Option<String>,
    /// The offset of the address within that module.
    pub offset: Option<u64>,
    pub kind: FrameKind,
    pub confidence: FrameConfidence,
}

impl StackFrame {
    /// The display token for this frame: `module+0xoffset` or a bare
    /// address.
    pub fn resolve(&self, dump: &ParsedDump) -> String {
        dump.resolve(self.address)
    }

    pub fn category(&self) -> Option<ModuleCategory> {
        self.module.as_deref().map(categorize)
    }
}

/// Which phases of the walk produced frames, for display.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkNotes {
    pub used_exception_frame: bool,
    pub used_instruction_pointer: bool,
    pub frame_pointer_frames: usize,
    pub scanned_frames: usize,
}

struct Walk<'a> {
    dump: &'a ParsedDump<'a>,
    frames: Vec<StackFrame>,
    seen: HashSet<u64>,
}

impl<'a> Walk<'a> {
    fn push(&mut self, address: u64, kind: FrameKind, confidence: FrameConfidence) -> bool {
        if !self.seen.insert(address) {
            return false;
        }
        let module = self.dump.module_containing(address);
        self.frames.push(StackFrame {
            address,
            module: module.map(|m| m.name.clone()),
            offset: module.map(|m| address - m.base_address()),
            kind,
            confidence,
        });
        true
    }

    fn read_u64(&self, addr: u64) -> Option<u64> {
        let bytes = self.dump.read_at(addr, 8)?;
        if bytes.len() < 8 {
            return None;
        }
        Some(u64::from_le_bytes(bytes[..8].try_into().unwrap()))
    }
}

/// Reconstruct the call stack of the faulting thread.
///
/// `context` is the CPU state to walk from (preferably the exception
/// context); `thread` supplies the stack bounds and may be absent, in
/// which case only the instruction-pointer frames are produced.
pub fn walk_stack(
    dump: &ParsedDump<'_>,
    exception: Option<&Exception>,
    thread: Option<&Thread>,
    context: &CONTEXT_AMD64,
) -> (Vec<StackFrame>, WalkNotes) {
    let mut walk = Walk {
        dump,
        frames: Vec::new(),
        seen: HashSet::new(),
    };
    let mut notes = WalkNotes::default();

    // The exception address is the single most trustworthy frame.
    if let Some(exception) = exception {
        notes.used_exception_frame = walk.push(
            exception.address(),
            FrameKind::InstructionPointer,
            FrameConfidence::High,
        );
    }

    // RIP, unless it duplicates the exception address.
    if walk.push(
        context.rip,
        FrameKind::InstructionPointer,
        FrameConfidence::High,
    ) {
        notes.used_instruction_pointer = true;
    }

    if let Some(thread) = thread {
        notes.frame_pointer_frames = walk_frame_chain(&mut walk, thread, context);
        notes.scanned_frames = scan_stack(&mut walk, thread, context);
    }

    walk.frames.truncate(MAX_FRAMES);
    (walk.frames, notes)
}

/// Follow the saved-RBP chain while it stays inside the stack and makes
/// forward progress.
fn walk_frame_chain(walk: &mut Walk<'_>, thread: &Thread, context: &CONTEXT_AMD64) -> usize {
    let mut emitted = 0;
    let mut current = context.rbp;
    for _ in 0..MAX_CHAIN_STEPS {
        let in_stack = current >= thread.stack_base() && current < thread.stack_end();
        if !in_stack || current < context.rsp || current % 8 != 0 {
            break;
        }
        let (saved_rbp, return_addr) = match (walk.read_u64(current), walk.read_u64(current + 8)) {
            (Some(saved_rbp), Some(return_addr)) => (saved_rbp, return_addr),
            _ => {
                debug!("frame chain left captured memory at {current:#x}");
                break;
            }
        };
        if walk.dump.module_containing(return_addr).is_some()
            && walk.push(return_addr, FrameKind::FramePointer, FrameConfidence::High)
        {
            emitted += 1;
        }
        // The stack grows down, so a valid caller frame sits above us.
        if saved_rbp > current {
            current = saved_rbp;
        } else {
            break;
        }
    }
    emitted
}

/// Scan the stack below RSP for values that look like return addresses.
fn scan_stack(walk: &mut Walk<'_>, thread: &Thread, context: &CONTEXT_AMD64) -> usize {
    let available = thread.stack_end().saturating_sub(context.rsp);
    let scan_size = MAX_SCAN_BYTES.min(available) as usize;
    if scan_size == 0 {
        return 0;
    }
    let bytes = match walk.dump.read_at(context.rsp, scan_size) {
        Some(bytes) => bytes,
        None => return 0,
    };

    let mut emitted = 0;
    for chunk in bytes.chunks_exact(8) {
        if emitted >= MAX_SCAN_FRAMES {
            break;
        }
        let candidate = u64::from_le_bytes(chunk.try_into().unwrap());
        if walk.seen.contains(&candidate) {
            continue;
        }
        let Some(module) = walk.dump.module_containing(candidate) else {
            continue;
        };
        // Addresses inside the first page of a module are headers, not
        // call sites.
        if candidate - module.base_address() <= MIN_RETURN_OFFSET {
            continue;
        }
        let confidence = if crate::classify::is_system(&module.name) {
            FrameConfidence::Medium
        } else {
            FrameConfidence::Low
        };
        if walk.push(candidate, FrameKind::ReturnAddress, confidence) {
            emitted += 1;
        }
    }
    emitted
}
