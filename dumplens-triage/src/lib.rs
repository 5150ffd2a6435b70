// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Crash triage on top of a parsed minidump.
//!
//! [`analyze`] fuses the exception record, the faulting thread's CPU
//! context, and the module layout into a [`CrashAnalysis`]: a
//! reconstructed call stack, a blamed module with the reason it was
//! chosen, a probable-cause sentence, a recommendation, and a confidence
//! grade. Everything here is read-only over the borrowed dump; the
//! analysis owns its own frame list and display strings.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("crash.dmp")?;
//! let dump = dumplens::ParsedDump::parse(&data)?;
//! if let Some(analysis) = dumplens_triage::analyze(&dump) {
//!     println!("{}", analysis.summary.probable_cause);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations)]

pub mod classify;
pub mod walker;

use dumplens::nt_status;
use dumplens::ParsedDump;

pub use classify::{categorize, is_system, ModuleCategory};
pub use walker::{
    walk_stack, FrameConfidence, FrameKind, StackFrame, WalkNotes, MAX_FRAMES,
};

/// Why a module was blamed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlameReason {
    /// A graphics driver appeared in the top frames.
    GraphicsDriver,
    /// The crash happened directly inside the blamed module.
    DirectCrash,
    /// The first non-system module on the reconstructed stack.
    FirstNonSystemFrame,
}

impl BlameReason {
    /// A short sentence fragment for summaries.
    pub fn text(self) -> &'static str {
        match self {
            BlameReason::GraphicsDriver => "graphics driver code is on the faulting path",
            BlameReason::DirectCrash => "the crash occurred directly in this module",
            BlameReason::FirstNonSystemFrame => {
                "first non-system module on the reconstructed stack"
            }
        }
    }
}

/// The module the analyzer holds responsible for the crash.
#[derive(Debug, Clone)]
pub struct Blame {
    /// The blamed module's full name.
    pub module: String,
    /// The blamed module's file name.
    pub short_name: String,
    pub category: ModuleCategory,
    pub reason: BlameReason,
    /// Index into [`CrashAnalysis::frames`] of the frame that triggered
    /// the blame.
    pub frame_index: usize,
}

/// How much to trust the analysis as a whole.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalysisConfidence {
    Low,
    Medium,
    High,
}

/// Human-oriented conclusions about the crash.
#[derive(Debug, Clone)]
pub struct CrashSummary {
    /// The symbolic name of the exception code.
    pub exception_name: String,
    /// The reference description of the exception code.
    pub exception_description: String,
    pub probable_cause: String,
    pub recommendation: String,
}

/// The result of analyzing a parsed dump.
#[derive(Debug, Clone)]
pub struct CrashAnalysis {
    /// The reconstructed stack, innermost frame first, at most
    /// [`MAX_FRAMES`] entries, deduplicated by address.
    pub frames: Vec<StackFrame>,
    pub blame: Option<Blame>,
    pub summary: CrashSummary,
    pub confidence: AnalysisConfidence,
    /// Which walk phases contributed frames.
    pub notes: WalkNotes,
}

/// Analyze a parsed dump.
///
/// Returns `None` only when the dump has no exception stream or no usable
/// CPU context; every other degradation shows up as missing frames or a
/// lower confidence instead.
pub fn analyze(dump: &ParsedDump<'_>) -> Option<CrashAnalysis> {
    let exception = dump.exception.as_ref()?;
    let thread = dump.faulting_thread();
    // The exception context points at the fault; the thread context has
    // usually moved on into exception dispatch by the time of the dump.
    let context = exception
        .context
        .as_ref()
        .or_else(|| thread.and_then(|t| t.context.as_ref()))?;

    let (frames, notes) = walk_stack(dump, Some(exception), thread, context);
    let blame = assign_blame(dump, &frames, exception.address());
    let confidence = score_confidence(&frames);
    let summary = summarize(exception, blame.as_ref());

    Some(CrashAnalysis {
        frames,
        blame,
        summary,
        confidence,
        notes,
    })
}

/// How many leading frames the graphics-driver rule inspects.
const GRAPHICS_FRAME_WINDOW: usize = 5;

fn blame_from_frame(frames: &[StackFrame], index: usize, reason: BlameReason) -> Option<Blame> {
    let module = frames[index].module.as_ref()?;
    Some(Blame {
        module: module.clone(),
        short_name: short_name(module).to_string(),
        category: categorize(module),
        reason,
        frame_index: index,
    })
}

fn short_name(path: &str) -> &str {
    path.rsplit(|c| c == '\\' || c == '/').next().unwrap_or(path)
}

/// Pick a blamed module, first match wins:
/// a graphics driver near the top of the stack, then a non-system crash
/// site, then the first non-system frame anywhere, then the module
/// containing the exception address.
fn assign_blame(
    dump: &ParsedDump<'_>,
    frames: &[StackFrame],
    exception_address: u64,
) -> Option<Blame> {
    for (index, frame) in frames.iter().take(GRAPHICS_FRAME_WINDOW).enumerate() {
        if frame.category() == Some(ModuleCategory::GraphicsDriver) {
            return blame_from_frame(frames, index, BlameReason::GraphicsDriver);
        }
    }

    if let Some(first) = frames.first() {
        if first
            .category()
            .map(ModuleCategory::should_blame)
            .unwrap_or(false)
        {
            return blame_from_frame(frames, 0, BlameReason::DirectCrash);
        }
    }

    for (index, frame) in frames.iter().enumerate() {
        if frame
            .category()
            .map(ModuleCategory::should_blame)
            .unwrap_or(false)
        {
            return blame_from_frame(frames, index, BlameReason::FirstNonSystemFrame);
        }
    }

    // Fall back to whatever contains the faulting address, even a system
    // module; knowing where the fault landed beats knowing nothing.
    let module = dump.module_containing(exception_address)?;
    let index = frames
        .iter()
        .position(|frame| frame.module.as_deref() == Some(module.name.as_str()))?;
    blame_from_frame(frames, index, BlameReason::DirectCrash)
}

fn summarize(exception: &dumplens::Exception, blame: Option<&Blame>) -> CrashSummary {
    let code = exception.code();
    let probable_cause = match code {
        0xC000_0005 => exception
            .access_violation_details()
            .unwrap_or_else(|| "Invalid memory access".to_string()),
        0xC000_00FD => {
            "Stack overflow – excessive recursion or large stack allocations".to_string()
        }
        0xC000_0094 => "Division by zero in integer arithmetic".to_string(),
        0xC000_0409 => "Security check failure – buffer overrun detected".to_string(),
        0xE06D_7363 => "Unhandled C++ exception".to_string(),
        _ => match blame {
            Some(blame) => format!("Exception in {}: {}", blame.short_name, blame.reason.text()),
            None => nt_status::description(code).to_string(),
        },
    };

    let recommendation = match blame {
        Some(blame) => match blame.category {
            ModuleCategory::GraphicsDriver => {
                "Update graphics drivers to the latest version from the GPU vendor".to_string()
            }
            ModuleCategory::ThirdParty => format!(
                "Check for updates to {} – it is not part of Windows or the application",
                blame.short_name
            ),
            ModuleCategory::Application => {
                "This looks like a bug in the application code – report it to the developers"
                    .to_string()
            }
            ModuleCategory::System => {
                "Check for Windows updates or hardware issues".to_string()
            }
        },
        None => "No module could be blamed – analyze the stack trace manually".to_string(),
    };

    CrashSummary {
        exception_name: nt_status::name(code).into_owned(),
        exception_description: nt_status::description(code).to_string(),
        probable_cause,
        recommendation,
    }
}

fn score_confidence(frames: &[StackFrame]) -> AnalysisConfidence {
    let frame_pointer_frames = frames
        .iter()
        .filter(|f| f.kind == FrameKind::FramePointer)
        .count();
    let high_frames = frames
        .iter()
        .filter(|f| f.confidence == FrameConfidence::High)
        .count();

    if frame_pointer_frames >= 3 && high_frames >= 4 {
        AnalysisConfidence::High
    } else if high_frames >= 2 || frame_pointer_frames >= 1 {
        AnalysisConfidence::Medium
    } else {
        AnalysisConfidence::Low
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame(kind: FrameKind, confidence: FrameConfidence) -> StackFrame {
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0x1000);
        StackFrame {
            address: COUNTER.fetch_add(8, std::sync::atomic::Ordering::Relaxed),
            module: None,
            offset: None,
            kind,
            confidence,
        }
    }

    #[test]
    fn test_confidence_scoring() {
        use FrameConfidence::*;
        use FrameKind::*;

        // 3 frame-pointer frames and 4 high frames: High.
        let frames: Vec<_> = vec![
            frame(InstructionPointer, High),
            frame(FramePointer, High),
            frame(FramePointer, High),
            frame(FramePointer, High),
        ];
        assert_eq!(score_confidence(&frames), AnalysisConfidence::High);

        // One frame-pointer frame: Medium.
        let frames = vec![frame(FramePointer, High)];
        assert_eq!(score_confidence(&frames), AnalysisConfidence::Medium);

        // Two high frames without any chain: Medium.
        let frames = vec![
            frame(InstructionPointer, High),
            frame(InstructionPointer, High),
        ];
        assert_eq!(score_confidence(&frames), AnalysisConfidence::Medium);

        // Scan-only results: Low.
        let frames = vec![
            frame(ReturnAddress, Medium),
            frame(ReturnAddress, Low),
        ];
        assert_eq!(score_confidence(&frames), AnalysisConfidence::Low);
        assert_eq!(score_confidence(&[]), AnalysisConfidence::Low);
    }
}
