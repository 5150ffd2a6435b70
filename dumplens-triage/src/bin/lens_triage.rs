// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! `lens-triage`: print the crash analysis for a minidump.

use std::path::PathBuf;

use clap::Parser;
use dumplens::ParsedDump;
use dumplens_triage::{analyze, AnalysisConfidence};

#[derive(Parser, Debug)]
#[command(name = "lens-triage", about = "Analyze a Windows minidump and assign blame")]
struct Options {
    /// The minidump file to analyze.
    dump: PathBuf,

    /// Print every reconstructed frame instead of the top ten.
    #[arg(long)]
    all_frames: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let options = Options::parse();

    let mapping = dumplens::map_file(&options.dump)?;
    let dump = ParsedDump::parse(&mapping)?;

    if let Some(system_info) = &dump.system_info {
        println!("System:      {} ({:?})", system_info.os_name(), system_info.arch);
    }
    if let Some(exception) = &dump.exception {
        println!(
            "Exception:   {} at {}",
            exception.code_name(),
            dump.resolve(exception.address())
        );
    }

    let Some(analysis) = analyze(&dump) else {
        println!("No exception or usable CPU context; nothing to analyze.");
        return Ok(());
    };

    println!("Cause:       {}", analysis.summary.probable_cause);
    if let Some(blame) = &analysis.blame {
        println!(
            "Blame:       {} ({:?}, {:?})",
            blame.short_name, blame.category, blame.reason
        );
    }
    println!("Advice:      {}", analysis.summary.recommendation);
    let confidence = match analysis.confidence {
        AnalysisConfidence::High => "high",
        AnalysisConfidence::Medium => "medium",
        AnalysisConfidence::Low => "low",
    };
    println!("Confidence:  {confidence}");

    println!("\nCall stack ({} frames):", analysis.frames.len());
    let shown = if options.all_frames {
        analysis.frames.len()
    } else {
        analysis.frames.len().min(10)
    };
    for (i, frame) in analysis.frames[..shown].iter().enumerate() {
        println!(
            "  #{:02} {} [{:?}, {:?}]",
            i,
            frame.resolve(&dump),
            frame.kind,
            frame.confidence
        );
    }
    if shown < analysis.frames.len() {
        println!("  ... {} more (use --all-frames)", analysis.frames.len() - shown);
    }

    Ok(())
}
