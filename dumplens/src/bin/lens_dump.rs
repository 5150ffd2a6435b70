// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! `lens-dump`: print every parsed stream of a minidump.

use std::env;
use std::io::Write;
use std::path::Path;

use dumplens::ParsedDump;

const USAGE: &str = "Usage: lens-dump <minidump>";

fn print_dump(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mapping = dumplens::map_file(path)?;
    let dump = ParsedDump::parse(&mapping)?;
    let stdout = &mut std::io::stdout();

    dump.print(stdout)?;
    if let Some(system_info) = &dump.system_info {
        system_info.print(stdout)?;
    }
    if let Some(misc_info) = &dump.misc_info {
        misc_info.print(stdout)?;
    }
    if let Some(exception) = &dump.exception {
        exception.print(stdout)?;
    }
    if let Some(thread_list) = &dump.thread_list {
        thread_list.print(stdout)?;
    }
    if let Some(module_list) = &dump.module_list {
        module_list.print(stdout)?;
    }
    if let Some(unloaded) = &dump.unloaded_module_list {
        unloaded.print(stdout)?;
    }
    if let Some(memory64_list) = &dump.memory64_list {
        memory64_list.print(stdout)?;
    }
    if let Some(memory_info_list) = &dump.memory_info_list {
        memory_info_list.print(stdout)?;
    }
    if let Some(handle_data) = &dump.handle_data {
        handle_data.print(stdout)?;
    }
    if let Some(thread_names) = &dump.thread_names {
        thread_names.print(stdout)?;
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let Some(dump_arg) = env::args().nth(1) else {
        let mut stderr = std::io::stderr();
        writeln!(&mut stderr, "{USAGE}").unwrap();
        std::process::exit(1);
    };
    if let Err(err) = print_dump(Path::new(&dump_arg)) {
        let mut stderr = std::io::stderr();
        writeln!(&mut stderr, "Error reading dump: {err}").unwrap();
        std::process::exit(1);
    }
}
