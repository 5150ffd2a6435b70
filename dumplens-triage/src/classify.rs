// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Static module classification.
//!
//! Blame assignment needs to know whether a module is part of Windows, a
//! display driver, the application itself, or some other third party. The
//! tables here are deliberately static: they describe the module ecosystem,
//! not the dump.

/// What kind of code a module is, for blame purposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModuleCategory {
    /// A Windows system module. Never blamed.
    System,
    /// A display driver from one of the GPU vendors.
    GraphicsDriver,
    /// The application's own code (anything under Program Files or
    /// ProgramData).
    Application,
    /// Everything else: injected DLLs, plugins, overlays.
    ThirdParty,
}

impl ModuleCategory {
    /// Whether the blame pass may pin a crash on this kind of module.
    ///
    /// Graphics drivers are deliberately blameable even though they live
    /// under `\Windows\`.
    pub fn should_blame(self) -> bool {
        self != ModuleCategory::System
    }
}

/// Windows core DLLs, by file stem.
static SYSTEM_MODULES: &[&str] = &[
    "ntdll",
    "kernel32",
    "kernelbase",
    "user32",
    "gdi32",
    "gdi32full",
    "msvcrt",
    "ucrtbase",
    "ole32",
    "oleaut32",
    "combase",
    "rpcrt4",
    "sechost",
    "crypt32",
    "advapi32",
    "ws2_32",
    "winhttp",
    "wininet",
    "urlmon",
    "shell32",
    "shlwapi",
    "shcore",
    "win32u",
    "cfgmgr32",
    "setupapi",
    "wintrust",
    "imagehlp",
    "dbghelp",
    "version",
    "psapi",
    "imm32",
    "msctf",
    "clr",
    "clrjit",
    "mscorwks",
    "coreclr",
    "mscoreei",
    "d3d9",
    "d3d10",
    "d3d10_1",
    "d3d11",
    "d3d12",
    "dxgi",
    "d2d1",
    "dwrite",
    "dcomp",
    "mf",
    "mfplat",
    "mfreadwrite",
    "windowscodecs",
    "propsys",
    "profapi",
    "powrprof",
    "ntmarta",
];

/// System DLL families matched by prefix (vcruntime140, msvcp140_2,
/// bcryptprimitives, ...).
static SYSTEM_PREFIXES: &[&str] = &["vcruntime", "msvcp", "bcrypt"];

/// Graphics driver DLLs matched exactly, by file stem.
static GRAPHICS_MODULES: &[&str] = &[
    "igdusc64",
    "intelocl64",
    "igdfcl64",
    "nvinit",
    "nvumdshimx",
    "nvldumdx",
    "vulkan-1",
];

/// Graphics driver DLL families matched by prefix: Intel (igxelp*, ig9*,
/// igd*, igc*), NVIDIA (nvogl*, nvd3d*, nvwgf2*, nvcuda*, nvapi*,
/// nvopencl*), AMD/ATI (ati*, amd*).
static GRAPHICS_PREFIXES: &[&str] = &[
    "igxelp", "ig9", "igd", "igc", "nvogl", "nvd3d", "nvwgf2", "nvcuda", "nvapi", "nvopencl",
    "ati", "amd",
];

static WINDOWS_PATHS: &[&str] = &[
    r"\windows\system32\",
    r"\windows\syswow64\",
    r"\windows\winsxs\",
];

fn short_name(path: &str) -> &str {
    path.rsplit(|c| c == '\\' || c == '/').next().unwrap_or(path)
}

/// The file stem: short name minus a trailing `.dll`/`.exe`/`.sys`.
fn stem(short: &str) -> &str {
    for ext in [".dll", ".exe", ".sys"] {
        if let Some(stripped) = strip_suffix_ignore_case(short, ext) {
            return stripped;
        }
    }
    short
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.len() >= suffix.len() && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix) {
        Some(&s[..s.len() - suffix.len()])
    } else {
        None
    }
}

fn is_graphics_driver(stem: &str) -> bool {
    GRAPHICS_MODULES.contains(&stem) || GRAPHICS_PREFIXES.iter().any(|p| stem.starts_with(p))
}

fn is_system_module(stem: &str, lower_path: &str) -> bool {
    SYSTEM_MODULES.contains(&stem)
        || SYSTEM_PREFIXES.iter().any(|p| stem.starts_with(p))
        || WINDOWS_PATHS.iter().any(|p| lower_path.contains(p))
}

/// Classify a module by its (full or short) name.
///
/// The decision order matters: a graphics driver wins over the system
/// table even when it lives under `\Windows\System32\`, and the system
/// table wins over the Program Files check.
pub fn categorize(module_name: &str) -> ModuleCategory {
    let lower_path = module_name.to_ascii_lowercase();
    let stem = stem(short_name(&lower_path));

    if is_graphics_driver(stem) {
        ModuleCategory::GraphicsDriver
    } else if is_system_module(stem, &lower_path) {
        ModuleCategory::System
    } else if lower_path.contains(r"\program files") || lower_path.contains(r"\programdata") {
        ModuleCategory::Application
    } else {
        ModuleCategory::ThirdParty
    }
}

/// Whether blame treats this module as part of Windows.
///
/// Graphics drivers return `false` here regardless of location.
pub fn is_system(module_name: &str) -> bool {
    categorize(module_name) == ModuleCategory::System
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_system_modules() {
        assert_eq!(
            categorize(r"C:\Windows\System32\ntdll.dll"),
            ModuleCategory::System
        );
        assert_eq!(categorize("KERNELBASE.dll"), ModuleCategory::System);
        assert_eq!(categorize("vcruntime140_1.dll"), ModuleCategory::System);
        assert_eq!(categorize("msvcp140.dll"), ModuleCategory::System);
        assert_eq!(categorize("bcryptprimitives.dll"), ModuleCategory::System);
        // An unknown module under System32 is still system.
        assert_eq!(
            categorize(r"C:\Windows\System32\obscure.dll"),
            ModuleCategory::System
        );
        assert_eq!(
            categorize(r"C:\WINDOWS\SysWOW64\foo.dll"),
            ModuleCategory::System
        );
    }

    #[test]
    fn test_graphics_drivers_beat_system_paths() {
        // Driver DLLs live under System32 but classify as drivers.
        assert_eq!(
            categorize(r"C:\Windows\System32\nvoglv64.dll"),
            ModuleCategory::GraphicsDriver
        );
        assert_eq!(
            categorize(r"C:\Windows\System32\DriverStore\igd10iumd64.dll"),
            ModuleCategory::GraphicsDriver
        );
        assert_eq!(categorize("atidxx64.dll"), ModuleCategory::GraphicsDriver);
        assert_eq!(categorize("amdvlk64.dll"), ModuleCategory::GraphicsDriver);
        assert_eq!(categorize("vulkan-1.dll"), ModuleCategory::GraphicsDriver);
        assert_eq!(categorize("nvwgf2umx.dll"), ModuleCategory::GraphicsDriver);
        assert!(!is_system(r"C:\Windows\System32\nvoglv64.dll"));
    }

    #[test]
    fn test_application_and_third_party() {
        assert_eq!(
            categorize(r"C:\Program Files\MyApp\myapp.exe"),
            ModuleCategory::Application
        );
        assert_eq!(
            categorize(r"C:\Program Files (x86)\Tool\tool.dll"),
            ModuleCategory::Application
        );
        assert_eq!(
            categorize(r"C:\ProgramData\Vendor\hook.dll"),
            ModuleCategory::Application
        );
        assert_eq!(
            categorize(r"C:\Users\me\AppData\overlay.dll"),
            ModuleCategory::ThirdParty
        );
        assert_eq!(categorize("random.dll"), ModuleCategory::ThirdParty);
    }

    #[test]
    fn test_should_blame() {
        assert!(!ModuleCategory::System.should_blame());
        assert!(ModuleCategory::GraphicsDriver.should_blame());
        assert!(ModuleCategory::Application.should_blame());
        assert!(ModuleCategory::ThirdParty.should_blame());
    }
}
