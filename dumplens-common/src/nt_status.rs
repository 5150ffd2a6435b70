// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! NTSTATUS codes as they appear in Windows exception records.
//!
//! The table covers the codes that actually show up in crash dumps:
//! hardware exception codes, loader failures, runtime fail-fasts, and the
//! compiler/runtime-reserved codes (`0xE06D7363` and friends, which are
//! thrown through `RaiseException` and are not ntstatus.h entries).
//! Everything else gets a hex placeholder name and a generic description.

use num_traits::FromPrimitive;
use std::borrow::Cow;

/// The severity of an NTSTATUS code, from bits 31..30.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Success = 0,
    Informational = 1,
    Warning = 2,
    Error = 3,
}

/// The severity encoded in `code`.
pub fn severity(code: u32) -> Severity {
    match code >> 30 {
        0 => Severity::Success,
        1 => Severity::Informational,
        2 => Severity::Warning,
        _ => Severity::Error,
    }
}

/// Whether `code` carries error severity.
pub fn is_error(code: u32) -> bool {
    severity(code) == Severity::Error
}

/// The symbolic name of `code`, or an `"0x..."` placeholder for codes not
/// in the table.
pub fn name(code: u32) -> Cow<'static, str> {
    match NtStatus::from_u32(code) {
        Some(status) => Cow::Borrowed(status.name()),
        None => Cow::Owned(format!("0x{code:08X}")),
    }
}

/// A human-readable description of `code`.
pub fn description(code: u32) -> &'static str {
    match NtStatus::from_u32(code) {
        Some(status) => status.description(),
        None => "Unknown exception code.",
    }
}

macro_rules! nt_status_table {
    ($( $name:ident = $value:literal => $desc:literal, )+) => {
        /// The NTSTATUS codes this crate knows by name.
        #[repr(u32)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, enum_primitive_derive::Primitive)]
        #[allow(non_camel_case_types)]
        pub enum NtStatus {
            $( $name = $value, )+
        }

        impl NtStatus {
            /// The symbolic name, as spelled in the Microsoft reference.
            pub fn name(&self) -> &'static str {
                match self {
                    $( NtStatus::$name => stringify!($name), )+
                }
            }

            /// The Microsoft reference description.
            pub fn description(&self) -> &'static str {
                match self {
                    $( NtStatus::$name => $desc, )+
                }
            }
        }
    };
}

nt_status_table! {
    STATUS_SUCCESS = 0x0000_0000 => "The operation completed successfully.",
    STATUS_TIMEOUT = 0x0000_0102 => "The given Timeout interval expired.",
    STATUS_PENDING = 0x0000_0103 => "The operation that was requested is pending completion.",
    STATUS_OBJECT_NAME_EXISTS = 0x4000_0000 => "An attempt was made to create an object and the object name already existed.",
    STATUS_FATAL_APP_EXIT = 0x4000_0015 => "The application caused an unhandled exception and was terminated.",
    DBG_CONTROL_C = 0x4001_0005 => "Debugger received a CTRL+C event.",
    DBG_CONTROL_BREAK = 0x4001_0008 => "Debugger received a CTRL+BREAK event.",
    STATUS_GUARD_PAGE_VIOLATION = 0x8000_0001u32 => "A page of memory that marks the end of a data structure, such as a stack or an array, has been accessed.",
    STATUS_DATATYPE_MISALIGNMENT = 0x8000_0002u32 => "A datatype misalignment was detected in a load or store instruction.",
    STATUS_BREAKPOINT = 0x8000_0003u32 => "A breakpoint has been reached.",
    STATUS_SINGLE_STEP = 0x8000_0004u32 => "A single step or trace operation has just been completed.",
    STATUS_BUFFER_OVERFLOW = 0x8000_0005u32 => "The data was too large to fit into the specified buffer.",
    STATUS_LONGJUMP = 0x8000_0026u32 => "A long jump has been executed.",
    STATUS_UNWIND_CONSOLIDATE = 0x8000_0029u32 => "A frame consolidation has been executed.",
    STATUS_UNSUCCESSFUL = 0xC000_0001u32 => "The requested operation was unsuccessful.",
    STATUS_NOT_IMPLEMENTED = 0xC000_0002u32 => "The requested operation is not implemented.",
    STATUS_ACCESS_VIOLATION = 0xC000_0005u32 => "The instruction referenced memory that it is not allowed to access.",
    STATUS_IN_PAGE_ERROR = 0xC000_0006u32 => "The required data was not placed into memory because of an I/O error.",
    STATUS_INVALID_HANDLE = 0xC000_0008u32 => "An invalid HANDLE was specified.",
    STATUS_INVALID_PARAMETER = 0xC000_000Du32 => "An invalid parameter was passed to a service or function.",
    STATUS_NO_MEMORY = 0xC000_0017u32 => "Not enough virtual memory or paging file quota is available to complete the specified operation.",
    STATUS_ILLEGAL_INSTRUCTION = 0xC000_001Du32 => "An attempt was made to execute an illegal instruction.",
    STATUS_ACCESS_DENIED = 0xC000_0022u32 => "A process has requested access to an object, but has not been granted those access rights.",
    STATUS_NONCONTINUABLE_EXCEPTION = 0xC000_0025u32 => "Windows cannot continue from this exception.",
    STATUS_LOGON_FAILURE = 0xC000_006Du32 => "The attempted logon is invalid due to a bad user name or authentication information.",
    STATUS_INVALID_IMAGE_FORMAT = 0xC000_007Bu32 => "The specified image file did not have the correct format.",
    STATUS_ARRAY_BOUNDS_EXCEEDED = 0xC000_008Cu32 => "Array bounds exceeded.",
    STATUS_FLOAT_DENORMAL_OPERAND = 0xC000_008Du32 => "Floating-point denormal operand.",
    STATUS_FLOAT_DIVIDE_BY_ZERO = 0xC000_008Eu32 => "Floating-point division by zero.",
    STATUS_FLOAT_INEXACT_RESULT = 0xC000_008Fu32 => "Floating-point inexact result.",
    STATUS_FLOAT_INVALID_OPERATION = 0xC000_0090u32 => "Floating-point invalid operation.",
    STATUS_FLOAT_OVERFLOW = 0xC000_0091u32 => "Floating-point overflow.",
    STATUS_FLOAT_STACK_CHECK = 0xC000_0092u32 => "Floating-point stack check.",
    STATUS_FLOAT_UNDERFLOW = 0xC000_0093u32 => "Floating-point underflow.",
    STATUS_INTEGER_DIVIDE_BY_ZERO = 0xC000_0094u32 => "The thread attempted to divide an integer value by an integer divisor of zero.",
    STATUS_INTEGER_OVERFLOW = 0xC000_0095u32 => "The result of an integer operation caused the most significant bit of the result to carry.",
    STATUS_PRIVILEGED_INSTRUCTION = 0xC000_0096u32 => "An attempt was made to execute a privileged instruction.",
    STATUS_STACK_OVERFLOW = 0xC000_00FDu32 => "A new guard page for the stack cannot be created.",
    STATUS_DLL_NOT_FOUND = 0xC000_0135u32 => "The code execution cannot proceed because a required DLL was not found.",
    STATUS_ORDINAL_NOT_FOUND = 0xC000_0138u32 => "The ordinal could not be located in the DLL.",
    STATUS_ENTRYPOINT_NOT_FOUND = 0xC000_0139u32 => "The procedure entry point could not be located in the DLL.",
    STATUS_CONTROL_C_EXIT = 0xC000_013Au32 => "The application terminated as a result of a CTRL+C.",
    STATUS_DLL_INIT_FAILED = 0xC000_0142u32 => "Initialization of the dynamic link library failed. The process is terminating abnormally.",
    STATUS_UNHANDLED_EXCEPTION = 0xC000_0144u32 => "An unhandled exception occurred in the application.",
    STATUS_POSSIBLE_DEADLOCK = 0xC000_0194u32 => "A possible deadlock condition was detected.",
    STATUS_HEAP_CORRUPTION = 0xC000_0374u32 => "A heap has been corrupted.",
    STATUS_STACK_BUFFER_OVERRUN = 0xC000_0409u32 => "The system detected an overrun of a stack-based buffer in this application.",
    STATUS_INVALID_CRUNTIME_PARAMETER = 0xC000_0417u32 => "An invalid parameter was passed to a C runtime function.",
    STATUS_ASSERTION_FAILURE = 0xC000_0420u32 => "An assertion failure has occurred.",
    STATUS_FAIL_FAST_EXCEPTION = 0xC000_0602u32 => "A fail fast exception occurred. Exception handlers will not be invoked and the process will be terminated immediately.",
    RPC_NT_INVALID_STRING_BINDING = 0xC002_0001u32 => "The string binding is invalid.",
    RPC_NT_NOT_CANCELLED = 0xC002_0047u32 => "Thread is not canceled.",
    CLR_EXCEPTION = 0xE043_4352u32 => "Unhandled .NET (CLR) exception.",
    COM_PLUS_EXCEPTION = 0xE043_4F4Du32 => "Unhandled .NET 1.x (COM+) exception.",
    MSVC_CPP_EXCEPTION = 0xE06D_7363u32 => "Unhandled C++ exception thrown by the Microsoft Visual C++ runtime.",
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_severity() {
        assert_eq!(severity(0x0000_0000), Severity::Success);
        assert_eq!(severity(0x4001_0005), Severity::Informational);
        assert_eq!(severity(0x8000_0003), Severity::Warning);
        assert_eq!(severity(0xC000_0005), Severity::Error);
        assert_eq!(severity(0xE06D_7363), Severity::Error);
        assert!(is_error(0xC000_0374));
        assert!(!is_error(0x8000_0005));
    }

    #[test]
    fn test_listed_codes_have_names() {
        for code in [
            0x0000_0000u32,
            0x0000_0102,
            0x0000_0103,
            0x4000_0000,
            0x4000_0015,
            0x8000_0001,
            0x8000_0002,
            0x8000_0003,
            0x8000_0004,
            0x8000_0005,
            0x8000_0026,
            0x8000_0029,
            0xC000_0001,
            0xC000_0002,
            0xC000_0005,
            0xC000_0006,
            0xC000_0008,
            0xC000_000D,
            0xC000_0017,
            0xC000_001D,
            0xC000_0022,
            0xC000_0025,
            0xC000_006D,
            0xC000_007B,
            0xC000_008C,
            0xC000_008D,
            0xC000_008E,
            0xC000_008F,
            0xC000_0090,
            0xC000_0091,
            0xC000_0092,
            0xC000_0093,
            0xC000_0094,
            0xC000_0095,
            0xC000_0096,
            0xC000_00FD,
            0xC000_0135,
            0xC000_0138,
            0xC000_0139,
            0xC000_013A,
            0xC000_0142,
            0xC000_0144,
            0xC000_0194,
            0xC000_0374,
            0xC000_0409,
            0xC000_0417,
            0xC000_0420,
            0xC000_0602,
            0xE06D_7363,
            0xE043_4352,
            0xE043_4F4D,
            0x4001_0005,
            0x4001_0008,
            0xC002_0001,
            0xC002_0047,
        ] {
            assert!(
                !name(code).starts_with("0x"),
                "missing name for {code:#010x}"
            );
            assert_ne!(description(code), "Unknown exception code.");
        }
    }

    #[test]
    fn test_unknown_codes_get_placeholders() {
        assert_eq!(name(0xC111_2222), "0xC1112222");
        assert_eq!(description(0xC111_2222), "Unknown exception code.");
        assert_eq!(name(0xDEAD_BEEF), "0xDEADBEEF");
    }
}
