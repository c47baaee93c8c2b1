use std::fmt;

use crate::error::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    InvalidArgs,
    ScanFailed,
    TargetUnreachable,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::InvalidArgs => 2,
            ExitCode::ScanFailed => 10,
            ExitCode::TargetUnreachable => 20,
        }
    }

    pub fn for_scan_error(err: &ScanError) -> Self {
        match err {
            ScanError::Validation(_) => ExitCode::InvalidArgs,
            ScanError::Transport(_) | ScanError::Parse(_) => ExitCode::TargetUnreachable,
            ScanError::SchemaExtraction(_) | ScanError::Audit(_) => ExitCode::ScanFailed,
        }
    }
}

#[derive(Debug)]
pub struct ExitError {
    pub code: ExitCode,
    pub err: anyhow::Error,
}

impl ExitError {
    pub fn new(code: ExitCode, err: anyhow::Error) -> Self {
        Self { code, err }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl std::error::Error for ExitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.err.source()
    }
}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(exit) = err.downcast_ref::<ExitError>() {
        return exit.code.as_i32();
    }
    if let Some(scan) = err.downcast_ref::<ScanError>() {
        return ExitCode::for_scan_error(scan).as_i32();
    }
    ExitCode::ScanFailed.as_i32()
}

pub fn invalid_args(message: impl Into<String>) -> anyhow::Error {
    ExitError::new(ExitCode::InvalidArgs, anyhow::anyhow!(message.into())).into()
}

pub fn invalid_args_err(err: anyhow::Error) -> anyhow::Error {
    ExitError::new(ExitCode::InvalidArgs, err).into()
}

/// Wraps a scan failure with the exit code of its class.
pub fn scan_err(err: ScanError) -> anyhow::Error {
    let code = ExitCode::for_scan_error(&err);
    ExitError::new(code, err.into()).into()
}
