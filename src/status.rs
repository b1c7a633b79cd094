use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Outcome of one run, as reported to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    SuccessSandbox,
    NoEmails,
    NoEmailsSandbox,
    Failed,
    FailedSandbox,
}

impl RunStatus {
    pub fn success(sandbox_mode: bool) -> Self {
        if sandbox_mode { Self::SuccessSandbox } else { Self::Success }
    }

    pub fn no_emails(sandbox_mode: bool) -> Self {
        if sandbox_mode { Self::NoEmailsSandbox } else { Self::NoEmails }
    }

    pub fn failed(sandbox_mode: bool) -> Self {
        if sandbox_mode { Self::FailedSandbox } else { Self::Failed }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SuccessSandbox => "success_sandbox",
            Self::NoEmails => "no_emails",
            Self::NoEmailsSandbox => "no_emails_sandbox",
            Self::Failed => "failed",
            Self::FailedSandbox => "failed_sandbox",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only `key=value` file read by the CI scheduler (`$GITHUB_OUTPUT`).
pub struct StatusSink {
    path: PathBuf,
}

impl StatusSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, status: RunStatus) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "status={status}")?;
        log::debug!("wrote status={status} to {}", self.path.display());
        Ok(())
    }
}
