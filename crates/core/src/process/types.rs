//! Types for launching and observing external tools.

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::error::ProcessError;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append arguments from a single shell-style argument string.
    pub fn with_arg_string(self, args: &str) -> Result<Self, ProcessError> {
        let split = split_args(args)?;
        Ok(self.with_args(split))
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executable name, as it appears in the process table.
    pub fn name(&self) -> String {
        executable_name(&self.program)
    }
}

pub(crate) fn executable_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string())
}

/// Progress reported by a tool on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolProgress {
    /// 0-100, within the tool's own run.
    pub percent: u8,
}

/// Result of a tool that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub program: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub stderr_tail: Vec<String>,
}

static PROGRESS_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)progress\s*[:=]?\s*(\d{1,3})").unwrap());
static PERCENT_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,3})(?:\.\d+)?\s*%").unwrap());

/// Extract a percentage from a tool output line.
///
/// Understands `PROGRESS 42`, `progress=42` and `42%` / `42.5 %`.
pub fn parse_progress_line(line: &str) -> Option<u8> {
    let caps = PROGRESS_KEYWORD
        .captures(line)
        .or_else(|| PERCENT_SUFFIX.captures(line))?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    (value <= 100).then_some(value as u8)
}

/// Split an argument string the way a shell would, without expansion.
///
/// Whitespace separates arguments; single and double quotes group them.
/// Outside single quotes a backslash escapes a following quote, backslash or
/// whitespace character and is kept literally otherwise, so Windows paths
/// survive unquoted.
pub fn split_args(input: &str) -> Result<Vec<String>, ProcessError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('"'), '"') => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                match chars.peek() {
                    Some(&next) if matches!(next, '"' | '\'' | '\\') || next.is_whitespace() => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                }
                in_arg = true;
            }
            (Some(_), c) => current.push(c),
            (None, '\'') | (None, '"') => {
                quote = Some(c);
                in_arg = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_arg = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(ProcessError::InvalidArguments(format!("unterminated {} quote", q)));
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}
