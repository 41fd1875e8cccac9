//! Byte/line range computation for file contents.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A normalized byte and line window into a file.
///
/// Lines are 1-based and inclusive; bytes are 0-based with an exclusive end.
/// An empty file yields the all-zero range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRange {
    /// First byte of the range (inclusive).
    #[serde(default)]
    pub start_byte: u64,
    /// End byte of the range (exclusive).
    #[serde(default)]
    pub end_byte: u64,
    /// First line of the range (1-based, inclusive).
    #[serde(default)]
    pub start_line: u64,
    /// Last line of the range (1-based, inclusive).
    #[serde(default)]
    pub end_line: u64,
}

/// Options controlling how a file is read from the tree endpoint.
///
/// The fields are kept flat (rather than embedding a [`FileRange`]) so the
/// struct deserializes directly from a URL query string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFileOptions {
    /// First byte of the requested window; 0 is unset.
    #[serde(default)]
    pub start_byte: u64,
    /// End byte of the requested window (exclusive); 0 is unset.
    #[serde(default)]
    pub end_byte: u64,
    /// First line of the requested window (1-based); 0 is unset.
    #[serde(default)]
    pub start_line: u64,
    /// Last line of the requested window (1-based, inclusive); 0 is unset.
    #[serde(default)]
    pub end_line: u64,
    /// Expand a byte window outward to whole lines.
    #[serde(default)]
    pub full_lines: bool,
    /// For directories, materialize the entire subtree depth-first.
    #[serde(default)]
    pub full_tree: bool,
}

impl GetFileOptions {
    /// Whether any range-affecting option was supplied.
    pub fn has_range(&self) -> bool {
        self.start_byte != 0
            || self.end_byte != 0
            || self.start_line != 0
            || self.end_line != 0
            || self.full_lines
    }
}

/// Number of lines in `data`, counting a trailing fragment without a
/// newline as a line. Empty input has zero lines.
fn count_lines(data: &[u8]) -> u64 {
    if data.is_empty() {
        return 0;
    }
    let newlines = data.iter().filter(|&&b| b == b'\n').count() as u64;
    if data.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}

/// 1-based line containing byte offset `pos` (`pos` clamped into the data).
fn line_of_byte(data: &[u8], pos: u64) -> u64 {
    let pos = (pos as usize).min(data.len());
    1 + data[..pos].iter().filter(|&&b| b == b'\n').count() as u64
}

/// Byte offset of the start of the line containing `pos`.
fn expand_to_line_start(data: &[u8], pos: u64) -> u64 {
    let pos = (pos as usize).min(data.len());
    match data[..pos].iter().rposition(|&b| b == b'\n') {
        Some(nl) => nl as u64 + 1,
        None => 0,
    }
}

/// Byte offset just past the newline terminating the line that contains the
/// last byte of the range ending (exclusively) at `pos`; the end of the data
/// if that line is unterminated.
fn expand_to_line_end(data: &[u8], pos: u64) -> u64 {
    let from = pos.saturating_sub(1) as usize;
    match data[from..].iter().position(|&b| b == b'\n') {
        Some(rel) => (from + rel) as u64 + 1,
        None => data.len() as u64,
    }
}

/// Byte offset of the start of 1-based line `line`.
fn byte_of_line_start(data: &[u8], line: u64) -> u64 {
    if line <= 1 {
        return 0;
    }
    let mut seen = 0u64;
    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            seen += 1;
            if seen == line - 1 {
                return i as u64 + 1;
            }
        }
    }
    data.len() as u64
}

/// Byte offset just past the end of 1-based line `line` (including its
/// newline, or the end of the data for an unterminated final line).
fn byte_of_line_end(data: &[u8], line: u64) -> u64 {
    let mut seen = 0u64;
    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            seen += 1;
            if seen == line {
                return i as u64 + 1;
            }
        }
    }
    data.len() as u64
}

/// Computes the normalized [`FileRange`] selected by `opt` within `data`.
///
/// A byte window takes precedence over a line window when both are given.
/// With `full_lines`, a byte window is expanded outward to the nearest line
/// boundaries. Line windows are clamped at the end to the file's actual last
/// line. Inverted or out-of-bounds ranges are invalid-argument errors whose
/// messages carry the offending values and the file totals.
pub fn compute_file_range(data: &[u8], opt: GetFileOptions) -> Result<FileRange> {
    let total_bytes = data.len() as u64;
    let total_lines = count_lines(data);

    let has_byte_range = opt.start_byte != 0 || opt.end_byte != 0;
    let has_line_range = opt.start_line != 0 || opt.end_line != 0;

    if has_byte_range {
        let (mut start_byte, mut end_byte) = (opt.start_byte, opt.end_byte);
        if start_byte > end_byte {
            return Err(Error::invalid_argument(format!(
                "start byte ({start_byte}) cannot be greater than end byte ({end_byte}) ({total_bytes} bytes total)"
            )));
        }
        if start_byte > total_bytes {
            return Err(Error::invalid_argument(format!(
                "start byte {start_byte} out of bounds ({total_bytes} bytes total)"
            )));
        }
        if end_byte > total_bytes {
            return Err(Error::invalid_argument(format!(
                "end byte {end_byte} out of bounds ({total_bytes} bytes total)"
            )));
        }
        if opt.full_lines {
            start_byte = expand_to_line_start(data, start_byte);
            end_byte = expand_to_line_end(data, end_byte);
        }
        let start_line = line_of_byte(data, start_byte).min(total_lines.max(1));
        let end_line = line_of_byte(data, end_byte.saturating_sub(1)).max(start_line);
        return Ok(FileRange {
            start_byte,
            end_byte,
            start_line,
            end_line,
        });
    }

    if has_line_range {
        let (mut start_line, mut end_line) = (opt.start_line, opt.end_line);
        if start_line != 0 && end_line != 0 && start_line > end_line {
            return Err(Error::invalid_argument(format!(
                "start line ({start_line}) cannot be greater than end line ({end_line}) ({total_lines} lines total)"
            )));
        }
        if end_line == 0 || end_line > total_lines {
            end_line = if end_line == 0 { start_line } else { total_lines };
        }
        if start_line == 0 {
            start_line = end_line;
        }
        if end_line > total_lines {
            end_line = total_lines;
        }
        if start_line == 0 || start_line > total_lines {
            return Err(Error::invalid_argument(format!(
                "start line {start_line} out of bounds ({total_lines} lines total)"
            )));
        }
        return Ok(FileRange {
            start_byte: byte_of_line_start(data, start_line),
            end_byte: byte_of_line_end(data, end_line),
            start_line,
            end_line,
        });
    }

    // No range requested: the whole file.
    if data.is_empty() {
        return Ok(FileRange::default());
    }
    Ok(FileRange {
        start_byte: 0,
        end_byte: total_bytes,
        start_line: 1,
        end_line: total_lines,
    })
}
