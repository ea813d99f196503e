//! Line splitting of dump files for comparison.

use derive_more::{Display, Error};

/// Errors turning raw dump content into a line sequence.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum DocumentError {
    /// Content is binary or otherwise not line-oriented text.
    #[display("dump content is not decodable as text")]
    UnsupportedContent,
    /// The caller disallowed empty input.
    #[display("dump content is empty")]
    EmptyDocument,
}

/// A dump file split into an ordered sequence of lines, numbered from 1.
///
/// Lines keep their exact content including trailing whitespace; only the
/// line terminator (`\n` or `\r\n`) is removed. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpDocument {
    lines: Vec<String>,
}

impl DumpDocument {
    /// Split raw text content into lines.
    ///
    /// Empty content yields a document with zero lines, not an error.
    /// Content containing NUL bytes is rejected as [DocumentError::UnsupportedContent]
    /// instead of producing a garbage comparison.
    pub fn parse(content: &str) -> Result<Self, DocumentError> {
        if content.bytes().any(|b| b == 0) {
            return Err(DocumentError::UnsupportedContent);
        }

        if content.is_empty() {
            return Ok(Self { lines: Vec::new() });
        }

        let mut lines: Vec<String> = content
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();

        // A trailing newline terminates the last line rather than opening a new one.
        if content.ends_with('\n') {
            lines.pop();
        }

        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Content of the 1-based `line_number`, if present.
    pub fn line(&self, line_number: usize) -> Option<&str> {
        line_number
            .checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map(String::as_str)
    }
}
