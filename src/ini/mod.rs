//! Format-preserving INI parser for systemd unit files.
//!
//! A [`Document`] is an ordered list of [`Line`] tokens, each carrying its
//! raw text including the line terminator, so serializing a parsed document
//! reproduces the input byte for byte (CRLF terminators, a missing final
//! newline and backslash continuations included).
//!
//! # Examples
//!
//! ```
//! use quadsync::ini::Document;
//!
//! let text = "[Container]\r\nImage=nginx\r\n# pinned\r\nPublishPort=8080:80";
//! let doc = Document::parse(text).unwrap();
//! assert_eq!(doc.serialize(), text);
//! assert_eq!(doc.get("Container", "Image"), Some("nginx"));
//! ```
pub mod merge;

pub use merge::merge;

use std::fmt;

use crate::error::ParseError;

/// One logical line of an INI document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Empty or whitespace-only line.
    Blank {
        /// Raw text including terminator.
        raw: String,
    },
    /// Line whose first non-blank character is `#` or `;`.
    Comment {
        /// Raw text including terminator.
        raw: String,
    },
    /// `[Name]` header.
    Section {
        /// Raw text including terminator.
        raw: String,
        /// Trimmed section name.
        name: String,
    },
    /// `Key=Value` entry, possibly spanning several physical lines.
    Entry {
        /// Raw text of every physical line, including terminators.
        raw: String,
        /// Trimmed key.
        key: String,
        /// Trimmed logical value; continuation pieces joined by a space.
        value: String,
    },
}

impl Line {
    /// Raw text of the line, terminator included.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Blank { raw }
            | Self::Comment { raw }
            | Self::Section { raw, .. }
            | Self::Entry { raw, .. } => raw,
        }
    }

    fn raw_mut(&mut self) -> &mut String {
        match self {
            Self::Blank { raw }
            | Self::Comment { raw }
            | Self::Section { raw, .. }
            | Self::Entry { raw, .. } => raw,
        }
    }

    /// Whether the raw text ends with a line terminator.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.raw().ends_with('\n')
    }

    /// Append `newline` if the line is unterminated.
    pub(crate) fn terminate(&mut self, newline: &str) {
        if !self.is_terminated() {
            self.raw_mut().push_str(newline);
        }
    }

    /// Whether an entry's last physical line ends in a dangling `\`.
    ///
    /// Only possible for an entry at the end of input.
    pub(crate) fn ends_in_continuation(&self) -> bool {
        matches!(self, Self::Entry { .. })
            && strip_terminator(self.raw()).trim_end().ends_with('\\')
    }

    /// Key of an entry line.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Entry { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Name of a section header line.
    #[must_use]
    pub fn section_name(&self) -> Option<&str> {
        match self {
            Self::Section { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// A borrowed view of one entry together with its enclosing section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef<'a> {
    /// Section the entry belongs to.
    pub section: &'a str,
    /// Entry key.
    pub key: &'a str,
    /// Logical entry value.
    pub value: &'a str,
}

/// A parsed INI document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    lines: Vec<Line>,
}

impl Document {
    /// Parse INI text into a token stream.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] for an entry before the first header, a
    /// malformed or empty header, a line without `=`, or an empty key.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines = Vec::new();
        let mut in_section = false;
        let mut physical = text.split_inclusive('\n').enumerate().peekable();

        while let Some((index, raw)) = physical.next() {
            let line_no = index + 1;
            let content = strip_terminator(raw);
            let trimmed = content.trim();

            if trimmed.is_empty() {
                lines.push(Line::Blank {
                    raw: raw.to_string(),
                });
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                lines.push(Line::Comment {
                    raw: raw.to_string(),
                });
                continue;
            }
            if trimmed.starts_with('[') {
                let name = parse_header(trimmed).ok_or_else(|| ParseError::BadHeader {
                    line: line_no,
                    text: content.to_string(),
                })?;
                in_section = true;
                lines.push(Line::Section {
                    raw: raw.to_string(),
                    name: name.to_string(),
                });
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ParseError::NotKeyValue {
                    line: line_no,
                    text: content.to_string(),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ParseError::EmptyKey {
                    line: line_no,
                    text: content.to_string(),
                });
            }
            if !in_section {
                return Err(ParseError::OutsideSection {
                    line: line_no,
                    text: content.to_string(),
                });
            }

            let mut raw_all = raw.to_string();
            let mut pieces = Vec::new();
            let mut piece = value.trim();
            // A trailing backslash folds the next physical line into this entry.
            while let Some(head) = piece.strip_suffix('\\') {
                pieces.push(head.trim());
                match physical.next() {
                    Some((_, next_raw)) => {
                        raw_all.push_str(next_raw);
                        piece = strip_terminator(next_raw).trim();
                    }
                    None => {
                        piece = "";
                        break;
                    }
                }
            }
            pieces.push(piece);
            let value = pieces
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ");

            lines.push(Line::Entry {
                raw: raw_all,
                key: key.to_string(),
                value,
            });
        }

        Ok(Self { lines })
    }

    /// Serialize back to text by concatenating the raw lines.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.lines.iter().map(Line::raw).collect()
    }

    /// All tokens in document order.
    #[must_use]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub(crate) const fn from_lines(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    /// Returns `true` if the document has no lines at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Distinct section names in order of first appearance.
    #[must_use]
    pub fn section_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.lines.iter().filter_map(Line::section_name) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Whether at least one `[section]` header exists.
    #[must_use]
    pub fn has_section(&self, section: &str) -> bool {
        self.lines
            .iter()
            .any(|l| l.section_name() == Some(section))
    }

    /// Every entry in document order, tagged with its section.
    #[must_use]
    pub fn entries(&self) -> Vec<EntryRef<'_>> {
        let mut current = "";
        let mut out = Vec::new();
        for line in &self.lines {
            match line {
                Line::Section { name, .. } => current = name,
                Line::Entry { key, value, .. } => out.push(EntryRef {
                    section: current,
                    key,
                    value,
                }),
                Line::Blank { .. } | Line::Comment { .. } => {}
            }
        }
        out
    }

    /// All values of `key` across every occurrence of `section`, in order.
    #[must_use]
    pub fn get_all(&self, section: &str, key: &str) -> Vec<&str> {
        self.entries()
            .into_iter()
            .filter(|e| e.section == section && e.key == key)
            .map(|e| e.value)
            .collect()
    }

    /// The last value of `key` in `section` (systemd's "last one wins").
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.get_all(section, key).last().copied()
    }

    /// Whether `section` contains `key` at all, regardless of value.
    #[must_use]
    pub fn contains_key(&self, section: &str, key: &str) -> bool {
        self.entries()
            .iter()
            .any(|e| e.section == section && e.key == key)
    }

    /// The terminator style used by this document: `"\r\n"` if its first
    /// terminated line uses CRLF, `"\n"` otherwise.
    #[must_use]
    pub fn newline(&self) -> &'static str {
        match self.lines.iter().map(Line::raw).find(|r| r.ends_with('\n')) {
            Some(raw) if raw.ends_with("\r\n") => "\r\n",
            _ => "\n",
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            f.write_str(line.raw())?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Document {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn strip_terminator(raw: &str) -> &str {
    let line = raw.strip_suffix('\n').unwrap_or(raw);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Extract a non-empty section name from a trimmed `[...]` line.
fn parse_header(trimmed: &str) -> Option<&str> {
    let inner = trimmed.strip_prefix('[')?.strip_suffix(']')?.trim();
    if inner.is_empty() || inner.contains(['[', ']']) {
        return None;
    }
    Some(inner)
}
