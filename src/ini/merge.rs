//! Two-rule transform merge.
//!
//! A transform only ever adds lines to a unit file:
//!
//! - `Key=Value` is a default, applied only when the unit's section has no
//!   `Key` at all. Defaults land after the section's last entry.
//! - `+Key=Value` is a prepend, always applied, placed before the unit's first
//!   `Key` value (or appended like a default when the unit has none).
//!
//! Sections that only the transform names are appended after all unit
//! content, separated by one blank line.
use super::{Document, Line};

/// One line of the merged output and whether it came from the unit.
#[derive(Debug)]
struct Slot {
    line: Line,
    from_unit: bool,
}

/// A section created by the transform, emitted after the unit's content.
#[derive(Debug)]
struct NewSection {
    name: String,
    entries: Vec<(String, String)>,
}

/// Merge `transform` into `unit`, returning a new document.
///
/// Pure and deterministic; unit lines are never removed or reordered.
///
/// # Examples
///
/// ```
/// use quadsync::ini::{Document, merge};
///
/// let unit = Document::parse("[Container]\nImage=nginx\nVolume=/data:/data\n").unwrap();
/// let transform = Document::parse("[Container]\nImage=ignored\n+Volume=/etc/tz:/etc/tz\nNetwork=host\n").unwrap();
///
/// assert_eq!(
///     merge(&unit, &transform).serialize(),
///     "[Container]\nImage=nginx\nVolume=/etc/tz:/etc/tz\nVolume=/data:/data\nNetwork=host\n"
/// );
/// ```
#[must_use]
pub fn merge(unit: &Document, transform: &Document) -> Document {
    let newline = unit.newline();
    let mut slots: Vec<Slot> = unit
        .lines()
        .iter()
        .cloned()
        .map(|line| Slot {
            line,
            from_unit: true,
        })
        .collect();
    let mut created: Vec<NewSection> = Vec::new();

    // Section headers without entries still create the section.
    for name in transform.section_names() {
        if !unit.has_section(name) && !created.iter().any(|s| s.name == name) {
            created.push(NewSection {
                name: name.to_string(),
                entries: Vec::new(),
            });
        }
    }

    for entry in transform.entries() {
        let (key, prepend) = match entry.key.strip_prefix('+') {
            Some(rest) => (rest.trim(), true),
            None => (entry.key, false),
        };
        if key.is_empty() {
            continue;
        }
        if !prepend && unit.contains_key(entry.section, key) {
            continue;
        }

        if let Some(section) = created.iter_mut().find(|s| s.name == entry.section) {
            section
                .entries
                .push((key.to_string(), entry.value.to_string()));
            continue;
        }

        let at = if prepend {
            first_unit_value(&slots, entry.section, key)
                .unwrap_or_else(|| append_point(&slots, entry.section))
        } else {
            append_point(&slots, entry.section)
        };
        insert(
            &mut slots,
            at,
            Line::Entry {
                raw: format!("{key}={}{newline}", entry.value),
                key: key.to_string(),
                value: entry.value.to_string(),
            },
            newline,
        );
    }

    let mut lines: Vec<Line> = slots.into_iter().map(|s| s.line).collect();
    for section in created {
        if let Some(last) = lines.last_mut() {
            last.terminate(newline);
            if !matches!(last, Line::Blank { .. }) {
                lines.push(Line::Blank {
                    raw: newline.to_string(),
                });
            }
        }
        lines.push(Line::Section {
            raw: format!("[{}]{newline}", section.name),
            name: section.name,
        });
        for (key, value) in section.entries {
            lines.push(Line::Entry {
                raw: format!("{key}={value}{newline}"),
                key,
                value,
            });
        }
    }

    Document::from_lines(lines)
}

/// Index of the first unit-supplied `key` entry in any occurrence of `section`.
fn first_unit_value(slots: &[Slot], section: &str, key: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    for (i, slot) in slots.iter().enumerate() {
        match &slot.line {
            Line::Section { name, .. } => current = Some(name),
            Line::Entry { key: k, .. }
                if slot.from_unit && current == Some(section) && k == key =>
            {
                return Some(i);
            }
            _ => {}
        }
    }
    None
}

/// Index just past the last entry of the last occurrence of `section`, or
/// just past its header when that occurrence has no entries.
///
/// Callers only pass sections that exist in the unit.
fn append_point(slots: &[Slot], section: &str) -> usize {
    let mut point = slots.len();
    let mut current: Option<&str> = None;
    for (i, slot) in slots.iter().enumerate() {
        match &slot.line {
            Line::Section { name, .. } => {
                current = Some(name);
                if name == section {
                    point = i + 1;
                }
            }
            Line::Entry { .. } if current == Some(section) => point = i + 1,
            _ => {}
        }
    }
    point
}

fn insert(slots: &mut Vec<Slot>, mut at: usize, line: Line, newline: &str) {
    let mut dangling = false;
    if let Some(prev) = at.checked_sub(1).and_then(|i| slots.get_mut(i)) {
        prev.line.terminate(newline);
        dangling = prev.line.ends_in_continuation();
    }
    // A blank line closes the continuation so the new entry is not folded in.
    if dangling {
        slots.insert(
            at,
            Slot {
                line: Line::Blank {
                    raw: newline.to_string(),
                },
                from_unit: false,
            },
        );
        at += 1;
    }
    slots.insert(
        at,
        Slot {
            line,
            from_unit: false,
        },
    );
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::parse(text).unwrap()
    }

    fn merged(unit: &str, transform: &str) -> String {
        merge(&doc(unit), &doc(transform)).serialize()
    }

    // -----------------------------------------------------------------------
    // Defaults
    // -----------------------------------------------------------------------

    #[test]
    fn default_after_dangling_continuation_stays_separate() {
        let out = merged(
            "[Container]\nImage=x\nExec=/bin/app \\",
            "[Container]\nNetwork=host\n",
        );
        assert_eq!(out, "[Container]\nImage=x\nExec=/bin/app \\\n\nNetwork=host\n");
        let reparsed = doc(&out);
        assert_eq!(reparsed.get("Container", "Exec"), Some("/bin/app"));
        assert_eq!(reparsed.get("Container", "Network"), Some("host"));
    }

    #[test]
    fn new_section_after_dangling_continuation_stays_separate() {
        let out = merged("[Container]\nExec=/bin/app \\", "[Service]\nRestart=always\n");
        let reparsed = doc(&out);
        assert_eq!(reparsed.get("Container", "Exec"), Some("/bin/app"));
        assert_eq!(reparsed.get("Service", "Restart"), Some("always"));
    }

    #[test]
    fn default_applies_when_key_absent() {
        assert_eq!(
            merged("[Container]\nImage=nginx\n", "[Container]\nNetwork=host\n"),
            "[Container]\nImage=nginx\nNetwork=host\n"
        );
    }

    #[test]
    fn default_never_overrides_unit_key() {
        assert_eq!(
            merged("[Container]\nImage=nginx\n", "[Container]\nImage=httpd\n"),
            "[Container]\nImage=nginx\n"
        );
    }

    #[test]
    fn default_respects_key_presence_with_empty_value() {
        assert_eq!(
            merged("[Container]\nExec=\n", "[Container]\nExec=/bin/app\n"),
            "[Container]\nExec=\n"
        );
    }

    #[test]
    fn default_lands_before_trailing_comments_and_blanks() {
        let unit = "[Container]\nImage=nginx\n# trailing note\n\n[Service]\nRestart=always\n";
        assert_eq!(
            merged(unit, "[Container]\nNetwork=host\n"),
            "[Container]\nImage=nginx\nNetwork=host\n# trailing note\n\n[Service]\nRestart=always\n"
        );
    }

    #[test]
    fn default_goes_after_header_of_empty_section() {
        assert_eq!(
            merged("[Container]\n\n[Service]\nX=1\n", "[Container]\nImage=nginx\n"),
            "[Container]\nImage=nginx\n\n[Service]\nX=1\n"
        );
    }

    #[test]
    fn defaults_keep_transform_order() {
        assert_eq!(
            merged("[Container]\nImage=nginx\n", "[Container]\nA=1\nB=2\nC=3\n"),
            "[Container]\nImage=nginx\nA=1\nB=2\nC=3\n"
        );
    }

    #[test]
    fn default_terminates_unterminated_last_line() {
        assert_eq!(
            merged("[Container]\nImage=nginx", "[Container]\nNetwork=host\n"),
            "[Container]\nImage=nginx\nNetwork=host\n"
        );
    }

    #[test]
    fn repeated_section_appends_to_last_occurrence() {
        let unit = "[Container]\nImage=nginx\n[Unit]\nX=1\n[Container]\nVolume=a\n[Service]\nY=2\n";
        assert_eq!(
            merged(unit, "[Container]\nImage=other\nNetwork=host\n"),
            "[Container]\nImage=nginx\n[Unit]\nX=1\n[Container]\nVolume=a\nNetwork=host\n[Service]\nY=2\n"
        );
    }

    // -----------------------------------------------------------------------
    // Prepends
    // -----------------------------------------------------------------------

    #[test]
    fn prepends_precede_unit_values_in_transform_order() {
        let unit = "[Container]\nImage=nginx\nVolume=/a:/a\nVolume=/b:/b\n";
        let transform = "[Container]\n+Volume=/x:/x\n+Volume=/y:/y\n";
        assert_eq!(
            merged(unit, transform),
            "[Container]\nImage=nginx\nVolume=/x:/x\nVolume=/y:/y\nVolume=/a:/a\nVolume=/b:/b\n"
        );
    }

    #[test]
    fn prepend_without_unit_value_appends() {
        assert_eq!(
            merged("[Container]\nImage=nginx\n", "[Container]\n+Volume=/x:/x\n"),
            "[Container]\nImage=nginx\nVolume=/x:/x\n"
        );
    }

    #[test]
    fn prepend_targets_first_occurrence_value() {
        let unit = "[Container]\nVolume=a\n[Unit]\nX=1\n[Container]\nVolume=b\n";
        assert_eq!(
            merged(unit, "[Container]\n+Volume=z\n"),
            "[Container]\nVolume=z\nVolume=a\n[Unit]\nX=1\n[Container]\nVolume=b\n"
        );
    }

    #[test]
    fn prepend_with_empty_key_is_ignored() {
        assert_eq!(
            merged("[Container]\nImage=nginx\n", "[Container]\n+=oops\n"),
            "[Container]\nImage=nginx\n"
        );
    }

    // -----------------------------------------------------------------------
    // New sections and newline style
    // -----------------------------------------------------------------------

    #[test]
    fn new_sections_follow_unit_in_transform_order() {
        let transform = "[Service]\nRestart=always\n+ExecStartPre=/bin/true\n[Install]\nWantedBy=default.target\n";
        assert_eq!(
            merged("[Container]\nImage=nginx", transform),
            "[Container]\nImage=nginx\n\n[Service]\nRestart=always\nExecStartPre=/bin/true\n\n[Install]\nWantedBy=default.target\n"
        );
    }

    #[test]
    fn new_section_reuses_existing_blank_separator() {
        assert_eq!(
            merged("[Container]\nImage=nginx\n\n", "[Install]\nWantedBy=default.target\n"),
            "[Container]\nImage=nginx\n\n[Install]\nWantedBy=default.target\n"
        );
    }

    #[test]
    fn inserted_lines_follow_crlf_unit() {
        assert_eq!(
            merged("[Container]\r\nImage=nginx\r\n", "[Container]\nNetwork=host\n[Install]\nA=b\n"),
            "[Container]\r\nImage=nginx\r\nNetwork=host\r\n\r\n[Install]\r\nA=b\r\n"
        );
    }

    #[test]
    fn unit_comments_survive_merge() {
        let unit = "# managed by git\n[Container]\n; image pin\nImage=nginx:1.27\n";
        let out = merged(unit, "[Container]\n+Label=a=b\n");
        assert!(out.starts_with("# managed by git\n[Container]\n; image pin\n"));
        assert!(out.contains("Label=a=b\n"));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    #[test]
    fn defaults_only_merge_is_idempotent() {
        let unit = doc("[Container]\nImage=nginx\n\n[Service]\nRestart=on-failure\n");
        let transform = doc("[Container]\nNetwork=host\nImage=x\n[Service]\nTimeoutSec=30\n[Install]\nWantedBy=default.target\n");
        let once = merge(&unit, &transform);
        let twice = merge(&once, &transform);
        assert_eq!(once, twice);
    }

    #[test]
    fn merged_output_reparses() {
        let unit = doc("[Container]\nImage=nginx\nExec=/bin/app \\\n  --flag\n");
        let transform = doc("[Container]\n+Exec=ignored-first\nNetwork=host\n");
        let out = merge(&unit, &transform);
        let reparsed = Document::parse(&out.serialize()).unwrap();
        assert_eq!(reparsed.get_all("Container", "Exec"), ["ignored-first", "/bin/app --flag"]);
        assert_eq!(reparsed.get("Container", "Network"), Some("host"));
    }

    #[test]
    fn empty_transform_is_identity() {
        let unit = "[Container]\r\nImage=nginx";
        assert_eq!(merged(unit, ""), unit);
        assert_eq!(merged(unit, "[Container]\n"), unit);
    }
}
