use std::collections::BTreeMap;

/// Parse `KEY=VALUE` lines.
///
/// Blank lines and `#` comments are skipped, keys and values are trimmed,
/// and a value wrapped in matching single or double quotes is unquoted.
/// Lines without `=` are ignored.
///
/// # Examples
///
/// ```
/// use quadsync::config::parse_env_file;
///
/// let vars = parse_env_file("# repo\nQUADSYNC_REPO_URL = \"https://example.com/u.git\"\n");
/// assert_eq!(vars["QUADSYNC_REPO_URL"], "https://example.com/u.git");
/// ```
#[must_use]
pub fn parse_env_file(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
