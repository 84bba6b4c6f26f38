//! Command: print version information.

/// Version string stamped by the build script, or the crate version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("QUADSYNC_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the quadsync version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    println!("quadsync {}", version());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
