//! Desired-state builder: resolves unit files and transforms into a
//! name-keyed deployment plan.
//!
//! Layout of the input tree:
//!
//! ```text
//! <root>/web.container          used as-is
//! <root>/edge/proxy.container   merged with the transform named "edge"
//! <root>/.git/...               hidden, ignored
//! ```
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{BuildError, ParseError};
use crate::ini::{self, Document};

/// File extension of container unit files.
pub const UNIT_EXTENSION: &str = "container";

/// A transform file, parsed or not.
#[derive(Debug, Clone)]
struct TransformEntry {
    path: PathBuf,
    document: Result<Document, ParseError>,
}

/// Host-specific transforms keyed by the subdirectory name they apply to.
#[derive(Debug, Clone, Default)]
pub struct Transforms {
    entries: BTreeMap<String, TransformEntry>,
}

impl Transforms {
    /// Load every regular, non-hidden file in `dir` as a transform keyed by
    /// its file stem.
    ///
    /// A missing directory yields an empty set. A file that fails to parse
    /// is kept as broken so units depending on it can be held.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] if the directory or a file cannot be read,
    /// or [`BuildError::DuplicateTransform`] if two files share a stem.
    pub fn load(dir: &Path) -> Result<Self, BuildError> {
        let mut transforms = Self::default();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(transforms),
            Err(source) => {
                return Err(BuildError::Io {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| BuildError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if is_hidden(&path) || !path.is_file() {
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        for path in paths {
            let Some(name) = stem(&path) else { continue };
            if let Some(existing) = transforms.entries.get(&name) {
                return Err(BuildError::DuplicateTransform {
                    name,
                    first: existing.path.clone(),
                    second: path,
                });
            }
            let text = read_text(&path)?;
            transforms.entries.insert(
                name,
                TransformEntry {
                    document: Document::parse(&text),
                    path,
                },
            );
        }
        Ok(transforms)
    }

    /// Register an already-parsed transform under `name`.
    pub fn insert(&mut self, name: impl Into<String>, document: Document) {
        let name = name.into();
        self.entries.insert(
            name.clone(),
            TransformEntry {
                path: PathBuf::from(name),
                document: Ok(document),
            },
        );
    }

    /// The transform for directory `name`: `None` if absent, `Some(Err)` if
    /// it failed to parse.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Result<&Document, &ParseError>> {
        self.entries.get(name).map(|e| e.document.as_ref())
    }

    /// Transform names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of loaded transforms, broken ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no transforms are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A resolved unit ready to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredUnit {
    /// Deployment name (file stem).
    pub name: String,
    /// File the unit was read from.
    pub source: PathBuf,
    /// Final unit text.
    pub content: String,
    /// SHA-256 hex digest of `content`.
    pub hash: String,
}

/// A unit that could not be resolved this cycle.
///
/// Held names are neither deployed nor removed.
#[derive(Debug)]
pub struct HeldUnit {
    /// Deployment name (file stem).
    pub name: String,
    /// File the unit would have been read from.
    pub source: PathBuf,
    /// Why the unit could not be resolved.
    pub reason: BuildError,
}

/// The deployment plan for one cycle.
#[derive(Debug, Default)]
pub struct DesiredState {
    /// Deployable units keyed by name.
    pub units: BTreeMap<String, DesiredUnit>,
    /// Unresolvable units keyed by name.
    pub held: BTreeMap<String, HeldUnit>,
    /// Subdirectories skipped because no transform matches them.
    pub skipped_dirs: Vec<PathBuf>,
}

impl DesiredState {
    /// Whether `name` is claimed by the tree, deployable or held.
    #[must_use]
    pub fn claims(&self, name: &str) -> bool {
        self.units.contains_key(name) || self.held.contains_key(name)
    }
}

/// Build the desired state from `root` and `transforms`.
///
/// # Errors
///
/// Returns [`BuildError::DuplicateName`] when two sources share a stem, or
/// [`BuildError::Io`] when the tree cannot be read. Per-file parse failures
/// are not errors; those names are held.
pub fn build(root: &Path, transforms: &Transforms) -> Result<DesiredState, BuildError> {
    let mut state = DesiredState::default();
    let mut claimed: BTreeMap<String, PathBuf> = BTreeMap::new();

    for path in unit_files(root)? {
        let name = claim(&mut claimed, &path)?;
        let content = read_text(&path)?;
        state.units.insert(
            name.clone(),
            DesiredUnit {
                hash: content_hash(&content),
                name,
                source: path,
                content,
            },
        );
    }

    for dir in subdirectories(root)? {
        let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(transform) = transforms.lookup(dir_name) else {
            state.skipped_dirs.push(dir);
            continue;
        };

        for path in unit_files(&dir)? {
            let name = claim(&mut claimed, &path)?;
            let resolved = match transform {
                Ok(transform) => merge_file(&path, transform),
                Err(source) => Err(BuildError::BrokenTransform {
                    name: dir_name.to_string(),
                    source: source.clone(),
                }),
            };
            match resolved {
                Ok(content) => {
                    state.units.insert(
                        name.clone(),
                        DesiredUnit {
                            hash: content_hash(&content),
                            name,
                            source: path,
                            content,
                        },
                    );
                }
                Err(e @ (BuildError::Parse { .. } | BuildError::BrokenTransform { .. })) => {
                    state.held.insert(
                        name.clone(),
                        HeldUnit {
                            name,
                            source: path,
                            reason: e,
                        },
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(state)
}

/// Merged text of one unit file against the transform selected by its
/// parent directory name.
///
/// # Errors
///
/// Returns [`BuildError::NoTransform`] or [`BuildError::BrokenTransform`]
/// when no usable transform matches, and [`BuildError::Io`] or
/// [`BuildError::Parse`] when the file cannot be read or parsed.
pub fn augment(file: &Path, transforms: &Transforms) -> Result<String, BuildError> {
    let directory = file
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    match transforms.lookup(&directory) {
        None => Err(BuildError::NoTransform { directory }),
        Some(Err(source)) => Err(BuildError::BrokenTransform {
            name: directory,
            source: source.clone(),
        }),
        Some(Ok(transform)) => merge_file(file, transform),
    }
}

/// SHA-256 hex digest of a unit's text.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = String::with_capacity(64);
    for b in &digest {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

fn merge_file(path: &Path, transform: &Document) -> Result<String, BuildError> {
    let text = read_text(path)?;
    let unit = Document::parse(&text).map_err(|source| BuildError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ini::merge(&unit, transform).serialize())
}

fn claim(claimed: &mut BTreeMap<String, PathBuf>, path: &Path) -> Result<String, BuildError> {
    let name = stem(path).unwrap_or_default();
    if let Some(first) = claimed.get(&name) {
        return Err(BuildError::DuplicateName {
            name,
            first: first.clone(),
            second: path.to_path_buf(),
        });
    }
    claimed.insert(name.clone(), path.to_path_buf());
    Ok(name)
}

/// Sorted `*.container` regular files directly under `dir`.
pub(crate) fn unit_files(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut files: Vec<PathBuf> = list(dir)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == UNIT_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

/// Sorted non-hidden subdirectories of `dir`.
pub(crate) fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut dirs: Vec<PathBuf> = list(dir)?.into_iter().filter(|p| p.is_dir()).collect();
    dirs.sort();
    Ok(dirs)
}

fn list(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let io_err = |source| BuildError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !is_hidden(&path) {
            out.push(path);
        }
    }
    Ok(out)
}

fn read_text(path: &Path) -> Result<String, BuildError> {
    fs::read_to_string(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(String::from)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn transforms(pairs: &[(&str, &str)]) -> Transforms {
        let mut t = Transforms::default();
        for (name, text) in pairs {
            t.insert(*name, Document::parse(text).unwrap());
        }
        t
    }

    // -----------------------------------------------------------------------
    // build
    // -----------------------------------------------------------------------

    #[test]
    fn root_files_are_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        // Not valid INI: root files are never parsed.
        write(dir.path(), "raw.container", "not ini at all\r\n");
        let state = build(dir.path(), &Transforms::default()).unwrap();
        let unit = &state.units["raw"];
        assert_eq!(unit.content, "not ini at all\r\n");
        assert_eq!(unit.hash, content_hash("not ini at all\r\n"));
    }

    #[test]
    fn subdirectory_units_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "edge/proxy.container", "[Container]\nImage=caddy\n");
        let t = transforms(&[("edge", "[Container]\nNetwork=host\n")]);
        let state = build(dir.path(), &t).unwrap();
        assert_eq!(
            state.units["proxy"].content,
            "[Container]\nImage=caddy\nNetwork=host\n"
        );
    }

    #[test]
    fn subdirectory_without_transform_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "other/app.container", "[Container]\nImage=x\n");
        let state = build(dir.path(), &Transforms::default()).unwrap();
        assert!(state.units.is_empty());
        assert_eq!(state.skipped_dirs, [dir.path().join("other")]);
    }

    #[test]
    fn hidden_entries_and_other_extensions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".git/config.container", "[Container]\n");
        write(dir.path(), ".hidden.container", "[Container]\n");
        write(dir.path(), "README.md", "# docs\n");
        write(dir.path(), "web.container", "[Container]\nImage=nginx\n");
        let t = transforms(&[(".git", "[Container]\n")]);
        let state = build(dir.path(), &t).unwrap();
        assert_eq!(state.units.keys().collect::<Vec<_>>(), ["web"]);
    }

    #[test]
    fn nested_subdirectories_are_not_walked() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "edge/deep/app.container", "[Container]\nImage=x\n");
        let t = transforms(&[("edge", ""), ("deep", "")]);
        let state = build(dir.path(), &t).unwrap();
        assert!(state.units.is_empty());
    }

    #[test]
    fn duplicate_across_subdirectories_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/web.container", "[Container]\nImage=x\n");
        write(dir.path(), "b/web.container", "[Container]\nImage=y\n");
        let t = transforms(&[("a", ""), ("b", "")]);
        let err = build(dir.path(), &t).unwrap_err();
        match err {
            BuildError::DuplicateName {
                name,
                first,
                second,
            } => {
                assert_eq!(name, "web");
                assert_eq!(first, dir.path().join("a/web.container"));
                assert_eq!(second, dir.path().join("b/web.container"));
            }
            other => panic!("expected DuplicateName, got {other:?}"),
        }
    }

    #[test]
    fn unparsable_unit_is_held() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "edge/bad.container", "Image=outside\n");
        write(dir.path(), "edge/good.container", "[Container]\nImage=x\n");
        let t = transforms(&[("edge", "")]);
        let state = build(dir.path(), &t).unwrap();
        assert!(state.units.contains_key("good"));
        assert!(matches!(
            state.held["bad"].reason,
            BuildError::Parse { .. }
        ));
        assert!(state.claims("bad"));
    }

    #[test]
    fn held_name_still_counts_for_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "web.container", "[Container]\nImage=x\n");
        write(dir.path(), "edge/web.container", "garbage\n");
        let t = transforms(&[("edge", "")]);
        assert!(matches!(
            build(dir.path(), &t),
            Err(BuildError::DuplicateName { .. })
        ));
    }

    #[test]
    fn broken_transform_holds_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tdir = tempfile::tempdir().unwrap();
        write(tdir.path(), "edge.conf", "[Container\n");
        write(dir.path(), "edge/proxy.container", "[Container]\nImage=caddy\n");
        let t = Transforms::load(tdir.path()).unwrap();
        let state = build(dir.path(), &t).unwrap();
        assert!(state.units.is_empty());
        assert!(matches!(
            state.held["proxy"].reason,
            BuildError::BrokenTransform { .. }
        ));
    }

    // -----------------------------------------------------------------------
    // Transforms::load
    // -----------------------------------------------------------------------

    #[test]
    fn load_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let t = Transforms::load(&dir.path().join("absent")).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn load_keys_by_stem_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "edge.container", "[Container]\nNetwork=host\n");
        write(dir.path(), "core", "[Service]\nRestart=always\n");
        write(dir.path(), ".swap", "junk");
        fs::create_dir(dir.path().join("nested")).unwrap();
        let t = Transforms::load(dir.path()).unwrap();
        assert_eq!(t.names().collect::<Vec<_>>(), ["core", "edge"]);
        assert!(t.lookup("edge").unwrap().is_ok());
    }

    #[test]
    fn load_duplicate_stem_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "edge.conf", "");
        write(dir.path(), "edge.ini", "");
        assert!(matches!(
            Transforms::load(dir.path()),
            Err(BuildError::DuplicateTransform { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // augment / hash
    // -----------------------------------------------------------------------

    #[test]
    fn augment_merges_with_parent_transform() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "edge/proxy.container", "[Container]\nImage=caddy");
        let t = transforms(&[("edge", "[Container]\n+Volume=/a:/a\n")]);
        assert_eq!(
            augment(&file, &t).unwrap(),
            "[Container]\nImage=caddy\nVolume=/a:/a\n"
        );
    }

    #[test]
    fn augment_without_transform_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "edge/proxy.container", "[Container]\n");
        let err = augment(&file, &Transforms::default()).unwrap_err();
        assert!(matches!(err, BuildError::NoTransform { ref directory } if directory == "edge"));
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash("a\n"), content_hash("a\r\n"));
    }
}
