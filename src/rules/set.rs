// src/rules/set.rs

//! The mutable namespace → rule-source mapping and its locator resolution.
//!
//! A locator is a filesystem path pattern: a concrete file resolves to
//! itself, anything else is expanded with standard glob semantics.  The
//! namespace of each entry is the resolved path itself, so merging the same
//! locators twice is a no-op.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// All the ways rule loading and compilation can go wrong.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule source {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid rule locator '{0}': {1}")]
    Locator(String, #[source] glob::PatternError),

    #[error("rule file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("rule '{0}', string '{1}': {2}")]
    Pattern(String, String, #[source] regex::Error),

    #[error("rule '{0}' has no strings")]
    NoStrings(String),

    #[error("rule set is empty, nothing to compile")]
    Empty,

    #[error("recompile rejected, previous rules stay active: {0}")]
    Rejected(String),

    #[error("control queue closed")]
    ControlClosed,
}

/// Mapping from namespace to rule-source path.
///
/// Not synchronized on its own: the processor guards mutation so it only
/// happens between compilations.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    entries: BTreeMap<String, PathBuf>,
}

impl RuleSet {
    /// Resolve `locators` into a fresh rule set.
    pub fn from_locators(locators: &[String]) -> Result<Self, RuleError> {
        let mut set = Self::default();
        set.extend_from_locators(locators)?;
        Ok(set)
    }

    /// Resolve `locators` and merge them in; replace wins on namespace
    /// collision.
    pub fn extend_from_locators(&mut self, locators: &[String]) -> Result<(), RuleError> {
        for path in resolve_locators(locators)? {
            let namespace = path.to_string_lossy().into_owned();
            self.entries.insert(namespace, path);
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(ns, p)| (ns.as_str(), p.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Expand each locator to zero or more concrete rule-source files.
fn resolve_locators(locators: &[String]) -> Result<Vec<PathBuf>, RuleError> {
    let mut out = Vec::new();
    for locator in locators {
        let direct = Path::new(locator);
        if direct.is_file() {
            out.push(direct.to_path_buf());
            continue;
        }
        let paths = glob::glob(locator).map_err(|e| RuleError::Locator(locator.clone(), e))?;
        for entry in paths {
            match entry {
                Ok(p) if p.is_file() => out.push(p),
                Ok(_) => {}
                Err(e) => log::warn!("skipping unreadable rule path under '{}': {}", locator, e),
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn concrete_file_resolves_to_itself() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.toml");
        fs::write(&file, "").unwrap();

        let set = RuleSet::from_locators(&[file.to_string_lossy().into_owned()]).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn glob_expands_within_a_segment() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.toml"), "").unwrap();
        fs::write(dir.path().join("b.toml"), "").unwrap();
        fs::write(dir.path().join("c.txt"), "").unwrap();

        let pattern = dir.path().join("*.toml").to_string_lossy().into_owned();
        let set = RuleSet::from_locators(&[pattern]).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn merging_same_locators_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.toml");
        fs::write(&file, "").unwrap();
        let locators = vec![file.to_string_lossy().into_owned()];

        let mut set = RuleSet::from_locators(&locators).unwrap();
        set.extend_from_locators(&locators).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn bad_glob_pattern_is_an_error() {
        let err = RuleSet::from_locators(&["[".to_string()]).unwrap_err();
        assert!(matches!(err, RuleError::Locator(_, _)));
    }
}
