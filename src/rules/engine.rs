// src/rules/engine.rs

//! Compiled matching engine.
//!
//! Rule sources are TOML files holding `[[rules]]` entries: a name, optional
//! tags, and a `strings` table mapping a label to a byte-oriented regex.  A
//! rule hits when any of its strings hits; each hitting string contributes
//! one region (label, offset, matched bytes).
//!
//! An `Engine` is immutable once compiled.  Hot reload replaces the whole
//! engine behind an `Arc`, so readers see either the fully-old or fully-new
//! rule set, never a partially rebuilt one.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::bytes::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::events::MatchRegion;
use crate::rules::set::{RuleError, RuleSet};

/// Hard cap on scannable content; larger events are a recoverable scan
/// error, not a crash.
pub const MAX_SCAN_BYTES: usize = 64 * 1024 * 1024;

/// Content handed to `scan` exceeded the size cap.
#[derive(Debug, Error)]
#[error("content of {size} bytes exceeds the {limit}-byte scan limit")]
pub struct ScanError {
    pub size: usize,
    pub limit: usize,
}

/// One rule's positive result, before event context is attached.
#[derive(Debug, Clone)]
pub struct RuleHit {
    pub namespace: String,
    pub rule_name: String,
    pub tags: Vec<String>,
    pub regions: Vec<MatchRegion>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    strings: BTreeMap<String, String>,
}

struct CompiledRule {
    namespace: String,
    name: String,
    tags: Vec<String>,
    strings: Vec<(String, Regex)>,
}

/// Immutable compiled form of a `RuleSet` snapshot.
pub struct Engine {
    rules: Vec<CompiledRule>,
}

impl Engine {
    /// Read, parse and compile every source in the rule set.
    ///
    /// Any unreadable file, malformed TOML, invalid pattern or empty rule
    /// set fails the whole compilation; the caller decides whether that is
    /// fatal (construction) or rolled back (hot recompile).
    pub fn compile(rules: &RuleSet) -> Result<Self, RuleError> {
        let mut compiled = Vec::new();
        for (namespace, path) in rules.iter() {
            for spec in parse_rule_file(path)? {
                compiled.push(compile_rule(namespace, spec)?);
            }
        }
        if compiled.is_empty() {
            return Err(RuleError::Empty);
        }
        log::debug!("compiled {} rule(s) from {} source(s)", compiled.len(), rules.len());
        Ok(Self { rules: compiled })
    }

    /// Match `data` against every rule, returning one hit per matching rule.
    pub fn scan(&self, data: &[u8]) -> Result<Vec<RuleHit>, ScanError> {
        if data.len() > MAX_SCAN_BYTES {
            return Err(ScanError { size: data.len(), limit: MAX_SCAN_BYTES });
        }
        let mut hits = Vec::new();
        for rule in &self.rules {
            let regions: Vec<MatchRegion> = rule
                .strings
                .iter()
                .filter_map(|(label, re)| {
                    re.find(data).map(|m| MatchRegion {
                        label: label.clone(),
                        offset: m.start() as u64,
                        data: String::from_utf8_lossy(m.as_bytes()).into_owned(),
                    })
                })
                .collect();
            if !regions.is_empty() {
                hits.push(RuleHit {
                    namespace: rule.namespace.clone(),
                    rule_name: rule.name.clone(),
                    tags: rule.tags.clone(),
                    regions,
                });
            }
        }
        Ok(hits)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn parse_rule_file(path: &Path) -> Result<Vec<RuleSpec>, RuleError> {
    let text = fs::read_to_string(path).map_err(|e| RuleError::Io(path.to_path_buf(), e))?;
    let file: RuleFile =
        toml::from_str(&text).map_err(|e| RuleError::Parse(path.to_path_buf(), e))?;
    Ok(file.rules)
}

fn compile_rule(namespace: &str, spec: RuleSpec) -> Result<CompiledRule, RuleError> {
    if spec.strings.is_empty() {
        return Err(RuleError::NoStrings(spec.name));
    }
    let mut strings = Vec::with_capacity(spec.strings.len());
    for (label, pattern) in spec.strings {
        let re = Regex::new(&pattern)
            .map_err(|e| RuleError::Pattern(spec.name.clone(), label.clone(), e))?;
        strings.push((label, re));
    }
    Ok(CompiledRule {
        namespace: namespace.to_owned(),
        name: spec.name,
        tags: spec.tags,
        strings,
    })
}
