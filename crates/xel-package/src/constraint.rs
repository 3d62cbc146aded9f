//! Version constraint parsing
//!
//! Constraints are written the way package authors write them in `xel.json`:
//!
//! - aliases: `latest` (`>=0.0.0`), `stable` (`>=1.0.0`), `any` and the empty
//!   string (`*`)
//! - `||` separates alternatives, any of which may match
//! - inside an alternative, comparators separated by commas or whitespace
//!   must all match (`>= 1.2 < 2`)
//! - a bare version (`1.2.3`, `v1.2.3`) means exactly that version
//! - `a - b` is the inclusive range `>=a, <=b`
//!
//! Each alternative is lowered onto a [`semver::VersionReq`].

use crate::{PackageError, Result};
use semver::{Version, VersionReq};
use std::fmt;
use std::str::FromStr;

const OPERATOR_CHARS: &[char] = &['=', '<', '>', '~', '^'];

/// Expand a version alias, returning the constraint text to parse
pub fn expand_alias(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "any" => "*".to_string(),
        "latest" => ">=0.0.0".to_string(),
        "stable" => ">=1.0.0".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Whether the constraint is the `latest` alias
pub fn is_latest(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("latest")
}

/// A parsed version constraint
#[derive(Debug, Clone)]
pub struct Constraint {
    source: String,
    alternatives: Vec<VersionReq>,
}

impl Constraint {
    /// Parse a constraint, expanding aliases first
    pub fn parse(raw: &str) -> Result<Self> {
        let expanded = expand_alias(raw);
        let alternatives = expanded
            .split("||")
            .map(|alternative| {
                parse_alternative(alternative).map_err(|reason| PackageError::ConstraintSyntax {
                    constraint: raw.to_string(),
                    reason,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: raw.trim().to_string(),
            alternatives,
        })
    }

    /// Check a version against the constraint
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// The constraint as written
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Constraint {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_alternative(input: &str) -> std::result::Result<VersionReq, String> {
    let comparators = comparators(input)?;
    if comparators.is_empty() {
        return Err("empty constraint".to_string());
    }
    VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())
}

/// Split an alternative into normalized comparator strings
fn comparators(input: &str) -> std::result::Result<Vec<String>, String> {
    let pieces: Vec<&str> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();

    let mut tokens: Vec<String> = Vec::new();
    let mut i = 0;
    while i < pieces.len() {
        let piece = pieces[i];
        if piece.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            // Operator separated from its version: `>= 1.2`
            let version = pieces
                .get(i + 1)
                .ok_or_else(|| format!("operator `{}` without a version", piece))?;
            tokens.push(format!("{}{}", piece, version));
            i += 2;
        } else {
            tokens.push(piece.to_string());
            i += 1;
        }
    }

    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if tokens.get(i + 1).map(String::as_str) == Some("-") {
            let upper = tokens
                .get(i + 2)
                .ok_or_else(|| format!("range `{} -` without an upper bound", tokens[i]))?;
            out.push(format!(">={}", strip_v(&tokens[i])));
            out.push(format!("<={}", strip_v(upper)));
            i += 3;
        } else {
            out.push(normalize_comparator(&tokens[i]));
            i += 1;
        }
    }
    Ok(out)
}

fn normalize_comparator(token: &str) -> String {
    let op_len = token
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(op_len);
    let version = strip_v(version);
    let wildcard = version.split('.').any(|p| matches!(p, "*" | "x" | "X"));

    if op.is_empty() && !wildcard {
        format!("={}", version)
    } else {
        format!("{}{}", op, version)
    }
}

fn strip_v(version: &str) -> &str {
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}

/// Parse a version leniently: a leading `v` is stripped and missing minor or
/// patch components are filled with zero (`v1.2` is `1.2.0`)
pub fn parse_version(raw: &str) -> Result<Version> {
    let invalid = |reason: &str| PackageError::InvalidVersion {
        version: raw.to_string(),
        reason: reason.to_string(),
    };

    let text = strip_v(raw.trim());
    let core_end = text.find(['-', '+']).unwrap_or(text.len());
    let (core, suffix) = text.split_at(core_end);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid("expected MAJOR[.MINOR[.PATCH]]"));
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);

    Version::parse(&padded).map_err(|e| invalid(&e.to_string()))
}
