//! Repository and branch name validation.
//!
//! Branch names follow git-style conventions:
//! - non-empty
//! - no whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - no `..` and no `@{`
//! - must not start or end with `.` or `/`, nor end with `.lock`
//! - slash-separated components are non-empty and do not start with `.`
//!
//! Repository names are 3 to 63 characters of lowercase ASCII letters,
//! digits and `-`, starting with a letter or digit.

use crate::error::{CatalogError, CatalogResult};

const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> CatalogError {
    CatalogError::InvalidName {
        kind,
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a branch name.
///
/// ```
/// use arbor_catalog::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("feature/export").is_ok());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> CatalogResult<()> {
    let bad = |reason: String| Err(invalid("branch", name, reason));

    if name.is_empty() {
        return bad("must not be empty".into());
    }
    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|ch| name.contains(**ch)) {
        return bad(format!("contains forbidden character {ch:?}"));
    }
    if name.contains("..") {
        return bad("must not contain '..'".into());
    }
    if name.contains("@{") {
        return bad("must not contain '@{'".into());
    }
    if name.starts_with(['.', '/']) || name.ends_with(['.', '/']) {
        return bad("must not start or end with '.' or '/'".into());
    }
    if name.ends_with(".lock") {
        return bad("must not end with '.lock'".into());
    }
    for component in name.split('/') {
        if component.is_empty() {
            return bad("path components must not be empty".into());
        }
        if component.starts_with('.') {
            return bad(format!("component {component:?} starts with '.'"));
        }
    }
    Ok(())
}

/// Validate a repository name.
pub fn validate_repository_name(name: &str) -> CatalogResult<()> {
    if !(3..=63).contains(&name.len()) {
        return Err(invalid("repository", name, "must be 3 to 63 characters long"));
    }
    if name.starts_with('-') {
        return Err(invalid("repository", name, "must start with a letter or digit"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(invalid(
            "repository",
            name,
            format!("contains invalid character {ch:?}"),
        ));
    }
    Ok(())
}
