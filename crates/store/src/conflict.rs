//! Best-effort recovery of schema-conflict paths from store diagnostics.
//!
//! When a `$set` path traverses a field stored as a scalar, the store rejects
//! the update with a diagnostic naming the offending element, e.g.
//!
//! ```text
//! Plan executor error during update :: caused by ::
//!   Cannot create field 'email' in element {contact: null}
//! ```
//!
//! This shim extracts the element names so the repository can clear exactly
//! those paths and retry the patch. It is string matching by construction and
//! deliberately narrow: anything it cannot parse with confidence returns
//! `None`, and the repository then surfaces the original error unchanged
//! rather than guessing at paths to clear.

/// Extract the conflicting paths from a path-conflict diagnostic.
pub fn classify_schema_conflict(message: &str) -> Option<Vec<String>> {
    let start = message.find('{')?;
    let end = message.rfind('}')?;
    if end <= start {
        return None;
    }

    let body = &message[start + 1..end];
    let mut paths = Vec::new();
    for part in body.split(',') {
        let name = part
            .split(':')
            .next()?
            .trim()
            .trim_matches(|c| c == '\'' || c == '"');
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return None;
        }
        paths.push(name.to_owned());
    }

    if paths.is_empty() {
        None
    } else {
        Some(paths)
    }
}
