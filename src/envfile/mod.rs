//! Flat `KEY=value` file access (the `.env` file holding credentials and
//! the system message).
//!
//! Reading goes through `dotenvy` so quoting and escapes follow the usual
//! dotenv rules.  Writing rewrites the file line by line: the assignment
//! for the touched key is replaced in place, duplicates of it are dropped,
//! and every other line (comments, unrelated keys) is kept verbatim.

use std::path::Path;

use anyhow::Context;
use tracing::debug;

/// Parse every `KEY=value` pair in `path`, in file order.
///
/// A missing file yields an empty list.  Lines `dotenvy` rejects (older
/// installs wrote values with bare spaces) fall back to the raw text
/// after the first `=`.
pub fn read(path: &Path) -> anyhow::Result<Vec<(String, String)>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };

    let mut pairs = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let Some(key) = line_key(line) else {
            continue;
        };
        match dotenvy::from_read_iter(line.as_bytes()).next() {
            Some(Ok(pair)) => pairs.push(pair),
            Some(Err(e)) => {
                debug!(path = %path.display(), line = lineno + 1, error = %e, "lenient env line");
                pairs.push((key.to_string(), raw_value(line).to_string()));
            }
            None => {}
        }
    }
    Ok(pairs)
}

fn raw_value(line: &str) -> &str {
    line.split_once('=').map(|(_, v)| v.trim()).unwrap_or_default()
}

/// Return the value assigned to `key`, if any.
///
/// When the key is assigned more than once the last assignment wins.
pub fn get(path: &Path, key: &str) -> anyhow::Result<Option<String>> {
    Ok(read(path)?
        .into_iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v))
}

/// Set `key` to `value`, keeping all other lines untouched.
pub fn set(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    validate_key(key)?;
    let assignment = format!("{key}={}", quote_value(value));
    rewrite(path, key, Some(assignment))?;
    debug!(path = %path.display(), key, "env key written");
    Ok(())
}

/// Remove every assignment of `key`.  Missing files and keys are a no-op.
pub fn remove(path: &Path, key: &str) -> anyhow::Result<()> {
    validate_key(key)?;
    if !path.exists() {
        return Ok(());
    }
    rewrite(path, key, None)?;
    debug!(path = %path.display(), key, "env key removed");
    Ok(())
}

fn validate_key(key: &str) -> anyhow::Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid {
        anyhow::bail!("invalid env key: {key:?}");
    }
    Ok(())
}

fn rewrite(path: &Path, key: &str, assignment: Option<String>) -> anyhow::Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };

    let mut out: Vec<String> = Vec::new();
    let mut pending = assignment;
    for line in existing.lines() {
        if line_key(line) == Some(key) {
            // First assignment is replaced in place; later duplicates vanish.
            if let Some(a) = pending.take() {
                out.push(a);
            }
            continue;
        }
        out.push(line.to_string());
    }
    if let Some(a) = pending {
        out.push(a);
    }

    let mut contents = out.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    crate::utils::write_atomic(path, &contents)
}

/// Name of the variable assigned on `line`, or `None` for comments and
/// blank lines.
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (name, _) = trimmed.split_once('=')?;
    Some(name.trim())
}

/// Render `value` so that `dotenvy` reads it back unchanged.
fn quote_value(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_.,:/+=@%".contains(c));
    if plain {
        return value.to_string();
    }
    if !value.contains('\'') && !value.contains('\n') {
        return format!("'{value}'");
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
