use anyhow::{Context as AnyhowContext, Result};
use std::fs;
use std::path::Path;

/// One product description per non-blank line
pub(crate) fn read_products(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read products file {}", path.display()))?;
    Ok(parse_products(&raw))
}

pub(crate) fn parse_products(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Display title of a `"Name: description"` line; the whole line otherwise
pub(crate) fn product_title(line: &str) -> &str {
    let line = line.trim();
    match line.split_once(':') {
        Some((title, _)) if !title.trim().is_empty() => title.trim(),
        _ => line,
    }
}
