use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between category segments in a serialized path
pub const SEPARATOR: &str = " > ";

/// One taxonomy line as an ordered, non-empty list of category names,
/// most general first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxonomyPath(Vec<String>);

impl TaxonomyPath {
    /// Split a serialized path into segments.
    ///
    /// Returns `None` if the line is blank or any segment is empty
    /// (e.g. `"Electronics >  > Laptops"`).
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let segments: Vec<String> = line
            .split(SEPARATOR)
            .map(|segment| segment.trim().to_string())
            .collect();

        if segments.iter().any(String::is_empty) {
            return None;
        }

        Some(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// First segment (the L1 category)
    pub fn top_level(&self) -> &str {
        &self.0[0]
    }

    /// Final segment
    pub fn leaf(&self) -> &str {
        &self.0[self.0.len() - 1]
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn into_segments(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for TaxonomyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(SEPARATOR))
    }
}
