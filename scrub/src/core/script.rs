//! The revisable cleaning script threaded through turns.

use serde::{Deserialize, Serialize};

/// Opaque, versioned cleaning script text.
///
/// The controller never inspects the source; it only retains the most recent
/// revision so the generator can edit it incrementally instead of starting
/// over. A script is replaced only when the generator returns a new one;
/// execution failures never discard it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningScript {
    /// Monotonically increasing revision, starting at 1.
    pub revision: u32,
    /// Complete script source. Always a full program, never a diff.
    pub source: String,
}

impl CleaningScript {
    /// First revision of a script.
    pub fn initial(source: impl Into<String>) -> Self {
        Self {
            revision: 1,
            source: source.into(),
        }
    }

    /// Next revision, derived from this one.
    pub fn revised(&self, source: impl Into<String>) -> Self {
        Self {
            revision: self.revision + 1,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revisions_increase_monotonically() {
        let first = CleaningScript::initial("print('v1')");
        let second = first.revised("print('v2')");
        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);
        assert_eq!(second.source, "print('v2')");
    }
}
