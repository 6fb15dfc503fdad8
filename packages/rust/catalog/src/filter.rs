//! Naming-convention filter for catalog titles.

/// Selects items whose title contains a fixed marker.
///
/// Matching is an exact, case-sensitive substring test. No trimming,
/// case folding or fuzzy matching is applied to either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleFilter {
    marker: String,
}

impl TitleFilter {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn matches(&self, title: &str) -> bool {
        title.contains(self.marker.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flash() -> TitleFilter {
        TitleFilter::new("ITPM Flash")
    }

    #[test]
    fn marker_anywhere_in_title_matches() {
        assert!(flash().matches("Weekly ITPM Flash Update"));
        assert!(flash().matches("ITPM Flash"));
        assert!(flash().matches("[LIVE] ITPM Flash: rates"));
    }

    #[test]
    fn unrelated_title_does_not_match() {
        assert!(!flash().matches("Market Open Bell"));
        assert!(!flash().matches(""));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!flash().matches("itpm flash"));
        assert!(!flash().matches("Weekly ITPM FLASH Update"));
    }

    #[test]
    fn no_whitespace_normalization() {
        assert!(!flash().matches("ITPM  Flash"));
        assert!(!flash().matches("ITPMFlash"));
    }
}
