use crate::media::config::DEFAULT_EXTENSIONS;

/// Extension allow-list. Matching is by name only, case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaClassifier {
    extensions: Vec<String>,
}

impl MediaClassifier {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for raw in extensions {
            let ext = raw.as_ref().trim().trim_start_matches('.').to_lowercase();
            if ext.is_empty() {
                continue;
            }
            let ext = format!(".{ext}");
            if !normalized.contains(&ext) {
                normalized.push(ext);
            }
        }
        Self {
            extensions: normalized,
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn is_eligible(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.len() > ext.len() && lower.ends_with(ext.as_str()))
    }
}

impl Default for MediaClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::MediaClassifier;

    #[test]
    fn default_list_matches_case_insensitively() {
        let c = MediaClassifier::default();
        assert!(c.is_eligible("clip.MP4"));
        assert!(c.is_eligible("clip.mov"));
        assert!(c.is_eligible("GOPR0001.Mkv"));
        assert!(c.is_eligible("take.2.avi"));
        assert!(!c.is_eligible("clip.txt"));
        assert!(!c.is_eligible("clip"));
        assert!(!c.is_eligible("clip.mp4.part"));
        assert!(!c.is_eligible(".mp4"));
    }

    #[test]
    fn configured_extensions_are_normalized() {
        let c = MediaClassifier::new(["MTS", " .m2ts ", "", ".", "mts"]);
        assert_eq!(c.extensions(), &[".mts".to_string(), ".m2ts".to_string()]);
        assert!(c.is_eligible("00001.MTS"));
        assert!(!c.is_eligible("clip.mp4"));
    }
}
