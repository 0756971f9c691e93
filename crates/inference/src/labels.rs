use crate::error::LabelIndexError;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

/// Class names indexed by the model's class output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    /// Read a newline-delimited label file.
    ///
    /// A missing file yields an empty set; every lookup against it then fails
    /// with a [`LabelIndexError`]. Any other IO failure is returned.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let labels = Self::parse(&contents);
                tracing::info!(path = %path.display(), count = labels.len(), "Labels loaded");
                Ok(labels)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Label file not found, using empty label set");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn parse(contents: &str) -> Self {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Label for a raw class value as emitted by the model.
    ///
    /// The value is truncated toward zero, so `1.9` addresses label 1.
    pub fn get(&self, class_id: f32) -> Result<&str, LabelIndexError> {
        let out_of_bounds = LabelIndexError {
            index: class_id,
            len: self.0.len(),
        };

        if !class_id.is_finite() || class_id < 0.0 {
            return Err(out_of_bounds);
        }

        self.0
            .get(class_id as usize)
            .map(String::as_str)
            .ok_or(out_of_bounds)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_skips_blank_lines() {
        let labels = LabelSet::parse("person\r\n  bicycle \n\n car\n");
        assert_eq!(labels.iter().collect::<Vec<_>>(), ["person", "bicycle", "car"]);
    }

    #[test]
    fn test_get_bounds() {
        let labels: LabelSet = ["cat", "dog"].into_iter().collect();

        assert_eq!(labels.get(0.0), Ok("cat"));
        assert_eq!(labels.get(1.0), Ok("dog"), "Last index is valid");
        assert_eq!(labels.get(1.7), Ok("dog"), "Fractional class truncates");

        assert_eq!(labels.get(2.0), Err(LabelIndexError { index: 2.0, len: 2 }));
        assert!(labels.get(-1.0).is_err(), "Negative class must fail");
        assert!(labels.get(f32::NAN).is_err());
        assert!(labels.get(f32::INFINITY).is_err());
    }

    #[test]
    fn test_empty_set_rejects_every_index() {
        let labels = LabelSet::default();
        assert!(labels.is_empty());
        assert!(labels.get(0.0).is_err());
    }

    #[test]
    fn test_serializes_as_list() {
        let labels = LabelSet::new(vec!["a".into(), "b".into()]);
        assert_eq!(serde_json::to_string(&labels).unwrap(), r#"["a","b"]"#);
    }
}
