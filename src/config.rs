use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::MResult;

/// Bounds applied when building matrices from outside input.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    pub max_rows: usize,
    pub max_cols: usize,
    pub max_name_len: usize,
    /// Upper bound on how many input files the CLI accepts.
    pub max_files: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_rows: 100,
            max_cols: 100,
            max_name_len: 255,
            max_files: 100,
        }
    }
}

impl Limits {
    /// No limit beyond what fits in memory.
    pub fn unbounded() -> Self {
        Limits {
            max_rows: usize::MAX,
            max_cols: usize::MAX,
            max_name_len: usize::MAX,
            max_files: usize::MAX,
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> MResult<Self> {
        let file = File::open(path)?;
        let limits = serde_json::from_reader(BufReader::new(file))?;
        Ok(limits)
    }

    pub fn from_json_str(s: &str) -> MResult<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MError;

    #[test]
    fn test_default_limits() {
        let l = Limits::default();
        assert_eq!((l.max_rows, l.max_cols), (100, 100));
        assert_eq!(l.max_files, 100);
    }

    #[test]
    fn test_partial_json_overrides() {
        let l = Limits::from_json_str(r#"{ "max_rows": 500 }"#).unwrap();
        assert_eq!(l.max_rows, 500);
        assert_eq!(l.max_cols, 100);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            Limits::from_json_str("{ max_rows: }"),
            Err(MError::Config(_))
        ));
    }
}
