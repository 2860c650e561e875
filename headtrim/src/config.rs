use std::path::Path;

use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::{Error, error};

/// Highest libFLAC compression preset.
pub const MAX_COMPRESSION_LEVEL: u32 = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: Log,
    pub encoder: Encoder,
}

#[derive(Debug, Clone, Serialize, Deserialize, Educe)]
#[educe(Default)]
#[serde(default)]
pub struct Log {
    /// `tracing-subscriber` filter directives, e.g. `headtrim=debug`.
    #[educe(Default(expression = "info".to_owned()))]
    pub filter: String,
    pub time: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Educe)]
#[educe(Default)]
#[serde(default)]
pub struct Encoder {
    #[educe(Default(expression = MAX_COMPRESSION_LEVEL))]
    pub compression_level: u32,
}

impl Encoder {
    pub fn compression_level(&self) -> u32 {
        self.compression_level.min(MAX_COMPRESSION_LEVEL)
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|e| error::Kind::Config(e.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_default() {
        let config = Config::default();
        assert_eq!(config.log.filter, "info");
        assert!(!config.log.time);
        assert_eq!(config.encoder.compression_level(), 8);
    }

    #[test]
    fn test_partial_file() {
        let config = Config::parse("[log]\nfilter = \"headtrim=debug\"\n").unwrap();
        assert_eq!(config.log.filter, "headtrim=debug");
        assert!(!config.log.time);
        assert_eq!(config.encoder.compression_level, 8);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(5, 5)]
    #[case(8, 8)]
    #[case(12, 8)]
    fn test_compression_level_is_clamped(#[case] configured: u32, #[case] expected: u32) {
        let config = Config::parse(&format!("[encoder]\ncompression_level = {configured}\n")).unwrap();
        assert_eq!(config.encoder.compression_level(), expected);
    }

    #[test]
    fn test_invalid_file() {
        let err = Config::parse("[log]\ntime = \"yes\"\n").unwrap_err();
        assert!(matches!(err.kind(), error::Kind::Config(_)));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headtrim.toml");
        std::fs::write(&path, "[log]\ntime = true\n").unwrap();

        assert!(Config::load(Some(&path)).unwrap().log.time);
        assert!(!Config::load(None).unwrap().log.time);
        assert!(matches!(
            Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err().kind(),
            error::Kind::Io(_)
        ));
    }
}
