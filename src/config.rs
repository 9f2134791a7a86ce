//! Configuration options for the tagdir rewrite engine.

use serde::{Deserialize, Serialize};

/// Which entry is kept when a directory holds the same tag more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first occurrence; later ones are dropped.
    #[default]
    FirstWins,
    /// Keep the last occurrence.
    LastWins,
}

/// Configuration options for reading and rewriting directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Maximum sub-directory nesting depth.
    /// Default: 16
    pub max_depth: usize,

    /// Precedence rule for duplicate tags in a source directory.
    /// Default: DuplicatePolicy::FirstWins
    pub duplicate_policy: DuplicatePolicy,

    /// Skip all-zero records at the start of a directory instead of
    /// reporting them as bad formats.
    /// Default: true
    pub tolerate_leading_zeros: bool,

    /// Downgrade read failures of preview payloads to warnings.
    /// Default: true
    pub lenient_previews: bool,

    /// Drop pointers to sub-directories that fail to read, with a warning,
    /// instead of failing the whole rewrite.
    /// Default: false
    pub skip_bad_subdirectories: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_depth: 16,
            duplicate_policy: DuplicatePolicy::FirstWins,
            tolerate_leading_zeros: true,
            lenient_previews: true,
            skip_bad_subdirectories: false,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Sets the maximum nesting depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the duplicate tag policy.
    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Sets whether leading all-zero records are tolerated.
    pub fn tolerate_leading_zeros(mut self, value: bool) -> Self {
        self.tolerate_leading_zeros = value;
        self
    }

    /// Sets whether preview read failures are downgraded to warnings.
    pub fn lenient_previews(mut self, value: bool) -> Self {
        self.lenient_previews = value;
        self
    }

    /// Sets whether unreadable sub-directories are dropped instead of failing.
    pub fn skip_bad_subdirectories(mut self, value: bool) -> Self {
        self.skip_bad_subdirectories = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_depth == 0 {
            return Err(crate::Error::invalid_argument("max_depth must be > 0"));
        }
        Ok(())
    }
}
