//! Session configuration types.

use serde::{Deserialize, Serialize};

/// Default length above which element text is written as CDATA.
pub const DEFAULT_CDATA_THRESHOLD: usize = 512;

/// Configuration of one backup or restore session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Match table and column names case-sensitively (default: false).
    #[serde(default)]
    pub case_sensitive: bool,

    /// Insert supplied identity values instead of letting the platform
    /// generate them (default: false).
    #[serde(default)]
    pub identity_override: bool,

    /// Character encoding of written transfer streams, as a WHATWG label
    /// (default: "UTF-8").
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Element text longer than this many characters is written as CDATA
    /// (default: 512).
    #[serde(default = "default_cdata_threshold")]
    pub cdata_threshold: usize,

    /// Name of the root element of written transfer streams (default: "data").
    #[serde(default = "default_root_element")]
    pub root_element: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            identity_override: false,
            encoding: default_encoding(),
            cdata_threshold: DEFAULT_CDATA_THRESHOLD,
            root_element: default_root_element(),
        }
    }
}

impl SessionConfig {
    /// Set case-sensitive name matching.
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Set identity-override mode.
    pub fn with_identity_override(mut self, identity_override: bool) -> Self {
        self.identity_override = identity_override;
        self
    }

    /// Set the output encoding label.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Set the CDATA threshold.
    pub fn with_cdata_threshold(mut self, threshold: usize) -> Self {
        self.cdata_threshold = threshold;
        self
    }
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

fn default_cdata_threshold() -> usize {
    DEFAULT_CDATA_THRESHOLD
}

fn default_root_element() -> String {
    "data".to_string()
}
