//! Hierarchy engine configuration.

use std::env;

/// Configuration for the hierarchy engine.
#[derive(Debug, Clone)]
pub struct HierarchyConfig {
    /// Longest accepted category name, in characters (default: 100).
    pub max_name_length: usize,
    /// Deepest level a category may sit at; roots are level 0 (default: 16).
    pub max_depth: u32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_name_length: 100,
            max_depth: 16,
        }
    }
}

impl HierarchyConfig {
    /// Build from `TOOLSHED_CATEGORY_*` variables. Unset or unparsable
    /// values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_name_length: env::var("TOOLSHED_CATEGORY_MAX_NAME_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_name_length),
            max_depth: env::var("TOOLSHED_CATEGORY_MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HierarchyConfig::default();
        assert_eq!(config.max_name_length, 100);
        assert_eq!(config.max_depth, 16);
    }
}
