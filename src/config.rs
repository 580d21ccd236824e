//! Configuration schema: a `serde`-deserializable mirror of the JSON-shaped
//! option tables the optimizer's passes read, loaded via `figment` merging a
//! JSON file, a local JSON override, and `AIK_`-prefixed environment
//! variables — the same three-tier pattern `inputlayer`'s own
//! `Config::load` uses.
//!
//! Unknown keys are warned about rather than rejected: unknown values are
//! ignored and defaults are applied, so a config file written against an
//! older option table still loads cleanly.

use std::collections::HashSet;

use figment::providers::{Env, Format, Json};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The method inliner's option table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields = false)]
pub struct InlinerConfig {
    pub enforce_method_size_limit: bool,
    pub whitelist_no_method_limit: HashSet<String>,
    pub use_cfg_inliner: bool,
    pub throws_inline: bool,
    pub multiple_callers: bool,
    pub inline_small_non_deletables: bool,
    pub black_list: HashSet<String>,
    pub caller_black_list: HashSet<String>,
    pub virtual_same_class_inline: bool,
    pub super_same_class_inline: bool,
}

impl Default for InlinerConfig {
    fn default() -> Self {
        InlinerConfig {
            enforce_method_size_limit: true,
            whitelist_no_method_limit: HashSet::new(),
            use_cfg_inliner: true,
            throws_inline: false,
            multiple_callers: true,
            inline_small_non_deletables: false,
            black_list: HashSet::new(),
            caller_black_list: HashSet::new(),
            virtual_same_class_inline: false,
            super_same_class_inline: false,
        }
    }
}

/// Copy-propagation toggles. The pass itself is an out-of-scope
/// collaborator; only the schema is owned here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CopyPropagationConfig {
    pub eliminate_const_literals: bool,
    pub eliminate_const_strings: bool,
    pub eliminate_const_classes: bool,
    pub replace_with_representative: bool,
    pub wide_registers: bool,
    pub static_finals: bool,
}

/// Access-marking toggles; schema-only, same rationale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AccessMarkingConfig {
    pub finalize_classes: bool,
    pub finalize_methods: bool,
    pub finalize_fields: bool,
    pub privatize_methods: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub inliner: InlinerConfig,
    pub copy_propagation: CopyPropagationConfig,
    pub access_marking: AccessMarkingConfig,
}

impl Config {
    /// Loads `path`, merges `<path>.local.json` if present, then merges
    /// `AIK_`-prefixed environment variables, a three-tier `Figment` stack.
    /// Unknown keys in the input are not
    /// rejected — `figment`/`serde`'s `#[serde(default)]` fields simply keep
    /// their defaults, and this function logs a warning for any top-level
    /// key it does not recognize.
    pub fn load(path: &std::path::Path) -> Result<Config, ConfigError> {
        let local_path = path.with_extension("local.json");
        let mut figment = Figment::new().merge(Json::file(path));
        if local_path.exists() {
            figment = figment.merge(Json::file(&local_path));
        }
        figment = figment.merge(Env::prefixed("AIK_").split("_"));

        let raw: serde_json::Value = figment.extract()?;
        warn_unknown_top_level_keys(&raw);

        let config: Config = figment.extract()?;
        Ok(config)
    }
}

fn warn_unknown_top_level_keys(raw: &serde_json::Value) {
    const KNOWN: &[&str] = &["inliner", "copy_propagation", "access_marking"];
    if let serde_json::Value::Object(map) = raw {
        for key in map.keys() {
            if !KNOWN.contains(&key.as_str()) {
                tracing::warn!(key = %key, "unrecognized top-level configuration key, ignoring");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert!(config.inliner.enforce_method_size_limit);
        assert!(config.inliner.use_cfg_inliner);
        assert!(config.inliner.multiple_callers);
        assert!(!config.inliner.throws_inline);
    }

    #[test]
    fn load_merges_file_and_ignores_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aik.json");
        std::fs::write(
            &path,
            r#"{"inliner": {"throws_inline": true}, "mystery_future_option": 1}"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.inliner.throws_inline);
        // Everything else still defaults.
        assert!(config.inliner.enforce_method_size_limit);
    }
}
