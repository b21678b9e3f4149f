//! User settings read from extension storage.
//!
//! Storage is an external key/value capability. The host hands in a JSON
//! snapshot at startup and `{key: {newValue}}` change maps afterwards.
//! Every key fails open: a missing or wrongly typed value means "enabled, no
//! host exclusions, do not force sound".
//!
//! # Keys
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `enabled` | bool | `true` |
//! | `globally_enabled` | bool | `true` |
//! | `disabled_hosts` | string array | `[]` |
//! | `always_enable_sound` | bool | `false` |

use serde_json::{Map, Value};

pub const KEY_ENABLED: &str = "enabled";
pub const KEY_GLOBALLY_ENABLED: &str = "globally_enabled";
pub const KEY_DISABLED_HOSTS: &str = "disabled_hosts";
pub const KEY_ALWAYS_ENABLE_SOUND: &str = "always_enable_sound";

/// Every storage key the core reads.
pub const STORAGE_KEYS: [&str; 4] = [
    KEY_ENABLED,
    KEY_GLOBALLY_ENABLED,
    KEY_DISABLED_HOSTS,
    KEY_ALWAYS_ENABLE_SOUND,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub enabled: bool,
    pub globally_enabled: bool,
    /// Lower-cased hostnames.
    pub disabled_hosts: Vec<String>,
    pub always_enable_sound: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            globally_enabled: true,
            disabled_hosts: Vec::new(),
            always_enable_sound: false,
        }
    }
}

impl Settings {
    /// Settings from a `storage.get` result.
    #[must_use]
    pub fn from_snapshot(snapshot: &Map<String, Value>) -> Self {
        let mut settings = Self::default();
        for key in STORAGE_KEYS {
            settings.set(key, snapshot.get(key));
        }
        settings
    }

    /// Apply a `storage.onChanged` map. Returns whether anything changed.
    pub fn apply_changes(&mut self, changes: &Map<String, Value>) -> bool {
        let before = self.clone();
        for (key, change) in changes {
            self.set(key, change.get("newValue"));
        }
        *self != before
    }

    fn set(&mut self, key: &str, value: Option<&Value>) {
        let defaults = Self::default();
        match key {
            KEY_ENABLED => {
                self.enabled = value.and_then(Value::as_bool).unwrap_or(defaults.enabled);
            }
            KEY_GLOBALLY_ENABLED => {
                self.globally_enabled = value
                    .and_then(Value::as_bool)
                    .unwrap_or(defaults.globally_enabled);
            }
            KEY_DISABLED_HOSTS => {
                self.disabled_hosts = value
                    .and_then(Value::as_array)
                    .map(|hosts| {
                        hosts
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_ascii_lowercase)
                            .collect()
                    })
                    .unwrap_or_default();
            }
            KEY_ALWAYS_ENABLE_SOUND => {
                self.always_enable_sound = value.and_then(Value::as_bool) == Some(true);
            }
            _ => {}
        }
    }

    /// Whether shortcuts should run on `hostname`.
    #[must_use]
    pub fn is_active_for(&self, hostname: &str) -> bool {
        self.enabled
            && self.globally_enabled
            && !self
                .disabled_hosts
                .iter()
                .any(|h| h.eq_ignore_ascii_case(hostname))
    }
}
