//! `#[serde(default)]` helper functions for the settings schema.

pub fn default_working_root() -> String {
    "./gitvault-work".to_string()
}

pub fn default_retention_minimum() -> u32 {
    1
}

pub fn default_enabled() -> bool {
    true
}

pub fn default_max_retries() -> usize {
    3
}

pub fn default_retry_delay_ms() -> u64 {
    500
}

pub fn default_retry_max_delay_ms() -> u64 {
    5000
}
