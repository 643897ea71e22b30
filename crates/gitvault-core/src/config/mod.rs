mod defaults;
mod resolve;
mod types;

pub use self::resolve::{default_settings_candidates, load_settings, resolve_settings_path};
pub use self::types::*;
