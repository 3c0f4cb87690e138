//! Configuration loading and env substitution.
//!
//! Config files: `graphpush.toml`, `graphpush.yaml`, or `graphpush.json`
//! Searched in `./` then `~/.config/graphpush/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw
//! file contents, and `GRAPHPUSH_*` environment overrides after parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{ClientConfig, GraphpushConfig, LimitsConfig, ServerConfig},
};
