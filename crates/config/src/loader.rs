use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::GraphpushConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "graphpush.toml",
    "graphpush.yaml",
    "graphpush.yml",
    "graphpush.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<GraphpushConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./graphpush.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/graphpush/graphpush.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to defaults (plus env overrides) when nothing is found or the
/// file fails to parse.
pub fn discover_and_load() -> GraphpushConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    let mut config = GraphpushConfig::default();
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config
}

/// Returns the user-global config directory (`~/.config/graphpush/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "graphpush").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Apply `GRAPHPUSH_*` overrides on top of a parsed config.
///
/// Unparseable numeric values are ignored with a warning.
pub fn apply_env_overrides(config: &mut GraphpushConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup("GRAPHPUSH_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("GRAPHPUSH_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid GRAPHPUSH_PORT"),
        }
    }
    if let Some(max) = lookup("GRAPHPUSH_MAX_PAYLOAD_BYTES") {
        match max.parse() {
            Ok(max) => config.limits.max_payload_bytes = max,
            Err(e) => warn!(value = %max, error = %e, "ignoring invalid GRAPHPUSH_MAX_PAYLOAD_BYTES"),
        }
    }
    if let Some(max) = lookup("GRAPHPUSH_MAX_SUBSCRIPTIONS_PER_CONNECTION") {
        match max.parse() {
            Ok(max) => config.limits.max_subscriptions_per_connection = max,
            Err(e) => warn!(
                value = %max,
                error = %e,
                "ignoring invalid GRAPHPUSH_MAX_SUBSCRIPTIONS_PER_CONNECTION"
            ),
        }
    }
    if let Some(url) = lookup("GRAPHPUSH_WS_URL") {
        config.client.ws_url = url;
    }
    if let Some(url) = lookup("GRAPHPUSH_HTTP_URL") {
        config.client.http_url = url;
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<GraphpushConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
