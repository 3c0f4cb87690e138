use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    graphpush_config::{GraphpushConfig, config_dir, discover_and_load, load_config},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the user-global config directory.
    Path,
}

/// An explicit path must load; discovery falls back to defaults.
pub fn load(path: Option<&Path>) -> Result<GraphpushConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(discover_and_load()),
    }
}

pub fn handle_config(action: ConfigAction, config: &GraphpushConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        },
        ConfigAction::Path => {
            match config_dir() {
                Some(dir) => println!("{}", dir.display()),
                None => eprintln!("no home directory found"),
            }
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn explicit_missing_path_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/graphpush.toml"))).is_err());
    }

    #[test]
    fn default_config_renders_as_toml() {
        let rendered = toml::to_string_pretty(&GraphpushConfig::default()).unwrap();
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("ws_path = \"/ws\""));
    }
}
