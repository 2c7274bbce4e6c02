use std::path::{Path, PathBuf};

use anyhow::Context as _;
use checker_core::config::{Config, PartialConfig};

use crate::util;

pub const APP_NAME: &str = "simple-checker";

/// `<user config dir>/simple-checker/checker.toml`
pub fn global_config_filepath() -> Option<PathBuf> {
    let dir = dirs::config_dir()?;
    Some(dir.join(APP_NAME).join(Config::FILENAME))
}

fn load_layer(path: &Path) -> anyhow::Result<PartialConfig> {
    log::info!(
        "Loading config '{}'",
        util::replace_homedir_to_tilde(path).to_string_lossy()
    );
    PartialConfig::from_toml_file(path)
}

/// Merges the global config file, the project config file (`explicit`, or the
/// nearest `checker.toml` from `cur_dir` upwards) and `args`, in this order.
pub fn resolve_layers(
    explicit: Option<&Path>,
    cur_dir: impl AsRef<Path>,
    args: PartialConfig,
) -> anyhow::Result<PartialConfig> {
    let global = match self::global_config_filepath().filter(|p| p.is_file()) {
        Some(path) => self::load_layer(&path)?,
        None => PartialConfig::default(),
    };

    let project = match explicit {
        Some(path) => self::load_layer(path)
            .with_context(|| format!("Cannot load config {:?}", path))?,
        None => match Config::find_file_in_ancestors(cur_dir) {
            Some(path) => self::load_layer(&path)?,
            None => PartialConfig::default(),
        },
    };

    Ok(global.merge(project).merge(args))
}
