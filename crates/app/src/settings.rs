use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context as _;
use libcat_core::Settings;

/// Reads `path`; a missing file yields the defaults.
pub fn load(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(text) => toml::from_str::<Settings>(&text)
            .with_context(|| format!("parse settings {}", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("read settings {}", path.display()));
        }
    };
    settings.normalize();
    Ok(settings)
}

pub fn save(path: &Path, settings: &Settings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }
    let text = toml::to_string_pretty(settings).context("serialize settings")?;
    fs::write(path, text).with_context(|| format!("write settings {}", path.display()))
}

/// Command-line and environment values win over the file.
pub fn apply_overrides(settings: &mut Settings, api_url: Option<&str>) {
    if let Some(url) = api_url {
        settings.api_url = url.to_string();
    }
    settings.normalize();
}
