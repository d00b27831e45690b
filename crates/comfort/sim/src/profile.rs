//! Controller configuration for a replay: a profile preset with an optional
//! TOML file layered on top.

use std::path::Path;

use anyhow::Context;
use comfort_loop::{ControllerConfig, ExperienceProfile};

/// Build the configuration for `profile`, overridden by the TOML file at
/// `overrides` if given.
///
/// Tables merge key by key, so a file only needs the values it changes.
pub fn load_config(
    profile: ExperienceProfile,
    overrides: Option<&Path>,
) -> anyhow::Result<ControllerConfig> {
    let base = ControllerConfig::for_profile(profile);
    let Some(path) = overrides else {
        return Ok(base);
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let layer: toml::Value =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;

    let mut merged = toml::Value::try_from(&base).context("encoding profile preset")?;
    merge(&mut merged, layer);

    let config: ControllerConfig = merged
        .try_into()
        .with_context(|| format!("applying config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Render the effective configuration of a profile as TOML.
pub fn render_profile(profile: ExperienceProfile) -> anyhow::Result<String> {
    let config = ControllerConfig::for_profile(profile);
    toml::to_string_pretty(&config).context("encoding configuration")
}

fn merge(base: &mut toml::Value, layer: toml::Value) {
    match (base, layer) {
        (toml::Value::Table(base), toml::Value::Table(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}
