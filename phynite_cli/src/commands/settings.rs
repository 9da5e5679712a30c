//! Settings commands (show, set)

use crate::{client::ServerClient, config::Config};
use anyhow::{anyhow, bail, Context, Result};
use console::style;
use phynite_common::Settings;
use serde_json::Value;

const SETTINGS_PATH: &str = "/v1/admin/settings";

/// Print the current settings
pub async fn show() -> Result<()> {
    let config = Config::load()?;
    let client = ServerClient::admin(&config)?;
    let settings: Settings = client.get(SETTINGS_PATH).await?;
    print_settings(&settings)?;
    Ok(())
}

/// Change one field and write the settings back
pub async fn set(key: &str, value: &str) -> Result<()> {
    let config = Config::load()?;
    let client = ServerClient::admin(&config)?;

    // The masked API key round-trips unchanged
    let current: Settings = client.get(SETTINGS_PATH).await?;
    let candidate = apply_setting(current, key, value)?;
    let saved: Settings = client.put(SETTINGS_PATH, &candidate).await?;

    let sent = serde_json::to_value(&candidate)?;
    let stored = serde_json::to_value(&saved)?;
    if key != "api_key" && sent.get(key) != stored.get(key) {
        cliclack::log::warning(format!(
            "Server adjusted {} to {}",
            style(key).yellow(),
            stored.get(key).cloned().unwrap_or(Value::Null)
        ))?;
    } else {
        cliclack::log::success(format!("Updated {}", style(key).green()))?;
    }

    print_settings(&saved)?;
    Ok(())
}

/// Set `key` to `value`, parsed according to the field's current type
pub fn apply_setting(settings: Settings, key: &str, value: &str) -> Result<Settings> {
    let mut object = match serde_json::to_value(settings)? {
        Value::Object(object) => object,
        _ => bail!("Settings did not serialize to an object"),
    };

    let current = object
        .get(key)
        .ok_or_else(|| anyhow!("Unknown setting `{}`", key))?;

    let parsed = match current {
        Value::Bool(_) => Value::Bool(
            parse_bool(value).ok_or_else(|| anyhow!("`{}` expects true or false", key))?,
        ),
        Value::Number(_) => Value::from(
            value
                .trim()
                .parse::<u32>()
                .with_context(|| format!("`{}` expects a number", key))?,
        ),
        Value::Array(_) => Value::Array(
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        ),
        Value::Null if value.trim().is_empty() => Value::Null,
        _ => Value::String(value.trim().to_string()),
    };
    object.insert(key.to_string(), parsed);

    serde_json::from_value(Value::Object(object)).with_context(|| format!("Invalid value for `{}`", key))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn print_settings(settings: &Settings) -> Result<()> {
    let value = serde_json::to_value(settings)?;
    let mut lines = Vec::new();
    if let Value::Object(object) = value {
        for (key, value) in object {
            let shown = match value {
                Value::String(s) if s.is_empty() => style("(empty)".to_string()).dim().to_string(),
                Value::String(s) => s,
                Value::Null => style("(none)".to_string()).dim().to_string(),
                other => other.to_string(),
            };
            lines.push(format!("{:<24} {}", style(key).dim(), shown));
        }
    }
    cliclack::note("Settings", lines.join("\n"))?;
    Ok(())
}
