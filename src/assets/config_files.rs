//! Shared configuration files - Reading and editing the files under `configuration/`

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config name")]
    UnknownName(String),

    #[error("Config file not found")]
    NotFound(PathBuf),

    #[error("Content is required")]
    ContentRequired,

    #[error("Invalid field path: {0}")]
    InvalidFieldPath(String),

    #[error("Failed to parse {name}: {message}")]
    Parse { name: String, message: String },

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// How a config file is parsed and reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
    Text,
}

/// The editable files, by name
const CONFIG_FILES: &[(&str, ConfigFormat)] = &[
    ("settings.yml", ConfigFormat::Yaml),
    ("velocity.toml", ConfigFormat::Toml),
    ("resources.json", ConfigFormat::Json),
    ("forwarding.secret", ConfigFormat::Text),
];

/// A parsed config file as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigDocument {
    pub content: Value,
    #[serde(rename = "type")]
    pub format: ConfigFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

pub fn format_of(name: &str) -> ConfigResult<ConfigFormat> {
    CONFIG_FILES
        .iter()
        .find(|(file, _)| *file == name)
        .map(|(_, format)| *format)
        .ok_or_else(|| ConfigError::UnknownName(name.to_string()))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn parse(name: &str, format: ConfigFormat, raw: &str) -> ConfigResult<Value> {
    let parse_error = |message: String| ConfigError::Parse {
        name: name.to_string(),
        message,
    };
    match format {
        ConfigFormat::Json => serde_json::from_str(raw).map_err(|e| parse_error(e.to_string())),
        ConfigFormat::Toml => {
            let value: toml::Value = toml::from_str(raw).map_err(|e| parse_error(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| parse_error(e.to_string()))
        }
        ConfigFormat::Yaml => {
            let value: serde_yaml::Value =
                serde_yaml::from_str(raw).map_err(|e| parse_error(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| parse_error(e.to_string()))
        }
        ConfigFormat::Text => Ok(Value::String(raw.trim().to_string())),
    }
}

fn render(name: &str, format: ConfigFormat, content: &Value) -> ConfigResult<String> {
    let render_error = |message: String| ConfigError::Parse {
        name: name.to_string(),
        message,
    };
    match format {
        ConfigFormat::Json => {
            serde_json::to_string_pretty(content).map_err(|e| render_error(e.to_string()))
        }
        ConfigFormat::Toml => {
            toml::to_string_pretty(content).map_err(|e| render_error(e.to_string()))
        }
        ConfigFormat::Yaml => serde_yaml::to_string(content).map_err(|e| render_error(e.to_string())),
        ConfigFormat::Text => Ok(match content {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        }),
    }
}

/// Replace the value at a dotted `field_path` inside `document`
fn set_field(document: &mut Value, field_path: &str, content: Value) -> ConfigResult<()> {
    let invalid = || ConfigError::InvalidFieldPath(field_path.to_string());
    let mut keys: Vec<&str> = field_path.split('.').collect();
    let last = keys.pop().filter(|k| !k.is_empty()).ok_or_else(invalid)?;

    let mut current = document;
    for key in keys {
        current = current
            .as_object_mut()
            .and_then(|map| map.get_mut(key))
            .ok_or_else(invalid)?;
    }
    current
        .as_object_mut()
        .ok_or_else(invalid)?
        .insert(last.to_string(), content);
    Ok(())
}

/// The shared configuration directory
pub struct ConfigFiles {
    dir: PathBuf,
}

impl ConfigFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_of(&self, name: &str) -> ConfigResult<(PathBuf, ConfigFormat)> {
        let format = format_of(name)?;
        Ok((self.dir.join(name), format))
    }

    /// Read and parse `name`
    pub fn read(&self, name: &str) -> ConfigResult<ConfigDocument> {
        let (path, format) = self.path_of(name)?;
        if !path.is_file() {
            return Err(ConfigError::NotFound(path));
        }
        let raw = fs::read_to_string(&path).map_err(io_error(&path))?;
        let content = parse(name, format, &raw)?;
        Ok(ConfigDocument {
            content,
            format,
            raw: (format != ConfigFormat::Text).then_some(raw),
        })
    }

    /// Write `content` to `name`, either as the whole document or at `field_path`
    pub fn write(
        &self,
        name: &str,
        content: Option<Value>,
        field_path: Option<&str>,
    ) -> ConfigResult<()> {
        let (path, format) = self.path_of(name)?;
        let content = content.ok_or(ConfigError::ContentRequired)?;

        let document = match field_path.filter(|p| !p.is_empty()) {
            Some(field_path) if format != ConfigFormat::Text => {
                let mut document = self.read(name)?.content;
                set_field(&mut document, field_path, content)?;
                document
            }
            _ => content,
        };

        let rendered = render(name, format, &document)?;
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        fs::write(&path, rendered).map_err(io_error(&path))?;
        info!("Saved config {}", name);
        Ok(())
    }
}
