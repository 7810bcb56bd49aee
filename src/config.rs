use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use log::*;
use serde::{Deserialize, Serialize};

use crate::util::{manifest_path, resolve_path};

/// env var that overrides the config file location
pub const CONFIG_PATH_VAR: &str = "QUAD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub renderer: RendererSettings,
    /// sleep between frames, about 60 fps by default
    pub frame_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            renderer: RendererSettings::default(),
            frame_delay_ms: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Tutorial".to_string(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// None means 'on in debug builds'
    pub validation: Option<bool>,
    pub prefer_mailbox: bool,
    pub clear_color: [f32; 4],
    /// None uses a generated checkerboard
    pub texture: Option<PathBuf>,
    /// None uses shaders/compiled under the manifest dir
    pub shaders_dir: Option<PathBuf>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            validation: None,
            prefer_mailbox: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            texture: None,
            shaders_dir: None,
        }
    }
}

impl RendererSettings {
    pub fn validation_enabled(&self) -> bool {
        self.validation.unwrap_or(cfg!(debug_assertions))
    }

    /// the directory holding the compiled .spv files
    pub fn shaders_dir(&self) -> PathBuf {
        match &self.shaders_dir {
            Some(dir) => resolve_path(dir),
            None => manifest_path(["shaders", "compiled"]),
        }
    }
}

impl Config {
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// A missing file is not an error; defaults are used instead.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("no config at {path:?}, using defaults");
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path:?}"))?;
        let config =
            Self::from_json(&json).with_context(|| format!("failed to parse config: {path:?}"))?;
        debug!("loaded config from {path:?}: {config:?}");

        Ok(config)
    }

    pub fn load_default_location() -> anyhow::Result<Self> {
        Self::load(&default_config_path())
    }
}

pub fn default_config_path() -> PathBuf {
    match std::env::var_os(CONFIG_PATH_VAR) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => manifest_path(["config.json"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_all_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let json = r#"{ "window": { "width": 1024 }, "renderer": { "prefer_mailbox": false } }"#;
        let config = Config::from_json(json).unwrap();

        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Vulkan Tutorial");
        assert!(!config.renderer.prefer_mailbox);
        assert_eq!(config.frame_delay(), Duration::from_millis(15));
    }

    #[test]
    fn explicit_validation_overrides_build_profile() {
        let mut settings = RendererSettings::default();
        assert_eq!(settings.validation_enabled(), cfg!(debug_assertions));

        settings.validation = Some(false);
        assert!(!settings.validation_enabled());
        settings.validation = Some(true);
        assert!(settings.validation_enabled());
    }

    #[test]
    fn shaders_dir_defaults_to_compiled_under_the_manifest() {
        let mut settings = RendererSettings::default();
        assert_eq!(settings.shaders_dir(), manifest_path(["shaders", "compiled"]));

        settings.shaders_dir = Some(PathBuf::from("/opt/quad/spv"));
        assert_eq!(settings.shaders_dir(), PathBuf::from("/opt/quad/spv"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Config::from_json(r#"{ "window": { "width": "wide" } }"#).is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join(format!("quad-config-{}.json", std::process::id()));
        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_on_disk_is_parsed() {
        let path = std::env::temp_dir().join(format!(
            "quad-config-on-disk-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{ "frame_delay_ms": 8, "renderer": { "texture": "a.png" } }"#)
            .unwrap();

        let config = Config::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.frame_delay_ms, 8);
        assert_eq!(config.renderer.texture, Some(PathBuf::from("a.png")));
    }

    #[test]
    fn default_config_shape() {
        let json = serde_json::to_string_pretty(&Config::default()).unwrap();
        insta::assert_snapshot!(json, @r#"
        {
          "window": {
            "title": "Vulkan Tutorial",
            "width": 800,
            "height": 600
          },
          "renderer": {
            "validation": null,
            "prefer_mailbox": true,
            "clear_color": [
              0.0,
              0.0,
              0.0,
              1.0
            ],
            "texture": null,
            "shaders_dir": null
          },
          "frame_delay_ms": 15
        }
        "#);
    }
}
