// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::queue_family::QueueWeights;
use crate::backend::swapchain::SwapchainPreferences;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub queues: QueuesConfig,
    pub shaders: ShadersConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vk-frameloop".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Low-latency mode to prefer; FIFO is the fallback.
    pub present_mode: String,
    pub surface_format: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            surface_format: "b8g8r8a8_srgb".to_string(),
            clear_color: [0.1, 0.2, 0.8, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Scheduler priority hints for the secondary queue roles
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub transfer_weight: f32,
    pub compute_weight: f32,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            transfer_weight: 0.5,
            compute_weight: 0.5,
        }
    }
}

/// Where to find compiled SPIR-V
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShadersConfig {
    /// Searched in order; the first directory holding the file wins.
    pub search_dirs: Vec<PathBuf>,
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShadersConfig {
    fn default() -> Self {
        Self {
            search_dirs: vec![PathBuf::from("shaders"), PathBuf::from("assets/shaders")],
            vertex: "triangle.vert.spv".to_string(),
            fragment: "triangle.frag.spv".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honoured in debug builds.
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        let format = match self.graphics.surface_format.to_lowercase().as_str() {
            "b8g8r8a8_srgb" => vk::Format::B8G8R8A8_SRGB,
            "r8g8b8a8_srgb" => vk::Format::R8G8B8A8_SRGB,
            "b8g8r8a8_unorm" => vk::Format::B8G8R8A8_UNORM,
            "r8g8b8a8_unorm" => vk::Format::R8G8B8A8_UNORM,
            _ => {
                log::warn!(
                    "Unknown surface format '{}', defaulting to B8G8R8A8_SRGB",
                    self.graphics.surface_format
                );
                vk::Format::B8G8R8A8_SRGB
            }
        };
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    pub fn swapchain_preferences(&self) -> SwapchainPreferences {
        SwapchainPreferences {
            surface_format: self.surface_format(),
            present_mode: self.present_mode(),
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.graphics.max_frames_in_flight.max(1)
    }

    /// Role weights with transfer and compute kept within [0.5, 0.75].
    pub fn queue_weights(&self) -> QueueWeights {
        let clamp = |weight: f32| {
            if weight.is_nan() {
                0.5
            } else {
                weight.clamp(0.5, 0.75)
            }
        };
        QueueWeights {
            transfer: clamp(self.queues.transfer_weight),
            compute: clamp(self.queues.compute_weight),
            ..QueueWeights::default()
        }
    }

    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', using info", self.debug.log_level);
            log::LevelFilter::Info
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.frames_in_flight(), 2);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.shaders.search_dirs.len(), 2);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            present_mode = "immediate"

            [shaders]
            search_dirs = ["build/spv", "shaders"]
            "#,
        )
        .unwrap();

        assert_eq!(config.present_mode(), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(
            config.shaders.search_dirs,
            vec![PathBuf::from("build/spv"), PathBuf::from("shaders")]
        );
        assert_eq!(config.shaders.vertex, "triangle.vert.spv");
    }

    #[test]
    fn frames_in_flight_is_at_least_one() {
        let config: Config = toml::from_str("[graphics]\nmax_frames_in_flight = 0").unwrap();
        assert_eq!(config.frames_in_flight(), 1);
    }

    #[test]
    fn queue_weights_are_clamped() {
        let config: Config =
            toml::from_str("[queues]\ntransfer_weight = 2.0\ncompute_weight = 0.1").unwrap();
        let weights = config.queue_weights();
        assert_eq!(weights.transfer, 0.75);
        assert_eq!(weights.compute, 0.5);
        assert_eq!(weights.graphics, 1.0);
        assert_eq!(weights.present, 0.25);
    }

    #[test]
    fn unknown_names_fall_back() {
        let config: Config = toml::from_str(
            "[graphics]\npresent_mode = \"sometimes\"\nsurface_format = \"rgb565\"\n[debug]\nlog_level = \"loud\"",
        )
        .unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.surface_format().format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn malformed_file_is_an_error_from_load_from_path() {
        let path = std::env::temp_dir().join(format!("vk-frameloop-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[window\nwidth = ").unwrap();
        assert!(Config::load_from_path(&path).is_err());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("definitely/not/here.toml").unwrap();
        assert_eq!(config.window.title, "vk-frameloop");
    }
}
