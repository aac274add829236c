//! Per-user JSON config (§6: "a per-user config JSON is read and written
//! at start/end"), modeled the way `naive-client::project_config` loads
//! `naive.yaml` — a typed struct with `#[serde(default)]` fields — but
//! rooted at the OS user-config directory (`dirs::config_dir`) instead of
//! a project directory, and JSON instead of YAML per §6's literal format.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// `seed`: either the literal string `"TIME"` (resolve to the wall clock
/// at startup) or a fixed integer, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    Time,
    Fixed(u64),
}

impl Seed {
    /// Resolve to the `u64` the world's RNG is actually seeded with.
    pub fn resolve(self) -> u64 {
        match self {
            Seed::Fixed(n) => n,
            Seed::Time => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0),
        }
    }
}

impl Serialize for Seed {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Seed::Time => serializer.serialize_str("TIME"),
            Seed::Fixed(n) => serializer.serialize_u64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Str(s) if s.eq_ignore_ascii_case("time") => Ok(Seed::Time),
            Raw::Str(s) => s
                .parse()
                .map(Seed::Fixed)
                .map_err(|_| serde::de::Error::custom(format!("seed: not \"TIME\" or an integer: {s}"))),
            Raw::Num(n) => Ok(Seed::Fixed(n)),
        }
    }
}

fn default_seed() -> Seed {
    Seed::Time
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(rename = "windowWidth", default = "default_window_width")]
    pub window_width: u32,
    #[serde(rename = "windowHeight", default = "default_window_height")]
    pub window_height: u32,
    #[serde(rename = "screenWidth", default)]
    pub screen_width: u32,
    #[serde(rename = "screenHeight", default)]
    pub screen_height: u32,
    #[serde(default)]
    pub fullscreen: bool,
}

fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    720
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            screen_width: 0,
            screen_height: 0,
            fullscreen: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundConfig {
    #[serde(default)]
    pub device: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub speaker: String,
}

fn default_volume() -> f32 {
    1.0
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            volume: default_volume(),
            speaker: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(rename = "textureLod", default)]
    pub texture_lod: u32,
    #[serde(rename = "dynamicLoading", default = "default_true")]
    pub dynamic_loading: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            texture_lod: 0,
            dynamic_loading: true,
        }
    }
}

/// Top-level config document. Unknown keys are preserved round-trip
/// (`#[serde(flatten)]` into a `serde_json::Value` map) so a future engine
/// version does not clobber keys it does not understand, the same
/// forward-compatible spirit as the teacher's `#[serde(default)]` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub sound: SoundConfig,
    #[serde(default = "default_seed")]
    pub seed: Seed,
    #[serde(default)]
    pub lingua: String,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(flatten)]
    pub unknown: serde_json::Map<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            sound: SoundConfig::default(),
            seed: default_seed(),
            lingua: String::new(),
            context: ContextConfig::default(),
            unknown: serde_json::Map::new(),
        }
    }
}

/// The user config directory this engine's config and log file live
/// under: `$XDG_CONFIG_HOME/openzone` (or the platform equivalent via
/// `dirs::config_dir`).
pub fn config_dir() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("openzone"))
        .ok_or_else(|| anyhow::anyhow!("no user config directory on this platform"))
}

fn config_path(dir: &Path) -> PathBuf {
    dir.join("openzone.json")
}

/// Load the config from `dir`, or a default one if the file does not
/// exist yet (first run).
pub fn load(dir: &Path) -> anyhow::Result<Config> {
    let path = config_path(dir);
    match fs::read_to_string(&path) {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(e.into()),
    }
}

/// Write the config back to `dir`, creating it if missing (§6: "read and
/// written at start/end").
pub fn save(dir: &Path, config: &Config) -> anyhow::Result<()> {
    fs::create_dir_all(dir)?;
    let text = serde_json::to_string_pretty(config)?;
    fs::write(config_path(dir), text)?;
    Ok(())
}
