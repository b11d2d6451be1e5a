use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CONFIG_PATH_ENV: &str = "EMOTE_WALL_CONFIG";

/// Where static (non-physics) emotes appear on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpawnArea {
    #[default]
    Random,
    Top,
    Bottom,
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Ceiling of simultaneously visible emotes.
    pub max_on_screen: usize,
    /// Global admissions per second; 0 disables the limit.
    pub max_per_second: u32,
    pub spam_filter_enabled: bool,
    pub spam_filter_ms: u64,
    /// Identical consecutive candidates required before one is shown; 0 disables combos.
    pub combo_requirement: u32,
    pub ignore_duplicates: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_on_screen: 50,
            max_per_second: 3,
            spam_filter_enabled: true,
            spam_filter_ms: 1_000,
            combo_requirement: 0,
            ignore_duplicates: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationWeights {
    pub float: f64,
    pub physics: f64,
    pub rain: f64,
}

impl Default for AnimationWeights {
    fn default() -> Self {
        Self {
            float: 1.0,
            physics: 0.0,
            rain: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FloatConfig {
    pub amplitude: f32,
    pub speed: f32,
}

impl Default for FloatConfig {
    fn default() -> Self {
        Self {
            amplitude: 20.0,
            speed: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Added to vertical velocity every frame (px/frame²).
    pub gravity: f32,
    /// Velocity multiplier applied on every wall contact, in `[0, 1)`.
    pub bounce_damping: f32,
    /// Post-bounce vertical speeds below this are zeroed.
    pub rest_threshold: f32,
    /// Initial upward speed (px/frame).
    pub launch_speed: f32,
    /// Width of the uniform horizontal launch velocity range (px/frame).
    pub horizontal_jitter: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 0.2,
            bounce_damping: 0.8,
            rest_threshold: 0.5,
            launch_speed: 5.0,
            horizontal_jitter: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RainConfig {
    /// Fall speed (px/frame).
    pub speed: f32,
    /// Base angle in degrees; 90 falls straight down.
    pub angle: f32,
    /// Maximum random deviation from `angle`, in degrees.
    pub angle_deviation: f32,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            speed: 2.0,
            angle: 90.0,
            angle_deviation: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnimationConfig {
    pub weights: AnimationWeights,
    pub float: FloatConfig,
    pub physics: PhysicsConfig,
    pub rain: RainConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    pub scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub random_scale: bool,
    pub spawn_area: SpawnArea,
    pub margin: f32,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            scale: 0.5,
            min_scale: 0.2,
            max_scale: 0.8,
            random_scale: true,
            spawn_area: SpawnArea::Random,
            margin: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub display_ms: u64,
    pub fade_in_ms: u64,
    pub fade_out_ms: u64,
    pub test_interval_ms: u64,
    /// Render tick rate of the headless frame loop.
    pub frame_rate: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            display_ms: 5_000,
            fade_in_ms: 300,
            fade_out_ms: 300,
            test_interval_ms: 500,
            frame_rate: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub seventv: bool,
    pub bttv: bool,
    pub ffz: bool,
    /// Native chat emotes carried in the `emotes` IRC tag.
    pub twitch: bool,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            seventv: true,
            bttv: true,
            ffz: true,
            twitch: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub nick: Option<String>,
    pub reconnect_delay_ms: u64,
    pub ignore_commands: bool,
    pub ignore_users: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "irc.chat.twitch.tv".to_owned(),
            port: 6667,
            nick: None,
            reconnect_delay_ms: 5_000,
            ignore_commands: false,
            ignore_users: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmoteWallConfig {
    pub channel: String,
    pub debug: bool,
    pub test_mode: bool,
    pub limits: LimitsConfig,
    pub timing: TimingConfig,
    pub appearance: AppearanceConfig,
    pub animation: AnimationConfig,
    pub providers: ProvidersConfig,
    pub chat: ChatConfig,
    pub viewport: ViewportConfig,
}

impl Default for EmoteWallConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            debug: true,
            test_mode: false,
            limits: LimitsConfig::default(),
            timing: TimingConfig::default(),
            appearance: AppearanceConfig::default(),
            animation: AnimationConfig::default(),
            providers: ProvidersConfig::default(),
            chat: ChatConfig::default(),
            viewport: ViewportConfig::default(),
        }
    }
}

impl EmoteWallConfig {
    pub fn load_or_create() -> Result<(Self, PathBuf)> {
        let config_path = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .context("unable to locate OS config directory")?
                .join("emote-wall")
                .join("config.json"),
        };
        let config = Self::load_or_create_at(&config_path)?;
        Ok((config, config_path))
    }

    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed creating config dir at {}", dir.display()))?;
            }
            let default = Self::default();
            default.save(path)?;
            return Ok(default);
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let config = serde_json::from_str::<Self>(&text)
            .with_context(|| format!("invalid json in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let payload = serde_json::to_string_pretty(self).context("failed serializing config")?;
        fs::write(path, payload).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(())
    }

    /// Rejects values the engine cannot run with. Suspicious but usable
    /// combinations are only logged.
    pub fn validate(&self) -> Result<()> {
        let weights = &self.animation.weights;
        for (kind, weight) in [
            ("float", weights.float),
            ("physics", weights.physics),
            ("rain", weights.rain),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                bail!("animation weight `{kind}` must be a finite non-negative number, got {weight}");
            }
        }

        let damping = self.animation.physics.bounce_damping;
        if !(0.0..1.0).contains(&damping) {
            bail!("bounce_damping must be in [0, 1), got {damping}");
        }
        if self.animation.physics.rest_threshold < 0.0 {
            bail!("rest_threshold must not be negative");
        }

        let appearance = &self.appearance;
        if appearance.min_scale <= 0.0 || appearance.max_scale <= 0.0 || appearance.scale <= 0.0 {
            bail!("emote scales must be positive");
        }
        if appearance.min_scale > appearance.max_scale {
            bail!(
                "min_scale ({}) is greater than max_scale ({})",
                appearance.min_scale,
                appearance.max_scale
            );
        }
        if appearance.margin < 0.0 {
            bail!("margin must not be negative");
        }

        if self.viewport.width <= 0.0 || self.viewport.height <= 0.0 {
            bail!(
                "viewport must have a positive size, got {}x{}",
                self.viewport.width,
                self.viewport.height
            );
        }
        if self.limits.max_on_screen == 0 {
            bail!("max_on_screen must be at least 1");
        }
        if self.timing.frame_rate == 0 || self.timing.test_interval_ms == 0 {
            bail!("frame_rate and test_interval_ms must be positive");
        }

        if self.limits.combo_requirement > 0 && self.limits.ignore_duplicates {
            warn!("combo_requirement and ignore_duplicates are both set; combo admissions will always be suppressed as duplicates");
        }
        if self.chat.enabled && self.channel.trim().is_empty() {
            warn!("chat is enabled but channel is empty; chat ingestion will not start");
        }
        Ok(())
    }
}
