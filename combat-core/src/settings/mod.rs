//! Combat settings: the single source of every timing and ratio constant.
//!
//! Every consumer (state machine, defense tracker, arbitrators, the network
//! authority, debug displays) reads values through a [`SettingsHandle`].
//! Nothing keeps its own copy of a window length, so the parry window used
//! by local play and by the server can never drift apart.
//!
//! Settings load from JSON or RON (chosen by file extension) and are
//! validated before they become visible. See [`hotreload`] for live reload.

pub mod hotreload;

use std::path::Path;
use std::sync::Arc;

use bevy::prelude::*;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("unsupported settings format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// All tunable combat constants. Times are seconds, ratios are `0.0..=1.0`
/// unless stated otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatSettings {
    // --- parry ---
    pub parry_window: f32,
    /// Grace added to the parry window for input jitter
    pub parry_buffer: f32,
    pub parry_stamina_cost: f32,
    /// How long a successful parry lets the defender riposte
    pub counter_window: f32,
    pub parry_hitstop_scale: f32,
    pub parry_hitstop_duration: f32,

    // --- dodge ---
    pub dodge_duration: f32,
    pub dodge_distance: f32,
    pub dodge_stamina_cost: f32,
    /// Offset from dodge start at which invincibility begins
    pub iframe_start: f32,
    pub iframe_duration: f32,
    /// Sub-window at the start of the i-frames that counts as a perfect dodge
    pub perfect_dodge_window: f32,
    /// Dodging may be cancelled into an attack
    pub allow_dodge_attack: bool,

    // --- block / guard-break ---
    pub block_damage_reduction: f32,
    /// Stamina lost per point of blocked damage (may exceed 1.0)
    pub guard_stamina_damage_ratio: f32,
    pub block_poise_cost: f32,
    pub guard_break_stagger_duration: f32,
    pub guard_break_invincibility: f32,
    pub guard_recovery_duration: f32,

    // --- input ---
    pub input_buffer_duration: f32,

    // --- attacks / combo ---
    pub light_attack_stamina_cost: f32,
    pub heavy_attack_stamina_cost: f32,
    pub special_attack_stamina_cost: f32,
    pub default_max_combo: u32,
    pub combo_reset_duration: f32,
    /// Per-combo-step damage bonus: final = 1.0 + (index - 1) * step
    pub combo_damage_step: f32,
    pub windup_end_fraction: f32,
    pub active_end_fraction: f32,
    pub recovery_end_fraction: f32,
    /// A new attack may restart the current swing from any phase. Off, an
    /// attack chains only from ComboWindow.
    pub allow_swing_restart: bool,

    // --- angles / criticals ---
    pub front_damage_multiplier: f32,
    pub side_damage_multiplier: f32,
    pub back_damage_multiplier: f32,
    pub critical_damage_multiplier: f32,
    pub critical_range: f32,

    // --- poise ---
    pub hyper_armor_poise_reduction: f32,
    pub flinch_threshold: f32,
    pub stagger_threshold: f32,
    pub heavy_stagger_threshold: f32,
    pub knockback_threshold: f32,
    pub knockdown_threshold: f32,
    pub poise_regen_delay: f32,
    pub poise_regen_rate: f32,

    // --- reactions ---
    pub stagger_duration: f32,
    pub heavy_stagger_duration: f32,
    pub knockback_duration: f32,
    pub knockdown_duration: f32,
    pub recovering_duration: f32,

    // --- stamina ---
    pub stamina_regen_rate: f32,
    pub stamina_regen_delay: f32,

    // --- safety ---
    /// A state active longer than `nominal * ceiling` is force-reset
    pub state_ceiling_multiplier: f32,

    // --- network authority ---
    /// Extra parry time the server grants to cover client round-trip
    pub network_latency_allowance: f32,
    pub attack_cooldown: f32,
    pub dodge_cooldown: f32,
    pub parry_cooldown: f32,
    pub hit_delay_light: f32,
    pub hit_delay_heavy: f32,
    pub hit_delay_special: f32,
}

impl Default for CombatSettings {
    fn default() -> Self {
        Self {
            parry_window: 0.18,
            parry_buffer: 0.02,
            parry_stamina_cost: 10.0,
            counter_window: 1.0,
            parry_hitstop_scale: 0.2,
            parry_hitstop_duration: 0.25,

            dodge_duration: 0.5,
            dodge_distance: 4.0,
            dodge_stamina_cost: 25.0,
            iframe_start: 0.05,
            iframe_duration: 0.25,
            perfect_dodge_window: 0.08,
            allow_dodge_attack: true,

            block_damage_reduction: 0.7,
            guard_stamina_damage_ratio: 1.5,
            block_poise_cost: 10.0,
            guard_break_stagger_duration: 1.5,
            guard_break_invincibility: 0.3,
            guard_recovery_duration: 0.5,

            input_buffer_duration: 0.15,

            light_attack_stamina_cost: 15.0,
            heavy_attack_stamina_cost: 30.0,
            special_attack_stamina_cost: 40.0,
            default_max_combo: 3,
            combo_reset_duration: 1.2,
            combo_damage_step: 0.15,
            windup_end_fraction: 0.3,
            active_end_fraction: 0.5,
            recovery_end_fraction: 0.8,
            allow_swing_restart: false,

            front_damage_multiplier: 1.0,
            side_damage_multiplier: 1.15,
            back_damage_multiplier: 1.4,
            critical_damage_multiplier: 2.5,
            critical_range: 2.0,

            hyper_armor_poise_reduction: 0.5,
            flinch_threshold: 0.1,
            stagger_threshold: 0.25,
            heavy_stagger_threshold: 0.45,
            knockback_threshold: 0.65,
            knockdown_threshold: 0.85,
            poise_regen_delay: 2.0,
            poise_regen_rate: 20.0,

            stagger_duration: 0.6,
            heavy_stagger_duration: 1.0,
            knockback_duration: 1.2,
            knockdown_duration: 2.0,
            recovering_duration: 0.4,

            stamina_regen_rate: 20.0,
            stamina_regen_delay: 0.8,

            state_ceiling_multiplier: 2.0,

            network_latency_allowance: 0.12,
            attack_cooldown: 0.05,
            dodge_cooldown: 0.3,
            parry_cooldown: 0.4,
            hit_delay_light: 0.15,
            hit_delay_heavy: 0.35,
            hit_delay_special: 0.45,
        }
    }
}

impl CombatSettings {
    /// Key/value access for collaborators that only know setting names.
    /// Booleans read as `1.0` / `0.0`.
    pub fn get(&self, key: &str) -> Option<f32> {
        let value = match key {
            "parry_window" => self.parry_window,
            "parry_buffer" => self.parry_buffer,
            "parry_stamina_cost" => self.parry_stamina_cost,
            "counter_window" => self.counter_window,
            "parry_hitstop_scale" => self.parry_hitstop_scale,
            "parry_hitstop_duration" => self.parry_hitstop_duration,
            "dodge_duration" => self.dodge_duration,
            "dodge_distance" => self.dodge_distance,
            "dodge_stamina_cost" => self.dodge_stamina_cost,
            "iframe_start" => self.iframe_start,
            "iframe_duration" => self.iframe_duration,
            "perfect_dodge_window" => self.perfect_dodge_window,
            "allow_dodge_attack" => f32::from(u8::from(self.allow_dodge_attack)),
            "allow_swing_restart" => f32::from(u8::from(self.allow_swing_restart)),
            "block_damage_reduction" => self.block_damage_reduction,
            "guard_stamina_damage_ratio" => self.guard_stamina_damage_ratio,
            "block_poise_cost" => self.block_poise_cost,
            "guard_break_stagger_duration" => self.guard_break_stagger_duration,
            "guard_break_invincibility" => self.guard_break_invincibility,
            "guard_recovery_duration" => self.guard_recovery_duration,
            "input_buffer_duration" => self.input_buffer_duration,
            "light_attack_stamina_cost" => self.light_attack_stamina_cost,
            "heavy_attack_stamina_cost" => self.heavy_attack_stamina_cost,
            "special_attack_stamina_cost" => self.special_attack_stamina_cost,
            "default_max_combo" => self.default_max_combo as f32,
            "combo_reset_duration" => self.combo_reset_duration,
            "combo_damage_step" => self.combo_damage_step,
            "windup_end_fraction" => self.windup_end_fraction,
            "active_end_fraction" => self.active_end_fraction,
            "recovery_end_fraction" => self.recovery_end_fraction,
            "front_damage_multiplier" => self.front_damage_multiplier,
            "side_damage_multiplier" => self.side_damage_multiplier,
            "back_damage_multiplier" => self.back_damage_multiplier,
            "critical_damage_multiplier" => self.critical_damage_multiplier,
            "critical_range" => self.critical_range,
            "hyper_armor_poise_reduction" => self.hyper_armor_poise_reduction,
            "flinch_threshold" => self.flinch_threshold,
            "stagger_threshold" => self.stagger_threshold,
            "heavy_stagger_threshold" => self.heavy_stagger_threshold,
            "knockback_threshold" => self.knockback_threshold,
            "knockdown_threshold" => self.knockdown_threshold,
            "poise_regen_delay" => self.poise_regen_delay,
            "poise_regen_rate" => self.poise_regen_rate,
            "stagger_duration" => self.stagger_duration,
            "heavy_stagger_duration" => self.heavy_stagger_duration,
            "knockback_duration" => self.knockback_duration,
            "knockdown_duration" => self.knockdown_duration,
            "recovering_duration" => self.recovering_duration,
            "stamina_regen_rate" => self.stamina_regen_rate,
            "stamina_regen_delay" => self.stamina_regen_delay,
            "state_ceiling_multiplier" => self.state_ceiling_multiplier,
            "network_latency_allowance" => self.network_latency_allowance,
            "attack_cooldown" => self.attack_cooldown,
            "dodge_cooldown" => self.dodge_cooldown,
            "parry_cooldown" => self.parry_cooldown,
            "hit_delay_light" => self.hit_delay_light,
            "hit_delay_heavy" => self.hit_delay_heavy,
            "hit_delay_special" => self.hit_delay_special,
            _ => return None,
        };
        Some(value)
    }

    /// Full parry window as seen by a local defender (no latency allowance).
    pub fn effective_parry_window(&self) -> f32 {
        self.parry_window + self.parry_buffer
    }

    /// Check internal consistency. Called before any settings become visible.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let positive = [
            ("parry_window", self.parry_window),
            ("counter_window", self.counter_window),
            ("dodge_duration", self.dodge_duration),
            ("iframe_duration", self.iframe_duration),
            ("guard_break_stagger_duration", self.guard_break_stagger_duration),
            ("guard_recovery_duration", self.guard_recovery_duration),
            ("combo_reset_duration", self.combo_reset_duration),
            ("stagger_duration", self.stagger_duration),
            ("heavy_stagger_duration", self.heavy_stagger_duration),
            ("knockback_duration", self.knockback_duration),
            ("knockdown_duration", self.knockdown_duration),
            ("recovering_duration", self.recovering_duration),
            ("state_ceiling_multiplier", self.state_ceiling_multiplier),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SettingsError::Invalid {
                    key,
                    reason: format!("must be a positive duration, got {value}"),
                });
            }
        }

        let non_negative = [
            ("parry_buffer", self.parry_buffer),
            ("parry_stamina_cost", self.parry_stamina_cost),
            ("dodge_distance", self.dodge_distance),
            ("dodge_stamina_cost", self.dodge_stamina_cost),
            ("iframe_start", self.iframe_start),
            ("perfect_dodge_window", self.perfect_dodge_window),
            ("guard_stamina_damage_ratio", self.guard_stamina_damage_ratio),
            ("block_poise_cost", self.block_poise_cost),
            ("guard_break_invincibility", self.guard_break_invincibility),
            ("input_buffer_duration", self.input_buffer_duration),
            ("light_attack_stamina_cost", self.light_attack_stamina_cost),
            ("heavy_attack_stamina_cost", self.heavy_attack_stamina_cost),
            ("special_attack_stamina_cost", self.special_attack_stamina_cost),
            ("poise_regen_delay", self.poise_regen_delay),
            ("poise_regen_rate", self.poise_regen_rate),
            ("stamina_regen_rate", self.stamina_regen_rate),
            ("stamina_regen_delay", self.stamina_regen_delay),
            ("network_latency_allowance", self.network_latency_allowance),
            ("attack_cooldown", self.attack_cooldown),
            ("dodge_cooldown", self.dodge_cooldown),
            ("parry_cooldown", self.parry_cooldown),
            ("hit_delay_light", self.hit_delay_light),
            ("hit_delay_heavy", self.hit_delay_heavy),
            ("hit_delay_special", self.hit_delay_special),
            ("critical_range", self.critical_range),
        ];
        for (key, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SettingsError::Invalid {
                    key,
                    reason: format!("must be >= 0, got {value}"),
                });
            }
        }

        let ratios = [
            ("block_damage_reduction", self.block_damage_reduction),
            ("hyper_armor_poise_reduction", self.hyper_armor_poise_reduction),
        ];
        for (key, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(SettingsError::Invalid {
                    key,
                    reason: format!("must be within [0, 1], got {value}"),
                });
            }
        }

        let thresholds = [
            ("flinch_threshold", self.flinch_threshold),
            ("stagger_threshold", self.stagger_threshold),
            ("heavy_stagger_threshold", self.heavy_stagger_threshold),
            ("knockback_threshold", self.knockback_threshold),
            ("knockdown_threshold", self.knockdown_threshold),
        ];
        for pair in thresholds.windows(2) {
            let (lower_key, lower) = pair[0];
            let (key, value) = pair[1];
            if value <= lower {
                return Err(SettingsError::Invalid {
                    key,
                    reason: format!("must be greater than {lower_key} ({lower}), got {value}"),
                });
            }
        }

        if !(0.0 < self.windup_end_fraction
            && self.windup_end_fraction < self.active_end_fraction
            && self.active_end_fraction < self.recovery_end_fraction
            && self.recovery_end_fraction < 1.0)
        {
            return Err(SettingsError::Invalid {
                key: "windup_end_fraction",
                reason: "phase fractions must be strictly ascending inside (0, 1)".into(),
            });
        }

        if self.perfect_dodge_window > self.iframe_duration {
            return Err(SettingsError::Invalid {
                key: "perfect_dodge_window",
                reason: "must not exceed iframe_duration".into(),
            });
        }

        if self.iframe_start + self.iframe_duration > self.dodge_duration {
            return Err(SettingsError::Invalid {
                key: "iframe_duration",
                reason: "i-frames must end before the dodge does".into(),
            });
        }

        if self.default_max_combo == 0 {
            return Err(SettingsError::Invalid {
                key: "default_max_combo",
                reason: "must be at least 1".into(),
            });
        }

        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_ron_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = ron::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a `.json` or `.ron` file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("ron") => Self::from_ron_str(&content),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Shared, swappable view of the current settings.
///
/// Cloning the handle shares the same underlying value; a reload through
/// [`SettingsHandle::replace`] is seen by every holder on its next read.
#[derive(Resource, Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Arc<CombatSettings>>>,
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(CombatSettings::default())
    }
}

impl SettingsHandle {
    pub fn new(settings: CombatSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// Snapshot of the settings in effect right now.
    pub fn current(&self) -> Arc<CombatSettings> {
        self.inner.read().clone()
    }

    /// Validate and publish new settings. Invalid settings are rejected and
    /// the previous value stays in effect.
    pub fn replace(&self, settings: CombatSettings) -> Result<(), SettingsError> {
        settings.validate()?;
        *self.inner.write() = Arc::new(settings);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.inner.read().get(key)
    }

    /// True if both handles point at the same provider.
    pub fn same_provider(&self, other: &SettingsHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
