use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

pub const MAX_PROFILES: usize = 12;

// ────────────────────────────────────────────────────────────────────────────
// Settings
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for the moderation heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    /// Suicides inside one session before that session is flagged.
    pub suicides_per_session: u32,
    /// Suicide rate per played hour before that session is flagged.
    pub suicides_per_hour: f64,
    /// Gap between disconnect and the next connect treated as "rapid", in seconds.
    pub rapid_reconnect_secs: i64,
    /// Rapid reconnects before a player is flagged.
    pub rapid_reconnects: u32,
    /// Mean damage per hit before an attacker is flagged.
    pub avg_damage_per_hit: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            suicides_per_session: 5,
            suicides_per_hour: 3.0,
            rapid_reconnect_secs: 30,
            rapid_reconnects: 3,
            avg_damage_per_hit: 150.0,
        }
    }
}

/// A log pattern supplied through the config file rather than built in.
///
/// The fragment is matched after the standard `HH:MM:SS |` prefix. Capture
/// groups are positional: second group is read as a player name, third as an
/// id, and three consecutive float groups after that as a position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomRule {
    pub name: String,
    pub pattern: String,
}

/// Everything a profile snapshots: detection thresholds plus parser tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub thresholds: AnomalyThresholds,
    /// Ammo class fragments treated as melee. Used to recover a weapon name
    /// when a hit line carries an ammo class but no weapon.
    pub melee_ammo: Vec<String>,
    pub custom_rules: Vec<CustomRule>,
    /// Hotspot grid cell edge in world units.
    pub hotspot_grid: f64,
    /// Rows kept in the hotspot and most-active leaderboards.
    pub top_results: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            thresholds: AnomalyThresholds::default(),
            melee_ammo: default_melee_ammo(),
            custom_rules: Vec::new(),
            hotspot_grid: 500.0,
            top_results: 10,
        }
    }
}

fn default_melee_ammo() -> Vec<String> {
    [
        "MeleeFist",
        "MeleeAxe",
        "MeleeKnife",
        "MeleeBat",
        "MeleeShovel",
        "MeleeHammer",
        "MeleeMachete",
        "MeleePipe",
        "MeleeCrowbar",
        "MeleeSoft",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Profiles
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisProfile {
    pub name: String,
    pub settings: AnalysisSettings,
}

impl AnalysisProfile {
    pub fn new(name: String, settings: AnalysisSettings) -> Self {
        Self { name, settings }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Config root
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Directory scanned for `.ADM` files when the command line names none.
    pub log_directory: Option<PathBuf>,
    pub settings: AnalysisSettings,
    pub profiles: Vec<AnalysisProfile>,
    pub active_profile_name: Option<String>,
}

impl AnalyzerConfig {
    /// Load from the platform config dir, falling back to defaults. A missing
    /// file is the normal first run; a malformed one is reported and ignored.
    pub fn load() -> Self {
        confy::load("admiral", "config").unwrap_or_else(|err| {
            warn!("failed to load config, using defaults: {err}");
            Self::default()
        })
    }

    pub fn save(self) {
        confy::store("admiral", "config", self).expect("Failed to save configuration");
    }

    pub fn save_profile(&mut self, name: String) -> Result<(), &'static str> {
        // Existing profile with this name is updated in place
        if let Some(profile) = self.profiles.iter_mut().find(|p| p.name == name) {
            profile.settings = self.settings.clone();
            self.active_profile_name = Some(name);
            return Ok(());
        }

        if self.profiles.len() >= MAX_PROFILES {
            return Err("Maximum number of profiles reached (12)");
        }

        self.profiles
            .push(AnalysisProfile::new(name.clone(), self.settings.clone()));
        self.active_profile_name = Some(name);
        Ok(())
    }

    pub fn load_profile(&mut self, name: &str) -> Result<(), &'static str> {
        let profile = self
            .profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or("Profile not found")?;
        self.settings = profile.settings.clone();
        self.active_profile_name = Some(name.to_string());
        Ok(())
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<(), &'static str> {
        let index = self
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or("Profile not found")?;
        self.profiles.remove(index);
        if self.active_profile_name.as_deref() == Some(name) {
            self.active_profile_name = None;
        }
        Ok(())
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }
}
