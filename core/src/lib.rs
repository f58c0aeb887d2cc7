pub mod adm_log;
pub mod analysis;
pub mod anomaly;
pub mod combat;
pub mod context;
pub mod session;
pub mod stats;

// Re-exports for convenience
pub use adm_log::*;
pub use analysis::Analysis;
pub use anomaly::{AnomalyReport, DamageAnomaly, ReconnectAnomaly, SuicideAnomaly};
pub use combat::CombatCorrelator;
pub use context::{
    AnalysisProfile, AnalysisSettings, AnalyzerConfig, AnomalyThresholds, CustomRule, IStr,
    MAX_PROFILES, date_from_filename, expand_inputs, intern, resolve, scan_directory,
};
pub use session::{PlayerSession, SessionTracker};
pub use stats::{
    AnalysisReport, CombatStats, CombatantActivity, Hotspot, PlayerMetrics, WeaponMetrics,
    aggregate, combat_stats, player_metrics,
};
