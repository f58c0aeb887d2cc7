mod config;
mod interner;
mod log_files;

pub use config::{
    AnalysisProfile, AnalysisSettings, AnalyzerConfig, AnomalyThresholds, CustomRule,
    MAX_PROFILES,
};
pub use interner::{IStr, intern, resolve, empty_istr};
pub use log_files::{date_from_filename, expand_inputs, scan_directory};
