//! End-to-end pipeline: expand inputs, parse each file in parallel, then
//! replay events in file order so session state and kill correlation carry
//! across rotated logs.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use tracing::{error, info};

use crate::adm_log::{ParseSummary, PatternRegistry, PlayerEvent, read_log_file};
use crate::anomaly;
use crate::combat::CombatCorrelator;
use crate::context::{AnalyzerConfig, expand_inputs};
use crate::session::SessionTracker;
use crate::stats::{AnalysisReport, aggregate};

pub struct Analysis {
    config: AnalyzerConfig,
    registry: PatternRegistry,
    since: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
}

impl Analysis {
    pub fn new(config: AnalyzerConfig) -> Self {
        let registry = PatternRegistry::with_custom_rules(&config.settings.custom_rules);
        Self {
            config,
            registry,
            since: None,
            until: None,
        }
    }

    /// Restrict the run to events inside the given bounds. Out-of-range
    /// lines still parse, they just never reach the report.
    pub fn with_range(
        mut self,
        since: Option<NaiveDateTime>,
        until: Option<NaiveDateTime>,
    ) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn run(&self, inputs: &[PathBuf]) -> AnalysisReport {
        let files = expand_inputs(inputs);
        info!("analyzing {} log file(s)", files.len());

        // Files parse independently; the indexed collect restores rotation
        // order before the stateful fold below runs.
        let parsed: Vec<_> = files
            .par_iter()
            .map(|path| {
                read_log_file(
                    path,
                    &self.registry,
                    &self.config.settings.melee_ammo,
                    self.since,
                    self.until,
                )
            })
            .collect();

        let mut summary = ParseSummary::default();
        let mut tracker = SessionTracker::new();
        let mut correlator = CombatCorrelator::new();
        let mut events: Vec<PlayerEvent> = Vec::new();
        let mut last_seen: Option<NaiveDateTime> = None;

        for (path, outcome) in files.iter().zip(parsed) {
            match outcome {
                Ok(parse) => {
                    for event in parse.events {
                        tracker.observe(&event);
                        correlator.observe(&event);
                        last_seen = Some(match last_seen {
                            Some(seen) => seen.max(event.timestamp),
                            None => event.timestamp,
                        });
                        events.push(event);
                    }
                    summary.merge(parse.summary);
                }
                Err(err) => {
                    error!("skipping {}: {err}", path.display());
                    summary.files_failed += 1;
                }
            }
        }

        let sessions = tracker.finish(last_seen);
        let records = correlator.finish();
        let anomalies = anomaly::detect(
            &sessions,
            &events,
            &records,
            &self.config.settings.thresholds,
        );
        aggregate(
            &sessions,
            &events,
            &records,
            summary,
            anomalies,
            &self.config.settings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn write_log(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn run(inputs: &[PathBuf]) -> AnalysisReport {
        Analysis::new(AnalyzerConfig::default()).run(inputs)
    }

    #[test]
    fn sessions_and_kills_carry_across_rotated_files() {
        let dir = TempDir::new().unwrap();
        let first = write_log(
            &dir,
            "DayZServer_X1_x64_2024-03-01_10-00-00.ADM",
            concat!(
                "AdminLog started on 2024-03-01 at 10:00:00\n",
                "10:00:05 | Player \"Rook\" (id=AA11) is connected\n",
                "10:00:06 | Player \"Dana\" (id=BB22) is connected\n",
                "10:15:00 | Player \"Dana\" (id=BB22 pos=<500.0, 600.0, 10.0>) [HP: 55.0] hit by Player \"Rook\" (id=AA11 pos=<520.0, 610.0, 10.0>) into Torso(5) for 45.0 damage (Bullet_556x45) with M4A1 from 25.5 meters\n",
                "10:15:00 | Player \"Dana\" (DEAD) (id=BB22 pos=<500.0, 600.0, 10.0>) killed by Player \"Rook\" (id=AA11 pos=<520.0, 610.0, 10.0>) with M4A1 from 25.5 meters\n",
            ),
        );
        let second = write_log(
            &dir,
            "DayZServer_X1_x64_2024-03-01_11-00-00.ADM",
            concat!(
                "AdminLog started on 2024-03-01 at 11:00:00\n",
                "11:30:05 | Player \"Rook\" (id=AA11) has been disconnected\n",
                "11:30:06 | Player \"Dana\" (id=BB22) has been disconnected\n",
            ),
        );

        let report = run(&[first, second]);

        assert_eq!(report.summary.files_parsed, 2);
        assert_eq!(report.summary.files_failed, 0);
        assert_eq!(report.players.len(), 2);

        // Connected in the first file, disconnected in the second: one session
        let rook = &report.players["AA11"];
        assert_eq!(rook.name, "Rook");
        assert_eq!(rook.sessions, 1);
        assert_eq!(rook.total_playtime_hours, 1.5);
        assert_eq!(rook.kills, 1);
        assert_eq!(rook.hits_dealt, 1);
        assert_eq!(rook.damage_dealt, 45.0);
        assert_eq!(rook.kd_ratio, 1.0);

        let dana = &report.players["BB22"];
        assert_eq!(dana.deaths_by_player, 1);
        assert_eq!(dana.hits_taken, 1);

        // Same-second hit and kill fold into one record
        assert_eq!(report.combat.total_events, 1);
        assert_eq!(report.combat.total_kills, 1);
        assert_eq!(report.combat.weapon_usage["M4A1"], 1);
    }

    #[test]
    fn midnight_rollover_spans_the_session() {
        let dir = TempDir::new().unwrap();
        let log = write_log(
            &dir,
            "DayZServer_X1_x64_2024-03-01_23-50-00.ADM",
            concat!(
                "AdminLog started on 2024-03-01 at 23:50:00\n",
                "23:50:10 | Player \"Owl\" (id=CC33) is connected\n",
                "00:10:10 | Player \"Owl\" (id=CC33) has been disconnected\n",
            ),
        );

        let report = run(&[log]);

        let owl = &report.players["CC33"];
        assert_eq!(owl.sessions, 1);
        assert_eq!(owl.avg_session_minutes, 20.0);
        assert_eq!(
            report.summary.end_time.map(|t| t.date()),
            NaiveDate::from_ymd_opt(2024, 3, 2)
        );
    }

    #[test]
    fn unreadable_file_is_reported_without_aborting_the_batch() {
        let dir = TempDir::new().unwrap();
        let good = write_log(
            &dir,
            "DayZServer_X1_x64_2024-03-01_10-00-00.ADM",
            concat!(
                "AdminLog started on 2024-03-01 at 10:00:00\n",
                "10:00:05 | Player \"Rook\" (id=AA11) is connected\n",
            ),
        );
        let missing = dir.path().join("not_there.ADM");

        let report = run(&[good, missing]);

        assert_eq!(report.summary.files_parsed, 1);
        assert_eq!(report.summary.files_failed, 1);
        assert!(report.players.contains_key("AA11"));
    }

    #[test]
    fn range_bounds_drop_events_from_the_report() {
        let dir = TempDir::new().unwrap();
        let log = write_log(
            &dir,
            "DayZServer_X1_x64_2024-03-01_10-00-00.ADM",
            concat!(
                "AdminLog started on 2024-03-01 at 10:00:00\n",
                "10:00:05 | Player \"Rook\" (id=AA11) is connected\n",
                "10:30:00 | Player \"Rook\" (id=AA11) has been disconnected\n",
                "11:00:00 | Player \"Late\" (id=DD44) is connected\n",
            ),
        );

        let until = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 45, 0);
        let report = Analysis::new(AnalyzerConfig::default())
            .with_range(None, until)
            .run(&[log]);

        assert!(report.players.contains_key("AA11"));
        assert!(!report.players.contains_key("DD44"));
        assert_eq!(report.summary.filtered_events, 1);
    }
}
