//! Flags suspicious player behavior after a run: suicide spam, reconnect
//! cycling and implausible damage output.
//!
//! Detectors are independent passes; one coming up empty never stops the
//! others. Thresholds come from the config so server owners can tune them.

use chrono::NaiveDateTime;
use hashbrown::HashMap;
use serde::Serialize;

use crate::adm_log::{CombatRecord, EventKind, PlayerEvent};
use crate::context::{AnomalyThresholds, IStr, resolve};
use crate::session::PlayerSession;

#[derive(Debug, Default, Serialize)]
pub struct AnomalyReport {
    pub excessive_suicides: Vec<SuicideAnomaly>,
    pub rapid_reconnects: Vec<ReconnectAnomaly>,
    pub high_damage_dealers: Vec<DamageAnomaly>,
}

/// One session in which a player killed themselves suspiciously often.
#[derive(Debug, Serialize)]
pub struct SuicideAnomaly {
    pub player_id: String,
    pub player_name: String,
    pub session_start: NaiveDateTime,
    pub suicides: u64,
    pub per_hour: f64,
}

/// A player cycling connects and disconnects faster than a loading screen.
#[derive(Debug, Serialize)]
pub struct ReconnectAnomaly {
    pub player_id: String,
    pub player_name: String,
    pub rapid_reconnects: u64,
    pub sessions: u64,
}

#[derive(Debug, Serialize)]
pub struct DamageAnomaly {
    pub player_id: String,
    pub player_name: String,
    pub hits: u64,
    pub average_damage: f64,
}

pub fn detect(
    sessions: &HashMap<IStr, Vec<PlayerSession>>,
    events: &[PlayerEvent],
    records: &[CombatRecord],
    thresholds: &AnomalyThresholds,
) -> AnomalyReport {
    let mut report = AnomalyReport {
        excessive_suicides: excessive_suicides(sessions, events, thresholds),
        rapid_reconnects: rapid_reconnects(sessions, thresholds),
        high_damage_dealers: high_damage_dealers(records, thresholds),
    };

    // Map iteration order is arbitrary; sort for stable reports
    report
        .excessive_suicides
        .sort_by(|a, b| (&a.player_id, a.session_start).cmp(&(&b.player_id, b.session_start)));
    report.rapid_reconnects.sort_by(|a, b| a.player_id.cmp(&b.player_id));
    report
        .high_damage_dealers
        .sort_by(|a, b| a.player_id.cmp(&b.player_id));
    report
}

/// Flags a session when the absolute suicide count is exceeded, or when the
/// session lasted long enough to rate them and the hourly rate is exceeded.
fn excessive_suicides(
    sessions: &HashMap<IStr, Vec<PlayerSession>>,
    events: &[PlayerEvent],
    thresholds: &AnomalyThresholds,
) -> Vec<SuicideAnomaly> {
    let mut suicides: HashMap<IStr, Vec<NaiveDateTime>> = HashMap::new();
    for event in events {
        if event.kind == EventKind::Suicide {
            suicides.entry(event.player_id).or_default().push(event.timestamp);
        }
    }

    let mut flagged = Vec::new();
    for (player_id, player_sessions) in sessions {
        let Some(times) = suicides.get(player_id) else {
            continue;
        };
        for session in player_sessions {
            let end = session.disconnect_time.unwrap_or(NaiveDateTime::MAX);
            let count = times
                .iter()
                .filter(|t| **t >= session.connect_time && **t <= end)
                .count() as u64;
            if count == 0 {
                continue;
            }
            let hours = session
                .duration()
                .map(|d| d.num_seconds() as f64 / 3600.0)
                .unwrap_or(0.0);
            let per_hour = if hours > 0.0 { count as f64 / hours } else { 0.0 };

            if count > u64::from(thresholds.suicides_per_session)
                || (hours > 0.0 && per_hour > thresholds.suicides_per_hour)
            {
                flagged.push(SuicideAnomaly {
                    player_id: resolve(*player_id).to_string(),
                    player_name: resolve(session.player_name).to_string(),
                    session_start: session.connect_time,
                    suicides: count,
                    per_hour,
                });
            }
        }
    }
    flagged
}

/// Counts disconnect-to-reconnect gaps shorter than the configured window;
/// a chain of them marks a player, not a single quick rejoin.
fn rapid_reconnects(
    sessions: &HashMap<IStr, Vec<PlayerSession>>,
    thresholds: &AnomalyThresholds,
) -> Vec<ReconnectAnomaly> {
    let mut flagged = Vec::new();
    for (player_id, player_sessions) in sessions {
        if player_sessions.len() < 2 {
            continue;
        }
        let mut ordered: Vec<&PlayerSession> = player_sessions.iter().collect();
        ordered.sort_by_key(|s| s.connect_time);

        let mut rapid = 0u64;
        for pair in ordered.windows(2) {
            if let Some(end) = pair[0].disconnect_time
                && (pair[1].connect_time - end).num_seconds() < thresholds.rapid_reconnect_secs
            {
                rapid += 1;
            }
        }

        if rapid >= u64::from(thresholds.rapid_reconnects) {
            flagged.push(ReconnectAnomaly {
                player_id: resolve(*player_id).to_string(),
                player_name: resolve(ordered[0].player_name).to_string(),
                rapid_reconnects: rapid,
                sessions: player_sessions.len() as u64,
            });
        }
    }
    flagged
}

fn high_damage_dealers(
    records: &[CombatRecord],
    thresholds: &AnomalyThresholds,
) -> Vec<DamageAnomaly> {
    let mut by_attacker: HashMap<IStr, (IStr, u64, f64)> = HashMap::new();
    for record in records {
        let entry = by_attacker
            .entry(record.attacker_id)
            .or_insert((record.attacker_name, 0, 0.0));
        entry.1 += 1;
        entry.2 += f64::from(record.damage);
    }

    let mut flagged = Vec::new();
    for (attacker_id, (attacker_name, hits, total)) in by_attacker {
        let average = total / hits as f64;
        if average > thresholds.avg_damage_per_hit {
            flagged.push(DamageAnomaly {
                player_id: resolve(attacker_id).to_string(),
                player_name: resolve(attacker_name).to_string(),
                hits,
                average_damage: average,
            });
        }
    }
    flagged
}
