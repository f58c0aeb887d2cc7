//! Reduces events, sessions and combat records into the final report.
//!
//! Per-player metrics only exist for players with at least one session; a
//! name that appears in events but never connected during the analyzed
//! window has nothing to report playtime against. All ratio fields are
//! plain ratios, not percentages.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use hashbrown::HashMap;
use serde::Serialize;

use crate::adm_log::{CombatRecord, EventKind, ParseSummary, PlayerEvent};
use crate::anomaly::AnomalyReport;
use crate::context::{AnalysisSettings, IStr, resolve};
use crate::session::PlayerSession;

/// Kills of the same victim within this window count as one engagement,
/// so spray-downs do not inflate the kill column.
const ENGAGEMENT_TIMEOUT_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize)]
pub struct PlayerMetrics {
    pub name: String,
    pub sessions: u64,
    pub total_playtime_hours: f64,
    pub avg_session_minutes: f64,
    pub distance_traveled: f32,
    pub deaths: u64,
    /// Deaths where another player got the kill; the K/D denominator.
    pub deaths_by_player: u64,
    pub suicides: u64,
    pub kills: u64,
    pub kd_ratio: f64,
    pub hits_dealt: u64,
    pub hits_taken: u64,
    pub damage_dealt: f64,
    pub damage_taken: f64,
    /// Kills per hit dealt; zero when the player never landed a hit.
    pub accuracy: f64,
    pub avg_damage_per_hit: f64,
    pub emotes: u64,
    pub building_actions: u64,
    pub teleports: u64,
    pub tripwire_hits: u64,
    pub combat_logouts: u64,
    pub deaths_by_bear: u64,
    pub deaths_by_wolf: u64,
    pub deaths_by_fall: u64,
    pub deaths_by_explosion: u64,
    pub deaths_by_zombie: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Hotspot {
    pub x: i64,
    pub y: i64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeaponMetrics {
    pub hits: u64,
    pub kills: u64,
    pub kill_rate: f64,
    pub average_damage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombatantActivity {
    pub name: String,
    pub attacks: u64,
    pub kills: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct CombatStats {
    pub total_events: u64,
    pub total_kills: u64,
    pub weapon_usage: BTreeMap<String, u64>,
    pub hit_locations: BTreeMap<String, u64>,
    pub average_damage: f64,
    pub average_distance: f64,
    pub hotspots: Vec<Hotspot>,
    pub deadliest_weapons: BTreeMap<String, WeaponMetrics>,
    pub most_active: Vec<CombatantActivity>,
}

/// Everything a run produces, ready for serialization.
#[derive(Serialize)]
pub struct AnalysisReport {
    pub players: BTreeMap<String, PlayerMetrics>,
    pub combat: CombatStats,
    pub anomalies: AnomalyReport,
    pub summary: ParseSummary,
}

pub fn aggregate(
    sessions: &HashMap<IStr, Vec<PlayerSession>>,
    events: &[PlayerEvent],
    records: &[CombatRecord],
    summary: ParseSummary,
    anomalies: AnomalyReport,
    settings: &AnalysisSettings,
) -> AnalysisReport {
    AnalysisReport {
        players: player_metrics(sessions, events, records),
        combat: combat_stats(records, settings.hotspot_grid, settings.top_results),
        anomalies,
        summary,
    }
}

/// True when a record describes two different real players. Self-inflicted
/// and environment-attributed damage drops out of the PvP columns here.
fn distinct_players(attacker: IStr, victim: IStr) -> bool {
    !resolve(attacker).trim().is_empty()
        && !resolve(victim).trim().is_empty()
        && attacker != victim
}

fn count_kind(events: &[&PlayerEvent], kind: EventKind) -> u64 {
    events.iter().filter(|e| e.kind == kind).count() as u64
}

/// Groups kill records into engagements: repeat kills of the same victim
/// within the timeout collapse into the engagement that started them.
fn unique_kills(records: &[&CombatRecord]) -> u64 {
    let mut kills: Vec<&&CombatRecord> = records.iter().filter(|r| r.kill).collect();
    kills.sort_by_key(|r| r.timestamp);

    let mut engagements: Vec<(IStr, NaiveDateTime)> = Vec::new();
    for kill in kills {
        let ongoing = engagements.iter().any(|&(victim, start)| {
            victim == kill.victim_id
                && (kill.timestamp - start).num_seconds() <= ENGAGEMENT_TIMEOUT_SECS
        });
        if !ongoing {
            engagements.push((kill.victim_id, kill.timestamp));
        }
    }
    engagements.len() as u64
}

pub fn player_metrics(
    sessions: &HashMap<IStr, Vec<PlayerSession>>,
    events: &[PlayerEvent],
    records: &[CombatRecord],
) -> BTreeMap<String, PlayerMetrics> {
    let mut events_by_player: HashMap<IStr, Vec<&PlayerEvent>> = HashMap::new();
    for event in events {
        events_by_player.entry(event.player_id).or_default().push(event);
    }
    let mut as_attacker: HashMap<IStr, Vec<&CombatRecord>> = HashMap::new();
    let mut as_victim: HashMap<IStr, Vec<&CombatRecord>> = HashMap::new();
    for record in records {
        as_attacker.entry(record.attacker_id).or_default().push(record);
        as_victim.entry(record.victim_id).or_default().push(record);
    }

    let mut players = BTreeMap::new();
    for (player_id, player_sessions) in sessions {
        let Some(first) = player_sessions.first() else {
            continue;
        };

        let total_secs: i64 = player_sessions
            .iter()
            .filter_map(PlayerSession::duration)
            .map(|d| d.num_seconds())
            .sum();
        let distance_traveled: f32 = player_sessions
            .iter()
            .map(PlayerSession::distance_traveled)
            .sum();

        let my_events: &[&PlayerEvent] =
            events_by_player.get(player_id).map_or(&[], Vec::as_slice);
        let dealt_all: &[&CombatRecord] = as_attacker.get(player_id).map_or(&[], Vec::as_slice);
        let taken_all: &[&CombatRecord] = as_victim.get(player_id).map_or(&[], Vec::as_slice);

        let deaths = my_events.iter().filter(|e| e.kind.is_death()).count() as u64;
        let deaths_by_player = taken_all.iter().filter(|r| r.kill).count() as u64;
        let building_actions = my_events.iter().filter(|e| e.kind.is_building()).count() as u64;

        let kills = unique_kills(dealt_all);
        let dealt: Vec<&&CombatRecord> = dealt_all
            .iter()
            .filter(|r| distinct_players(r.attacker_id, r.victim_id))
            .collect();
        let taken: Vec<&&CombatRecord> = taken_all
            .iter()
            .filter(|r| distinct_players(r.attacker_id, r.victim_id))
            .collect();

        let hits_dealt = dealt.len() as u64;
        let hits_taken = taken.len() as u64;
        let damage_dealt: f64 = dealt.iter().map(|r| f64::from(r.damage)).sum();
        let damage_taken: f64 = taken.iter().map(|r| f64::from(r.damage)).sum();

        let accuracy = if hits_dealt > 0 {
            kills as f64 / hits_dealt as f64
        } else {
            0.0
        };
        let avg_damage_per_hit = if hits_dealt > 0 {
            damage_dealt / hits_dealt as f64
        } else {
            0.0
        };

        let session_count = player_sessions.len() as u64;
        players.insert(
            resolve(*player_id).to_string(),
            PlayerMetrics {
                name: resolve(first.player_name).to_string(),
                sessions: session_count,
                total_playtime_hours: total_secs as f64 / 3600.0,
                avg_session_minutes: total_secs as f64 / session_count as f64 / 60.0,
                distance_traveled,
                deaths,
                deaths_by_player,
                suicides: count_kind(my_events, EventKind::Suicide),
                kills,
                kd_ratio: kills as f64 / deaths_by_player.max(1) as f64,
                hits_dealt,
                hits_taken,
                damage_dealt,
                damage_taken,
                accuracy,
                avg_damage_per_hit,
                emotes: count_kind(my_events, EventKind::Emote),
                building_actions,
                teleports: count_kind(my_events, EventKind::Teleported),
                tripwire_hits: count_kind(my_events, EventKind::TripwireHit),
                combat_logouts: count_kind(my_events, EventKind::CombatLogout),
                deaths_by_bear: count_kind(my_events, EventKind::DeathByBear),
                deaths_by_wolf: count_kind(my_events, EventKind::DeathByWolf),
                deaths_by_fall: count_kind(my_events, EventKind::DeathFall),
                deaths_by_explosion: count_kind(my_events, EventKind::DeathByExplosion),
                deaths_by_zombie: count_kind(my_events, EventKind::DeathByZombie),
            },
        );
    }
    players
}

pub fn combat_stats(records: &[CombatRecord], grid_size: f64, top_results: usize) -> CombatStats {
    if records.is_empty() {
        return CombatStats::default();
    }

    let total_events = records.len() as u64;
    let total_kills = records.iter().filter(|r| r.kill).count() as u64;
    let average_damage =
        records.iter().map(|r| f64::from(r.damage)).sum::<f64>() / total_events as f64;
    let average_distance =
        records.iter().map(|r| f64::from(r.distance)).sum::<f64>() / total_events as f64;

    let mut weapon_usage: BTreeMap<String, u64> = BTreeMap::new();
    let mut hit_locations: BTreeMap<String, u64> = BTreeMap::new();
    let mut weapon_acc: HashMap<IStr, (u64, u64, f64)> = HashMap::new();
    let mut activity: HashMap<IStr, (u64, u64)> = HashMap::new();
    let mut cells: HashMap<(i64, i64), u64> = HashMap::new();

    for record in records {
        *weapon_usage
            .entry(resolve(record.weapon).to_string())
            .or_default() += 1;
        *hit_locations
            .entry(resolve(record.hit_location).to_string())
            .or_default() += 1;

        let weapon = weapon_acc.entry(record.weapon).or_insert((0, 0, 0.0));
        weapon.0 += 1;
        weapon.2 += f64::from(record.damage);
        if record.kill {
            weapon.1 += 1;
        }

        let combatant = activity.entry(record.attacker_name).or_insert((0, 0));
        combatant.0 += 1;
        if record.kill {
            combatant.1 += 1;
        }

        if let Some((x, y, _)) = record.victim_pos {
            let cell = (
                (f64::from(x) / grid_size).floor() as i64 * grid_size as i64,
                (f64::from(y) / grid_size).floor() as i64 * grid_size as i64,
            );
            *cells.entry(cell).or_default() += 1;
        }
    }

    let deadliest_weapons = weapon_acc
        .into_iter()
        .map(|(weapon, (hits, kills, damage))| {
            (
                resolve(weapon).to_string(),
                WeaponMetrics {
                    hits,
                    kills,
                    kill_rate: kills as f64 / hits as f64,
                    average_damage: damage / hits as f64,
                },
            )
        })
        .collect();

    let mut hotspots: Vec<Hotspot> = cells
        .into_iter()
        .map(|((x, y), count)| Hotspot { x, y, count })
        .collect();
    hotspots.sort_by(|a, b| b.count.cmp(&a.count).then((a.x, a.y).cmp(&(b.x, b.y))));
    hotspots.truncate(top_results);

    let mut most_active: Vec<CombatantActivity> = activity
        .into_iter()
        .map(|(name, (attacks, kills))| CombatantActivity {
            name: resolve(name).to_string(),
            attacks,
            kills,
        })
        .collect();
    most_active.sort_by(|a, b| b.attacks.cmp(&a.attacks).then(a.name.cmp(&b.name)));
    most_active.truncate(top_results);

    CombatStats {
        total_events,
        total_kills,
        weapon_usage,
        hit_locations,
        average_damage,
        average_distance,
        hotspots,
        deadliest_weapons,
        most_active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::intern;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn one_session(name: &str, connect: NaiveDateTime, disconnect: NaiveDateTime) -> HashMap<IStr, Vec<PlayerSession>> {
        let mut map = HashMap::new();
        map.insert(
            intern(&format!("{name}-id")),
            vec![PlayerSession {
                player_name: intern(name),
                player_id: intern(&format!("{name}-id")),
                connect_time: connect,
                disconnect_time: Some(disconnect),
                positions: Vec::new(),
            }],
        );
        map
    }

    fn record(
        attacker: &str,
        victim: &str,
        damage: f32,
        time: NaiveDateTime,
        kill: bool,
    ) -> CombatRecord {
        CombatRecord {
            timestamp: time,
            attacker_name: intern(attacker),
            attacker_id: intern(&format!("{attacker}-id")),
            victim_name: intern(victim),
            victim_id: intern(&format!("{victim}-id")),
            weapon: intern("M4A1"),
            damage,
            hit_location: intern("Torso"),
            distance: 25.0,
            kill,
            ..CombatRecord::default()
        }
    }

    #[test]
    fn kd_ratio_with_zero_deaths_equals_kill_count() {
        let sessions = one_session("Rook", at(10, 0, 0), at(12, 0, 0));
        let records: Vec<CombatRecord> = (0..5)
            .map(|i| record("Rook", &format!("v{i}"), 50.0, at(10, i, 0), true))
            .collect();

        let players = player_metrics(&sessions, &[], &records);
        let rook = &players["Rook-id"];
        assert_eq!(rook.kills, 5);
        assert_eq!(rook.deaths_by_player, 0);
        assert_eq!(rook.kd_ratio, 5.0);
    }

    #[test]
    fn repeat_kills_of_one_victim_collapse_into_engagements() {
        let sessions = one_session("Rook", at(10, 0, 0), at(12, 0, 0));
        let records = vec![
            record("Rook", "Dana", 50.0, at(10, 0, 0), true),
            // 30s later: same engagement
            record("Rook", "Dana", 50.0, at(10, 0, 30), true),
            // 2 minutes after the engagement started: a fresh one
            record("Rook", "Dana", 50.0, at(10, 2, 0), true),
        ];

        let players = player_metrics(&sessions, &[], &records);
        assert_eq!(players["Rook-id"].kills, 2);
    }

    #[test]
    fn accuracy_and_damage_averages() {
        let sessions = one_session("Rook", at(10, 0, 0), at(12, 0, 0));
        let records = vec![
            record("Rook", "Dana", 10.0, at(10, 0, 0), false),
            record("Rook", "Dana", 20.0, at(10, 1, 0), false),
            record("Rook", "Eve", 15.0, at(10, 2, 0), false),
            record("Rook", "Eve", 35.0, at(10, 3, 0), true),
        ];

        let players = player_metrics(&sessions, &[], &records);
        let rook = &players["Rook-id"];
        assert_eq!(rook.hits_dealt, 4);
        assert_eq!(rook.kills, 1);
        assert_eq!(rook.accuracy, 0.25);
        assert_eq!(rook.damage_dealt, 80.0);
        assert_eq!(rook.avg_damage_per_hit, 20.0);
    }

    #[test]
    fn self_damage_stays_out_of_pvp_columns() {
        let sessions = one_session("Ann", at(10, 0, 0), at(11, 0, 0));
        let records = vec![record("Ann", "Ann", 30.0, at(10, 5, 0), false)];

        let players = player_metrics(&sessions, &[], &records);
        let ann = &players["Ann-id"];
        assert_eq!(ann.hits_dealt, 0);
        assert_eq!(ann.hits_taken, 0);
        assert_eq!(ann.damage_dealt, 0.0);
    }

    #[test]
    fn playtime_totals() {
        let sessions = one_session("Ann", at(10, 0, 0), at(11, 30, 0));
        let players = player_metrics(&sessions, &[], &[]);
        let ann = &players["Ann-id"];
        assert_eq!(ann.sessions, 1);
        assert_eq!(ann.total_playtime_hours, 1.5);
        assert_eq!(ann.avg_session_minutes, 90.0);
    }

    #[test]
    fn players_without_sessions_are_absent() {
        let records = vec![record("Ghost", "Dana", 10.0, at(10, 0, 0), false)];
        let players = player_metrics(&HashMap::new(), &[], &records);
        assert!(players.is_empty());
    }

    #[test]
    fn hotspots_bucket_victim_positions_on_the_grid() {
        let mut a = record("Rook", "Dana", 10.0, at(10, 0, 0), false);
        a.victim_pos = Some((4501.0, 9799.0, 100.0));
        let mut b = record("Rook", "Dana", 10.0, at(10, 1, 0), false);
        b.victim_pos = Some((4999.0, 9501.0, 100.0));
        let mut c = record("Rook", "Dana", 10.0, at(10, 2, 0), false);
        c.victim_pos = Some((250.0, -1.0, 100.0));

        let stats = combat_stats(&[a, b, c], 500.0, 10);
        assert_eq!(stats.hotspots.len(), 2);
        assert_eq!(
            (stats.hotspots[0].x, stats.hotspots[0].y, stats.hotspots[0].count),
            (4500, 9500, 2)
        );
        assert_eq!(
            (stats.hotspots[1].x, stats.hotspots[1].y, stats.hotspots[1].count),
            (0, -500, 1)
        );
    }

    #[test]
    fn weapon_kill_rate_is_a_plain_ratio() {
        let records = vec![
            record("Rook", "Dana", 30.0, at(10, 0, 0), false),
            record("Rook", "Eve", 50.0, at(10, 1, 0), true),
        ];
        let stats = combat_stats(&records, 500.0, 10);

        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.total_kills, 1);
        let m4 = &stats.deadliest_weapons["M4A1"];
        assert_eq!(m4.hits, 2);
        assert_eq!(m4.kills, 1);
        assert_eq!(m4.kill_rate, 0.5);
        assert_eq!(m4.average_damage, 40.0);
        assert_eq!(stats.weapon_usage["M4A1"], 2);
    }

    #[test]
    fn empty_run_produces_empty_stats() {
        let stats = combat_stats(&[], 500.0, 10);
        assert_eq!(stats.total_events, 0);
        assert_eq!(stats.average_damage, 0.0);
        assert!(stats.hotspots.is_empty());
    }

    #[test]
    fn leaderboards_honor_the_configured_cut() {
        let records: Vec<CombatRecord> = (0..4)
            .map(|i| {
                let mut r = record(&format!("p{i}"), "Dana", 10.0, at(10, i, 0), false);
                r.victim_pos = Some((i as f32 * 1000.0, 0.0, 0.0));
                r
            })
            .collect();

        let stats = combat_stats(&records, 500.0, 2);
        assert_eq!(stats.hotspots.len(), 2);
        assert_eq!(stats.most_active.len(), 2);
    }
}
