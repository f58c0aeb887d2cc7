//! Correlates hit and kill lines into deduplicated combat records.
//!
//! Hits enter a working list in log order. A kill folds the same-second
//! hits from its attacker/victim pair into itself and removes them, so a
//! burst of hit lines plus the kill line count as one engagement. A kill
//! with no same-second hits instead adopts the damage of the nearest hit
//! from that pair within the last 30 seconds, without removing it.

use crate::adm_log::{CombatRecord, EventDetails, PlayerEvent, Position};
use crate::context::{IStr, empty_istr, intern, resolve};

/// How far back a kill looks for its killing blow when no hit shares its
/// timestamp.
const FALLBACK_WINDOW_SECS: i64 = 30;

/// Accumulates combat records across a run. Must see events in log order;
/// kills consume hits recorded before them.
#[derive(Default)]
pub struct CombatCorrelator {
    records: Vec<CombatRecord>,
}

impl CombatCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &PlayerEvent) {
        match &event.details {
            EventDetails::Hit {
                attacker_name,
                attacker_id,
                attacker_pos,
                hit_location,
                damage,
                weapon,
                distance,
                lethal,
                ..
            } => {
                if !is_pvp_hit(resolve(*attacker_name), resolve(event.player_name)) {
                    return;
                }
                self.records.push(CombatRecord {
                    timestamp: event.timestamp,
                    attacker_name: *attacker_name,
                    attacker_id: *attacker_id,
                    victim_name: event.player_name,
                    victim_id: event.player_id,
                    weapon: *weapon,
                    damage: *damage,
                    hit_location: *hit_location,
                    distance: *distance,
                    attacker_pos: *attacker_pos,
                    victim_pos: event.position,
                    kill: *lethal,
                });
            }
            EventDetails::Kill {
                attacker_name,
                attacker_id,
                attacker_pos,
                weapon,
                distance,
            } => {
                self.correlate_kill(
                    event,
                    *attacker_name,
                    *attacker_id,
                    *attacker_pos,
                    *weapon,
                    *distance,
                );
            }
            _ => {}
        }
    }

    /// A kill always produces a record, with damage folded in from the hit
    /// lines that belong to it when they can be found.
    fn correlate_kill(
        &mut self,
        event: &PlayerEvent,
        attacker_name: IStr,
        attacker_id: IStr,
        attacker_pos: Option<Position>,
        weapon: IStr,
        distance: f32,
    ) {
        let victim_id = event.player_id;
        let at = event.timestamp;

        // Non-lethal hits from this pair at the exact kill timestamp fold
        // into the kill and leave the working list
        let mut matched: Vec<usize> = Vec::new();
        let mut damage = 0.0_f32;
        let mut locations: Vec<IStr> = Vec::new();
        for (i, rec) in self.records.iter().enumerate() {
            if rec.attacker_id == attacker_id
                && rec.victim_id == victim_id
                && rec.timestamp == at
                && !rec.kill
            {
                matched.push(i);
                damage += rec.damage;
                locations.push(rec.hit_location);
            }
        }

        let hit_location;
        if matched.is_empty() {
            // The killing blow usually logs a second or two earlier; adopt
            // its damage but leave the hit record in place
            let mut adopted = None;
            for rec in self.records.iter().rev() {
                if rec.attacker_id != attacker_id || rec.victim_id != victim_id {
                    continue;
                }
                let gap = (at - rec.timestamp).num_seconds();
                if (0..=FALLBACK_WINDOW_SECS).contains(&gap) {
                    damage = rec.damage;
                    adopted = Some(rec.hit_location);
                }
                // Only the nearest prior hit decides, in or out of window
                break;
            }
            hit_location = adopted.unwrap_or_else(empty_istr);
        } else {
            hit_location = intern(
                &locations
                    .iter()
                    .map(|&l| resolve(l))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            remove_indices(&mut self.records, &matched);
        }

        self.records.push(CombatRecord {
            timestamp: at,
            attacker_name,
            attacker_id,
            victim_name: event.player_name,
            victim_id,
            weapon,
            damage,
            hit_location,
            distance,
            attacker_pos,
            victim_pos: event.position,
            kill: true,
        });
    }

    pub fn finish(self) -> Vec<CombatRecord> {
        self.records
    }
}

/// Hits only become combat records when a real player hurt a real player.
fn is_pvp_hit(attacker: &str, victim: &str) -> bool {
    !attacker.is_empty()
        && attacker != "Unknown"
        && !attacker.starts_with("Environment")
        && !attacker.starts_with("Explosion")
        && !victim.is_empty()
        && victim != "Unknown"
}

/// Single-pass compaction over a sorted index list.
fn remove_indices(records: &mut Vec<CombatRecord>, sorted: &[usize]) {
    let mut next = sorted.iter().copied().peekable();
    let mut idx = 0;
    records.retain(|_| {
        let drop = next.peek() == Some(&idx);
        if drop {
            next.next();
        }
        idx += 1;
        !drop
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adm_log::EventKind;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn hit(
        time: NaiveDateTime,
        attacker: &str,
        victim: &str,
        damage: f32,
        location: &str,
        lethal: bool,
    ) -> PlayerEvent {
        PlayerEvent {
            line_number: 0,
            timestamp: time,
            player_name: intern(victim),
            player_id: intern(&format!("{victim}-id")),
            kind: EventKind::Hit,
            position: Some((4500.0, 9800.0, 190.0)),
            details: EventDetails::Hit {
                attacker_name: intern(attacker),
                attacker_id: intern(&format!("{attacker}-id")),
                attacker_pos: None,
                victim_hp: if lethal { 0.0 } else { 50.0 },
                hit_location: intern(location),
                damage,
                ammo: intern("Bullet_556x45"),
                weapon: intern("M4A1"),
                distance: 25.0,
                lethal,
            },
        }
    }

    fn kill(time: NaiveDateTime, attacker: &str, victim: &str) -> PlayerEvent {
        PlayerEvent {
            line_number: 0,
            timestamp: time,
            player_name: intern(victim),
            player_id: intern(&format!("{victim}-id")),
            kind: EventKind::Kill,
            position: Some((4500.0, 9800.0, 190.0)),
            details: EventDetails::Kill {
                attacker_name: intern(attacker),
                attacker_id: intern(&format!("{attacker}-id")),
                attacker_pos: None,
                weapon: intern("M4A1"),
                distance: 26.0,
            },
        }
    }

    fn run(events: &[PlayerEvent]) -> Vec<CombatRecord> {
        let mut correlator = CombatCorrelator::new();
        for event in events {
            correlator.observe(event);
        }
        correlator.finish()
    }

    #[test]
    fn kill_consumes_same_second_hit() {
        let t = at(13, 30, 0);
        let records = run(&[hit(t, "Rook", "Dana", 10.0, "Head", false), kill(t, "Rook", "Dana")]);

        assert_eq!(records.len(), 1);
        assert!(records[0].kill);
        assert_eq!(records[0].damage, 10.0);
        assert_eq!(resolve(records[0].hit_location), "Head");
    }

    #[test]
    fn burst_of_hits_sums_damage_and_joins_locations() {
        let t = at(13, 30, 0);
        let records = run(&[
            hit(t, "Rook", "Dana", 10.0, "Head", false),
            hit(t, "Rook", "Dana", 15.0, "Torso", false),
            kill(t, "Rook", "Dana"),
        ]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].damage, 25.0);
        assert_eq!(resolve(records[0].hit_location), "Head, Torso");
    }

    #[test]
    fn unrelated_hits_survive_the_fold() {
        let t = at(13, 30, 0);
        let records = run(&[
            hit(t, "Rook", "Dana", 10.0, "Head", false),
            hit(t, "Rook", "Eve", 7.0, "Torso", false),
            kill(t, "Rook", "Dana"),
        ]);

        assert_eq!(records.len(), 2);
        assert_eq!(resolve(records[0].victim_name), "Eve");
        assert!(!records[0].kill);
        assert!(records[1].kill);
    }

    #[test]
    fn late_kill_adopts_nearest_hit_but_keeps_it() {
        let records = run(&[
            hit(at(13, 30, 0), "Rook", "Dana", 41.0, "Torso", true),
            kill(at(13, 30, 2), "Rook", "Dana"),
        ]);

        // The killing-blow hit stays in the list; its damage is copied,
        // not moved
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].damage, 41.0);
        assert_eq!(resolve(records[1].hit_location), "Torso");
        assert_eq!(records[0].damage, 41.0);
    }

    #[test]
    fn kill_outside_window_gets_zero_damage() {
        let records = run(&[
            hit(at(13, 30, 0), "Rook", "Dana", 41.0, "Torso", false),
            kill(at(13, 30, 45), "Rook", "Dana"),
        ]);

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].damage, 0.0);
        assert_eq!(resolve(records[1].hit_location), "");
    }

    #[test]
    fn standalone_kill_is_still_recorded() {
        let records = run(&[kill(at(13, 30, 0), "Rook", "Dana")]);

        assert_eq!(records.len(), 1);
        assert!(records[0].kill);
        assert_eq!(records[0].damage, 0.0);
        assert_eq!(records[0].distance, 26.0);
    }

    #[test]
    fn environmental_hits_never_become_records() {
        let t = at(13, 30, 0);
        let records = run(&[
            hit(t, "Unknown", "Dana", 10.0, "Head", false),
            hit(t, "EnvironmentFire", "Dana", 10.0, "Head", false),
            hit(t, "ExplosionCharge", "Dana", 10.0, "Head", false),
        ]);
        assert!(records.is_empty());
    }
}
