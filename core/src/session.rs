//! Pairs connect/disconnect lines into play sessions and tracks movement.

use chrono::{NaiveDateTime, TimeDelta};
use hashbrown::HashMap;

use crate::adm_log::{EventKind, PlayerEvent, Position, distance_3d};
use crate::context::IStr;

/// Faster than vehicle speed means a teleport or respawn, not travel.
const MAX_TRAVEL_SPEED_M_PER_MIN: f32 = 500.0;
/// Below this gap the speed estimate is too noisy to trust.
const MIN_SEGMENT_MINUTES: f32 = 0.1;

/// One stretch of play between a connect and a disconnect.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub player_name: IStr,
    pub player_id: IStr,
    pub connect_time: NaiveDateTime,
    /// None while the session is still open.
    pub disconnect_time: Option<NaiveDateTime>,
    /// Every position the player was seen at, in log order.
    pub positions: Vec<(NaiveDateTime, Position)>,
}

impl PlayerSession {
    pub fn duration(&self) -> Option<TimeDelta> {
        self.disconnect_time.map(|end| end - self.connect_time)
    }

    /// Ground distance covered, with teleport-speed segments dropped.
    pub fn distance_traveled(&self) -> f32 {
        let mut total = 0.0;
        for pair in self.positions.windows(2) {
            let (prev_time, prev) = pair[0];
            let (curr_time, curr) = pair[1];
            let minutes = (curr_time - prev_time).num_seconds() as f32 / 60.0;
            if minutes < MIN_SEGMENT_MINUTES {
                continue;
            }
            let distance = distance_3d(prev, curr);
            if distance / minutes <= MAX_TRAVEL_SPEED_M_PER_MIN {
                total += distance;
            }
        }
        total
    }
}

/// Feeds on the event stream in log order and pairs sessions per player.
///
/// A connection while a session is already open closes the old one at the
/// new connect time (the server never logged the disconnect, typically a
/// crash). A disconnection with no open session is ignored.
#[derive(Default)]
pub struct SessionTracker {
    open: HashMap<IStr, PlayerSession>,
    closed: HashMap<IStr, Vec<PlayerSession>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &PlayerEvent) {
        match event.kind {
            EventKind::Connection => {
                if let Some(mut existing) = self.open.remove(&event.player_id) {
                    existing.disconnect_time = Some(event.timestamp);
                    self.closed
                        .entry(existing.player_id)
                        .or_default()
                        .push(existing);
                }
                self.open.insert(
                    event.player_id,
                    PlayerSession {
                        player_name: event.player_name,
                        player_id: event.player_id,
                        connect_time: event.timestamp,
                        disconnect_time: None,
                        positions: Vec::new(),
                    },
                );
            }
            EventKind::Disconnection => {
                if let Some(mut session) = self.open.remove(&event.player_id) {
                    session.disconnect_time = Some(event.timestamp);
                    self.closed
                        .entry(session.player_id)
                        .or_default()
                        .push(session);
                }
            }
            _ => {}
        }

        // Any event that carries a position feeds the movement track
        if let Some(position) = event.position
            && let Some(session) = self.open.get_mut(&event.player_id)
        {
            session.positions.push((event.timestamp, position));
        }
    }

    /// Closes whatever is still open at the last seen timestamp and returns
    /// every session grouped by player id, in connect order per player.
    pub fn finish(
        mut self,
        last_seen: Option<NaiveDateTime>,
    ) -> HashMap<IStr, Vec<PlayerSession>> {
        for (_, mut session) in self.open.drain() {
            if session.disconnect_time.is_none() {
                session.disconnect_time = last_seen;
            }
            self.closed
                .entry(session.player_id)
                .or_default()
                .push(session);
        }
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adm_log::EventDetails;
    use crate::context::intern;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn event(kind: EventKind, time: NaiveDateTime, position: Option<Position>) -> PlayerEvent {
        PlayerEvent {
            line_number: 0,
            timestamp: time,
            player_name: intern("Ann"),
            player_id: intern("aa11"),
            kind,
            position,
            details: EventDetails::None,
        }
    }

    #[test]
    fn connect_disconnect_pair() {
        let mut tracker = SessionTracker::new();
        tracker.observe(&event(EventKind::Connection, at(10, 0, 0), None));
        tracker.observe(&event(
            EventKind::Position,
            at(10, 5, 0),
            Some((100.0, 200.0, 3.0)),
        ));
        tracker.observe(&event(EventKind::Disconnection, at(10, 30, 0), None));

        let sessions = tracker.finish(None);
        let mine = &sessions[&intern("aa11")];
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].connect_time, at(10, 0, 0));
        assert_eq!(mine[0].disconnect_time, Some(at(10, 30, 0)));
        assert_eq!(mine[0].duration().unwrap().num_minutes(), 30);
        assert_eq!(mine[0].positions.len(), 1);
    }

    #[test]
    fn reconnect_closes_previous_session() {
        let mut tracker = SessionTracker::new();
        tracker.observe(&event(EventKind::Connection, at(10, 0, 0), None));
        tracker.observe(&event(EventKind::Connection, at(11, 0, 0), None));

        let sessions = tracker.finish(Some(at(12, 0, 0)));
        let mine = &sessions[&intern("aa11")];
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].disconnect_time, Some(at(11, 0, 0)));
        assert_eq!(mine[1].connect_time, at(11, 0, 0));
        assert_eq!(mine[1].disconnect_time, Some(at(12, 0, 0)));
    }

    #[test]
    fn disconnect_without_connect_is_ignored() {
        let mut tracker = SessionTracker::new();
        tracker.observe(&event(EventKind::Disconnection, at(10, 0, 0), None));
        assert!(tracker.finish(None).is_empty());
    }

    #[test]
    fn positions_before_connect_are_not_tracked() {
        let mut tracker = SessionTracker::new();
        tracker.observe(&event(
            EventKind::Position,
            at(9, 0, 0),
            Some((1.0, 2.0, 3.0)),
        ));
        tracker.observe(&event(EventKind::Connection, at(10, 0, 0), None));

        let sessions = tracker.finish(Some(at(11, 0, 0)));
        assert!(sessions[&intern("aa11")][0].positions.is_empty());
    }

    #[test]
    fn distance_skips_teleport_speed_and_tiny_gaps() {
        let session = PlayerSession {
            player_name: intern("Ann"),
            player_id: intern("aa11"),
            connect_time: at(10, 0, 0),
            disconnect_time: Some(at(10, 10, 0)),
            positions: vec![
                (at(10, 0, 0), (0.0, 0.0, 0.0)),
                // 100m in one minute: walking, counted
                (at(10, 1, 0), (100.0, 0.0, 0.0)),
                // 5000m in one minute: teleport, dropped
                (at(10, 2, 0), (5100.0, 0.0, 0.0)),
                // 3 seconds later: gap too small for a speed estimate
                (at(10, 2, 3), (5110.0, 0.0, 0.0)),
            ],
        };
        assert_eq!(session.distance_traveled(), 100.0);
    }
}
