//! Turns classified lines into typed player events.
//!
//! Numeric capture fields never abort a line: a bad float falls back to the
//! default so one garbled number cannot drop an otherwise good event. The
//! exception is positions, which become None and are reported, since a made
//! up coordinate would poison distance accounting.

use crate::adm_log::{
    EventDetails, EventKind, PatternRegistry, PlayerEvent, Position, TimestampResolver,
    distance_3d,
};
use crate::context::{IStr, empty_istr, intern};
use chrono::NaiveDateTime;
use phf::phf_map;
use regex::Captures;
use tracing::warn;


/// Outcome of a single line. Some shapes (dead-player roster entries) are
/// recognized without producing an event; they must not count as malformed.
#[derive(Debug, PartialEq)]
pub enum ParseOutcome {
    Event(PlayerEvent),
    Recognized(EventKind),
    NoMatch,
}

/// Animal class names that re-tag a generic death line.
static ANIMAL_DEATHS: phf::Map<&'static str, (&'static str, EventKind)> = phf_map! {
    "Animal_UrsusArctos" => ("Bear", EventKind::DeathByBear),
    "Animal_CanisLupus_Grey" => ("Wolf", EventKind::DeathByWolf),
    "Animal_CanisLupus_White" => ("Wolf", EventKind::DeathByWolf),
};

/// Killer substrings that mark a death as explosive.
const EXPLOSION_KEYWORDS: &[&str] = &[
    "6-M7", "Claymore", "M18", "RGD", "M67", "Mine", "Grenade", "Explosion",
];

macro_rules! parse_f32 {
    ($s:expr) => {
        $s.parse::<f32>().unwrap_or_default()
    };
}

fn cap<'t>(caps: &Captures<'t>, name: &str) -> Option<&'t str> {
    caps.name(name).map(|m| m.as_str())
}

fn cap_f32(caps: &Captures, name: &str) -> f32 {
    cap(caps, name).map(|s| parse_f32!(s)).unwrap_or_default()
}

fn cap_istr(caps: &Captures, name: &str) -> IStr {
    cap(caps, name).map(intern).unwrap_or_else(empty_istr)
}

fn cap_istr_or(caps: &Captures, name: &str, default: &str) -> IStr {
    intern(cap(caps, name).unwrap_or(default))
}

fn cap_pos(caps: &Captures, x: &str, y: &str, z: &str) -> Option<Position> {
    let (xs, ys, zs) = (cap(caps, x)?, cap(caps, y)?, cap(caps, z)?);
    match (xs.parse(), ys.parse(), zs.parse()) {
        (Ok(x), Ok(y), Ok(z)) => Some((x, y, z)),
        _ => {
            warn!("discarding unparsable position <{xs}, {ys}, {zs}>");
            None
        }
    }
}

pub struct LogParser<'a> {
    registry: &'a PatternRegistry,
    resolver: TimestampResolver,
    melee_ammo: &'a [String],
}

impl<'a> LogParser<'a> {
    pub fn new(
        registry: &'a PatternRegistry,
        resolver: TimestampResolver,
        melee_ammo: &'a [String],
    ) -> Self {
        Self {
            registry,
            resolver,
            melee_ammo,
        }
    }

    pub fn parse_line(&self, line_number: u64, line: &str) -> ParseOutcome {
        // Every event line opens with HH:MM:SS; skip the rule table otherwise
        let b = line.as_bytes();
        if b.len() < 8 || b[2] != b':' || b[5] != b':' {
            return ParseOutcome::NoMatch;
        }

        let Some((kind, caps)) = self.registry.classify(line) else {
            return ParseOutcome::NoMatch;
        };
        let Some(timestamp) = cap(&caps, "time").and_then(|t| self.resolver.resolve(t)) else {
            return ParseOutcome::NoMatch;
        };

        use EventKind::*;
        let event = match kind {
            Connection | Disconnection | BannedConnection | Unconscious | Conscious | Suicide
            | Bledout | Respawn | CombatLogout | Position => {
                self.base(line_number, timestamp, kind, &caps)
            }

            DeathStats => {
                let mut event = self.base(line_number, timestamp, kind, &caps);
                event.details = EventDetails::DeathStats {
                    water: cap_f32(&caps, "water"),
                    energy: cap_f32(&caps, "energy"),
                    bleed_sources: cap(&caps, "bleed_sources")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or_default(),
                };
                event
            }

            Emote => {
                let mut event = self.base(line_number, timestamp, kind, &caps);
                event.details = EventDetails::Emote {
                    gesture: cap_istr(&caps, "emote"),
                    item: cap_istr(&caps, "emote_item"),
                };
                event
            }

            TripwireHit => {
                let mut event = self.base(line_number, timestamp, kind, &caps);
                event.details = EventDetails::Tripwire {
                    location_id: cap(&caps, "hit_location")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or_default(),
                    damage: cap_f32(&caps, "damage"),
                    hp: cap_f32(&caps, "hp"),
                };
                event
            }

            Hit => self.hit_event(line_number, timestamp, &caps, line),
            Kill => self.kill_event(line_number, timestamp, &caps),

            EnvHit => {
                let mut event = self.base(line_number, timestamp, kind, &caps);
                event.details = EventDetails::Struck {
                    source: cap_istr(&caps, "attacker"),
                    weapon: cap_istr(&caps, "weapon"),
                    hp: cap_f32(&caps, "hp"),
                };
                event
            }

            EnvHitSimple => {
                let mut event = self.base(line_number, timestamp, kind, &caps);
                // The short form names no weapon; the source token doubles as one
                let source = cap_istr(&caps, "attacker");
                event.details = EventDetails::Struck {
                    source,
                    weapon: source,
                    hp: cap_f32(&caps, "hp"),
                };
                event
            }

            ExplosionHit => {
                let mut event = self.base(line_number, timestamp, kind, &caps);
                event.details = EventDetails::Struck {
                    source: intern("explosion"),
                    weapon: cap_istr_or(&caps, "explosion_type", "Explosion"),
                    hp: cap_f32(&caps, "hp"),
                };
                event
            }

            DeathOther => {
                let mut event = self.base(line_number, timestamp, kind, &caps);
                let killer = cap(&caps, "killer").unwrap_or("Unknown");
                let (refined, details) = classify_death_cause(killer);
                event.kind = refined;
                event.details = details;
                event
            }

            DeathFall => {
                let mut event = self.base(line_number, timestamp, kind, &caps);
                event.details = EventDetails::DeathCause {
                    attacker: intern("Fall Damage"),
                    killer: intern("FallDamageHealth"),
                    weapon: intern("FallDamageHealth"),
                };
                event
            }

            Building | Mounted | Unmounted | RaisedFlag | BuiltBaseOn | Dismantle | Repaired
            | Packed | Placed | Folded => self.building_event(line_number, timestamp, kind, &caps, line),

            Teleported => self.teleport_event(line_number, timestamp, &caps),

            PlayerList => return ParseOutcome::Recognized(kind),

            Custom(_) => self.custom_event(line_number, timestamp, kind, &caps),

            // Refined kinds are produced by re-tagging, never matched directly
            DeathByBear | DeathByWolf | DeathByExplosion | DeathByZombie => {
                return ParseOutcome::NoMatch;
            }
        };

        ParseOutcome::Event(event)
    }

    /// Fields every shape shares: the clock, the quoted player and the id,
    /// plus a position when the shape carries one.
    fn base(
        &self,
        line_number: u64,
        timestamp: NaiveDateTime,
        kind: EventKind,
        caps: &Captures,
    ) -> PlayerEvent {
        PlayerEvent {
            line_number,
            timestamp,
            player_name: cap_istr_or(caps, "player_name", "Unknown"),
            player_id: cap_istr_or(caps, "player_id", "Unknown"),
            kind,
            position: cap_pos(caps, "x", "y", "z"),
            details: EventDetails::None,
        }
    }

    fn hit_event(
        &self,
        line_number: u64,
        timestamp: NaiveDateTime,
        caps: &Captures,
        line: &str,
    ) -> PlayerEvent {
        let victim_pos = cap_pos(caps, "victim_x", "victim_y", "victim_z");
        let victim_hp = cap_f32(caps, "victim_hp");

        let ammo = cap(caps, "ammo").unwrap_or("");
        let mut weapon = cap(caps, "weapon").unwrap_or("Unknown");
        // Melee swings log an ammo class but no weapon; adopt the ammo token
        if weapon == "Unknown"
            && !ammo.is_empty()
            && self.melee_ammo.iter().any(|m| ammo.contains(m.as_str()))
        {
            weapon = ammo;
        }

        PlayerEvent {
            line_number,
            timestamp,
            player_name: cap_istr_or(caps, "victim_name", "Unknown"),
            player_id: cap_istr_or(caps, "victim_id", "Unknown"),
            kind: EventKind::Hit,
            position: victim_pos,
            details: EventDetails::Hit {
                attacker_name: cap_istr_or(caps, "attacker_name", "Unknown"),
                attacker_id: cap_istr_or(caps, "attacker_id", "Unknown"),
                attacker_pos: cap_pos(caps, "attacker_x", "attacker_y", "attacker_z"),
                victim_hp,
                hit_location: intern(cap(caps, "hit_location").map(str::trim).unwrap_or("unknown")),
                damage: cap_f32(caps, "damage"),
                ammo: intern(ammo),
                weapon: intern(weapon),
                distance: cap_f32(caps, "distance"),
                lethal: victim_hp == 0.0 || line.contains("(DEAD)"),
            },
        }
    }

    fn kill_event(
        &self,
        line_number: u64,
        timestamp: NaiveDateTime,
        caps: &Captures,
    ) -> PlayerEvent {
        PlayerEvent {
            line_number,
            timestamp,
            player_name: cap_istr_or(caps, "victim_name", "Unknown"),
            player_id: cap_istr_or(caps, "victim_id", "Unknown"),
            kind: EventKind::Kill,
            position: cap_pos(caps, "victim_x", "victim_y", "victim_z"),
            details: EventDetails::Kill {
                attacker_name: cap_istr_or(caps, "attacker_name", "Unknown"),
                attacker_id: cap_istr_or(caps, "attacker_id", "Unknown"),
                attacker_pos: cap_pos(caps, "attacker_x", "attacker_y", "attacker_z"),
                weapon: cap_istr(caps, "weapon"),
                distance: cap_f32(caps, "distance"),
            },
        }
    }

    fn building_event(
        &self,
        line_number: u64,
        timestamp: NaiveDateTime,
        kind: EventKind,
        caps: &Captures,
        line: &str,
    ) -> PlayerEvent {
        let mut event = self.base(line_number, timestamp, kind, caps);

        let mut action = match kind {
            EventKind::BuiltBaseOn => "Built base on",
            EventKind::Packed => "packed",
            EventKind::Placed => "placed",
            EventKind::Folded => "folded",
            _ => cap(caps, "action").unwrap_or(""),
        };
        let mut structure = match kind {
            EventKind::BuiltBaseOn => "base",
            _ => cap(caps, "structure").unwrap_or(""),
        };
        let parent = cap(caps, "parent").unwrap_or("");
        let mut tool = cap(caps, "tool").unwrap_or("");

        // Some construction lines glue fields together and leave captures
        // empty; a loose rescan of the raw line recovers what it can
        if action.is_empty() || structure.is_empty() {
            if let Some(fc) = self.registry.building_fallback().captures(line) {
                if action.is_empty()
                    && let Some(m) = fc.get(1)
                {
                    action = m.as_str();
                }
                if structure.is_empty()
                    && let Some(m) = fc.get(2)
                {
                    structure = m.as_str();
                }
                if tool.is_empty()
                    && let Some(m) = fc.get(3)
                {
                    tool = m.as_str();
                }
            }
        }

        event.details = EventDetails::Building {
            action: intern(action),
            structure: intern(structure),
            parent: intern(parent),
            tool: intern(tool),
        };
        event
    }

    fn teleport_event(
        &self,
        line_number: u64,
        timestamp: NaiveDateTime,
        caps: &Captures,
    ) -> PlayerEvent {
        let mut event = self.base(line_number, timestamp, EventKind::Teleported, caps);

        let from = cap_pos(caps, "from_x", "from_y", "from_z");
        let to = cap_pos(caps, "to_x", "to_y", "to_z");
        let distance = match (from, to) {
            (Some(a), Some(b)) => distance_3d(a, b),
            _ => 0.0,
        };

        let reason = cap(caps, "reason").unwrap_or("").trim();
        let restricted_area = reason
            .split_once("Restricted Area:")
            .map(|(_, area)| intern(area.trim()));

        event.details = EventDetails::Teleport {
            from,
            to,
            distance,
            reason: intern(reason),
            restricted_area,
        };
        event
    }

    /// Config-supplied rules use positional captures: after the clock, the
    /// second group is read as a player name, the third as an id, and three
    /// consecutive float groups after that as a position.
    fn custom_event(
        &self,
        line_number: u64,
        timestamp: NaiveDateTime,
        kind: EventKind,
        caps: &Captures,
    ) -> PlayerEvent {
        let captures: Vec<String> = (2..caps.len())
            .map(|i| {
                caps.get(i)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default()
            })
            .collect();

        let named = |idx: usize| -> IStr {
            match captures.get(idx) {
                Some(v) if !v.is_empty() => intern(v),
                _ => intern("Unknown"),
            }
        };
        let player_name = named(0);
        let player_id = named(1);

        let position = match (captures.get(2), captures.get(3), captures.get(4)) {
            (Some(x), Some(y), Some(z)) => match (x.parse(), y.parse(), z.parse()) {
                (Ok(x), Ok(y), Ok(z)) => Some((x, y, z)),
                _ => None,
            },
            _ => None,
        };

        PlayerEvent {
            line_number,
            timestamp,
            player_name,
            player_id,
            kind,
            position,
            details: EventDetails::Custom { captures },
        }
    }
}

fn classify_death_cause(killer: &str) -> (EventKind, EventDetails) {
    if let Some(&(label, kind)) = ANIMAL_DEATHS.get(killer) {
        return (
            kind,
            EventDetails::DeathCause {
                attacker: intern(label),
                killer: intern(killer),
                weapon: empty_istr(),
            },
        );
    }
    if EXPLOSION_KEYWORDS.iter().any(|k| killer.contains(k)) {
        return (
            EventKind::DeathByExplosion,
            EventDetails::DeathCause {
                attacker: intern(killer),
                killer: intern(killer),
                weapon: intern(killer),
            },
        );
    }
    if killer.starts_with("Zmb") {
        return (
            EventKind::DeathByZombie,
            EventDetails::DeathCause {
                attacker: intern(killer),
                killer: intern(killer),
                weapon: empty_istr(),
            },
        );
    }
    (
        EventKind::DeathOther,
        EventDetails::DeathCause {
            attacker: intern(killer),
            killer: intern(killer),
            weapon: empty_istr(),
        },
    )
}
