use crate::context::{IStr, empty_istr, resolve};
use chrono::NaiveDateTime;

/// World coordinates as they appear in `pos=<x, y, z>` fragments.
pub type Position = (f32, f32, f32);

/// Straight-line distance between two world positions.
pub fn distance_3d(a: Position, b: Position) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    let dz = a.2 - b.2;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// What a log line turned out to be. One variant per recognized line shape,
/// plus the refined death causes produced when a generic kill line names an
/// animal, an explosive or an infected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connection,
    Disconnection,
    BannedConnection,
    Unconscious,
    Conscious,
    Suicide,
    DeathStats,
    Bledout,
    Respawn,
    Emote,
    TripwireHit,
    Hit,
    Kill,
    EnvHit,
    EnvHitSimple,
    ExplosionHit,
    DeathOther,
    DeathFall,
    DeathByBear,
    DeathByWolf,
    DeathByExplosion,
    DeathByZombie,
    CombatLogout,
    Building,
    Mounted,
    Unmounted,
    RaisedFlag,
    BuiltBaseOn,
    Dismantle,
    Repaired,
    Packed,
    Placed,
    Folded,
    Teleported,
    Position,
    PlayerList,
    /// A rule loaded from the config file; carries the rule's name.
    Custom(IStr),
}

impl EventKind {
    /// Stable name used for report keys and per-kind counters.
    pub fn name(self) -> &'static str {
        use EventKind::*;
        match self {
            Connection => "connection",
            Disconnection => "disconnection",
            BannedConnection => "banned_connection",
            Unconscious => "unconscious",
            Conscious => "conscious",
            Suicide => "suicide",
            DeathStats => "death_stats",
            Bledout => "bledout",
            Respawn => "respawn",
            Emote => "emote",
            TripwireHit => "tripwire_hit",
            Hit => "hit",
            Kill => "kill",
            EnvHit => "env_hit",
            EnvHitSimple => "env_hit_simple",
            ExplosionHit => "explosion_hit",
            DeathOther => "death_other",
            DeathFall => "death_fall",
            DeathByBear => "death_by_bear",
            DeathByWolf => "death_by_wolf",
            DeathByExplosion => "death_by_explosion",
            DeathByZombie => "death_by_zombie",
            CombatLogout => "combat_logout",
            Building => "building",
            Mounted => "mounted",
            Unmounted => "unmounted",
            RaisedFlag => "raised_flag",
            BuiltBaseOn => "built_base_on",
            Dismantle => "dismantle",
            Repaired => "repaired",
            Packed => "packed",
            Placed => "placed",
            Folded => "folded",
            Teleported => "teleported",
            Position => "position",
            PlayerList => "player_list",
            Custom(name) => resolve(name),
        }
    }

    /// Deaths attributed to the player in per-player totals. Kill lines are
    /// excluded here (those count through combat records) and so are the
    /// `death_stats` trailers that accompany another death line.
    pub fn is_death(self) -> bool {
        use EventKind::*;
        matches!(
            self,
            Bledout
                | DeathOther
                | DeathFall
                | DeathByBear
                | DeathByWolf
                | DeathByExplosion
                | DeathByZombie
                | Suicide
        )
    }

    /// Base-building family, including deployment and packing of placeables.
    pub fn is_building(self) -> bool {
        use EventKind::*;
        matches!(
            self,
            Building
                | Mounted
                | Unmounted
                | RaisedFlag
                | BuiltBaseOn
                | Dismantle
                | Repaired
                | Packed
                | Placed
                | Folded
        )
    }
}

/// Payload that only some line shapes carry.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventDetails {
    #[default]
    None,
    /// Player-vs-player hit, seen from the victim's side of the line.
    Hit {
        attacker_name: IStr,
        attacker_id: IStr,
        attacker_pos: Option<Position>,
        victim_hp: f32,
        hit_location: IStr,
        damage: f32,
        ammo: IStr,
        weapon: IStr,
        distance: f32,
        /// Victim was at zero health or already marked dead on this line.
        lethal: bool,
    },
    /// Player-vs-player kill confirmation.
    Kill {
        attacker_name: IStr,
        attacker_id: IStr,
        attacker_pos: Option<Position>,
        weapon: IStr,
        distance: f32,
    },
    /// Hit by something that is not a player: infected, animal, explosion.
    Struck {
        source: IStr,
        weapon: IStr,
        hp: f32,
    },
    Tripwire {
        location_id: i32,
        damage: f32,
        hp: f32,
    },
    /// Death with the killer named by class rather than by player.
    DeathCause {
        /// Friendly label ("Bear", "Fall Damage") or the raw class name.
        attacker: IStr,
        /// Class name exactly as logged.
        killer: IStr,
        weapon: IStr,
    },
    DeathStats {
        water: f32,
        energy: f32,
        bleed_sources: u32,
    },
    Emote {
        gesture: IStr,
        item: IStr,
    },
    Building {
        action: IStr,
        structure: IStr,
        parent: IStr,
        tool: IStr,
    },
    Teleport {
        from: Option<Position>,
        to: Option<Position>,
        distance: f32,
        reason: IStr,
        restricted_area: Option<IStr>,
    },
    /// Positional captures from a config-supplied rule, in group order.
    Custom {
        captures: Vec<String>,
    },
}

/// One recognized log line. The player fields name whoever the line is
/// about; for hits and kills that is the victim.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvent {
    pub line_number: u64,
    pub timestamp: NaiveDateTime,
    pub player_name: IStr,
    pub player_id: IStr,
    pub kind: EventKind,
    pub position: Option<Position>,
    pub details: EventDetails,
}

/// A correlated combat record: either a surviving non-lethal hit or a kill
/// with the damage of its contributing hits folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct CombatRecord {
    pub timestamp: NaiveDateTime,
    pub attacker_name: IStr,
    pub attacker_id: IStr,
    pub victim_name: IStr,
    pub victim_id: IStr,
    pub weapon: IStr,
    pub damage: f32,
    pub hit_location: IStr,
    pub distance: f32,
    pub attacker_pos: Option<Position>,
    pub victim_pos: Option<Position>,
    pub kill: bool,
}

impl CombatRecord {
    pub fn attacker(&self) -> &'static str {
        resolve(self.attacker_name)
    }

    pub fn victim(&self) -> &'static str {
        resolve(self.victim_name)
    }
}

impl Default for CombatRecord {
    fn default() -> Self {
        Self {
            timestamp: NaiveDateTime::default(),
            attacker_name: empty_istr(),
            attacker_id: empty_istr(),
            victim_name: empty_istr(),
            victim_id: empty_istr(),
            weapon: empty_istr(),
            damage: 0.0,
            hit_location: empty_istr(),
            distance: 0.0,
            attacker_pos: None,
            victim_pos: None,
            kill: false,
        }
    }
}
