//! Ordered rule table that classifies raw admin log lines.
//!
//! Rules are tried strictly in registration order and the first match wins.
//! Several shapes are prefixes of others (a bare position line is a prefix
//! of almost everything), so the fallback rules sit at the end of the table
//! and config-supplied rules are appended after those.

use crate::adm_log::EventKind;
use crate::context::{CustomRule, intern};
use regex::Regex;
use tracing::error;

/// Every line the server writes opens with a bare wall clock.
const LINE_PREFIX: &str = r"^(?P<time>\d{2}:\d{2}:\d{2})\s*\|\s*";

pub struct Rule {
    pub kind: EventKind,
    pub regex: Regex,
}

fn compile_rule(kind: EventKind, fragment: &str) -> Result<Rule, regex::Error> {
    let mut pattern = String::with_capacity(LINE_PREFIX.len() + fragment.len());
    pattern.push_str(LINE_PREFIX);
    pattern.push_str(fragment);
    let regex = Regex::new(&pattern)?;
    Ok(Rule { kind, regex })
}

pub struct PatternRegistry {
    rules: Vec<Rule>,
    /// Loose secondary scan for construction lines whose primary captures
    /// came up empty.
    building_fallback: Regex,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self {
            rules: builtin_rules(),
            building_fallback: Regex::new(r"\)\s*(Built|Dismantled|placed) ([^\s]+)(?: with ([^\s]+))?")
                .expect("builtin pattern is valid"),
        }
    }

    /// Builtin table plus rules from the config file.
    pub fn with_custom_rules(custom: &[CustomRule]) -> Self {
        let mut registry = Self::new();
        registry.extend_from_config(custom);
        registry
    }

    /// Append config-supplied rules after the builtin table. The fragment is
    /// matched behind the standard clock prefix; a fragment that fails to
    /// compile is reported and dropped, never aborting the run.
    pub fn extend_from_config(&mut self, custom: &[CustomRule]) {
        for rule in custom {
            let kind = EventKind::Custom(intern(&rule.name));
            match compile_rule(kind, &rule.pattern) {
                Ok(compiled) => self.rules.push(compiled),
                Err(err) => error!("skipping custom rule {:?}: {err}", rule.name),
            }
        }
    }

    /// First structural match wins.
    pub fn classify<'t>(&self, line: &'t str) -> Option<(EventKind, regex::Captures<'t>)> {
        for rule in &self.rules {
            if let Some(caps) = rule.regex.captures(line) {
                return Some((rule.kind, caps));
            }
        }
        None
    }

    pub(crate) fn building_fallback(&self) -> &Regex {
        &self.building_fallback
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_rules() -> Vec<Rule> {
    use EventKind::*;
    // Table order is priority order. Banned connections must trail plain
    // disconnections, the five death shapes precede the generic ones, and
    // the bare position/player-list fallbacks go last.
    let table: [(EventKind, &str); 32] = [
        (
            Connection,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\)\s*is connected"#,
        ),
        (
            Disconnection,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\)\s*has been disconnected"#,
        ),
        (
            BannedConnection,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=Unknown\)\s*has been disconnected"#,
        ),
        (
            Unconscious,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*is unconscious"#,
        ),
        (
            Conscious,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*regained consciousness"#,
        ),
        (
            Suicide,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*(?:\(DEAD\)\s*)?\(id=(?P<player_id>[A-Fa-f0-9-]+)(?:\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>)?\)\s*committed suicide"#,
        ),
        (
            DeathStats,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(DEAD\)\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*died\.\s*Stats>\s*Water:\s*(?P<water>[0-9.]+)\s*Energy:\s*(?P<energy>[0-9.]+)\s*Bleed sources:\s*(?P<bleed_sources>\d+)"#,
        ),
        (
            Bledout,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(DEAD\)\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*bled out"#,
        ),
        (
            Respawn,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(DEAD\)\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*is choosing to respawn"#,
        ),
        (
            Emote,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*performed (?P<emote>[^\s]+)(?:\s+with\s+(?P<emote_item>[^\s]+))?"#,
        ),
        (
            TripwireHit,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\[HP:\s*(?P<hp>[0-9.]+)\]\s*hit by\s+TripwireTrap\s+into\s+\((?P<hit_location>-?\d+)\)\s+for\s+(?P<damage>[0-9.]+)\s+damage\s+\(TripWireHit\)"#,
        ),
        (
            Hit,
            r#"Player\s*"(?P<victim_name>[^"]+?)"\s*(?:\(DEAD\)\s*)?\(id=(?P<victim_id>[A-Fa-f0-9-]+)\s*pos=<(?P<victim_x>[0-9.-]+),\s*(?P<victim_y>[0-9.-]+),\s*(?P<victim_z>[0-9.-]+)>\)\s*\[HP:\s*(?P<victim_hp>[0-9.]+)\]\s*hit by Player\s*"(?P<attacker_name>[^"]+?)"\s*\(id=(?P<attacker_id>[A-Fa-f0-9-]+)\s*pos=<(?P<attacker_x>[0-9.-]+),\s*(?P<attacker_y>[0-9.-]+),\s*(?P<attacker_z>[0-9.-]+)>\)\s*into\s*(?P<hit_location>[^(]+)\((?P<hit_location_id>\d+)\)\s*for\s*(?P<damage>[0-9.]+)\s+damage\s*\((?P<ammo>[^)]+)\)(?:\s*with\s+(?P<weapon>[^\s]+)(?:\s+from\s+(?P<distance>[0-9.]+)\s+meters)?)?"#,
        ),
        (
            Kill,
            r#"Player\s*"(?P<victim_name>[^"]+?)"\s*\(DEAD\)\s*\(id=(?P<victim_id>[A-Fa-f0-9-]+)\s*pos=<(?P<victim_x>[0-9.-]+),\s*(?P<victim_y>[0-9.-]+),\s*(?P<victim_z>[0-9.-]+)>\)\s*killed by Player\s*"(?P<attacker_name>[^"]+?)"\s*\(id=(?P<attacker_id>[A-Fa-f0-9-]+)\s*pos=<(?P<attacker_x>[0-9.-]+),\s*(?P<attacker_y>[0-9.-]+),\s*(?P<attacker_z>[0-9.-]+)>\)\s*with\s*(?P<weapon>[^\s]+)\s*from\s*(?P<distance>[0-9.]+)\s+meters"#,
        ),
        (
            EnvHit,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\[HP:\s*(?P<hp>[0-9.]+)\]\s+hit by\s+(?P<attacker>[^\s]+)\s+with\s+(?P<weapon>[^\s]+)"#,
        ),
        (
            EnvHitSimple,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\[HP:\s*(?P<hp>[0-9.]+)\]\s*hit by\s+(?P<attacker>[^\s]+)$"#,
        ),
        (
            ExplosionHit,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*(?:\(DEAD\)\s*)?\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\[HP:\s*(?P<hp>[0-9.]+)\]\s+hit by explosion\s+\((?P<explosion_type>[^)]+)\)"#,
        ),
        (
            DeathOther,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(DEAD\)\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s+killed by\s+(?P<killer>[^\s]+)"#,
        ),
        (
            DeathFall,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(DEAD\)\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\[HP:\s*0\]\s+hit by\s+FallDamageHealth"#,
        ),
        (
            CombatLogout,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*is disconnecting while being unconscious"#,
        ),
        (
            Building,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*(?P<action>Built|Dismantled)\s+(?P<structure>[^\s]+)\s+(?P<on_or_from>on|from)\s+(?P<parent>[^\s]+)\s+with\s+(?P<tool>[^\s]+)$"#,
        ),
        (
            Mounted,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)Player\s+[^<]*<[^>]*>\s+(?P<action>Mounted)\s+(?P<structure>[^\s]+)\s+on\s+(?P<parent>.+)$"#,
        ),
        (
            Unmounted,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)Player\s+[^<]*<[^>]*>\s+(?P<action>Unmounted)\s+(?P<structure>[^\s]+)\s+from\s+(?P<parent>.+)$"#,
        ),
        (
            RaisedFlag,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s+has\s+(?P<action>raised)\s+(?P<structure>[^\s]+)\s+on\s+(?P<parent>[^\s]+)\s+at\s+<[0-9.-]+,\s*[0-9.-]+,\s*[0-9.-]+>$"#,
        ),
        (
            BuiltBaseOn,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)Built\s+(?P<action>base)\s+on\s+(?P<parent>[^\s]+)\s+with\s+(?P<tool>.+)$"#,
        ),
        (
            Dismantle,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)(?P<action>Dismantled)\s+(?P<structure>[^\s]+(?: [^\s]+)*)\s+from\s+(?P<parent>[^\s]+)\s+with\s+(?P<tool>.+)$"#,
        ),
        (
            Repaired,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*(?P<action>repaired)\s+(?P<structure>[^\s]+)\s+with\s+(?P<tool>[^\s]+)$"#,
        ),
        (
            Packed,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s+packed\s+(?P<structure>.+?)\s+with\s+(?P<tool>[^\s]+)$"#,
        ),
        (
            Placed,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s+placed\s+(?P<structure>.+)$"#,
        ),
        (
            Folded,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s+folded\s+(?P<structure>.+)$"#,
        ),
        (
            Teleported,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*was teleported from:\s*<(?P<from_x>[0-9.-]+),\s*(?P<from_y>[0-9.-]+),\s*(?P<from_z>[0-9.-]+)>\s*to:\s*<(?P<to_x>[0-9.-]+),\s*(?P<to_y>[0-9.-]+),\s*(?P<to_z>[0-9.-]+)>\.\s*Reason:\s*(?P<reason>.+)$"#,
        ),
        (
            Position,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)\s*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)\s*$"#,
        ),
        (
            PlayerList,
            r#"Player\s*"(?P<player_name>[^"]+?)"\s*\(DEAD\)\s*\(id=(?P<player_id>[A-Fa-f0-9-]+)[\s\)]*pos=<(?P<x>[0-9.-]+),\s*(?P<y>[0-9.-]+),\s*(?P<z>[0-9.-]+)>\)?\s*$"#,
        ),
    ];

    table
        .into_iter()
        .map(|(kind, fragment)| compile_rule(kind, fragment).expect("builtin pattern is valid"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::resolve;

    #[test]
    fn builtin_table_compiles() {
        let registry = PatternRegistry::new();
        assert_eq!(registry.len(), 32);
    }

    #[test]
    fn specific_shapes_win_over_position_fallback() {
        let registry = PatternRegistry::new();
        let (kind, _) = registry
            .classify(r#"12:00:01 | Player "Ann" (id=AB12-CD pos=<100.0, 200.0, 3.0>) is unconscious"#)
            .unwrap();
        assert_eq!(kind, EventKind::Unconscious);

        let (kind, _) = registry
            .classify(r#"12:00:02 | Player "Ann" (id=AB12-CD pos=<100.0, 200.0, 3.0>)"#)
            .unwrap();
        assert_eq!(kind, EventKind::Position);
    }

    #[test]
    fn unknown_id_disconnect_is_banned_connection() {
        let registry = PatternRegistry::new();
        let (kind, _) = registry
            .classify(r#"09:15:00 | Player "Griefer" (id=Unknown) has been disconnected"#)
            .unwrap();
        assert_eq!(kind, EventKind::BannedConnection);

        let (kind, _) = registry
            .classify(r#"09:15:01 | Player "Ok" (id=BEEF-01) has been disconnected"#)
            .unwrap();
        assert_eq!(kind, EventKind::Disconnection);
    }

    #[test]
    fn dead_position_line_is_player_list_not_position() {
        let registry = PatternRegistry::new();
        let (kind, _) = registry
            .classify(r#"13:37:00 | Player "Gone" (DEAD) (id=FE-99 pos=<1.0, 2.0, 3.0>)"#)
            .unwrap();
        assert_eq!(kind, EventKind::PlayerList);
    }

    #[test]
    fn custom_rules_append_after_builtins() {
        let custom = vec![CustomRule {
            name: "flag_capture".to_string(),
            pattern: r#"Territory flag "([^"]+)" captured by (\w+)"#.to_string(),
        }];
        let registry = PatternRegistry::with_custom_rules(&custom);
        assert_eq!(registry.len(), 33);

        let (kind, _) = registry
            .classify(r#"18:00:00 | Territory flag "North" captured by Raiders"#)
            .unwrap();
        match kind {
            EventKind::Custom(name) => assert_eq!(resolve(name), "flag_capture"),
            other => panic!("expected custom kind, got {other:?}"),
        }
    }

    #[test]
    fn invalid_custom_rule_is_dropped() {
        let custom = vec![
            CustomRule {
                name: "broken".to_string(),
                pattern: r"(unclosed".to_string(),
            },
            CustomRule {
                name: "fine".to_string(),
                pattern: r"server restart in (\d+) minutes".to_string(),
            },
        ];
        let registry = PatternRegistry::with_custom_rules(&custom);
        assert_eq!(registry.len(), 33);
        assert!(
            registry
                .classify("23:50:00 | server restart in 10 minutes")
                .is_some()
        );
    }

    #[test]
    fn lines_without_clock_prefix_never_match() {
        let registry = PatternRegistry::new();
        assert!(registry.classify(r#"Player "Ann" (id=AB12-CD) is connected"#).is_none());
        assert!(registry.classify("").is_none());
    }
}
