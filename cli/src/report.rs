//! Plain-text rendering of an analysis report. The JSON dump always carries
//! the full report; this view cuts the player table to the busiest rows.

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use admiral_core::{AnalysisReport, AnomalyReport, CombatStats, ParseSummary, PlayerMetrics};

const TABLE_ROWS: usize = 10;

pub fn render(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = summary_section(&mut out, &report.summary);
    let _ = players_section(&mut out, &report.players);
    let _ = combat_section(&mut out, &report.combat);
    let _ = anomaly_section(&mut out, &report.anomalies);
    out
}

fn summary_section(out: &mut String, summary: &ParseSummary) -> fmt::Result {
    writeln!(out, "=== Parse summary ===")?;
    writeln!(
        out,
        "files:    {} parsed, {} failed",
        summary.files_parsed, summary.files_failed
    )?;
    writeln!(
        out,
        "lines:    {} total, {} events, {} malformed, {} comments, {} out of range",
        summary.total_lines,
        summary.parsed_events,
        summary.malformed_lines,
        summary.comment_lines,
        summary.filtered_events
    )?;
    if let (Some(start), Some(end)) = (summary.start_time, summary.end_time) {
        writeln!(out, "window:   {start} .. {end}")?;
    }
    writeln!(
        out,
        "events:   {} connects, {} disconnects, {} deaths, {} combat, {} building, {} emotes, {} teleports",
        summary.connections,
        summary.disconnections,
        summary.deaths,
        summary.combat_events,
        summary.building_events,
        summary.emotes,
        summary.teleports
    )?;
    if !summary.malformed_samples.is_empty() {
        writeln!(out, "unparsed samples:")?;
        for sample in &summary.malformed_samples {
            writeln!(out, "  {sample}")?;
        }
    }
    Ok(())
}

fn players_section(out: &mut String, players: &BTreeMap<String, PlayerMetrics>) -> fmt::Result {
    writeln!(out, "\n=== Players ({}) ===", players.len())?;
    if players.is_empty() {
        return Ok(());
    }

    let mut rows: Vec<&PlayerMetrics> = players.values().collect();
    rows.sort_by(|a, b| b.total_playtime_hours.total_cmp(&a.total_playtime_hours));

    writeln!(
        out,
        "{:<24} {:>8} {:>7} {:>6} {:>7} {:>6} {:>10}",
        "Name", "Sessions", "Hours", "Kills", "Deaths", "K/D", "Dmg dealt"
    )?;
    writeln!(out, "{}", "-".repeat(74))?;
    for p in rows.iter().take(TABLE_ROWS) {
        writeln!(
            out,
            "{:<24} {:>8} {:>7.1} {:>6} {:>7} {:>6.2} {:>10.1}",
            clip(&p.name, 24),
            p.sessions,
            p.total_playtime_hours,
            p.kills,
            p.deaths + p.deaths_by_player,
            p.kd_ratio,
            p.damage_dealt
        )?;
    }
    if rows.len() > TABLE_ROWS {
        writeln!(out, "... and {} more (see --json)", rows.len() - TABLE_ROWS)?;
    }
    Ok(())
}

fn combat_section(out: &mut String, combat: &CombatStats) -> fmt::Result {
    writeln!(out, "\n=== Combat ===")?;
    writeln!(
        out,
        "events:   {} ({} kills)",
        combat.total_events, combat.total_kills
    )?;
    if combat.total_events == 0 {
        return Ok(());
    }
    writeln!(
        out,
        "averages: {:.1} damage per hit, {:.1} m engagement distance",
        combat.average_damage, combat.average_distance
    )?;

    let mut weapons: Vec<(&String, &u64)> = combat.weapon_usage.iter().collect();
    weapons.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    let line = join(weapons.iter().take(5).map(|(name, count)| format!("{name} ({count})")));
    writeln!(out, "weapons:  {line}")?;

    if !combat.hotspots.is_empty() {
        let line = join(
            combat
                .hotspots
                .iter()
                .take(5)
                .map(|h| format!("<{}, {}> x{}", h.x, h.y, h.count)),
        );
        writeln!(out, "hotspots: {line}")?;
    }
    if !combat.most_active.is_empty() {
        let line = join(
            combat
                .most_active
                .iter()
                .take(5)
                .map(|c| format!("{} ({} attacks, {} kills)", c.name, c.attacks, c.kills)),
        );
        writeln!(out, "active:   {line}")?;
    }
    Ok(())
}

fn anomaly_section(out: &mut String, anomalies: &AnomalyReport) -> fmt::Result {
    writeln!(out, "\n=== Anomalies ===")?;
    let total = anomalies.excessive_suicides.len()
        + anomalies.rapid_reconnects.len()
        + anomalies.high_damage_dealers.len();
    if total == 0 {
        writeln!(out, "none detected")?;
        return Ok(());
    }

    for a in &anomalies.excessive_suicides {
        writeln!(
            out,
            "suicides:   {} ({}) {} in session starting {} ({:.1}/h)",
            a.player_name, a.player_id, a.suicides, a.session_start, a.per_hour
        )?;
    }
    for a in &anomalies.rapid_reconnects {
        writeln!(
            out,
            "reconnects: {} ({}) {} rapid gaps across {} sessions",
            a.player_name, a.player_id, a.rapid_reconnects, a.sessions
        )?;
    }
    for a in &anomalies.high_damage_dealers {
        writeln!(
            out,
            "damage:     {} ({}) averaging {:.1} over {} hits",
            a.player_name, a.player_id, a.average_damage, a.hits
        )?;
    }
    Ok(())
}

fn clip(name: &str, max: usize) -> String {
    name.chars().take(max).collect()
}

fn join(parts: impl Iterator<Item = String>) -> String {
    parts.collect::<Vec<_>>().join(", ")
}
