use chrono::NaiveDate;
use std::fs;
use std::io::Result;
use std::path::{Path, PathBuf};
use tracing::error;

/// Collect `.ADM` files in a directory, sorted by filename so rotated logs
/// replay in the order the server wrote them.
pub fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("adm"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Expand a mixed list of files and directories into one ordered file list.
/// Directories contribute their `.ADM` files; explicit files pass through
/// untouched, whatever their extension. A directory that cannot be read is
/// reported and skipped so the rest of the batch still runs.
pub fn expand_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            match scan_directory(input) {
                Ok(found) => files.extend(found),
                Err(err) => error!("cannot scan {}: {err}", input.display()),
            }
        } else {
            files.push(input.clone());
        }
    }
    files
}

/// Pull a calendar date out of a rotated log filename, e.g.
/// `DayZServer_X1_x64_2024-03-01_10-30-45.ADM`. Returns the first
/// `YYYY-MM-DD` run that is a real date.
pub fn date_from_filename(filename: &str) -> Option<NaiveDate> {
    let bytes = filename.as_bytes();
    for start in 0..bytes.len().saturating_sub(9) {
        let window = &bytes[start..start + 10];
        let shape_ok = window.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
        // Window is pure ASCII when the shape matches, so slicing is safe
        if shape_ok
            && let Ok(date) = NaiveDate::parse_from_str(&filename[start..start + 10], "%Y-%m-%d")
        {
            return Some(date);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_date_from_rotated_log() {
        let date = date_from_filename("DayZServer_X1_x64_2024-03-01_10-30-45.ADM");
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn filename_without_date() {
        assert_eq!(date_from_filename("server.ADM"), None);
        assert_eq!(date_from_filename(""), None);
    }

    #[test]
    fn filename_date_skips_impossible_dates() {
        // Shape matches but month 13 is not a date; scan moves on
        assert_eq!(date_from_filename("log_2024-13-01.ADM"), None);
        let date = date_from_filename("a_2024-13-01_b_2025-06-30.ADM");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 6, 30));
    }
}
