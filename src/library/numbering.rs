use regex::Regex;
use std::sync::LazyLock;

/// The first run of 2-3 digits that is not directly preceded by a digit or
/// the season marker `S` (an optional `E`/`e` may sit in between) and is
/// followed by a non-digit.
static EPISODE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[^\dS]|^)[Ee]?(\d{2,3})\D").expect("episode number pattern is valid")
});

/// Extract the episode number from a file name or show-relative path.
///
/// `None` means the file is not an episode at all.
pub fn episode_number(name: &str) -> Option<u32> {
    EPISODE_NUMBER
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn is_episode(name: &str) -> bool {
    EPISODE_NUMBER.is_match(name)
}

/// `MM:SS` under an hour, `HH:MM:SS` from an hour on.
pub fn format_duration(total_seconds: u64) -> String {
    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// Always `HH:MM:SS`. Used for seek positions and chapter starts.
pub fn format_timestamp(total_seconds: u64) -> String {
    let h = total_seconds / 3600;
    let m = (total_seconds % 3600) / 60;
    let s = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Base name of `path` without its extension, passed through
/// [`sanitize_file_name`].
pub fn sanitize_file_stem(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    sanitize_file_name(stem)
}

/// Replace characters that are unsafe in file names by `_`, capped at 255
/// chars.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .take(255)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_marker_is_skipped() {
        assert_eq!(episode_number("Show.S01E07.mkv"), Some(7));
        assert_eq!(episode_number("Show.S02E113.mkv"), Some(113));
    }

    #[test]
    fn dash_separated_number() {
        assert_eq!(episode_number("Show - 07.mkv"), Some(7));
        assert_eq!(episode_number("[Group] Show - 124 [1080p].mkv"), Some(124));
    }

    #[test]
    fn leading_number() {
        assert_eq!(episode_number("01 - Pilot.mp4"), Some(1));
    }

    #[test]
    fn single_digit_or_trailing_run_is_not_an_episode() {
        assert_eq!(episode_number("Show - 7.mkv"), None);
        assert!(!is_episode("Movie.mkv"));
        // four digits never qualify as a 2-3 digit run
        assert_eq!(episode_number("Show 2004.mkv"), None);
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(45), "00:45");
        assert_eq!(format_duration(125), "02:05");
        assert_eq!(format_duration(3661), "01:01:01");
        assert_eq!(format_duration(0), "00:00");
    }

    #[test]
    fn timestamps() {
        assert_eq!(format_timestamp(0), "00:00:00");
        assert_eq!(format_timestamp(754), "00:12:34");
    }

    #[test]
    fn sanitize() {
        assert_eq!(sanitize_file_stem("/lib/Show/Ep: 01?.mkv"), "Ep_ 01_");
        assert_eq!(sanitize_file_stem("noext"), "noext");
        assert_eq!(sanitize_file_stem(".hidden"), ".hidden");
        assert_eq!(sanitize_file_name("Mr. Robot: S1"), "Mr. Robot_ S1");
    }
}
