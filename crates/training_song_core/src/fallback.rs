//! crates/training_song_core/src/fallback.rs
//!
//! Hand-curated songs for year offsets that predate the chart provider's
//! historical coverage. The table keys on the integer year offset (0 = 1900);
//! offsets with no curated entry fall back to one universal default so the
//! caller always receives a song. No I/O ever happens here.

use crate::domain::ChartEntry;

/// Served whenever a pre-coverage offset has no curated entry.
pub const DEFAULT_SONG: (&str, &str) = ("Never Gonna Give You Up", "Rick Astley");

/// Curated `(year_offset, title, artist)` picks, mostly songs that pun on
/// their own offset.
const CURATED: &[(u32, &str, &str)] = &[
    (0, "Flight of the Bumblebee", "Nikolai Rimsky-Korsakov"),
    (1, "Number 1", "Tinchy Stryder"),
    (2, "The Entertainer", "Scott Joplin"),
    (4, "I'm A Yankee Doodle Dandy", "George M. Cohan"),
    (5, "5 Years Time", "Noah and the Whale"),
    (7, "7 Years", "Lukas Graham"),
    (13, "Rite of Spring", "Igor Stravinsky"),
    (21, "Someone Like You", "Adele"),
    (22, "22", "Taylor Swift"),
    (24, "24K Magic", "Bruno Mars"),
    (42, "42", "Coldplay"),
];

/// Looks up the curated pick for a year offset, if one exists.
pub fn curated(year_offset: u32) -> Option<(&'static str, &'static str)> {
    CURATED
        .iter()
        .find(|(offset, _, _)| *offset == year_offset)
        .map(|(_, title, artist)| (*title, *artist))
}

/// Returns the song for a pre-coverage year offset, curated or default.
pub fn fallback_entry(year_offset: u32) -> ChartEntry {
    let (title, artist) = curated(year_offset).unwrap_or(DEFAULT_SONG);
    ChartEntry {
        title: title.to_string(),
        artist: artist.to_string(),
        weeks_on_chart: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curated_offsets_return_their_pick() {
        assert_eq!(curated(22), Some(("22", "Taylor Swift")));
        assert_eq!(curated(0), Some(("Flight of the Bumblebee", "Nikolai Rimsky-Korsakov")));
        assert_eq!(curated(42), Some(("42", "Coldplay")));
    }

    #[test]
    fn uncurated_offsets_get_the_universal_default() {
        assert_eq!(curated(50), None);
        let entry = fallback_entry(50);
        assert_eq!(entry.title, "Never Gonna Give You Up");
        assert_eq!(entry.artist, "Rick Astley");
    }

    #[test]
    fn fallback_entry_prefers_the_curated_pick() {
        let entry = fallback_entry(22);
        assert_eq!(entry.title, "22");
        assert_eq!(entry.artist, "Taylor Swift");
        assert_eq!(entry.weeks_on_chart, 0);
    }
}
