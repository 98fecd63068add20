//! File selection inside multi-file torrents.
//!
//! Release packs often bundle the base title with every update. These
//! functions pick which entries to keep given a wanted version, using the
//! bracketed `[v<digits>]` tag in each file name.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Title versions advance by this much per published update.
pub const UPDATE_VERSION_STEP: u64 = 65536;

static VERSION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[v(\d+)\]").expect("version tag regex"));

static RUSSIAN_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])(?:rus|russian|ru)(?:[^a-z0-9]|$)").expect("locale regex")
});

static UPDATE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bupdate\s*#?\s*(\d+)\b").expect("update number regex"));

/// Parameters for [`select_files`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionParams {
    /// Keep exactly this version (ignored when 0).
    pub expected_version: Option<u64>,
    /// Keep exactly update N, i.e. version N * [`UPDATE_VERSION_STEP`].
    pub expected_update: Option<u32>,
    /// Drop files carrying a Russian locale marker before comparing versions.
    pub exclude_russian: bool,
}

/// Extract the `[vNNN]` tag from a file name.
pub fn extract_version(name: &str) -> Option<u64> {
    VERSION_TAG
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether a name is marked as a Russian localisation.
pub fn has_russian_marker(name: &str) -> bool {
    RUSSIAN_MARKER.is_match(name) || name.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c))
}

/// Parse an "Update N" hint out of a release or title name.
pub fn update_number_hint(name: &str) -> Option<u32> {
    UPDATE_NUMBER
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Return the indices of the files to keep.
///
/// An empty result means no candidate matched (or nothing carried a version
/// tag at all); callers must treat it as a failure, not as "keep everything".
pub fn select_files<S: AsRef<str>>(names: &[S], params: &SelectionParams) -> Vec<usize> {
    let tagged: Vec<(usize, u64)> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| !(params.exclude_russian && has_russian_marker(name.as_ref())))
        .filter_map(|(idx, name)| extract_version(name.as_ref()).map(|v| (idx, v)))
        .collect();

    if tagged.is_empty() {
        return Vec::new();
    }

    let wanted = match (params.expected_version, params.expected_update) {
        (Some(version), _) if version > 0 => version,
        (_, Some(update)) => u64::from(update) * UPDATE_VERSION_STEP,
        _ => match tagged.iter().map(|(_, v)| *v).max() {
            Some(max) => max,
            None => return Vec::new(),
        },
    };

    tagged
        .into_iter()
        .filter(|(_, v)| *v == wanted)
        .map(|(idx, _)| idx)
        .collect()
}

/// Indices of files without a Russian locale marker. Used as the courtesy
/// filter when a whole torrent is fetched.
pub fn without_russian<S: AsRef<str>>(names: &[S]) -> Vec<usize> {
    names
        .iter()
        .enumerate()
        .filter(|(_, name)| !has_russian_marker(name.as_ref()))
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACK: [&str; 3] = ["A [v0]", "A [v65536]", "A [v131072]"];

    #[test]
    fn test_extract_version() {
        assert_eq!(extract_version("Game [0100ABCD][v131072].nsp"), Some(131072));
        assert_eq!(extract_version("Game [V65536].nsz"), Some(65536));
        assert_eq!(extract_version("Game v65536.nsp"), None);
        assert_eq!(extract_version("Game [vX].nsp"), None);
    }

    #[test]
    fn test_highest_version_by_default() {
        let selected = select_files(&PACK, &SelectionParams::default());
        assert_eq!(selected, vec![2]);
    }

    #[test]
    fn test_explicit_version() {
        let params = SelectionParams {
            expected_version: Some(65536),
            ..Default::default()
        };
        assert_eq!(select_files(&PACK, &params), vec![1]);
    }

    #[test]
    fn test_absent_version_is_empty() {
        let params = SelectionParams {
            expected_version: Some(999999),
            ..Default::default()
        };
        assert!(select_files(&PACK, &params).is_empty());
    }

    #[test]
    fn test_zero_version_means_highest() {
        let params = SelectionParams {
            expected_version: Some(0),
            ..Default::default()
        };
        assert_eq!(select_files(&PACK, &params), vec![2]);
    }

    #[test]
    fn test_expected_update_number() {
        let params = SelectionParams {
            expected_update: Some(1),
            ..Default::default()
        };
        assert_eq!(select_files(&PACK, &params), vec![1]);

        let missing = SelectionParams {
            expected_update: Some(7),
            ..Default::default()
        };
        assert!(select_files(&PACK, &missing).is_empty());
    }

    #[test]
    fn test_explicit_version_wins_over_update_number() {
        let params = SelectionParams {
            expected_version: Some(131072),
            expected_update: Some(1),
            ..Default::default()
        };
        assert_eq!(select_files(&PACK, &params), vec![2]);
    }

    #[test]
    fn test_exclude_russian_falls_back_to_next_highest() {
        let names = [
            "Game [v0].nsp",
            "Game [v65536].nsp",
            "Game [RUS] [v131072].nsp",
        ];
        let params = SelectionParams {
            exclude_russian: true,
            ..Default::default()
        };
        assert_eq!(select_files(&names, &params), vec![1]);

        let keep_all = SelectionParams::default();
        assert_eq!(select_files(&names, &keep_all), vec![2]);
    }

    #[test]
    fn test_untagged_files_are_ignored() {
        let names = ["readme.txt", "Game [v65536].nsp", "cover.jpg"];
        assert_eq!(select_files(&names, &SelectionParams::default()), vec![1]);
    }

    #[test]
    fn test_no_tags_at_all_is_empty() {
        let names = ["Game.nsp", "Game Update.nsp"];
        assert!(select_files(&names, &SelectionParams::default()).is_empty());
    }

    #[test]
    fn test_duplicate_versions_all_kept() {
        let names = ["Game [v65536].nsp", "Game DLC [v65536].nsp", "Game [v0].nsp"];
        assert_eq!(select_files(&names, &SelectionParams::default()), vec![0, 1]);
    }

    #[test]
    fn test_russian_markers() {
        assert!(has_russian_marker("Game [RUS].nsp"));
        assert!(has_russian_marker("Game (ru) [v0].nsp"));
        assert!(has_russian_marker("Game_Russian_v0.nsp"));
        assert!(has_russian_marker("Игра [v0].nsp"));
        assert!(!has_russian_marker("Super Mario Run [v0].nsp"));
        assert!(!has_russian_marker("Truck Driver [v0].nsp"));
    }

    #[test]
    fn test_without_russian() {
        let names = ["a.nsp", "a [RUS].nsp", "b.nsp"];
        assert_eq!(without_russian(&names), vec![0, 2]);
    }

    #[test]
    fn test_update_number_hint() {
        assert_eq!(update_number_hint("Some Game Update 3"), Some(3));
        assert_eq!(update_number_hint("Some Game update #12"), Some(12));
        assert_eq!(update_number_hint("Some Game"), None);
    }
}
