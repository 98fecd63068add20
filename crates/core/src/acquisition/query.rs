//! Search query variants for a title.

use crate::config::AcquisitionConfig;

/// Queries to try for a title, in order.
///
/// With a configured prefix or suffix the decorated name comes first,
/// otherwise the plain name. The last variant is always the name followed
/// by "update". Duplicates are dropped.
pub fn build_query_variants(title_name: &str, config: &AcquisitionConfig) -> Vec<String> {
    let name = clean_title(title_name);
    if name.is_empty() {
        return Vec::new();
    }

    let prefix = config.query_prefix.as_deref().map(str::trim).unwrap_or("");
    let suffix = config.query_suffix.as_deref().map(str::trim).unwrap_or("");

    let first = [prefix, name.as_str(), suffix]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    let mut variants = vec![first];
    let fallback = format!("{} update", name);
    if !variants.contains(&fallback) {
        variants.push(fallback);
    }
    variants
}

/// Strip trademark symbols and collapse whitespace.
fn clean_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '™' | '®' | '©'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_then_update() {
        let config = AcquisitionConfig::default();
        assert_eq!(
            build_query_variants("Super Game™", &config),
            vec!["Super Game", "Super Game update"]
        );
    }

    #[test]
    fn test_prefix_and_suffix() {
        let config = AcquisitionConfig {
            query_prefix: Some("NSW".to_string()),
            query_suffix: Some(" NSP ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            build_query_variants("Super   Game", &config),
            vec!["NSW Super Game NSP", "Super Game update"]
        );
    }

    #[test]
    fn test_suffix_update_is_not_repeated() {
        let config = AcquisitionConfig {
            query_suffix: Some("update".to_string()),
            ..Default::default()
        };
        assert_eq!(build_query_variants("Game", &config), vec!["Game update"]);
    }

    #[test]
    fn test_empty_name() {
        assert!(build_query_variants(" ® ", &AcquisitionConfig::default()).is_empty());
    }
}
