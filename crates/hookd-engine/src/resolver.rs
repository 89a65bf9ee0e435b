//! Package resolution and application search ranking

use hookd_core::prelude::*;
use hookd_core::ApplicationInfo;

use crate::instrument::InstrumentDevice;

/// Maximum number of suggestions returned for an ambiguous identifier
pub const MAX_SUGGESTIONS: usize = 5;

/// Outcome of resolving a user-supplied application identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Unambiguous match; the identifier uses on-device casing
    Canonical(String),

    /// Candidates whose identifier contains the query, in enumeration order
    Suggestions(Vec<ApplicationInfo>),

    NotFound,
}

/// Resolve `query` against the device's installed applications.
///
/// Read-only: enumerates applications and matches, no device mutation.
pub async fn resolve<D>(device: &D, query: &str) -> Result<Resolution>
where
    D: InstrumentDevice + Sync,
{
    let apps = device.enumerate_applications().await?;
    Ok(resolve_in(&apps, query))
}

/// Pure resolution against an already-enumerated application list.
///
/// A case-insensitive exact identifier match wins outright. Otherwise up to
/// [`MAX_SUGGESTIONS`] case-insensitive substring matches are returned,
/// ranked only by enumeration order.
pub fn resolve_in(apps: &[ApplicationInfo], query: &str) -> Resolution {
    let query_lower = query.to_lowercase();

    if let Some(exact) = apps
        .iter()
        .find(|app| app.identifier.to_lowercase() == query_lower)
    {
        return Resolution::Canonical(exact.identifier.clone());
    }

    let suggestions: Vec<ApplicationInfo> = apps
        .iter()
        .filter(|app| app.identifier.to_lowercase().contains(&query_lower))
        .take(MAX_SUGGESTIONS)
        .cloned()
        .collect();

    if suggestions.is_empty() {
        Resolution::NotFound
    } else {
        Resolution::Suggestions(suggestions)
    }
}

/// Rank the full application list for a search query.
///
/// Tiers: exact identifier match, exact name match, identifier substring
/// match, then everything else. All comparisons are case-insensitive and
/// each tier preserves enumeration order. An empty query returns the list
/// unfiltered and unranked.
pub fn rank_applications(apps: Vec<ApplicationInfo>, query: &str) -> Vec<ApplicationInfo> {
    if query.is_empty() {
        return apps;
    }

    let query_lower = query.to_lowercase();

    let mut exact_identifier = Vec::new();
    let mut exact_name = Vec::new();
    let mut identifier_substring = Vec::new();
    let mut rest = Vec::new();

    for app in apps {
        if app.identifier.to_lowercase() == query_lower {
            exact_identifier.push(app);
        } else if app.name.to_lowercase() == query_lower {
            exact_name.push(app);
        } else if app.identifier.to_lowercase().contains(&query_lower) {
            identifier_substring.push(app);
        } else {
            rest.push(app);
        }
    }

    exact_identifier.extend(exact_name);
    exact_identifier.extend(identifier_substring);
    exact_identifier.extend(rest);
    exact_identifier
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str, identifier: &str) -> ApplicationInfo {
        ApplicationInfo::new(name, identifier)
    }

    fn sample_apps() -> Vec<ApplicationInfo> {
        vec![
            app("Browser", "com.android.browser"),
            app("Example", "com.Example.App"),
            app("Examples Gallery", "com.example.gallery"),
            app("Settings", "com.android.settings"),
        ]
    }

    #[test]
    fn test_exact_match_wins_over_substring() {
        // "com.example.app" matches com.Example.App exactly (ci) even though
        // com.example.gallery also contains shared prefixes
        let resolution = resolve_in(&sample_apps(), "com.example.app");
        assert_eq!(
            resolution,
            Resolution::Canonical("com.Example.App".to_string())
        );
    }

    #[test]
    fn test_exact_match_preserves_on_device_casing() {
        let resolution = resolve_in(&sample_apps(), "COM.EXAMPLE.APP");
        assert_eq!(
            resolution,
            Resolution::Canonical("com.Example.App".to_string())
        );
    }

    #[test]
    fn test_substring_matches_become_suggestions() {
        let resolution = resolve_in(&sample_apps(), "example");
        match resolution {
            Resolution::Suggestions(suggestions) => {
                assert_eq!(suggestions.len(), 2);
                // Enumeration order preserved
                assert_eq!(suggestions[0].identifier, "com.Example.App");
                assert_eq!(suggestions[1].identifier, "com.example.gallery");
            }
            other => panic!("expected suggestions, got {:?}", other),
        }
    }

    #[test]
    fn test_suggestions_capped() {
        let apps: Vec<ApplicationInfo> = (0..10)
            .map(|i| app(&format!("App {}", i), &format!("com.vendor.app{}", i)))
            .collect();

        match resolve_in(&apps, "vendor") {
            Resolution::Suggestions(suggestions) => {
                assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
                assert_eq!(suggestions[0].identifier, "com.vendor.app0");
            }
            other => panic!("expected suggestions, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found() {
        assert_eq!(resolve_in(&sample_apps(), "org.mozilla"), Resolution::NotFound);
    }

    #[test]
    fn test_rank_four_tiers() {
        let apps = vec![
            app("Other", "com.bar"),
            app("Gallery", "com.foobar"),
            app("Foo", "com.launcher"),
            app("Shell", "Foo"),
        ];

        let ranked = rank_applications(apps, "foo");

        // Exact identifier, exact name, identifier substring, rest
        assert_eq!(ranked[0].identifier, "Foo");
        assert_eq!(ranked[1].name, "Foo");
        assert_eq!(ranked[2].identifier, "com.foobar");
        assert_eq!(ranked[3].identifier, "com.bar");
    }

    #[test]
    fn test_rank_tiers_preserve_enumeration_order() {
        let apps = vec![
            app("A", "com.foo.one"),
            app("B", "com.foo.two"),
            app("C", "com.other"),
        ];

        let ranked = rank_applications(apps, "foo");
        assert_eq!(ranked[0].identifier, "com.foo.one");
        assert_eq!(ranked[1].identifier, "com.foo.two");
        assert_eq!(ranked[2].identifier, "com.other");
    }

    #[test]
    fn test_rank_empty_query_returns_all_unfiltered() {
        let apps = sample_apps();
        let ranked = rank_applications(apps.clone(), "");
        assert_eq!(ranked, apps);
    }
}
