//! Free-text location to IANA timezone lookup.

use chrono_tz::Tz;

/// Maps a user-supplied location string to a timezone, if any matches.
pub trait TimezoneResolver: Send + Sync {
    fn resolve(&self, location: &str) -> Option<Tz>;
}

/// Substring scan over the IANA zone table.
///
/// The needle is lowercased and spaces become underscores, so "new york"
/// finds `America/New_York`. Of the first 20 matching zones the last one
/// wins, which tends to prefer the more specific `Region/City` entries over
/// bare aliases.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZoneTableResolver;

impl TimezoneResolver for ZoneTableResolver {
    fn resolve(&self, location: &str) -> Option<Tz> {
        let needle = location.trim().to_lowercase().replace(' ', "_");
        if needle.is_empty() {
            return None;
        }
        chrono_tz::TZ_VARIANTS
            .iter()
            .filter(|tz| tz.name().to_lowercase().contains(&needle))
            .take(20)
            .last()
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_city_with_space() {
        let tz = ZoneTableResolver.resolve("new york");
        assert_eq!(tz, Some(chrono_tz::America::New_York));
    }

    #[test]
    fn resolves_plain_city() {
        let tz = ZoneTableResolver.resolve("Tokyo");
        assert_eq!(tz, Some(chrono_tz::Asia::Tokyo));
    }

    #[test]
    fn unknown_location_is_none() {
        assert_eq!(ZoneTableResolver.resolve("atlantis"), None);
        assert_eq!(ZoneTableResolver.resolve("   "), None);
    }
}
