use url::Url;

use crate::error::LocatorError;
use crate::models::{Contest, Sport};

/// Upstream site family a locator points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteFamily {
    /// Structured API when the league has a slug, gamecast HTML otherwise
    Espn,
    /// Boxscore pages with a `linescore` table
    SportsReference,
}

const SPORTS_REFERENCE_HOSTS: &[&str] = &[
    "sports-reference.com",
    "pro-football-reference.com",
    "basketball-reference.com",
];

/// Validated score-source URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreLocator {
    url: Url,
    site: SiteFamily,
}

impl ScoreLocator {
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let url = Url::parse(raw.trim()).map_err(|_| LocatorError::Invalid(raw.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(LocatorError::Invalid(raw.to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| LocatorError::Invalid(raw.to_string()))?
            .to_ascii_lowercase();

        let site = if host_matches(&host, "espn.com") {
            SiteFamily::Espn
        } else if SPORTS_REFERENCE_HOSTS.iter().any(|d| host_matches(&host, d)) {
            SiteFamily::SportsReference
        } else {
            return Err(LocatorError::Unsupported(raw.to_string()));
        };

        Ok(Self { url, site })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn site(&self) -> SiteFamily {
        self.site
    }

    /// ESPN event id from a `gameId/<digits>` path segment or `gameId` query
    pub fn espn_event_id(&self) -> Option<u64> {
        if self.site != SiteFamily::Espn {
            return None;
        }

        let from_path = self.url.path_segments().and_then(|segments| {
            let segments: Vec<&str> = segments.collect();
            segments
                .windows(2)
                .find(|w| w[0].eq_ignore_ascii_case("gameid"))
                .and_then(|w| w[1].parse().ok())
        });

        from_path.or_else(|| {
            self.url
                .query_pairs()
                .find(|(k, _)| k.eq_ignore_ascii_case("gameid"))
                .and_then(|(_, v)| v.parse().ok())
        })
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Everything an adapter needs to fetch one contest's linescore
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub locator: ScoreLocator,
    pub sport: Sport,
    pub league_slug: Option<String>,
}

impl ScoreRequest {
    pub fn new(locator: ScoreLocator, sport: Sport, league_slug: Option<String>) -> Self {
        Self {
            locator,
            sport,
            league_slug: league_slug.filter(|s| !s.trim().is_empty()),
        }
    }

    /// Request for a contest, or `None` when it has no score URL
    pub fn for_contest(contest: &Contest) -> Option<Result<Self, LocatorError>> {
        let url = contest.score_url.as_deref().filter(|u| !u.trim().is_empty())?;

        Some(ScoreLocator::parse(url).map(|locator| {
            Self::new(
                locator,
                contest.league.sport,
                contest.league.espn_slug.clone(),
            )
        }))
    }
}
