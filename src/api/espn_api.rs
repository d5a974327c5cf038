use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http::HttpFetcher;
use super::locator::ScoreRequest;
use super::ScoreSource;
use crate::error::ScrapeError;
use crate::models::RawLinescore;

/// Structured score source backed by ESPN's summary API.
///
/// Endpoint: `{base}/{sport}/{league}/summary?event={event_id}`
pub struct EspnApiSource {
    http: HttpFetcher,
    base_url: String,
}

/// Summary API response (only the parts we read)
#[derive(Debug, Deserialize)]
struct SummaryResponse {
    header: Option<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    competitions: Vec<Competition>,
}

#[derive(Debug, Deserialize)]
struct Competition {
    status: Option<Status>,
    competitors: Option<Vec<Competitor>>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(rename = "type")]
    kind: Option<StatusType>,
}

#[derive(Debug, Deserialize)]
struct StatusType {
    state: Option<String>,
    completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Competitor {
    home_away: Option<String>,
    #[serde(default)]
    linescores: Vec<PeriodLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeriodLine {
    display_value: Option<String>,
    value: Option<f64>,
}

impl EspnApiSource {
    /// Create a new API source
    pub fn new(http: HttpFetcher, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Summary URL for a request; needs a league slug and an event id
    pub fn summary_url(&self, request: &ScoreRequest) -> Result<String, ScrapeError> {
        let slug = request
            .league_slug
            .as_deref()
            .ok_or_else(|| ScrapeError::permanent("League has no ESPN slug"))?;

        let event_id = request.locator.espn_event_id().ok_or_else(|| {
            ScrapeError::permanent(format!(
                "No ESPN game id in {}",
                request.locator.as_str()
            ))
        })?;

        Ok(format!(
            "{}/{}/{}/summary?event={}",
            self.base_url,
            urlencoding::encode(request.sport.as_str()),
            urlencoding::encode(slug),
            event_id
        ))
    }
}

#[async_trait]
impl ScoreSource for EspnApiSource {
    fn name(&self) -> &'static str {
        "espn_api"
    }

    async fn fetch(&self, request: &ScoreRequest) -> Result<RawLinescore, ScrapeError> {
        let url = self.summary_url(request)?;
        debug!("Fetching ESPN summary: {}", url);

        let body = self.http.get_text(&url).await?;
        parse_summary(&body)
    }
}

/// Extract the linescore from a summary API body
pub fn parse_summary(body: &str) -> Result<RawLinescore, ScrapeError> {
    let summary: SummaryResponse = serde_json::from_str(body)
        .map_err(|e| ScrapeError::permanent(format!("ESPN API returned invalid JSON: {}", e)))?;

    let competition = summary
        .header
        .and_then(|h| h.competitions.into_iter().next())
        .ok_or_else(|| ScrapeError::permanent("No competition data in ESPN API response"))?;

    let status = competition.status.and_then(|s| s.kind);

    // Pre-game: no linescores yet
    if status.as_ref().and_then(|s| s.state.as_deref()) == Some("pre") {
        return Ok(RawLinescore::default());
    }

    let competitors = competition
        .competitors
        .filter(|c| c.len() >= 2)
        .ok_or_else(|| ScrapeError::permanent("No competitors in ESPN API response"))?;

    let side = |which: &str| {
        competitors
            .iter()
            .find(|c| c.home_away.as_deref() == Some(which))
    };

    let (away, home) = match (side("away"), side("home")) {
        (Some(away), Some(home)) => (away, home),
        _ => {
            return Err(ScrapeError::permanent(
                "Cannot identify home/away teams in ESPN API response",
            ))
        }
    };

    Ok(RawLinescore {
        away: period_scores(away),
        home: period_scores(home),
        is_final: status.and_then(|s| s.completed).unwrap_or(false),
    })
}

fn period_scores(competitor: &Competitor) -> Vec<i32> {
    competitor
        .linescores
        .iter()
        .map(|line| {
            line.display_value
                .as_deref()
                .and_then(|v| v.trim().parse::<i32>().ok())
                .or_else(|| line.value.map(|v| v as i32))
                .unwrap_or(0)
        })
        .collect()
}
