pub mod espn_api;
pub mod html_table;
pub mod http;
pub mod linescore_html;
pub mod locator;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ScrapeError;
use crate::models::{CanonicalScore, RawLinescore};
use crate::normalize::normalize;

pub use espn_api::EspnApiSource;
pub use http::HttpFetcher;
pub use linescore_html::{HtmlLinescoreSource, LinescoreLayout};
pub use locator::{ScoreLocator, ScoreRequest, SiteFamily};

/// Anything that can turn a score request into a raw linescore
#[async_trait]
pub trait ScoreSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, request: &ScoreRequest) -> Result<RawLinescore, ScrapeError>;
}

/// Linescore together with the source label recorded in the audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub raw: RawLinescore,
    pub source: &'static str,
}

/// Dry-run result for validating a locator before saving it
#[derive(Debug, Clone, Serialize)]
pub struct ProbePreview {
    pub source: &'static str,
    pub raw: RawLinescore,
    /// Present when the league's period count was supplied
    pub canonical: Option<CanonicalScore>,
}

/// Ordered sources to try for one request
struct SourcePlan {
    primary: (Arc<dyn ScoreSource>, &'static str),
    fallback: Option<(Arc<dyn ScoreSource>, &'static str)>,
}

/// The set of adapters, one per upstream shape
#[derive(Clone)]
pub struct ScoreSources {
    api: Arc<dyn ScoreSource>,
    espn_html: Arc<dyn ScoreSource>,
    sports_reference: Arc<dyn ScoreSource>,
}

impl ScoreSources {
    /// Production adapters sharing one HTTP client
    pub fn new(http: HttpFetcher, api_base_url: &str) -> Self {
        Self {
            api: Arc::new(EspnApiSource::new(http.clone(), api_base_url)),
            espn_html: Arc::new(HtmlLinescoreSource::espn(http.clone())),
            sports_reference: Arc::new(HtmlLinescoreSource::sports_reference(http)),
        }
    }

    pub fn from_parts(
        api: Arc<dyn ScoreSource>,
        espn_html: Arc<dyn ScoreSource>,
        sports_reference: Arc<dyn ScoreSource>,
    ) -> Self {
        Self {
            api,
            espn_html,
            sports_reference,
        }
    }

    fn plan(&self, request: &ScoreRequest) -> SourcePlan {
        match request.locator.site() {
            SiteFamily::Espn if request.league_slug.is_some() => SourcePlan {
                primary: (Arc::clone(&self.api), "espn_api"),
                fallback: Some((Arc::clone(&self.espn_html), "espn_html_fallback")),
            },
            SiteFamily::Espn => SourcePlan {
                primary: (Arc::clone(&self.espn_html), "espn_html"),
                fallback: None,
            },
            SiteFamily::SportsReference => SourcePlan {
                primary: (Arc::clone(&self.sports_reference), "sports_reference"),
                fallback: None,
            },
        }
    }

    /// Fetch once from the primary source, falling back once on a non-transient failure.
    ///
    /// Transient failures are returned as-is so the caller can retry.
    pub async fn fetch(&self, request: &ScoreRequest) -> Result<Fetched, ScrapeError> {
        let plan = self.plan(request);
        let (primary, label) = plan.primary;

        debug!("Fetching {} via {}", request.locator.as_str(), label);

        match primary.fetch(request).await {
            Ok(raw) => Ok(Fetched { raw, source: label }),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => match plan.fallback {
                Some((fallback, fallback_label)) => {
                    warn!(
                        "{} failed ({}), falling back to {} for {}",
                        primary.name(),
                        e,
                        fallback.name(),
                        request.locator.as_str()
                    );
                    let raw = fallback.fetch(request).await?;
                    Ok(Fetched {
                        raw,
                        source: fallback_label,
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Parse a locator without settling anything
    pub async fn probe(
        &self,
        request: &ScoreRequest,
        periods: Option<u32>,
    ) -> Result<ProbePreview, ScrapeError> {
        let fetched = self.fetch(request).await?;

        let canonical = match periods {
            Some(p) => Some(normalize(&fetched.raw, p)?),
            None => None,
        };

        Ok(ProbePreview {
            source: fetched.source,
            raw: fetched.raw,
            canonical,
        })
    }
}
