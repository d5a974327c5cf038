use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use squares_engine::api::{HttpFetcher, ScoreLocator, ScoreRequest, ScoreSources};
use squares_engine::models::Sport;

const USAGE: &str =
    "usage: probe <score-url> [--periods N] [--slug LEAGUE_SLUG] [--sport football|basketball]";

struct ProbeArgs {
    url: String,
    periods: Option<u32>,
    slug: Option<String>,
    sport: Sport,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "probe=info,squares_engine=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&args)?;

    dotenvy::dotenv().ok();
    let api_base_url = env::var("ESPN_API_BASE_URL")
        .unwrap_or_else(|_| "https://site.api.espn.com/apis/site/v2/sports".to_string());

    let locator = ScoreLocator::parse(&args.url)?;
    let request = ScoreRequest::new(locator, args.sport, args.slug);

    let http = HttpFetcher::new(Duration::from_secs(15))?;
    let sources = ScoreSources::new(http, &api_base_url);

    info!("Probing {}", request.locator.as_str());
    let preview = sources.probe(&request, args.periods).await?;

    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}

fn parse_args(args: &[String]) -> Result<ProbeArgs> {
    let mut url = None;
    let mut periods = None;
    let mut slug = None;
    let mut sport = Sport::Football;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--periods" => {
                let value = iter.next().context(USAGE)?;
                periods = Some(value.parse().context("--periods must be a number")?);
            }
            "--slug" => {
                slug = Some(iter.next().context(USAGE)?.clone());
            }
            "--sport" => {
                let value = iter.next().context(USAGE)?;
                sport = Sport::parse(value).with_context(|| format!("unknown sport: {}", value))?;
            }
            "-h" | "--help" => bail!(USAGE),
            other if url.is_none() && !other.starts_with("--") => url = Some(other.to_string()),
            other => bail!("unexpected argument: {}\n{}", other, USAGE),
        }
    }

    Ok(ProbeArgs {
        url: url.context(USAGE)?,
        periods,
        slug,
        sport,
    })
}
