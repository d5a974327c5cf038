use async_trait::async_trait;
use tracing::debug;

use super::html_table::{body_rows, cell_texts, leading_tag_name, scope_from_tag, tag_blocks, text};
use super::http::HttpFetcher;
use super::locator::ScoreRequest;
use super::ScoreSource;
use crate::error::ScrapeError;
use crate::models::{RawLinescore, UNPLAYED};

/// How a page signals that the contest is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalRule {
    /// Text of the element containing `marker` includes `final_text`;
    /// a page without that element is malformed
    ContainerText {
        marker: &'static str,
        final_text: &'static str,
    },
    /// The page carries no reliable status
    Undetectable,
}

/// Position of the linescore on a page family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinescoreLayout {
    pub name: &'static str,
    /// Text inside the tag that opens the region holding the table
    pub scope_marker: &'static str,
    /// Which table inside the scope
    pub table_index: usize,
    /// First period cell (earlier cells hold logos and team names)
    pub start_cell: usize,
    /// Cells after the last period (the total)
    pub trailing_cells: usize,
    pub final_rule: FinalRule,
}

/// ESPN gamecast pages
pub const ESPN_GAMECAST: LinescoreLayout = LinescoreLayout {
    name: "espn_html",
    scope_marker: "next-gen-gamecast",
    table_index: 0,
    start_cell: 1,
    trailing_cells: 1,
    final_rule: FinalRule::ContainerText {
        marker: "Gamestrip__Container",
        final_text: "Final",
    },
};

/// sports-reference boxscore pages
pub const SPORTS_REFERENCE: LinescoreLayout = LinescoreLayout {
    name: "sports_reference",
    scope_marker: "linescore",
    table_index: 0,
    start_cell: 2,
    trailing_cells: 1,
    final_rule: FinalRule::Undetectable,
};

/// HTML score source for one page layout
pub struct HtmlLinescoreSource {
    http: HttpFetcher,
    layout: LinescoreLayout,
}

impl HtmlLinescoreSource {
    pub fn new(http: HttpFetcher, layout: LinescoreLayout) -> Self {
        Self { http, layout }
    }

    pub fn espn(http: HttpFetcher) -> Self {
        Self::new(http, ESPN_GAMECAST)
    }

    pub fn sports_reference(http: HttpFetcher) -> Self {
        Self::new(http, SPORTS_REFERENCE)
    }
}

#[async_trait]
impl ScoreSource for HtmlLinescoreSource {
    fn name(&self) -> &'static str {
        self.layout.name
    }

    async fn fetch(&self, request: &ScoreRequest) -> Result<RawLinescore, ScrapeError> {
        let body = self.http.get_text(request.locator.as_str()).await?;
        debug!("Parsing {} linescore ({} bytes)", self.layout.name, body.len());
        parse_linescore(&body, &self.layout)
    }
}

/// Extract the linescore from a page; away is the first body row, home the second
pub fn parse_linescore(html: &str, layout: &LinescoreLayout) -> Result<RawLinescore, ScrapeError> {
    let table = scope_from_tag(html, layout.scope_marker)
        .and_then(|scope| tag_blocks(scope, "table").into_iter().nth(layout.table_index))
        .ok_or_else(|| ScrapeError::permanent("No linescore found in the response HTML"))?;

    let rows = body_rows(table);
    let away = rows.first().map(|r| period_cells(r, layout)).unwrap_or_default();
    let home = rows.get(1).map(|r| period_cells(r, layout)).unwrap_or_default();

    if away.is_empty() || home.is_empty() {
        return Err(ScrapeError::PreGame);
    }

    Ok(RawLinescore {
        away: away.iter().map(|c| parse_cell(c)).collect(),
        home: home.iter().map(|c| parse_cell(c)).collect(),
        is_final: detect_final(html, &layout.final_rule)?,
    })
}

fn period_cells(row: &str, layout: &LinescoreLayout) -> Vec<String> {
    let cells = cell_texts(row);
    if cells.len() < layout.start_cell + layout.trailing_cells {
        return Vec::new();
    }
    let end = cells.len() - layout.trailing_cells;
    cells[layout.start_cell..end].to_vec()
}

fn detect_final(html: &str, rule: &FinalRule) -> Result<bool, ScrapeError> {
    match rule {
        FinalRule::Undetectable => Ok(false),
        FinalRule::ContainerText { marker, final_text } => {
            let status = scope_from_tag(html, marker)
                .and_then(|scope| {
                    let tag = leading_tag_name(scope)?;
                    tag_blocks(scope, &tag).into_iter().next()
                })
                .map(text)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ScrapeError::permanent("No Gamestrip found in the response HTML"))?;

            Ok(status.contains(final_text))
        }
    }
}

/// Blank cells are unplayed; otherwise the leading integer, or 0 when there is none
pub fn parse_cell(cell: &str) -> i32 {
    let cell = cell.trim();
    if cell.is_empty() {
        return UNPLAYED;
    }

    let (sign, digits) = match cell.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, cell),
    };

    let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<i32>().map(|n| sign * n).unwrap_or(0)
}
