//! List stage: discover champions on a language's seed page.

use scraper::Html;
use url::Url;

use super::{last_segment, selector};

/// Repeated list-item block, one per champion.
const CHAMPION_BLOCK: &str = "li.item_30l8";

/// A champion discovered on a list page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedChampion {
    /// Stable code, the last path segment of the detail link.
    pub code: String,
    /// Absolute detail page URL.
    pub url: Url,
}

/// What a list page contained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Number of champion blocks, including blocks without a usable link.
    pub block_count: usize,
    /// Champions with a resolvable detail link, in page order.
    pub champions: Vec<ListedChampion>,
}

/// How the dispatcher should treat a list page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListDecision {
    /// More blocks than the previous run saw: filter and schedule detail fetches.
    Proceed,
    /// No blocks at all: the page failed to load, skip this language.
    Abandon,
    /// Blocks present but not more than last time: no new content.
    Exhausted,
}

impl ListDecision {
    /// Apply the termination heuristic to a block count.
    pub fn evaluate(block_count: usize, previous_count: usize) -> Self {
        if block_count > previous_count {
            ListDecision::Proceed
        } else if block_count == 0 {
            ListDecision::Abandon
        } else {
            ListDecision::Exhausted
        }
    }
}

/// Parse a fetched list page body.
pub fn parse(body: &str, page_url: &Url) -> ListPage {
    extract(&Html::parse_document(body), page_url)
}

/// Extract champion blocks from a list page.
pub fn extract(doc: &Html, page_url: &Url) -> ListPage {
    let block_sel = selector(CHAMPION_BLOCK);
    let link_sel = selector("a");

    let mut page = ListPage::default();
    for block in doc.select(&block_sel) {
        page.block_count += 1;

        let Some(href) = block
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let Some(code) = last_segment(href) else {
            continue;
        };
        let Ok(url) = page_url.join(href) else {
            continue;
        };

        page.champions.push(ListedChampion {
            code: code.to_string(),
            url,
        });
    }
    page
}
