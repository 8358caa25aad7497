//! Stage extractors and the champion state machine.
//!
//! Each stage module is a set of pure functions from a fetched document to
//! extracted fields plus the URL of the next page. [`advance`] ties them into
//! a state machine over [`Stage`] so a continuation can be driven, and tested,
//! without a live scheduler.

pub mod bio;
pub mod detail;
pub mod list;
pub mod story;

use lorebook_shared::{ChampionRecord, FrontierEntry, LorebookError, PartialRecord, Result, Stage};
use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

pub use bio::BioPage;
pub use detail::DetailPage;
pub use list::{ListDecision, ListPage, ListedChampion};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Hero image the bio stage wants normalized before the champion continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Asset identity (the champion code).
    pub identity: String,
    /// Absolute source URL.
    pub url: Url,
}

/// Where a champion goes after one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Fetch another page with the grown record.
    Fetch {
        entry: FrontierEntry,
        partial: PartialRecord,
    },
    /// The record is complete and ready to persist.
    Done(ChampionRecord),
}

/// Outcome of running one stage on one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub next: Next,
    /// Side effect the controller must await before following `next`.
    pub image: Option<ImageRequest>,
}

/// Run the extractor for `entry.stage` on `body` and decide the next step.
///
/// List pages fan out to many champions and are handled by the dispatcher,
/// so passing a [`Stage::List`] entry is an error.
pub fn advance(entry: &FrontierEntry, partial: PartialRecord, body: &str) -> Result<Step> {
    let doc = Html::parse_document(body);

    match entry.stage {
        Stage::List => Err(LorebookError::validation(
            "list pages are dispatched, not advanced",
        )),
        Stage::Detail => {
            let page = detail::extract(&doc, &entry.url, &entry.lang, &partial.champion);
            if page.story_url_fabricated {
                warn!(
                    champion = %partial.champion,
                    lang = %entry.lang,
                    url = %page.story_url,
                    "no story link on detail page, using fabricated bio URL"
                );
            }
            Ok(Step {
                next: Next::Fetch {
                    entry: FrontierEntry::new(&entry.lang, page.story_url, Stage::Bio),
                    partial: partial.with_detail(page.fields),
                },
                image: None,
            })
        }
        Stage::Bio => {
            let page = bio::extract(&doc, &entry.url);
            let image = match page.image_url {
                Some(url) => Some(ImageRequest {
                    identity: partial.champion.clone(),
                    url,
                }),
                None => {
                    warn!(champion = %partial.champion, lang = %entry.lang, "bio page has no hero image");
                    None
                }
            };

            let partial = partial.with_bio(page.bio);
            let next = match page.story_url {
                Some(url) => Next::Fetch {
                    entry: FrontierEntry::new(&entry.lang, url, Stage::Story),
                    partial,
                },
                None => {
                    warn!(champion = %partial.champion, lang = %entry.lang, "no story for champion");
                    Next::Done(partial.with_story("").finish())
                }
            };
            Ok(Step { next, image })
        }
        Stage::Story => {
            let story = story::extract(&doc);
            Ok(Step {
                next: Next::Done(partial.with_story(story).finish()),
                image: None,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Selector helpers
// ---------------------------------------------------------------------------

/// Parse a selector from a literal.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

/// First non-blank text node directly inside `el`, trimmed.
pub(crate) fn own_text(el: ElementRef<'_>) -> Option<String> {
    el.children()
        .filter_map(|child| child.value().as_text())
        .map(|text| text.trim())
        .find(|text| !text.is_empty())
        .map(String::from)
}

/// Try each selector in order; the first one with a match carrying text wins.
pub(crate) fn first_text(doc: &Html, chain: &[&str]) -> Option<String> {
    chain.iter().find_map(|css| {
        let sel = selector(css);
        doc.select(&sel).find_map(own_text)
    })
}

/// First matching element's attribute value.
pub(crate) fn first_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = selector(css);
    doc.select(&sel)
        .find_map(|el| el.value().attr(attr))
        .map(String::from)
}

/// Outer HTML of the first matching element.
pub(crate) fn first_outer_html(doc: &Html, css: &str) -> Option<String> {
    let sel = selector(css);
    doc.select(&sel).next().map(|el| el.html())
}

/// Last non-empty path segment of an href (`/en_US/champions/aatrox/` -> `aatrox`).
pub(crate) fn last_segment(href: &str) -> Option<&str> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.split('/').filter(|s| !s.is_empty()).next_back()
}

/// All links in a document, resolved against the page URL, fragments stripped.
pub(crate) fn extract_links(doc: &Html, base_url: &Url) -> Vec<Url> {
    let link_sel = selector("a[href]");
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }

            if let Ok(mut resolved) = base_url.join(href) {
                resolved.set_fragment(None);
                links.push(resolved);
            }
        }
    }

    links
}
