//! Detail stage: the champion's profile page.

use lorebook_shared::DetailFields;
use scraper::Html;
use url::Url;

use super::{extract_links, first_attr, first_text, last_segment, own_text, selector};
use crate::text::{clean_quote, clean_text, title_case};

const TITLE: &[&str] = &["h3.subheadline_rlsJ"];
const ROLE: &[&str] = &[".typeDescription_ixWu h6 span", ".typeDescription_ixWu h6"];
const RACE: &[&str] = &[".race_3k58 h6 span", ".race_3k58 h6"];
const REGION: &[&str] = &[".factionText_EnRL h6 span"];
const REGION_LINK: &str = "a.link_3m7v";
const QUOTE: &[&str] = &["li.quote_2507 p", "li.quote_2507 p i"];
const SHORT_BIO: &[&str] = &[
    ".biographyText_3-to p",
    ".biographyText_3-to",
    ".biographyText_3-to p i",
];
const RELATED_ITEM: &str = "ul.champions_jmhN li";
const RELATED_NAME: &str = "a h5";

/// Separator between the champion name and the site name in `<title>`.
const TITLE_SEPARATOR: &str = " - ";

/// Everything the detail page yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPage {
    pub fields: DetailFields,
    /// URL of the biography page.
    pub story_url: Url,
    /// True when no story link was found and `story_url` was built from a template.
    pub story_url_fabricated: bool,
}

/// Extract profile fields and the biography link.
pub fn extract(doc: &Html, page_url: &Url, lang: &str, champion: &str) -> DetailPage {
    let name = first_text(doc, &["title"])
        .map(|t| {
            t.split(TITLE_SEPARATOR)
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
        .unwrap_or_default();

    let region = first_text(doc, REGION)
        .or_else(|| {
            first_attr(doc, REGION_LINK, "href")
                .and_then(|href| last_segment(&href).map(title_case))
        })
        .unwrap_or_default();

    let fields = DetailFields {
        title: first_text(doc, TITLE).unwrap_or_default(),
        role: first_text(doc, ROLE).unwrap_or_default(),
        race: first_text(doc, RACE).unwrap_or_default(),
        region,
        quote: first_text(doc, QUOTE)
            .map(|q| clean_quote(&q))
            .unwrap_or_default(),
        short_bio: first_text(doc, SHORT_BIO)
            .map(|b| clean_text(&b))
            .unwrap_or_default(),
        related_champions: related_champions(doc),
        name,
    };

    let (story_url, story_url_fabricated) = match find_story_link(doc, page_url, lang) {
        Some(url) => (url, false),
        None => (fabricate_story_url(page_url, lang, &fields.name, champion), true),
    };

    DetailPage {
        fields,
        story_url,
        story_url_fabricated,
    }
}

/// Related champion names in page order, empty entries dropped.
fn related_champions(doc: &Html) -> Vec<String> {
    let item_sel = selector(RELATED_ITEM);
    let name_sel = selector(RELATED_NAME);

    doc.select(&item_sel)
        .filter_map(|item| item.select(&name_sel).find_map(own_text))
        .collect()
}

/// First outbound link under `/<lang>/story/`.
fn find_story_link(doc: &Html, page_url: &Url, lang: &str) -> Option<Url> {
    let prefix = format!("/{lang}/story/");
    extract_links(doc, page_url)
        .into_iter()
        .find(|link| link.path().starts_with(&prefix))
}

/// Best-effort biography URL: `/<lang>/story/champion/<lower-cased name>/`.
fn fabricate_story_url(page_url: &Url, lang: &str, name: &str, champion: &str) -> Url {
    let slug = if name.is_empty() {
        champion.to_lowercase()
    } else {
        name.to_lowercase()
    };
    page_url
        .join(&format!("/{lang}/story/champion/{slug}/"))
        .unwrap_or_else(|_| page_url.clone())
}
