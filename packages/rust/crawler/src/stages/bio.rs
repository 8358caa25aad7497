//! Bio stage: long biography, hero image and the link to the story.

use scraper::Html;
use url::Url;

use super::{first_attr, first_outer_html};

/// Rich-text container shared by biography and story pages.
pub(crate) const LORE_BODY: &str = ".root_3nvd.dark_1RHo";
const HERO_IMAGE: &str = "div.image_3oOd.backgroundImage_5wQJ";
const HERO_IMAGE_ATTR: &str = "data-am-url";
const CONTINUE_LINK: &str = "a.root_K4Th";

/// Everything the biography page yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BioPage {
    /// Biography HTML fragment, empty if the container is missing.
    pub bio: String,
    /// Hero image source.
    pub image_url: Option<Url>,
    /// Story page, when the champion has one.
    pub story_url: Option<Url>,
}

pub fn extract(doc: &Html, page_url: &Url) -> BioPage {
    BioPage {
        bio: first_outer_html(doc, LORE_BODY).unwrap_or_default(),
        image_url: first_attr(doc, HERO_IMAGE, HERO_IMAGE_ATTR)
            .and_then(|src| page_url.join(&src).ok()),
        story_url: first_attr(doc, CONTINUE_LINK, "href")
            .and_then(|href| page_url.join(&href).ok()),
    }
}
