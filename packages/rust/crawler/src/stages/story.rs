//! Story stage: the champion's short story.

use scraper::Html;

use super::bio::LORE_BODY;
use super::first_outer_html;

/// Story HTML fragment, empty if the container is missing.
pub fn extract(doc: &Html) -> String {
    first_outer_html(doc, LORE_BODY).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_markup() {
        let doc = Html::parse_document(
            r#"<div class="root_3nvd dark_1RHo"><h1>The Blade</h1><p>Once upon a time.</p></div>"#,
        );
        let story = extract(&doc);
        assert!(story.contains("<h1>The Blade</h1>"));
        assert!(story.contains("<p>Once upon a time.</p>"));
    }

    #[test]
    fn missing_container_is_empty() {
        assert_eq!(extract(&Html::parse_document("<p>404</p>")), "");
    }
}
