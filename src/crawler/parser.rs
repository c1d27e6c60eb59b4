//! HTML parsing
//!
//! Parsing never fails: malformed markup is repaired by the html5ever tree
//! builder, and an empty or non-HTML body yields a document with no matches.

use scraper::Html;

/// Parses a fetched body into a queryable document
///
/// The returned `Html` is not `Send`; callers parse, route and apply the
/// handler output without crossing an await point.
///
/// # Example
///
/// ```
/// use pricewatch::crawler::parse_document;
/// use scraper::Selector;
///
/// let document = parse_document("<ul><li>1<li>2</ul>");
/// let li = Selector::parse("li").unwrap();
/// assert_eq!(document.select(&li).count(), 2);
/// ```
pub fn parse_document(body: &str) -> Html {
    Html::parse_document(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;

    #[test]
    fn test_empty_body_has_no_matches() {
        let document = parse_document("");
        let selector = Selector::parse("a").unwrap();
        assert_eq!(document.select(&selector).count(), 0);
    }

    #[test]
    fn test_non_html_body_is_tolerated() {
        let document = parse_document("{\"json\": true}");
        let selector = Selector::parse("div").unwrap();
        assert_eq!(document.select(&selector).count(), 0);
    }

    #[test]
    fn test_unclosed_tags_are_repaired() {
        let document = parse_document("<div class=item><h2>A<div class=item><h2>B");
        let selector = Selector::parse("div.item").unwrap();
        assert_eq!(document.select(&selector).count(), 2);
    }
}
