//! Raw feed items → canonical [`Article`].
//!
//! Resolution order per field:
//! - id: guid, then link, then title + publish time (title + source when undated)
//! - title: item title, then "No title"
//! - link: item link, then a URL-shaped guid, then "#"
//! - published: item published, then updated, then the pass-wide `now`
//! - image: enclosure/media, then the first `<img src>` in the markup, then none

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use scraper::{Html, Selector};

use crate::model::{Article, HeadlineItem, RawItem};

pub const NO_TITLE: &str = "No title";
pub const NO_LINK: &str = "#";

/// Normalize one raw item. `now` must be captured once per aggregation pass.
pub fn normalize(raw: &RawItem, now: DateTime<Utc>) -> Article {
    match raw {
        RawItem::Syndicated { source, entry } => from_entry(source, entry, now),
        RawItem::Headline { source, item } => from_headline(source, item, now),
    }
}

fn from_entry(source: &str, entry: &Entry, now: DateTime<Utc>) -> Article {
    let guid = non_empty(Some(entry.id.as_str()));
    let supplied_date = entry.published.or(entry.updated);
    let title = non_empty(entry.title.as_ref().map(|t| t.content.as_str()))
        .map(|t| collapse_whitespace(&t))
        .unwrap_or_else(|| NO_TITLE.to_string());

    let link = entry
        .links
        .iter()
        .find_map(|l| non_empty(Some(l.href.as_str())))
        .or_else(|| guid.clone().filter(|g| g.starts_with("http://") || g.starts_with("https://")));

    let markup = entry
        .content
        .as_ref()
        .and_then(|c| non_empty(c.body.as_deref()))
        .or_else(|| non_empty(entry.summary.as_ref().map(|s| s.content.as_str())))
        .unwrap_or_default();

    let image = media_image(entry).or_else(|| embedded_image(&markup));

    Article {
        id: resolve_id(guid, link.as_deref(), &title, supplied_date, source),
        title,
        link: link.unwrap_or_else(|| NO_LINK.to_string()),
        published_at: supplied_date.unwrap_or(now),
        source: source.to_string(),
        raw_content: plain_text(&markup),
        image,
    }
}

fn from_headline(source: &str, item: &HeadlineItem, now: DateTime<Utc>) -> Article {
    let supplied_date = item.published_at.as_deref().and_then(parse_date);
    let title = non_empty(item.title.as_deref())
        .map(|t| collapse_whitespace(&t))
        .unwrap_or_else(|| NO_TITLE.to_string());
    let link = non_empty(item.url.as_deref());
    let source = item
        .source
        .as_ref()
        .and_then(|s| non_empty(s.name.as_deref()))
        .unwrap_or_else(|| source.to_string());

    let markup = non_empty(item.content.as_deref())
        .or_else(|| non_empty(item.description.as_deref()))
        .unwrap_or_default();

    let image = non_empty(item.url_to_image.as_deref()).or_else(|| embedded_image(&markup));

    Article {
        id: resolve_id(None, link.as_deref(), &title, supplied_date, &source),
        title,
        link: link.unwrap_or_else(|| NO_LINK.to_string()),
        published_at: supplied_date.unwrap_or(now),
        source,
        raw_content: plain_text(&markup),
        image,
    }
}

fn resolve_id(
    guid: Option<String>,
    link: Option<&str>,
    title: &str,
    supplied_date: Option<DateTime<Utc>>,
    source: &str,
) -> String {
    if let Some(guid) = guid {
        return guid;
    }
    if let Some(link) = link {
        return link.to_string();
    }
    match supplied_date {
        Some(date) => format!("{}|{}", title, date.to_rfc3339()),
        None => format!("{}|{}", title, source),
    }
}

fn media_image(entry: &Entry) -> Option<String> {
    let content = entry.media.iter().flat_map(|m| m.content.iter()).find_map(|c| {
        let is_image = c
            .content_type
            .as_ref()
            .map_or(true, |ct| ct.ty().as_str() == "image");
        c.url.as_ref().filter(|_| is_image).map(|u| u.to_string())
    });

    content.or_else(|| {
        entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .find_map(|t| non_empty(Some(t.image.uri.as_str())))
    })
}

/// First `<img src>` found in an HTML fragment.
pub fn embedded_image(markup: &str) -> Option<String> {
    if !markup.contains("<img") {
        return None;
    }
    let selector = Selector::parse("img[src]").ok()?;
    let fragment = Html::parse_fragment(markup);
    let found = fragment
        .select(&selector)
        .find_map(|img| non_empty(img.value().attr("src")));
    found
}

/// Text content of an HTML fragment with whitespace collapsed.
pub fn plain_text(markup: &str) -> String {
    if !markup.contains('<') {
        return collapse_whitespace(markup);
    }
    let fragment = Html::parse_fragment(markup);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|d| d.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::parse_syndicated;
    use crate::model::HeadlineSource;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn rss(items: &str) -> Vec<RawItem> {
        let doc = format!(
            r#"<?xml version="1.0"?>
            <rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
              <channel>
                <title>CBC | Canada News</title>
                <link>https://www.cbc.ca/news/canada</link>
                <description>test</description>
                {}
              </channel>
            </rss>"#,
            items
        );
        parse_syndicated(doc.as_bytes(), "https://www.cbc.ca/cmlink/rss-canada", None)
            .expect("parse rss")
    }

    #[test]
    fn full_item_maps_every_field() {
        let items = rss(
            r#"<item>
                 <title>Ottawa opens new transit line</title>
                 <link>https://www.cbc.ca/news/transit</link>
                 <guid isPermaLink="false">cbc-1.7000001</guid>
                 <pubDate>Sat, 28 Feb 2026 09:30:00 GMT</pubDate>
                 <description><![CDATA[<img src="https://i.cbc.ca/transit.jpg" /><p>The line opened on Saturday.</p>]]></description>
               </item>"#,
        );
        let article = normalize(&items[0], now());

        assert_eq!(article.id, "cbc-1.7000001");
        assert_eq!(article.title, "Ottawa opens new transit line");
        assert_eq!(article.link, "https://www.cbc.ca/news/transit");
        assert_eq!(
            article.published_at,
            Utc.with_ymd_and_hms(2026, 2, 28, 9, 30, 0).unwrap()
        );
        assert_eq!(article.source, "CBC | Canada News");
        assert_eq!(article.raw_content, "The line opened on Saturday.");
        assert_eq!(article.image.as_deref(), Some("https://i.cbc.ca/transit.jpg"));
    }

    #[test]
    fn missing_fields_get_fallbacks() {
        let items = rss("<item><description>Body only.</description></item>");
        let article = normalize(&items[0], now());

        assert_eq!(article.title, NO_TITLE);
        assert_eq!(article.link, NO_LINK);
        assert_eq!(article.published_at, now());
        assert_eq!(article.id, "No title|CBC | Canada News");
        assert_eq!(article.image, None);
    }

    #[test]
    fn id_falls_back_to_link_then_title_and_date() {
        let items = rss(
            r#"<item>
                 <title>Linked</title>
                 <link>https://www.cbc.ca/news/linked</link>
               </item>
               <item>
                 <title>Dated</title>
                 <pubDate>Sat, 28 Feb 2026 09:30:00 GMT</pubDate>
               </item>"#,
        );
        assert_eq!(normalize(&items[0], now()).id, "https://www.cbc.ca/news/linked");
        assert_eq!(
            normalize(&items[1], now()).id,
            "Dated|2026-02-28T09:30:00+00:00"
        );
    }

    #[test]
    fn enclosure_wins_over_embedded_markup() {
        let items = rss(
            r#"<item>
                 <title>Photo story</title>
                 <link>https://www.cbc.ca/news/photo</link>
                 <enclosure url="https://i.cbc.ca/enclosure.jpg" type="image/jpeg" length="1000" />
                 <description><![CDATA[<img src="https://i.cbc.ca/inline.jpg" />]]></description>
               </item>"#,
        );
        let article = normalize(&items[0], now());
        assert_eq!(article.image.as_deref(), Some("https://i.cbc.ca/enclosure.jpg"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let items = rss(
            r#"<item>
                 <title>  Spaced
                   title </title>
                 <description>Undated body.</description>
               </item>"#,
        );
        let first = normalize(&items[0], now());
        let second = normalize(&items[0], now());
        assert_eq!(first, second);
        assert_eq!(first.title, "Spaced title");
    }

    #[test]
    fn headline_items_use_their_own_source_name() {
        let raw = RawItem::Headline {
            source: "newsapi.example".to_string(),
            item: HeadlineItem {
                title: Some("Leafs win in overtime".to_string()),
                description: Some("<p>A late goal sealed it.</p>".to_string()),
                content: None,
                url: Some("https://example.com/leafs".to_string()),
                url_to_image: Some("https://example.com/leafs.jpg".to_string()),
                published_at: Some("2026-02-27T22:15:00Z".to_string()),
                source: Some(HeadlineSource {
                    id: None,
                    name: Some("Example Sports".to_string()),
                }),
            },
        };
        let article = normalize(&raw, now());

        assert_eq!(article.id, "https://example.com/leafs");
        assert_eq!(article.source, "Example Sports");
        assert_eq!(article.raw_content, "A late goal sealed it.");
        assert_eq!(article.image.as_deref(), Some("https://example.com/leafs.jpg"));
        assert_eq!(
            article.published_at,
            Utc.with_ymd_and_hms(2026, 2, 27, 22, 15, 0).unwrap()
        );
    }

    #[test]
    fn headline_with_bad_date_uses_now() {
        let raw = RawItem::Headline {
            source: "newsapi.example".to_string(),
            item: HeadlineItem {
                title: Some("Undated".to_string()),
                published_at: Some("yesterday-ish".to_string()),
                ..HeadlineItem::default()
            },
        };
        let article = normalize(&raw, now());
        assert_eq!(article.published_at, now());
        assert_eq!(article.source, "newsapi.example");
        assert_eq!(article.id, "Undated|newsapi.example");
    }

    #[test]
    fn plain_text_strips_markup() {
        assert_eq!(
            plain_text("<p>First paragraph.</p><p>Second   one.</p>"),
            "First paragraph. Second one."
        );
        assert_eq!(plain_text("  no markup\nhere "), "no markup here");
    }
}
