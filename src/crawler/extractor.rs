//! Page extraction for each level of the directory
//!
//! This module turns a canonical page into the typed links of its children:
//! - Catalog, category and subcategory pages list their children in tiered
//!   list containers (`ul.first`, `ul.second`, `ul.third`)
//! - Category pages additionally list departments as `li.seo-departement`
//! - Listing pages link to record detail sheets (`fiche-detaillee-...`)
//! - Detail pages carry the address and phone of one record
//!
//! Extraction is pure: no I/O and no state between calls.

use crate::storage::Level;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Anchors inside the three list tiers
const TIER_ANCHORS: &str = "ul.first a[href], ul.second a[href], ul.third a[href]";

/// Tier anchors plus department items
const CATEGORY_ANCHORS: &str =
    "ul.first a[href], ul.second a[href], ul.third a[href], li.seo-departement a[href]";

/// Links to record detail sheets, kept only when they carry a structured name
const DETAIL_ANCHORS: &str = r#"a[href*="fiche-detaillee-"]"#;

const ADDRESS_BLOCK: &str = ".adresse";
const PHONE_BLOCK: &str = ".tel";

/// The kind of page being extracted, named after the node it describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// Root page listing every category
    Catalog,
    /// A category page listing its subcategories
    Category,
    /// A subcategory page listing its listings
    Subcategory,
    /// A listing page linking to record detail sheets
    Listing,
}

impl PageKind {
    /// The page kind whose children belong to `level`
    pub fn parent_of(level: Level) -> Self {
        match level {
            Level::Category => Self::Catalog,
            Level::Subcategory => Self::Category,
            Level::Listing => Self::Subcategory,
        }
    }
}

/// A child link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLink {
    /// Entity-decoded, whitespace-collapsed label
    pub name: String,
    /// Absolute URL
    pub url: String,
}

/// Fields read from a record detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDetails {
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
}

/// Pluggable page extraction
///
/// An empty result from [`extract_children`](Extractor::extract_children)
/// means the page has no children; it is not an error.
pub trait Extractor: Send + Sync {
    /// Returns the child links of a page, in document order
    fn extract_children(&self, page: &str, kind: PageKind) -> Vec<ChildLink>;

    /// Reads the details of a record from its detail page
    fn extract_record(&self, page: &str) -> RecordDetails;
}

/// Extractor for the directory site's markup
#[derive(Debug, Clone)]
pub struct SiteExtractor {
    base: Url,
}

impl SiteExtractor {
    /// Creates an extractor resolving links against `base`
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// Selects anchors matching `css`, labels them, and keeps the first
    /// occurrence of each URL
    ///
    /// Anchors whose `label` is None are not children.
    fn anchors(
        &self,
        document: &Html,
        css: &str,
        label: fn(ElementRef<'_>) -> Option<String>,
    ) -> Vec<ChildLink> {
        let Ok(selector) = Selector::parse(css) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        document
            .select(&selector)
            .filter_map(|anchor| {
                let href = anchor.value().attr("href")?;
                let url = resolve_link(href, &self.base)?;
                let mut name = label(anchor)?;
                if name.is_empty() {
                    name = slug_label(&url);
                }
                Some(ChildLink { name, url })
            })
            .filter(|link| seen.insert(link.url.clone()))
            .collect()
    }
}

impl Extractor for SiteExtractor {
    fn extract_children(&self, page: &str, kind: PageKind) -> Vec<ChildLink> {
        let document = Html::parse_document(page);

        match kind {
            PageKind::Catalog | PageKind::Subcategory => {
                self.anchors(&document, TIER_ANCHORS, plain_label)
            }
            PageKind::Category => self.anchors(&document, CATEGORY_ANCHORS, plain_label),
            PageKind::Listing => self.anchors(&document, DETAIL_ANCHORS, structured_name),
        }
    }

    fn extract_record(&self, page: &str) -> RecordDetails {
        let document = Html::parse_document(page);

        let address = first_text(&document, ADDRESS_BLOCK);
        let phone = first_text(&document, PHONE_BLOCK);
        let (postal_code, city) = address
            .as_deref()
            .and_then(split_postal_code)
            .map(|(code, city)| (Some(code), city))
            .unwrap_or((None, None));

        RecordDetails {
            address,
            postal_code,
            city,
            phone,
        }
    }
}

/// Collapses every whitespace run to one space and trims
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn plain_label(anchor: ElementRef<'_>) -> Option<String> {
    Some(collapse_whitespace(&anchor.text().collect::<String>()))
}

/// Builds "SURNAME Firstname" from `<strong>SURNAME</strong> Firstname`
///
/// Returns None unless the anchor has a direct `<strong>` child and both
/// name parts are non-empty.
fn structured_name(anchor: ElementRef<'_>) -> Option<String> {
    let mut surname = String::new();
    let mut given = String::new();
    let mut has_strong = false;

    for child in anchor.children() {
        if let Some(text) = child.value().as_text() {
            given.push_str(text);
        } else if let Some(element) = ElementRef::wrap(child) {
            if element.value().name() == "strong" && !has_strong {
                has_strong = true;
                surname.extend(element.text());
            } else {
                given.extend(element.text());
            }
        }
    }

    let surname = collapse_whitespace(&surname);
    let given = collapse_whitespace(&given);
    if !has_strong || surname.is_empty() || given.is_empty() {
        return None;
    }

    Some(format!("{} {}", surname, given))
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        // Text nodes are joined with a space so `<br>`-separated lines stay apart
        .map(|element| collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")))
        .filter(|s| !s.is_empty())
}

/// Splits "1 rue de Rivoli 75001 Paris" into ("75001", Some("Paris"))
fn split_postal_code(address: &str) -> Option<(String, Option<String>)> {
    let words: Vec<&str> = address.split_whitespace().collect();
    let position = words
        .iter()
        .position(|w| w.len() == 5 && w.chars().all(|c| c.is_ascii_digit()))?;

    let city = words[position + 1..].join(" ");
    let city = if city.is_empty() { None } else { Some(city) };
    Some((words[position].to_string(), city))
}

/// Label derived from a URL's last path segment: "75-paris" -> "paris"
fn slug_label(url: &str) -> String {
    let segment = last_segment(url).unwrap_or_default();
    match segment.split_once('-') {
        Some((_, rest)) if !rest.is_empty() => rest.to_string(),
        _ => segment,
    }
}

/// Last non-empty path segment of a URL
pub fn last_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// Resolves a link href to an absolute URL
///
/// Returns None for `javascript:`, `mailto:`, `tel:` and `data:` links,
/// fragment-only links, and anything that doesn't resolve to HTTP(S).
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url.to_string())
    } else {
        None
    }
}
