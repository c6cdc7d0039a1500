use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::models::{AuctionCar, ScrapedCar, ScrapedCarDetails};

// The capture keeps the last inner `</div>` so the final details item still
// closes inside the card body; the remaining two close the details wrapper
// and the card itself.
static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="vehicle-card"[^>]*>(.*?</div>)\s*</div>\s*</div>"#).unwrap()
});
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="vehicle-card__title"[^>]*>(.*?)</div>"#).unwrap()
});
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="vehicle-card__price"[^>]*>(.*?)</div>"#).unwrap()
});
static DETAIL_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="vehicle-card__details-item"[^>]*>(.*?)</div>"#).unwrap()
});
static IMG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<img[^>]*src="([^"]*)""#).unwrap());
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<a[^>]*href="([^"]*)""#).unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}$").unwrap());
static NON_DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());
static THOUSANDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(?:[.,]\d{3})+$").unwrap());
static NUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());

const SOURCE_BASE: &str = "https://www.openlane.eu";
const MAX_CARDS: usize = 20;
const FUEL_KEYWORDS: &[&str] = &["Diesel", "Petrol", "Electric", "Hybrid"];
const TRANSMISSION_KEYWORDS: &[&str] = &["Manual", "Automatic"];

/// Everything extracted from one listings page. `cars` is the normalized
/// storage shape, `envelopes` the response envelope for the same listings;
/// `skipped` counts cards dropped for missing title or URL.
pub struct ParsedListing {
    pub cars: Vec<AuctionCar>,
    pub envelopes: Vec<ScrapedCar>,
    pub skipped: usize,
}

/// Extract vehicle cards from the fetched HTML. The page structure is
/// unstable input: a card that fails to yield a title and link is counted
/// as skipped, never an error for the whole page.
pub fn parse_listing_page(html: &str, now: DateTime<Utc>) -> ParsedListing {
    let mut cars = Vec::new();
    let mut envelopes = Vec::new();
    let mut skipped = 0;

    for caps in CARD_RE.captures_iter(html).take(MAX_CARDS) {
        let card = &caps[1];
        match parse_card(card, now) {
            Some((car, envelope)) => {
                cars.push(car);
                envelopes.push(envelope);
            }
            None => skipped += 1,
        }
    }

    ParsedListing {
        cars,
        envelopes,
        skipped,
    }
}

fn parse_card(card: &str, now: DateTime<Utc>) -> Option<(AuctionCar, ScrapedCar)> {
    let title = TITLE_RE
        .captures(card)
        .map(|c| clean_html(&c[1]))
        .filter(|t| !t.is_empty())?;
    let external_url = LINK_RE
        .captures(card)
        .map(|c| absolute_url(&c[1]))
        .filter(|u| !u.is_empty())?;

    let price_text = PRICE_RE
        .captures(card)
        .map(|c| clean_html(&c[1]))
        .unwrap_or_default();
    let price = parse_price(&price_text).unwrap_or(0.0);

    let image_url = IMG_RE
        .captures(card)
        .map(|c| absolute_url(&c[1]))
        .filter(|u| !u.is_empty());

    let mut year: Option<i32> = None;
    let mut mileage_text: Option<String> = None;
    let mut fuel: Option<String> = None;
    let mut transmission: Option<String> = None;
    for item in DETAIL_ITEM_RE.captures_iter(card) {
        let text = clean_html(&item[1]);
        if YEAR_RE.is_match(&text) {
            year = text.parse().ok();
        } else if text.contains("km") {
            mileage_text = Some(text);
        } else if FUEL_KEYWORDS.iter().any(|k| text.contains(k)) {
            fuel = Some(text);
        } else if TRANSMISSION_KEYWORDS.iter().any(|k| text.contains(k)) {
            transmission = Some(text);
        }
    }

    let (make, model) = split_make_model(&title);
    let external_id = external_id_for(&external_url);
    let mileage = mileage_text.as_deref().and_then(parse_mileage);

    let mut extras = BTreeMap::new();
    if !price_text.is_empty() {
        extras.insert("price_text".to_string(), price_text.clone());
    }
    if let Some(text) = &mileage_text {
        extras.insert("mileage_text".to_string(), text.clone());
    }

    let envelope = ScrapedCar {
        id: external_id.clone(),
        title: title.clone(),
        price: price_text,
        image: image_url.clone(),
        url: external_url.clone(),
        details: ScrapedCarDetails {
            year: year.map(|y| y.to_string()),
            mileage: mileage_text,
            engine: None,
            transmission: transmission.clone(),
            fuel: fuel.clone(),
            color: None,
        },
    };

    let car = AuctionCar {
        id: None,
        external_id,
        title,
        start_price: price,
        current_price: Some(price),
        year,
        make,
        model,
        mileage,
        fuel_type: fuel,
        transmission,
        location: Some("Openlane EU".to_string()),
        image_url,
        external_url,
        // Card markup carries no auction deadline; assume a week out.
        end_date: now + Duration::days(7),
        status: Some("active".to_string()),
        extras,
    };

    Some((car, envelope))
}

fn clean_html(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn absolute_url(href: &str) -> String {
    let href = href.trim();
    if href.is_empty() || href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}{}", SOURCE_BASE, href)
    }
}

/// Stable listing key derived from the URL, so a re-scrape updates the same
/// row instead of inserting a duplicate.
fn external_id_for(external_url: &str) -> String {
    let slug = external_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(external_url);
    format!("openlane-{}", slug)
}

/// First word of the title is the make, the rest the model.
fn split_make_model(title: &str) -> (Option<String>, Option<String>) {
    let mut parts = title.splitn(2, ' ');
    let make = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    let model = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    (make, model)
}

/// Parse a formatted price like "€ 15.250" or "12 500,50". Grouped
/// thousands separators are stripped; a single trailing comma fragment is a
/// decimal point.
fn parse_price(text: &str) -> Option<f64> {
    let compact = text.replace(' ', "");
    let num = NUM_RE.find(&compact)?.as_str();
    if THOUSANDS_RE.is_match(num) {
        NON_DIGIT_RE.replace_all(num, "").parse().ok()
    } else {
        num.replace(',', ".").parse().ok()
    }
}

fn parse_mileage(text: &str) -> Option<i64> {
    let digits = NON_DIGIT_RE.replace_all(text, "");
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/listing.html").unwrap()
    }

    #[test]
    fn extracts_complete_card() {
        let now = Utc::now();
        let parsed = parse_listing_page(&fixture(), now);
        let car = parsed
            .cars
            .iter()
            .find(|c| c.title == "BMW 320d xDrive")
            .unwrap();

        assert_eq!(car.make.as_deref(), Some("BMW"));
        assert_eq!(car.model.as_deref(), Some("320d xDrive"));
        assert_eq!(car.year, Some(2018));
        assert_eq!(car.mileage, Some(150_000));
        assert_eq!(car.fuel_type.as_deref(), Some("Diesel"));
        assert_eq!(car.transmission.as_deref(), Some("Automatic"));
        assert_eq!(car.start_price, 15250.0);
        assert_eq!(car.external_url, "https://www.openlane.eu/en/car/12345");
        assert_eq!(car.end_date, now + Duration::days(7));
        assert_eq!(car.status.as_deref(), Some("active"));
        assert_eq!(
            car.extras.get("mileage_text").map(String::as_str),
            Some("150 000 km")
        );
    }

    #[test]
    fn last_details_item_survives_card_extraction() {
        // Transmission is the trailing item in the card layout; the card
        // terminator must not swallow its closing tag.
        let html = r#"<div class="vehicle-card">
            <a href="/en/car/31337"></a>
            <div class="vehicle-card__title">VW Golf</div>
            <div class="vehicle-card__details">
              <div class="vehicle-card__details-item">2020</div>
              <div class="vehicle-card__details-item">Manual</div>
            </div>
          </div>"#;
        let parsed = parse_listing_page(html, Utc::now());
        assert_eq!(parsed.cars.len(), 1);
        assert_eq!(parsed.cars[0].year, Some(2020));
        assert_eq!(parsed.cars[0].transmission.as_deref(), Some("Manual"));
    }

    #[test]
    fn skips_cards_missing_title_or_link() {
        let parsed = parse_listing_page(&fixture(), Utc::now());
        // The fixture has one card with no title and one with no link.
        assert_eq!(parsed.skipped, 2);
        assert_eq!(parsed.cars.len(), 2);
    }

    #[test]
    fn envelope_mirrors_card_fields() {
        let parsed = parse_listing_page(&fixture(), Utc::now());
        let envelope = parsed
            .envelopes
            .iter()
            .find(|e| e.title == "BMW 320d xDrive")
            .unwrap();
        assert_eq!(envelope.price, "€ 15.250");
        assert_eq!(envelope.details.year.as_deref(), Some("2018"));
        assert_eq!(envelope.details.fuel.as_deref(), Some("Diesel"));
    }

    #[test]
    fn external_id_is_stable_across_scrapes() {
        let first = parse_listing_page(&fixture(), Utc::now());
        let second = parse_listing_page(&fixture(), Utc::now());
        assert_eq!(first.cars[0].external_id, second.cars[0].external_id);
        assert_eq!(first.cars[0].external_id, "openlane-12345");
    }

    #[test]
    fn empty_page_yields_nothing() {
        let parsed = parse_listing_page("<html><body>maintenance</body></html>", Utc::now());
        assert!(parsed.cars.is_empty());
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn price_formats() {
        assert_eq!(parse_price("€ 15.250"), Some(15250.0));
        assert_eq!(parse_price("12 500"), Some(12500.0));
        assert_eq!(parse_price("1,5"), Some(1.5));
        assert_eq!(parse_price("9000"), Some(9000.0));
        assert_eq!(parse_price("no price"), None);
    }

    #[test]
    fn mileage_formats() {
        assert_eq!(parse_mileage("150 000 km"), Some(150_000));
        assert_eq!(parse_mileage("89.000 km"), Some(89_000));
        assert_eq!(parse_mileage("km"), None);
    }
}
