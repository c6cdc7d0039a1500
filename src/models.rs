use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An auction listing row. `external_url` and `end_date` are always present;
/// every other field is best-effort, depending on what the source page showed.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionCar {
    pub id: Option<i64>,
    pub external_id: String,
    pub title: String,
    pub start_price: f64,
    pub current_price: Option<f64>,
    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    /// Canonical mileage in kilometres. The source's formatted string
    /// (e.g. "150 000 km") is kept in `extras` under "mileage_text".
    pub mileage: Option<i64>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub external_url: String,
    pub end_date: DateTime<Utc>,
    pub status: Option<String>,
    /// Presentational passthrough fields carried verbatim from the source:
    /// formatted price, power, body type, country and the like.
    pub extras: BTreeMap<String, String>,
}

impl AuctionCar {
    /// The price that range filters apply to: current bid when known,
    /// otherwise the starting price.
    pub fn effective_price(&self) -> f64 {
        self.current_price.unwrap_or(self.start_price)
    }
}

/// Detail fields of a scraped listing, all optional strings as found on the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedCarDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmission: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// The pipeline's output envelope for a single listing. This is what the
/// scrape response carries back to the caller; the persisted table uses the
/// normalized `AuctionCar` shape instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedCar {
    pub id: String,
    pub title: String,
    pub price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub url: String,
    pub details: ScrapedCarDetails,
}

/// Wire shape of the scrape function's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub cars: Vec<ScrapedCar>,
    pub timestamp: DateTime<Utc>,
}

impl ScrapeResponse {
    pub fn ok(message: String, count: usize, skipped: usize, cars: Vec<ScrapedCar>) -> Self {
        Self {
            success: true,
            message: Some(message),
            error: None,
            count,
            skipped,
            cars,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error),
            count: 0,
            skipped: 0,
            cars: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_wire_shape() {
        let car = ScrapedCar {
            id: "openlane-12345".to_string(),
            title: "BMW 320d xDrive".to_string(),
            price: "€ 15.250".to_string(),
            image: None,
            url: "https://www.openlane.eu/en/car/12345".to_string(),
            details: ScrapedCarDetails {
                year: Some("2018".to_string()),
                ..Default::default()
            },
        };
        let response = ScrapeResponse::ok("1 cars imported".to_string(), 1, 0, vec![car]);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "1 cars imported");
        assert!(json.get("error").is_none());
        assert_eq!(json["cars"][0]["details"]["year"], "2018");
        // Absent detail fields stay off the wire entirely.
        assert!(json["cars"][0]["details"].get("color").is_none());

        let back: ScrapeResponse = serde_json::from_value(json).unwrap();
        assert!(back.success);
        assert_eq!(back.count, 1);

        let failed = ScrapeResponse::failed("rate limited".to_string());
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("rate limited"));
    }

    #[test]
    fn effective_price_prefers_current_bid() {
        let mut car = AuctionCar {
            id: None,
            external_id: "openlane-1".to_string(),
            title: "BMW 320d".to_string(),
            start_price: 15000.0,
            current_price: None,
            year: Some(2018),
            make: Some("BMW".to_string()),
            model: Some("320d".to_string()),
            mileage: None,
            fuel_type: None,
            transmission: None,
            location: None,
            image_url: None,
            external_url: "https://www.openlane.eu/en/car/1".to_string(),
            end_date: Utc::now(),
            status: None,
            extras: BTreeMap::new(),
        };
        assert_eq!(car.effective_price(), 15000.0);
        car.current_price = Some(15400.0);
        assert_eq!(car.effective_price(), 15400.0);
    }
}
