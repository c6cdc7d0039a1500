use crate::models::AuctionCar;

/// Text rendering of the auction listing view: a loading notice, an empty
/// notice, or a table plus pagination and result count.
pub fn render_listing(
    is_loading: bool,
    cars: &[AuctionCar],
    total_cars: usize,
    current_page: u32,
    total_pages: u32,
) -> String {
    if is_loading {
        return "Loading auctions...".to_string();
    }
    if cars.is_empty() {
        return "No auctions available.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:>3} | {:<32} | {:>4} | {:>10} | {:>10} | {:<10} | {:<10}\n",
        "#", "Title", "Year", "Price", "Mileage", "Fuel", "Ends"
    ));
    out.push_str(&format!("{}\n", "-".repeat(98)));

    for (i, car) in cars.iter().enumerate() {
        let year = car
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mileage = car
            .mileage
            .map(|m| format!("{} km", m))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:>3} | {:<32} | {:>4} | {:>10.0} | {:>10} | {:<10} | {:<10}\n",
            i + 1,
            truncate(&car.title, 32),
            year,
            car.effective_price(),
            mileage,
            truncate(car.fuel_type.as_deref().unwrap_or("-"), 10),
            car.end_date.format("%Y-%m-%d"),
        ));
    }

    out.push_str(&format!("\nPage {} of {}\n", current_page, total_pages));
    out.push_str(&format!("Showing {} of {} auctions\n", cars.len(), total_cars));
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        // Ellipsis counts against the width so the column stays aligned.
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn car(title: &str) -> AuctionCar {
        AuctionCar {
            id: Some(1),
            external_id: "openlane-1".to_string(),
            title: title.to_string(),
            start_price: 15000.0,
            current_price: Some(15400.0),
            year: Some(2018),
            make: Some("BMW".to_string()),
            model: Some("320d".to_string()),
            mileage: Some(150_000),
            fuel_type: Some("Diesel".to_string()),
            transmission: Some("Automatic".to_string()),
            location: None,
            image_url: None,
            external_url: "https://www.openlane.eu/en/car/1".to_string(),
            end_date: Utc.with_ymd_and_hms(2026, 9, 6, 12, 0, 0).unwrap(),
            status: Some("active".to_string()),
            extras: Default::default(),
        }
    }

    #[test]
    fn loading_state() {
        assert_eq!(render_listing(true, &[], 0, 1, 1), "Loading auctions...");
    }

    #[test]
    fn empty_state() {
        assert_eq!(render_listing(false, &[], 0, 1, 1), "No auctions available.");
    }

    #[test]
    fn grid_with_pagination_and_count() {
        let cars = vec![car("BMW 320d xDrive")];
        let out = render_listing(false, &cars, 13, 2, 2);
        assert!(out.contains("BMW 320d xDrive"));
        assert!(out.contains("15400"));
        assert!(out.contains("150000 km"));
        assert!(out.contains("Page 2 of 2"));
        assert!(out.contains("Showing 1 of 13 auctions"));
    }

    #[test]
    fn long_title_truncates_within_column_width() {
        let long = "Mercedes-Benz E 220 d 4MATIC All-Terrain Avantgarde";
        let out = truncate(long, 32);
        assert_eq!(out.chars().count(), 32);
        assert!(out.ends_with("..."));
        assert_eq!(truncate("BMW 320d", 32), "BMW 320d");
    }
}
