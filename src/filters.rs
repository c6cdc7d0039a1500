/// Sentinel option values meaning "no constraint" for each select control.
pub const ALL_MAKES: &str = "all_makes";
pub const ALL_MODELS: &str = "all_models";
pub const ALL_FUEL_TYPES: &str = "all_fuel_types";
pub const ALL_TRANSMISSIONS: &str = "all_transmissions";

/// Criteria for the auction listing query. No invariant ties the bounds
/// together: min > max is representable and simply matches nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuctionFilters {
    pub min_year: Option<i32>,
    pub max_year: Option<i32>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_mileage: Option<i64>,
    pub max_mileage: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
}

/// A partial update to `AuctionFilters`. Each field distinguishes three
/// states: outer `None` leaves the current value untouched, `Some(None)`
/// explicitly clears it, `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default)]
pub struct FilterPatch {
    pub min_year: Option<Option<i32>>,
    pub max_year: Option<Option<i32>>,
    pub min_price: Option<Option<f64>>,
    pub max_price: Option<Option<f64>>,
    pub min_mileage: Option<Option<i64>>,
    pub max_mileage: Option<Option<i64>>,
    pub make: Option<Option<String>>,
    pub model: Option<Option<String>>,
    pub fuel_type: Option<Option<String>>,
    pub transmission: Option<Option<String>>,
}

impl FilterPatch {
    /// Patch for a make change. A model is only meaningful relative to its
    /// make, so the same patch clears it; applying this is a single merge,
    /// never two sequential ones.
    pub fn make(value: Option<String>) -> Self {
        Self {
            make: Some(value),
            model: Some(None),
            ..Self::default()
        }
    }

    pub fn model(value: Option<String>) -> Self {
        Self {
            model: Some(value),
            ..Self::default()
        }
    }

    pub fn fuel_type(value: Option<String>) -> Self {
        Self {
            fuel_type: Some(value),
            ..Self::default()
        }
    }

    pub fn transmission(value: Option<String>) -> Self {
        Self {
            transmission: Some(value),
            ..Self::default()
        }
    }

    pub fn year_range(min: Option<i32>, max: Option<i32>) -> Self {
        Self {
            min_year: Some(min),
            max_year: Some(max),
            ..Self::default()
        }
    }

    pub fn price_range(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            min_price: Some(min),
            max_price: Some(max),
            ..Self::default()
        }
    }

    pub fn mileage_range(min: Option<i64>, max: Option<i64>) -> Self {
        Self {
            min_mileage: Some(min),
            max_mileage: Some(max),
            ..Self::default()
        }
    }
}

impl AuctionFilters {
    /// Merge a partial update into these filters. Pure: every key present in
    /// the patch overwrites (including explicit clears), every absent key is
    /// carried over unchanged.
    pub fn apply(&self, patch: &FilterPatch) -> AuctionFilters {
        AuctionFilters {
            min_year: patch.min_year.unwrap_or(self.min_year),
            max_year: patch.max_year.unwrap_or(self.max_year),
            min_price: patch.min_price.unwrap_or(self.min_price),
            max_price: patch.max_price.unwrap_or(self.max_price),
            min_mileage: patch.min_mileage.unwrap_or(self.min_mileage),
            max_mileage: patch.max_mileage.unwrap_or(self.max_mileage),
            make: patch.make.clone().unwrap_or_else(|| self.make.clone()),
            model: patch.model.clone().unwrap_or_else(|| self.model.clone()),
            fuel_type: patch
                .fuel_type
                .clone()
                .unwrap_or_else(|| self.fuel_type.clone()),
            transmission: patch
                .transmission
                .clone()
                .unwrap_or_else(|| self.transmission.clone()),
        }
    }

    /// The make constraint, with the sentinel treated as unset.
    pub fn make_constraint(&self) -> Option<&str> {
        constraint(self.make.as_deref(), ALL_MAKES)
    }

    pub fn model_constraint(&self) -> Option<&str> {
        constraint(self.model.as_deref(), ALL_MODELS)
    }

    pub fn fuel_type_constraint(&self) -> Option<&str> {
        constraint(self.fuel_type.as_deref(), ALL_FUEL_TYPES)
    }

    pub fn transmission_constraint(&self) -> Option<&str> {
        constraint(self.transmission.as_deref(), ALL_TRANSMISSIONS)
    }
}

fn constraint<'a>(value: Option<&'a str>, sentinel: &str) -> Option<&'a str> {
    value.filter(|v| *v != sentinel)
}

// ── Tests ──
