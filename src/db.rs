use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::Connection;

use crate::filters::AuctionFilters;
use crate::models::AuctionCar;

const DEFAULT_DB_PATH: &str = "data/auction.sqlite";

/// Column the listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    EndDate,
    Title,
    Year,
    StartPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::EndDate => "end_date",
            SortField::Title => "title",
            SortField::Year => "year",
            SortField::StartPrice => "start_price",
        }
    }

    /// The natural order when this field is first selected: A-Z for titles,
    /// newest first for years, cheapest first for prices, soonest first for
    /// end dates.
    pub fn default_order(self) -> SortOrder {
        match self {
            SortField::Year => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }
}

impl SortOrder {
    pub fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn toggled(self) -> SortOrder {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

/// One page of listing results plus the total match count, produced by a
/// single `search` call.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub cars: Vec<AuctionCar>,
    pub total_count: usize,
}

/// Store counters for the `stats` command.
pub struct Stats {
    pub total: usize,
    pub active: usize,
    pub makes: usize,
    pub next_end_date: Option<DateTime<Utc>>,
}

/// The auction-car store. Wraps a single SQLite connection so callers hold a
/// capability rather than reaching for a process-wide client; tests run
/// against an in-memory connection.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open the store at `AUCTION_DB` (default `data/auction.sqlite`).
    pub fn open() -> Result<Self> {
        let path = std::env::var("AUCTION_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS auction_cars (
                id            INTEGER PRIMARY KEY,
                external_id   TEXT UNIQUE NOT NULL,
                title         TEXT NOT NULL,
                start_price   REAL NOT NULL,
                current_price REAL,
                year          INTEGER,
                make          TEXT,
                model         TEXT,
                mileage       INTEGER,
                fuel_type     TEXT,
                transmission  TEXT,
                location      TEXT,
                image_url     TEXT,
                external_url  TEXT NOT NULL,
                end_date      TEXT NOT NULL,
                status        TEXT,
                extras        TEXT NOT NULL DEFAULT '{}',
                scraped_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_cars_make ON auction_cars(make);
            CREATE INDEX IF NOT EXISTS idx_cars_end_date ON auction_cars(end_date);
            ",
        )?;
        Ok(())
    }

    /// Upsert listings keyed on `external_id`: re-scraping the same listing
    /// updates its row in place instead of duplicating it.
    pub fn upsert_cars(&self, cars: &[AuctionCar]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO auction_cars
                 (external_id, title, start_price, current_price, year, make, model,
                  mileage, fuel_type, transmission, location, image_url,
                  external_url, end_date, status, extras)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)
                 ON CONFLICT(external_id) DO UPDATE SET
                    title = excluded.title,
                    start_price = excluded.start_price,
                    current_price = excluded.current_price,
                    year = excluded.year,
                    make = excluded.make,
                    model = excluded.model,
                    mileage = excluded.mileage,
                    fuel_type = excluded.fuel_type,
                    transmission = excluded.transmission,
                    location = excluded.location,
                    image_url = excluded.image_url,
                    external_url = excluded.external_url,
                    end_date = excluded.end_date,
                    status = excluded.status,
                    extras = excluded.extras,
                    scraped_at = datetime('now')",
            )?;
            for car in cars {
                let extras = serde_json::to_string(&car.extras)?;
                count += stmt.execute(rusqlite::params![
                    car.external_id,
                    car.title,
                    car.start_price,
                    car.current_price,
                    car.year,
                    car.make,
                    car.model,
                    car.mileage,
                    car.fuel_type,
                    car.transmission,
                    car.location,
                    car.image_url,
                    car.external_url,
                    car.end_date.to_rfc3339(),
                    car.status,
                    extras,
                ])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    /// Run the filtered listing query: one page of rows plus the total match
    /// count, ordered by `sort`/`order`. Inverted bounds are issued as-is and
    /// simply match nothing.
    pub fn search(
        &self,
        filters: &AuctionFilters,
        sort: SortField,
        order: SortOrder,
        page: u32,
        page_size: u32,
    ) -> Result<PageResult> {
        let (where_clause, params) = build_where(filters);
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count_sql = format!("SELECT COUNT(*) FROM auction_cars{}", where_clause);
        let total_count: usize =
            self.conn
                .query_row(&count_sql, param_refs.as_slice(), |r| r.get(0))?;

        let offset = (page.max(1) - 1) as i64 * page_size as i64;
        let sql = format!(
            "SELECT id, external_id, title, start_price, current_price, year, make,
                    model, mileage, fuel_type, transmission, location, image_url,
                    external_url, end_date, status, extras
             FROM auction_cars{}
             ORDER BY {} {}
             LIMIT {} OFFSET {}",
            where_clause,
            sort.column(),
            order.sql(),
            page_size,
            offset
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let cars = stmt
            .query_map(param_refs.as_slice(), row_to_car)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageResult { cars, total_count })
    }

    /// Distinct non-null make values, sorted. Idempotent; safe to retry.
    pub fn distinct_makes(&self) -> Result<Vec<String>> {
        self.distinct_column("make", None)
    }

    /// Distinct non-null model values for the given make, sorted.
    pub fn distinct_models(&self, make: &str) -> Result<Vec<String>> {
        self.distinct_column("model", Some(make))
    }

    pub fn distinct_fuel_types(&self) -> Result<Vec<String>> {
        self.distinct_column("fuel_type", None)
    }

    pub fn distinct_transmissions(&self) -> Result<Vec<String>> {
        self.distinct_column("transmission", None)
    }

    fn distinct_column(&self, column: &'static str, make: Option<&str>) -> Result<Vec<String>> {
        let sql = match make {
            Some(_) => format!(
                "SELECT DISTINCT {col} FROM auction_cars
                 WHERE make = ?1 AND {col} IS NOT NULL AND {col} != ''
                 ORDER BY {col}",
                col = column
            ),
            None => format!(
                "SELECT DISTINCT {col} FROM auction_cars
                 WHERE {col} IS NOT NULL AND {col} != ''
                 ORDER BY {col}",
                col = column
            ),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match make {
            Some(m) => stmt
                .query_map([m], |r| r.get(0))?
                .collect::<Result<Vec<String>, _>>()?,
            None => stmt
                .query_map([], |r| r.get(0))?
                .collect::<Result<Vec<String>, _>>()?,
        };
        Ok(rows)
    }

    pub fn get_stats(&self) -> Result<Stats> {
        let total: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM auction_cars", [], |r| r.get(0))?;
        let active: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM auction_cars WHERE status = 'active'",
            [],
            |r| r.get(0),
        )?;
        let makes: usize = self.conn.query_row(
            "SELECT COUNT(DISTINCT make) FROM auction_cars WHERE make IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let next_end_date: Option<String> = self.conn.query_row(
            "SELECT MIN(end_date) FROM auction_cars WHERE status = 'active'",
            [],
            |r| r.get(0),
        )?;
        Ok(Stats {
            total,
            active,
            makes,
            next_end_date: next_end_date.as_deref().and_then(parse_end_date),
        })
    }
}

/// Translate filters into a WHERE clause with positional params. Range
/// predicates are inclusive; price bounds apply to the current bid, falling
/// back to the starting price when no bid is recorded; equality predicates
/// are skipped entirely when unset or equal to their `all_*` sentinel.
pub fn build_where(filters: &AuctionFilters) -> (String, Vec<Box<dyn ToSql>>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    let mut push = |cond: &str, value: Box<dyn ToSql>,
                    conditions: &mut Vec<String>,
                    params: &mut Vec<Box<dyn ToSql>>| {
        params.push(value);
        conditions.push(format!("{} ?{}", cond, params.len()));
    };

    if let Some(v) = filters.min_year {
        push("year >=", Box::new(v), &mut conditions, &mut params);
    }
    if let Some(v) = filters.max_year {
        push("year <=", Box::new(v), &mut conditions, &mut params);
    }
    if let Some(v) = filters.min_price {
        push(
            "COALESCE(current_price, start_price) >=",
            Box::new(v),
            &mut conditions,
            &mut params,
        );
    }
    if let Some(v) = filters.max_price {
        push(
            "COALESCE(current_price, start_price) <=",
            Box::new(v),
            &mut conditions,
            &mut params,
        );
    }
    if let Some(v) = filters.min_mileage {
        push("mileage >=", Box::new(v), &mut conditions, &mut params);
    }
    if let Some(v) = filters.max_mileage {
        push("mileage <=", Box::new(v), &mut conditions, &mut params);
    }
    if let Some(v) = filters.make_constraint() {
        push("make =", Box::new(v.to_string()), &mut conditions, &mut params);
    }
    if let Some(v) = filters.model_constraint() {
        push("model =", Box::new(v.to_string()), &mut conditions, &mut params);
    }
    if let Some(v) = filters.fuel_type_constraint() {
        push(
            "fuel_type =",
            Box::new(v.to_string()),
            &mut conditions,
            &mut params,
        );
    }
    if let Some(v) = filters.transmission_constraint() {
        push(
            "transmission =",
            Box::new(v.to_string()),
            &mut conditions,
            &mut params,
        );
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (clause, params)
}

fn row_to_car(row: &rusqlite::Row) -> rusqlite::Result<AuctionCar> {
    let end_date: String = row.get(14)?;
    let extras: String = row.get(16)?;
    Ok(AuctionCar {
        id: row.get(0)?,
        external_id: row.get(1)?,
        title: row.get(2)?,
        start_price: row.get(3)?,
        current_price: row.get(4)?,
        year: row.get(5)?,
        make: row.get(6)?,
        model: row.get(7)?,
        mileage: row.get(8)?,
        fuel_type: row.get(9)?,
        transmission: row.get(10)?,
        location: row.get(11)?,
        image_url: row.get(12)?,
        external_url: row.get(13)?,
        end_date: parse_end_date(&end_date).unwrap_or_else(Utc::now),
        status: row.get(15)?,
        extras: serde_json::from_str::<BTreeMap<String, String>>(&extras).unwrap_or_default(),
    })
}

fn parse_end_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Tests ──
