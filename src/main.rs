mod db;
mod filters;
mod ingest;
mod models;
mod parser;
mod render;
mod scraper;
mod session;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use db::{SortField, Store};
use filters::FilterPatch;
use ingest::{Ingestor, LiveScrapeFunction};
use session::ListingSession;

#[derive(Parser)]
#[command(name = "auction_scout", about = "Auction car listing store and scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Scrape the external listings page and upsert what it finds
    Scrape,
    /// Filtered, paginated listing of stored auction cars
    List {
        #[arg(long)]
        make: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        fuel_type: Option<String>,
        #[arg(long)]
        transmission: Option<String>,
        #[arg(long)]
        min_year: Option<i32>,
        #[arg(long)]
        max_year: Option<i32>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        min_mileage: Option<i64>,
        #[arg(long)]
        max_mileage: Option<i64>,
        /// Page to show (clamped to the available range)
        #[arg(short = 'p', long, default_value = "1")]
        page: u32,
        #[arg(long, default_value_t = session::DEFAULT_PAGE_SIZE)]
        page_size: u32,
        /// Sort field: end-date, title, year, price
        #[arg(long, default_value = "end-date")]
        sort: String,
        /// Reverse the field's natural order
        #[arg(long)]
        desc: bool,
    },
    /// Filter dropdown option sets: makes, fuel types, transmissions
    Options,
    /// Distinct models for a make
    Models { make: String },
    /// Store statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let store = Store::open()?;
            store.init_schema()?;
            println!("Schema ready.");
            Ok(())
        }
        Commands::Scrape => {
            let store = Store::open()?;
            store.init_schema()?;
            let remote = LiveScrapeFunction::new(&store)?;
            let ingestor = Ingestor::new();
            match ingestor.trigger(&remote).await {
                Some(outcome) => println!("{}", outcome.message()),
                None => println!("A scrape is already running."),
            }
            Ok(())
        }
        Commands::List {
            make,
            model,
            fuel_type,
            transmission,
            min_year,
            max_year,
            min_price,
            max_price,
            min_mileage,
            max_mileage,
            page,
            page_size,
            sort,
            desc,
        } => {
            let store = Store::open()?;
            store.init_schema()?;

            let mut session = ListingSession::new(page_size);
            session.apply_patch(&FilterPatch {
                min_year: min_year.map(Some),
                max_year: max_year.map(Some),
                min_price: min_price.map(Some),
                max_price: max_price.map(Some),
                min_mileage: min_mileage.map(Some),
                max_mileage: max_mileage.map(Some),
                make: make.map(Some),
                model: model.map(Some),
                fuel_type: fuel_type.map(Some),
                transmission: transmission.map(Some),
            });

            let field = parse_sort(&sort)?;
            if field != session.sort().0 {
                session.set_sort(field);
            }
            if desc {
                // Re-selecting the field toggles out of its natural order.
                session.set_sort(field);
            }

            run_query(&store, &mut session)?;
            if page > 1 {
                session.set_page(page);
                if session.page() > 1 {
                    run_query(&store, &mut session)?;
                }
            }

            print!(
                "{}",
                render::render_listing(
                    session.is_loading(),
                    session.current_cars(),
                    session.total_cars(),
                    session.page(),
                    session.total_pages(),
                )
            );
            Ok(())
        }
        Commands::Options => {
            let store = Store::open()?;
            store.init_schema()?;
            print_options("Makes", store.distinct_makes());
            print_options("Fuel types", store.distinct_fuel_types());
            print_options("Transmissions", store.distinct_transmissions());
            Ok(())
        }
        Commands::Models { make } => {
            let store = Store::open()?;
            store.init_schema()?;
            print_options(&format!("Models for {}", make), store.distinct_models(&make));
            Ok(())
        }
        Commands::Stats => {
            let store = Store::open()?;
            store.init_schema()?;
            let stats = store.get_stats()?;
            println!("Listings: {}", stats.total);
            println!("Active:   {}", stats.active);
            println!("Makes:    {}", stats.makes);
            match stats.next_end_date {
                Some(dt) => println!("Next end: {}", dt.format("%Y-%m-%d %H:%M")),
                None => println!("Next end: -"),
            }
            Ok(())
        }
    }
}

/// Issue one listing query for the session's current state and commit the
/// response.
fn run_query(store: &Store, session: &mut ListingSession) -> Result<()> {
    let req = session.next_request();
    let result = store.search(&req.filters, req.sort, req.order, req.page, req.page_size)?;
    session.commit(req.seq, result);
    Ok(())
}

/// Print an option set. A load failure degrades to an empty set so the rest
/// of the command still works.
fn print_options(label: &str, loaded: Result<Vec<String>>) {
    println!("{}", options_line(label, loaded));
}

fn options_line(label: &str, loaded: Result<Vec<String>>) -> String {
    match loaded {
        Ok(values) if values.is_empty() => format!("{}: (none)", label),
        Ok(values) => format!("{}: {}", label, values.join(", ")),
        Err(e) => {
            warn!(error = %e, label, "failed to load filter options");
            format!("{}: (unavailable)", label)
        }
    }
}

fn parse_sort(s: &str) -> Result<SortField> {
    Ok(match s {
        "end-date" | "end_date" => SortField::EndDate,
        "title" => SortField::Title,
        "year" => SortField::Year,
        "price" | "start-price" | "start_price" => SortField::StartPrice,
        other => bail!("unknown sort field: {} (expected end-date, title, year, price)", other),
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_degrade_when_store_query_fails() {
        // No schema: every distinct-column query errors, and the option set
        // degrades instead of propagating the failure.
        let store = Store::open_in_memory().unwrap();
        assert_eq!(
            options_line("Makes", store.distinct_makes()),
            "Makes: (unavailable)"
        );
        assert_eq!(
            options_line("Models for BMW", store.distinct_models("BMW")),
            "Models for BMW: (unavailable)"
        );
    }

    #[test]
    fn options_line_formats_loaded_sets() {
        assert_eq!(
            options_line("Makes", Ok(vec!["Audi".to_string(), "BMW".to_string()])),
            "Makes: Audi, BMW"
        );
        assert_eq!(options_line("Makes", Ok(Vec::new())), "Makes: (none)");
    }
}
