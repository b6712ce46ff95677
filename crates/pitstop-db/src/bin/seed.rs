//! # Seed Data Generator
//!
//! Populates the database with a car-parts catalog for development.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in pitstop.toml (or the platform default)
//! cargo run -p pitstop-db --bin seed
//!
//! # Specify database path
//! cargo run -p pitstop-db --bin seed -- --db ./data/pitstop.db
//!
//! # Use a specific config file
//! cargo run -p pitstop-db --bin seed -- --config ./pitstop.toml
//! ```
//!
//! Each catalog entry becomes one product. Entries with fitments get one
//! variant per fitment (`{CODE}-{n}`); the rest keep stock on the product.

use chrono::Utc;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pitstop_core::{Money, Product, Variant};
use pitstop_db::{Database, PitstopConfig};

/// (position, material, stock)
type Fitment = (Option<&'static str>, Option<&'static str>, i64);

struct CatalogEntry {
    code: &'static str,
    name: &'static str,
    brand: &'static str,
    mrp_rupees: i64,
    discount_bps: u32,
    tags: &'static [&'static str],
    featured: bool,
    fitments: &'static [Fitment],
    /// Stock for entries without fitments.
    stock: i64,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        code: "BP",
        name: "Brake Pad Set",
        brand: "Bosch",
        mrp_rupees: 2_400,
        discount_bps: 1_000,
        tags: &["brakes", "safety"],
        featured: true,
        fitments: &[
            (Some("Front"), Some("Ceramic"), 12),
            (Some("Front"), Some("Semi-metallic"), 8),
            (Some("Rear"), Some("Ceramic"), 6),
        ],
        stock: 0,
    },
    CatalogEntry {
        code: "WB",
        name: "Wiper Blade",
        brand: "Valeo",
        mrp_rupees: 650,
        discount_bps: 1_500,
        tags: &["wipers", "monsoon"],
        featured: false,
        fitments: &[(Some("Driver"), None, 20), (Some("Passenger"), None, 18)],
        stock: 0,
    },
    CatalogEntry {
        code: "HB",
        name: "Headlight Bulb H4",
        brand: "Philips",
        mrp_rupees: 450,
        discount_bps: 0,
        tags: &["lighting"],
        featured: false,
        fitments: &[(None, Some("Halogen"), 40), (None, Some("LED"), 15)],
        stock: 0,
    },
    CatalogEntry {
        code: "SP",
        name: "Spark Plug",
        brand: "NGK",
        mrp_rupees: 320,
        discount_bps: 500,
        tags: &["engine", "ignition"],
        featured: true,
        fitments: &[(None, Some("Copper"), 60), (None, Some("Iridium"), 24)],
        stock: 0,
    },
    CatalogEntry {
        code: "EO",
        name: "Engine Oil 5W-30 (3.5L)",
        brand: "Castrol",
        mrp_rupees: 2_900,
        discount_bps: 800,
        tags: &["engine", "oil", "service"],
        featured: true,
        fitments: &[],
        stock: 30,
    },
    CatalogEntry {
        code: "CL",
        name: "Coolant Concentrate 1L",
        brand: "Shell",
        mrp_rupees: 540,
        discount_bps: 0,
        tags: &["engine", "cooling"],
        featured: false,
        fitments: &[],
        stock: 25,
    },
    CatalogEntry {
        code: "AF",
        name: "Air Filter",
        brand: "Mann",
        mrp_rupees: 780,
        discount_bps: 1_200,
        tags: &["engine", "filters", "service"],
        featured: false,
        fitments: &[(None, Some("Paper"), 14), (None, Some("Cotton"), 5)],
        stock: 0,
    },
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pitstop=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Pitstop Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform pitstop.toml)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(arg = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = PitstopConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    info!(path = %config.database.path.display(), "Seeding database");
    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Database::new(config.db_config()).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0;
    let mut units = 0;

    for entry in CATALOG {
        let product = build_product(entry);
        match db.products().insert(&product).await {
            Ok(stored) => {
                generated += 1;
                units += stored.total_stock;
                info!(
                    name = %stored.name,
                    variants = stored.variants.len(),
                    offer_price = %stored.offer_price,
                    "Seeded product"
                );
            }
            Err(e) => warn!(name = %product.name, error = %e, "Failed to insert product"),
        }
    }

    let hits = db.products().search("engine", 10).await?;
    info!(
        products = generated,
        units,
        search_engine = hits.len(),
        elapsed = ?start.elapsed(),
        "Seed complete"
    );

    db.close().await;
    Ok(())
}

fn build_product(entry: &CatalogEntry) -> Product {
    let now = Utc::now();

    let variants = entry
        .fitments
        .iter()
        .enumerate()
        .map(|(idx, (position, material, stock))| Variant {
            sku: format!("{}-{}", entry.code, idx + 1),
            position: position.map(str::to_string),
            material: material.map(str::to_string),
            stock: *stock,
            sort_order: idx as i64,
        })
        .collect();

    Product {
        id: String::new(),
        name: entry.name.to_string(),
        brand: Some(entry.brand.to_string()),
        description: None,
        mrp: Money::from_major(entry.mrp_rupees),
        discount_bps: entry.discount_bps,
        offer_price: Money::zero(),
        rating: 4.0 + (entry.mrp_rupees % 10) as f64 / 10.0,
        images: Vec::new(),
        tags: entry.tags.iter().map(|t| t.to_string()).collect(),
        warranty: Some("6 months".to_string()),
        return_policy: Some("7-day replacement".to_string()),
        is_active: true,
        is_featured: entry.featured,
        variants,
        total_stock: entry.stock,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}
