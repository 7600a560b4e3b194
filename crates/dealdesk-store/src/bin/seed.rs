//! # Seed Data Generator
//!
//! Populates the database with a realistic multi-state set of
//! jurisdiction rates and state rules for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./dealdesk_dev.db (default)
//! cargo run -p dealdesk-store --bin seed
//!
//! # Specify database path
//! cargo run -p dealdesk-store --bin seed -- --db ./data/dealdesk.db
//! ```
//!
//! ## Seeded States
//! Rates are plausible development data, not a compliance feed:
//! - TX: 6.25% state, Austin metro locals, bifurcated-style doc fee rule
//! - CA: 7.25% state, LA county + district, rebates taxable
//! - OH: 5.75% state, monthly-style lease rule for contrast
//! - OK: 1.25% on vehicles, drive-out destination example
//! - MI: 6% state, capped trade-in credit

use chrono::NaiveDate;
use std::env;
use uuid::Uuid;

use dealdesk_core::jurisdiction::{Jurisdiction, JurisdictionLevel};
use dealdesk_core::money::TaxRate;
use dealdesk_core::rules::{LeaseTaxMethod, StateRule, TradeInCredit};
use dealdesk_store::{Store, StoreConfig};

const EFFECTIVE: &str = "2024-01-01";

fn effective() -> NaiveDate {
    EFFECTIVE.parse().expect("valid seed effective date")
}

fn state_row(state: &str, rate: &str) -> Jurisdiction {
    Jurisdiction {
        id: Uuid::new_v4(),
        level: JurisdictionLevel::State,
        state_code: state.to_string(),
        name: state.to_string(),
        rate: TaxRate::from_fraction(rate.parse().expect("valid seed rate")),
        effective_date: effective(),
        end_date: None,
    }
}

fn local_row(level: JurisdictionLevel, state: &str, name: &str, rate: &str) -> Jurisdiction {
    Jurisdiction {
        id: Uuid::new_v4(),
        level,
        state_code: state.to_string(),
        name: name.to_string(),
        rate: TaxRate::from_fraction(rate.parse().expect("valid seed rate")),
        effective_date: effective(),
        end_date: None,
    }
}

fn zips(list: &[&str]) -> Vec<String> {
    list.iter().map(|z| z.to_string()).collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./dealdesk_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Deal Desk Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./dealdesk_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Deal Desk Seed Data Generator");
    println!("================================");
    println!("Database: {}", db_path);
    println!();

    let store = Store::new(StoreConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = store.jurisdictions().load_rate_table().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has jurisdiction data");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Seeding jurisdictions...");
    let jurisdictions = store.jurisdictions();

    // State-level rows
    for (state, rate) in [
        ("TX", "0.0625"),
        ("CA", "0.0725"),
        ("OH", "0.0575"),
        ("OK", "0.0125"),
        ("MI", "0.06"),
    ] {
        jurisdictions.insert(&state_row(state, rate), &[]).await?;
        println!("  {} state rate {}", state, rate);
    }

    // Austin metro: county + city + transit district over the same ZIPs
    let austin_zips = zips(&["78701", "78702", "78703", "78704", "78705"]);
    jurisdictions
        .insert(
            &local_row(JurisdictionLevel::County, "TX", "Travis County", "0.005"),
            &austin_zips,
        )
        .await?;
    jurisdictions
        .insert(
            &local_row(JurisdictionLevel::City, "TX", "Austin", "0.01"),
            &austin_zips,
        )
        .await?;
    jurisdictions
        .insert(
            &local_row(
                JurisdictionLevel::SpecialDistrict,
                "TX",
                "Austin MTA",
                "0.005",
            ),
            &austin_zips,
        )
        .await?;

    // Los Angeles: county + measure district
    let la_zips = zips(&["90001", "90012", "90210"]);
    jurisdictions
        .insert(
            &local_row(
                JurisdictionLevel::County,
                "CA",
                "Los Angeles County",
                "0.01",
            ),
            &la_zips,
        )
        .await?;
    jurisdictions
        .insert(
            &local_row(
                JurisdictionLevel::SpecialDistrict,
                "CA",
                "LA County Measure M",
                "0.005",
            ),
            &la_zips,
        )
        .await?;

    // Columbus
    jurisdictions
        .insert(
            &local_row(JurisdictionLevel::County, "OH", "Franklin County", "0.0175"),
            &zips(&["43004", "43215", "43230"]),
        )
        .await?;

    println!("  3 metro areas with layered local rates");

    println!();
    println!("Seeding state rules...");
    let rules = store.state_rules();

    // TX: full credit both layers, doc fee taxable uncapped
    let mut tx = StateRule::conservative_default("TX");
    tx.version = Uuid::new_v4();
    tx.effective_date = effective();
    tx.drive_out_eligible = true;
    tx.max_combined_local_rate = Some(TaxRate::from_percent("2".parse()?));
    rules.insert(&tx).await?;

    // CA: no trade-in credit, rebates taxable
    let mut ca = StateRule::conservative_default("CA");
    ca.version = Uuid::new_v4();
    ca.effective_date = effective();
    ca.trade_in_credit = TradeInCredit::None;
    ca.doc_fee_cap = Some("85".parse()?);
    rules.insert(&ca).await?;

    // OH: monthly lease taxation, manufacturer rebates reduce the base
    let mut oh = StateRule::conservative_default("OH");
    oh.version = Uuid::new_v4();
    oh.effective_date = effective();
    oh.lease_tax_method = LeaseTaxMethod::Monthly;
    oh.manufacturer_rebate_reduces_base = true;
    oh.reciprocity_credit = true;
    rules.insert(&oh).await?;

    // OK: low vehicle rate, reciprocity
    let mut ok = StateRule::conservative_default("OK");
    ok.version = Uuid::new_v4();
    ok.effective_date = effective();
    ok.reciprocity_credit = true;
    rules.insert(&ok).await?;

    // MI: capped trade-in credit, bifurcated-style local treatment
    let mut mi = StateRule::conservative_default("MI");
    mi.version = Uuid::new_v4();
    mi.effective_date = effective();
    mi.trade_in_credit = TradeInCredit::Capped {
        cap: "10000".parse()?,
    };
    mi.trade_in_credit_applies_to_local = false;
    rules.insert(&mi).await?;

    println!("  5 state rules");

    // Smoke-check the seeded data end to end
    println!();
    println!("Verifying...");
    let table = store.jurisdictions().load_rate_table().await?;
    let set = table.resolve("78701", effective(), None)?;
    println!(
        "  78701 resolves to {} + {} locals, combined {}",
        set.state.name,
        set.locals.len(),
        set.total_rate()
    );

    println!();
    println!("✓ Seed complete!");
    Ok(())
}
