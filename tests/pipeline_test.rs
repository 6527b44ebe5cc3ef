use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

use vendor_etl::config::Config;
use vendor_etl::constants::*;
use vendor_etl::jobs;
use vendor_etl::loader::{self, LoadStatus};
use vendor_etl::runs::RunRecorder;
use vendor_etl::store::{SqliteStore, Store};
use vendor_etl::summarizer;
use vendor_etl::table::{ColumnType, Table, Value};

const FIXTURES: [&str; 4] = [
    "purchases.csv",
    "purchase_prices.csv",
    "sales.csv",
    "vendor_invoice.csv",
];

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// Copies the fixture exports into a scratch data directory.
fn data_dir_with_fixtures() -> Result<TempDir> {
    let dir = tempdir()?;
    for name in FIXTURES {
        fs::copy(fixture_dir().join(name), dir.path().join(name))?;
    }
    Ok(dir)
}

fn config_for(data_dir: &Path, database: &Path) -> Config {
    Config {
        database: database.to_path_buf(),
        data_dir: data_dir.to_path_buf(),
        ..Config::default()
    }
}

fn real(table: &Table, row: usize, column: &str) -> f64 {
    table
        .get(row, column)
        .and_then(Value::as_f64)
        .unwrap_or_else(|| panic!("{column} in row {row} is not numeric"))
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

fn row_for_brand(table: &Table, brand: i64) -> usize {
    (0..table.row_count())
        .find(|&row| table.get(row, BRAND) == Some(&Value::Integer(brand)))
        .unwrap_or_else(|| panic!("brand {brand} missing from summary"))
}

#[test]
fn loaded_tables_match_data_row_counts() -> Result<()> {
    let data = data_dir_with_fixtures()?;
    let mut store = SqliteStore::open_in_memory()?;

    let report = loader::load_directory(&mut store, data.path(), &default_extensions())?;
    assert_eq!(report.loaded(), 4);
    assert_eq!(report.failed(), 0);

    for (table, rows) in [
        (PURCHASES_TABLE, 7),
        (PURCHASE_PRICES_TABLE, 5),
        (SALES_TABLE, 3),
        (VENDOR_INVOICE_TABLE, 2),
    ] {
        let loaded = store.query(&format!("SELECT * FROM {table}"))?;
        assert_eq!(loaded.row_count(), rows, "{table}");
    }

    let purchases = store.query("SELECT * FROM purchases")?;
    assert_eq!(purchases.column(BRAND)?.dtype, ColumnType::Integer);
    assert_eq!(purchases.column(PURCHASE_PRICE)?.dtype, ColumnType::Text);
    Ok(())
}

#[test]
fn malformed_file_does_not_stop_the_batch() -> Result<()> {
    let data = data_dir_with_fixtures()?;
    fs::write(data.path().join("broken.csv"), "a,b\n1,2\n3\n")?;
    fs::write(data.path().join("empty.csv"), "")?;
    let mut store = SqliteStore::open_in_memory()?;

    let report = loader::load_directory(&mut store, data.path(), &default_extensions())?;
    assert_eq!(report.files.len(), 6);
    assert_eq!(report.loaded(), 4);
    assert_eq!(report.failed(), 2);

    let broken = report.files.iter().find(|f| f.file == "broken.csv").unwrap();
    assert!(matches!(broken.status, LoadStatus::Failed { .. }));

    let tables = store.table_names()?;
    assert!(!tables.contains(&"broken".to_string()));
    for name in FIXTURES {
        let table = name.trim_end_matches(".csv").to_string();
        assert!(tables.contains(&table), "{table} missing");
    }
    Ok(())
}

#[test]
fn reloading_replaces_tables_with_identical_content() -> Result<()> {
    let data = data_dir_with_fixtures()?;
    let mut store = SqliteStore::open_in_memory()?;

    loader::load_directory(&mut store, data.path(), &default_extensions())?;
    let first = store.query("SELECT * FROM purchases")?.fingerprint();

    loader::load_directory(&mut store, data.path(), &default_extensions())?;
    let second = store.query("SELECT * FROM purchases")?;
    assert_eq!(second.row_count(), 7);
    assert_eq!(first, second.fingerprint());
    Ok(())
}

#[test]
fn summary_keeps_every_purchase_group_and_zero_fills_misses() -> Result<()> {
    let data = data_dir_with_fixtures()?;
    let mut store = SqliteStore::open_in_memory()?;
    loader::load_directory(&mut store, data.path(), &default_extensions())?;

    let raw = summarizer::compute_summary(&store)?;
    // Brand 62 has a zero price and brand 63 an unparseable one.
    assert_eq!(raw.row_count(), 3);
    let unmatched = row_for_brand(&raw, 60);
    assert_eq!(raw.get(unmatched, TOTAL_SALES_DOLLARS), Some(&Value::Null));

    let summary = summarizer::clean_and_enrich(raw)?;
    assert_eq!(summary.columns().len(), 18);

    let brands: Vec<&Value> = (0..summary.row_count())
        .map(|row| summary.get(row, BRAND).unwrap())
        .collect();
    assert_eq!(
        brands,
        vec![&Value::Integer(60), &Value::Integer(58), &Value::Integer(64)]
    );

    // Brand 60 has no sales rows; vendor 4466 has no invoices.
    let no_sales = row_for_brand(&summary, 60);
    for column in [
        TOTAL_SALES_DOLLARS,
        TOTAL_SALES_QUANTITY,
        TOTAL_SALES_PRICE,
        TOTAL_EXCISE_TAX,
        GROSS_PROFIT,
        PROFIT_MARGIN,
        STOCK_TURNOVER,
        SALES_TO_PURCHASE_RATIO,
    ] {
        assert_eq!(real(&summary, no_sales, column), 0.0, "{column}");
    }
    assert_close(real(&summary, no_sales, FREIGHT_COST), 4.0);
    assert_eq!(real(&summary, row_for_brand(&summary, 64), FREIGHT_COST), 0.0);

    let matched = row_for_brand(&summary, 58);
    assert_eq!(summary.get(matched, TOTAL_PURCHASE_QUANTITY), Some(&Value::Integer(10)));
    assert_close(real(&summary, matched, TOTAL_PURCHASE_DOLLARS), 92.80);
    assert_close(real(&summary, matched, TOTAL_SALES_DOLLARS), 64.95);
    assert_close(real(&summary, matched, GROSS_PROFIT), 64.95 - 92.80);
    assert_close(real(&summary, matched, STOCK_TURNOVER), 0.5);
    assert_close(real(&summary, matched, SALES_TO_PURCHASE_RATIO), 64.95 / 92.80);
    assert_eq!(
        summary.get(matched, VENDOR_NAME),
        Some(&Value::Text("ACME SPIRITS".into()))
    );
    assert_eq!(summary.get(matched, PURCHASE_PRICE), Some(&Value::Real(9.28)));

    for row in summary.rows() {
        for cell in row {
            assert!(!cell.is_missing() && !cell.is_infinite(), "{cell:?}");
        }
    }
    Ok(())
}

#[test]
fn zero_sales_and_bad_quantities() -> Result<()> {
    let data = data_dir_with_fixtures()?;
    let mut store = SqliteStore::open_in_memory()?;
    loader::load_directory(&mut store, data.path(), &default_extensions())?;

    let summary = summarizer::clean_and_enrich(summarizer::compute_summary(&store)?)?;
    let row = row_for_brand(&summary, 64);

    // The "abc" quantity is dropped from the sum; its dollars still count.
    assert_eq!(summary.get(row, TOTAL_PURCHASE_QUANTITY), Some(&Value::Integer(3)));
    assert_close(real(&summary, row, TOTAL_PURCHASE_DOLLARS), 35.0);
    assert_eq!(
        summary.get(row, DESCRIPTION),
        Some(&Value::Text("Lemon Vodka".into()))
    );
    assert_eq!(real(&summary, row, TOTAL_SALES_DOLLARS), 0.0);
    assert_close(real(&summary, row, GROSS_PROFIT), -35.0);
    assert_eq!(real(&summary, row, PROFIT_MARGIN), 0.0);
    assert_eq!(real(&summary, row, STOCK_TURNOVER), 0.0);
    assert_eq!(real(&summary, row, SALES_TO_PURCHASE_RATIO), 0.0);
    Ok(())
}

#[test]
fn summary_is_sorted_by_purchase_dollars() -> Result<()> {
    let data = data_dir_with_fixtures()?;
    let mut store = SqliteStore::open_in_memory()?;
    loader::load_directory(&mut store, data.path(), &default_extensions())?;

    summarizer::run_summary(&mut store, SUMMARY_TABLE)?;
    let summary = store.query("SELECT * FROM vendor_sales_summary")?;
    let dollars = summary.numeric_column(TOTAL_PURCHASE_DOLLARS)?;
    assert_eq!(dollars.len(), 3);
    assert!(dollars.windows(2).all(|pair| pair[0] >= pair[1]), "{dollars:?}");
    assert_close(dollars[0], 106.0);
    assert_close(dollars[1], 92.8);
    assert_close(dollars[2], 35.0);
    Ok(())
}

#[test]
fn unparseable_dollars_sort_as_zero_above_returns() -> Result<()> {
    let data = tempdir()?;
    for name in FIXTURES {
        fs::copy(
            fixture_dir().join("returns").join(name),
            data.path().join(name),
        )?;
    }
    let mut store = SqliteStore::open_in_memory()?;
    loader::load_directory(&mut store, data.path(), &default_extensions())?;

    let summary = summarizer::clean_and_enrich(summarizer::compute_summary(&store)?)?;
    let dollars = summary.numeric_column(TOTAL_PURCHASE_DOLLARS)?;
    assert_eq!(dollars, vec![20.0, 0.0, -5.0]);
    assert!(dollars.windows(2).all(|pair| pair[0] >= pair[1]), "{dollars:?}");
    assert_eq!(summary.get(1, BRAND), Some(&Value::Integer(11)));
    assert_eq!(summary.get(2, BRAND), Some(&Value::Integer(10)));
    Ok(())
}

#[test]
fn summarizing_twice_is_reproducible() -> Result<()> {
    let data = data_dir_with_fixtures()?;
    let mut store = SqliteStore::open_in_memory()?;
    loader::load_directory(&mut store, data.path(), &default_extensions())?;

    let first = summarizer::run_summary(&mut store, SUMMARY_TABLE)?;
    let stored_first = store.query("SELECT * FROM vendor_sales_summary")?;
    let second = summarizer::run_summary(&mut store, SUMMARY_TABLE)?;
    let stored_second = store.query("SELECT * FROM vendor_sales_summary")?;

    assert_eq!(first.rows, 3);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(stored_first, stored_second);
    assert_eq!(stored_first.fingerprint(), first.fingerprint);
    Ok(())
}

#[test]
fn failed_summary_leaves_previous_table() -> Result<()> {
    let data = data_dir_with_fixtures()?;
    let mut store = SqliteStore::open_in_memory()?;
    loader::load_directory(&mut store, data.path(), &default_extensions())?;
    summarizer::run_summary(&mut store, SUMMARY_TABLE)?;

    store.execute_batch("DROP TABLE sales")?;
    assert!(summarizer::run_summary(&mut store, SUMMARY_TABLE).is_err());

    let kept = store.query("SELECT * FROM vendor_sales_summary")?;
    assert_eq!(kept.row_count(), 3);
    Ok(())
}

#[test]
fn jobs_record_runs_in_the_ledger() -> Result<()> {
    let data = data_dir_with_fixtures()?;
    fs::write(data.path().join("broken.csv"), "a,b\n1,2\n3\n")?;
    let db_dir = tempdir()?;
    let config = config_for(data.path(), &db_dir.path().join("store").join("inventory.db"));

    {
        let mut store = SqliteStore::open(&config.database)?;
        let load = jobs::load_job(&mut store, &config)?;
        assert_eq!(load.failed(), 1);
        let summary = jobs::summarize_job(&mut store, &config)?;
        assert_eq!(summary.rows, 3);
    }

    // Reopen to check everything reached the file.
    let store = SqliteStore::open(&config.database)?;
    let history = RunRecorder::history(&store, 10)?;
    assert_eq!(history.row_count(), 2);
    let mut statuses: Vec<(String, String)> = (0..history.row_count())
        .map(|row| {
            (
                history.get(row, "job").unwrap().to_string(),
                history.get(row, "status").unwrap().to_string(),
            )
        })
        .collect();
    statuses.sort();
    assert_eq!(
        statuses,
        vec![
            ("load".to_string(), "partial".to_string()),
            ("summarize".to_string(), "succeeded".to_string()),
        ]
    );
    assert!(store.table_names()?.contains(&SUMMARY_TABLE.to_string()));
    Ok(())
}

#[test]
fn summarize_without_base_tables_fails_the_run() -> Result<()> {
    let data = tempdir()?;
    let db_dir = tempdir()?;
    let config = config_for(data.path(), &db_dir.path().join("inventory.db"));
    let mut store = SqliteStore::open(&config.database)?;

    assert!(jobs::summarize_job(&mut store, &config).is_err());

    let history = RunRecorder::history(&store, 10)?;
    assert_eq!(history.get(0, "status"), Some(&Value::Text("failed".into())));
    assert!(!store.table_names()?.contains(&SUMMARY_TABLE.to_string()));
    Ok(())
}
