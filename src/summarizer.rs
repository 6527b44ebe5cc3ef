use crate::constants::*;
use crate::error::Result;
use crate::store::Store;
use crate::table::{ColumnType, Table};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Vendor summary query.
///
/// Three grouped aggregates (freight per vendor, purchases per vendor and
/// brand joined to the price list, sales per vendor and brand) combined
/// with left joins so every purchase group survives. Every summed or
/// filtered field goes through `try_real`, so malformed numbers drop out
/// as nulls instead of failing the query. A group with no parseable dollars
/// sorts as zero, matching the value it is filled with after cleaning. Ties
/// on purchase dollars are ordered by the remaining group keys to keep the
/// output reproducible.
pub const SUMMARY_QUERY: &str = r#"
WITH FreightSummary AS (
    SELECT
        VendorNumber,
        SUM(try_real(Freight)) AS FreightCost
    FROM vendor_invoice
    GROUP BY VendorNumber
),

PurchaseSummary AS (
    SELECT
        p.VendorNumber,
        p.VendorName,
        p.Brand,
        p.Description,
        p.PurchasePrice,
        pp.Volume,
        pp.Price AS ActualPrice,
        SUM(try_real(p.Quantity)) AS TotalPurchaseQuantity,
        SUM(try_real(p.Dollars)) AS TotalPurchaseDollars
    FROM purchases AS p
    JOIN purchase_prices AS pp
        ON p.Brand = pp.Brand
    WHERE try_real(p.PurchasePrice) > 0
    GROUP BY p.VendorNumber, p.VendorName, p.Brand, p.Description, p.PurchasePrice, pp.Volume, pp.Price
),

SalesSummary AS (
    SELECT
        VendorNo,
        Brand,
        SUM(try_real(SalesDollars)) AS TotalSalesDollars,
        SUM(try_real(SalesPrice)) AS TotalSalesPrice,
        SUM(try_real(SalesQuantity)) AS TotalSalesQuantity,
        SUM(try_real(ExciseTax)) AS TotalExciseTax
    FROM sales
    GROUP BY VendorNo, Brand
)

SELECT
    ps.VendorNumber AS VendorNumber,
    ps.VendorName AS VendorName,
    ps.Brand AS Brand,
    ps.Description AS Description,
    ps.PurchasePrice AS PurchasePrice,
    ps.ActualPrice AS ActualPrice,
    ps.Volume AS Volume,
    ps.TotalPurchaseQuantity AS TotalPurchaseQuantity,
    ps.TotalPurchaseDollars AS TotalPurchaseDollars,
    ss.TotalSalesQuantity AS TotalSalesQuantity,
    ss.TotalSalesDollars AS TotalSalesDollars,
    ss.TotalSalesPrice AS TotalSalesPrice,
    ss.TotalExciseTax AS TotalExciseTax,
    fs.FreightCost AS FreightCost
FROM PurchaseSummary AS ps
LEFT JOIN SalesSummary AS ss
    ON ps.VendorNumber = ss.VendorNo
    AND ps.Brand = ss.Brand
LEFT JOIN FreightSummary AS fs
    ON ps.VendorNumber = fs.VendorNumber
ORDER BY
    COALESCE(ps.TotalPurchaseDollars, 0) DESC,
    ps.VendorNumber,
    ps.Brand,
    ps.VendorName,
    ps.Description,
    ps.PurchasePrice,
    ps.Volume,
    ps.ActualPrice
"#;

/// Column type enforcement applied before the derived columns.
const TYPE_FIXES: [(&str, ColumnType); 6] = [
    (VOLUME, ColumnType::Real),
    (VENDOR_NUMBER, ColumnType::Integer),
    (BRAND, ColumnType::Integer),
    (PURCHASE_PRICE, ColumnType::Real),
    (ACTUAL_PRICE, ColumnType::Real),
    (TOTAL_PURCHASE_QUANTITY, ColumnType::Integer),
];

const TRIMMED_COLUMNS: [&str; 2] = [VENDOR_NAME, DESCRIPTION];

/// Result of a summary run
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub table: String,
    pub rows: usize,
    pub fingerprint: String,
}

/// Runs the summary query. Left-join misses come back as nulls.
pub fn compute_summary<S: Store>(store: &S) -> Result<Table> {
    store.query(SUMMARY_QUERY)
}

/// Fixes column types, trims text keys, adds the four derived metrics and
/// then zero-fills infinities and missing values across the whole table.
pub fn clean_and_enrich(mut table: Table) -> Result<Table> {
    for (name, dtype) in TYPE_FIXES {
        table.cast_column(name, dtype)?;
    }
    for name in TRIMMED_COLUMNS {
        table.trim_text(name)?;
    }

    let sales_dollars = table.numeric_column(TOTAL_SALES_DOLLARS)?;
    let purchase_dollars = table.numeric_column(TOTAL_PURCHASE_DOLLARS)?;
    let sales_quantity = table.numeric_column(TOTAL_SALES_QUANTITY)?;
    let purchase_quantity = table.numeric_column(TOTAL_PURCHASE_QUANTITY)?;

    let gross_profit: Vec<f64> = sales_dollars
        .iter()
        .zip(&purchase_dollars)
        .map(|(sales, purchases)| sales - purchases)
        .collect();
    let profit_margin: Vec<f64> = gross_profit
        .iter()
        .zip(&sales_dollars)
        .map(|(profit, sales)| profit / sales * 100.0)
        .collect();
    let stock_turnover: Vec<f64> = sales_quantity
        .iter()
        .zip(&purchase_quantity)
        .map(|(sold, bought)| sold / bought)
        .collect();
    let sales_to_purchase: Vec<f64> = sales_dollars
        .iter()
        .zip(&purchase_dollars)
        .map(|(sales, purchases)| sales / purchases)
        .collect();

    table.set_real_column(GROSS_PROFIT, gross_profit);
    table.set_real_column(PROFIT_MARGIN, profit_margin);
    table.set_real_column(STOCK_TURNOVER, stock_turnover);
    table.set_real_column(SALES_TO_PURCHASE_RATIO, sales_to_purchase);

    // Runs over every column, so join misses are zero-filled here as well.
    let infinite = table.replace_infinite();
    let missing = table.fill_missing();
    debug!(infinite, missing, "Normalized non-finite and missing values");

    Ok(table)
}

/// Builds the vendor summary and replaces `table_name` with it.
///
/// Any failure aborts the run before the write, so the previous summary is
/// left untouched.
#[instrument(skip(store))]
pub fn run_summary<S: Store>(store: &mut S, table_name: &str) -> Result<SummaryReport> {
    info!("Creating Vendor Summary Table.....");
    let summary = compute_summary(&*store)?;
    info!("Summary preview:\n{}", summary.head(5));

    info!("Cleaning Data....");
    let cleaned = clean_and_enrich(summary)?;
    info!("Cleaned preview:\n{}", cleaned.head(5));

    info!("Ingesting Data....");
    store.replace_table(table_name, &cleaned)?;

    let report = SummaryReport {
        table: table_name.to_string(),
        rows: cleaned.row_count(),
        fingerprint: cleaned.fingerprint(),
    };
    info!(
        table = %report.table,
        rows = report.rows,
        fingerprint = %report.fingerprint,
        "Completed"
    );
    Ok(report)
}
