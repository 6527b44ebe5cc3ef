/// Table and column names shared by the loader, the summary query and the
/// cleaning step. Raw table names follow the export file names.

// Raw tables read by `summarizer::SUMMARY_QUERY`
pub const PURCHASES_TABLE: &str = "purchases";
pub const PURCHASE_PRICES_TABLE: &str = "purchase_prices";
pub const SALES_TABLE: &str = "sales";
pub const VENDOR_INVOICE_TABLE: &str = "vendor_invoice";

// Derived tables
pub const SUMMARY_TABLE: &str = "vendor_sales_summary";
pub const RUNS_TABLE: &str = "_etl_runs";

// Summary columns
pub const VENDOR_NUMBER: &str = "VendorNumber";
pub const VENDOR_NAME: &str = "VendorName";
pub const BRAND: &str = "Brand";
pub const DESCRIPTION: &str = "Description";
pub const PURCHASE_PRICE: &str = "PurchasePrice";
pub const ACTUAL_PRICE: &str = "ActualPrice";
pub const VOLUME: &str = "Volume";
pub const TOTAL_PURCHASE_QUANTITY: &str = "TotalPurchaseQuantity";
pub const TOTAL_PURCHASE_DOLLARS: &str = "TotalPurchaseDollars";
pub const TOTAL_SALES_QUANTITY: &str = "TotalSalesQuantity";
pub const TOTAL_SALES_DOLLARS: &str = "TotalSalesDollars";
pub const TOTAL_SALES_PRICE: &str = "TotalSalesPrice";
pub const TOTAL_EXCISE_TAX: &str = "TotalExciseTax";
pub const FREIGHT_COST: &str = "FreightCost";
pub const GROSS_PROFIT: &str = "GrossProfit";
pub const PROFIT_MARGIN: &str = "ProfitMargin";
pub const STOCK_TURNOVER: &str = "StockTurnover";
pub const SALES_TO_PURCHASE_RATIO: &str = "SalestoPurchaseRatio";

// Log files, one per job
pub const LOAD_LOG_FILE: &str = "ingestion_db.log";
pub const SUMMARY_LOG_FILE: &str = "get_vendor_summary.log";
pub const RUN_LOG_FILE: &str = "vendor_etl.log";

// Environment overrides
pub const DATABASE_ENV: &str = "VENDOR_ETL_DATABASE";
pub const DATA_DIR_ENV: &str = "VENDOR_ETL_DATA_DIR";
pub const LOG_DIR_ENV: &str = "VENDOR_ETL_LOG_DIR";

/// File extensions picked up by the loader when none are configured.
pub fn default_extensions() -> Vec<String> {
    vec!["csv".to_string(), "tsv".to_string()]
}

/// Field delimiter for a recognized extension. Anything that is not
/// tab-separated is read as comma-separated.
pub fn delimiter_for_extension(extension: &str) -> u8 {
    match extension.to_ascii_lowercase().as_str() {
        "tsv" | "tab" => b'\t',
        _ => b',',
    }
}
