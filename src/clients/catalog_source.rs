//! Catalog source: where product rows come from.

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::product::CatalogRow;

/// Fetch the current product table.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_rows(&self) -> Result<Vec<CatalogRow>, AppError>;
}

/// Published CSV export of a spreadsheet, fetched over HTTP.
#[derive(Debug, Clone)]
pub struct CsvCatalogSource {
    client: reqwest::Client,
    url: String,
}

impl CsvCatalogSource {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl CatalogSource for CsvCatalogSource {
    async fn fetch_rows(&self) -> Result<Vec<CatalogRow>, AppError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!("catalog fetch returned {status}")));
        }
        let body = response.text().await?;
        parse_csv(&body)
    }
}

/// Used when no catalog URL is configured.
#[derive(Debug, Clone, Default)]
pub struct EmptyCatalogSource;

#[async_trait]
impl CatalogSource for EmptyCatalogSource {
    async fn fetch_rows(&self) -> Result<Vec<CatalogRow>, AppError> {
        Ok(Vec::new())
    }
}

/// Parse CSV with a header row into column-name keyed rows.
///
/// Header names are trimmed and lower-cased; short rows simply lack the
/// trailing columns.
pub fn parse_csv(body: &str) -> Result<Vec<CatalogRow>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::Upstream(format!("catalog csv header: {e}")))?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AppError::Upstream(format!("catalog csv row: {e}")))?;
        let row: CatalogRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        if row.values().any(|v| !v.is_empty()) {
            rows.push(row);
        }
    }
    Ok(rows)
}
