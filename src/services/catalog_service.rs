//! Catalog cache.
//!
//! Holds the last fetched product table as an immutable snapshot behind an
//! `Arc`. A refresh builds a complete new snapshot and swaps the pointer,
//! so readers always see either the old or the new table, never a mix.
//!
//! # Staleness
//!
//! `refresh(false)` is a no-op while the snapshot is younger than the TTL.
//! A failed fetch leaves the previous snapshot in place.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::clients::CatalogSource;
use crate::error::AppError;
use crate::models::product::Product;

/// One complete fetched product table.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub products: Vec<Product>,
    fetched_at: Option<Instant>,
}

pub struct CatalogCache {
    source: Arc<dyn CatalogSource>,
    ttl: Duration,
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    // Serializes fetches so concurrent stale readers trigger one request.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn CatalogSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn is_fresh(&self) -> bool {
        self.snapshot()
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.ttl)
    }

    /// Refetch the product table if forced or older than the TTL.
    ///
    /// Returns the number of products in the current snapshot.
    ///
    /// # Errors
    ///
    /// Propagates the catalog source error; the previous snapshot stays valid.
    pub async fn refresh(&self, force: bool) -> Result<usize, AppError> {
        if !force && self.is_fresh() {
            return Ok(self.len());
        }

        let _guard = self.refresh_lock.lock().await;
        if !force && self.is_fresh() {
            return Ok(self.len());
        }

        let rows = self.source.fetch_rows().await?;
        let products: Vec<Product> = rows.iter().filter_map(Product::from_row).collect();
        let count = products.len();

        let next = Arc::new(CatalogSnapshot {
            products,
            fetched_at: Some(Instant::now()),
        });
        *self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;

        tracing::info!(products = count, "catalog refreshed");
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.snapshot().products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a product by code, ignoring case, diacritics and extra whitespace.
    pub fn lookup(&self, code: &str) -> Option<Product> {
        let wanted = normalize(code);
        if wanted.is_empty() {
            return None;
        }
        self.snapshot()
            .products
            .iter()
            .find(|p| normalize(&p.code) == wanted)
            .cloned()
    }

    /// Products whose name, description, code or category contains `query`.
    pub fn search(&self, query: &str) -> Vec<Product> {
        let needle = normalize(query);
        self.snapshot()
            .products
            .iter()
            .filter(|p| {
                [&p.name, &p.description, &p.code, &p.category]
                    .iter()
                    .any(|field| normalize(field).contains(&needle))
            })
            .cloned()
            .collect()
    }

    /// Products whose category contains `category`, in sheet order.
    ///
    /// An empty filter returns the whole catalog.
    pub fn in_category(&self, category: &str) -> Vec<Product> {
        let needle = normalize(category);
        self.snapshot()
            .products
            .iter()
            .filter(|p| normalize(&p.category).contains(&needle))
            .cloned()
            .collect()
    }

    /// Distinct non-empty categories, sorted.
    pub fn categories(&self) -> BTreeSet<String> {
        self.snapshot()
            .products
            .iter()
            .filter(|p| !p.category.is_empty())
            .map(|p| p.category.clone())
            .collect()
    }
}

/// Lower-case, strip diacritics (NFKD minus combining marks) and collapse
/// whitespace.
pub fn normalize(s: &str) -> String {
    let folded: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::CatalogRow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedSource {
        rows: Mutex<Vec<CatalogRow>>,
        fail: Mutex<bool>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn set(&self, rows: &[(&str, &str, &str, &str)]) {
            *self.rows.lock().unwrap() = rows
                .iter()
                .map(|(code, name, price, category)| {
                    CatalogRow::from([
                        ("kode".to_string(), code.to_string()),
                        ("nama".to_string(), name.to_string()),
                        ("harga".to_string(), price.to_string()),
                        ("kategori".to_string(), category.to_string()),
                    ])
                })
                .collect();
        }
    }

    #[async_trait]
    impl CatalogSource for ScriptedSource {
        async fn fetch_rows(&self) -> Result<Vec<CatalogRow>, AppError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if *self.fail.lock().unwrap() {
                return Err(AppError::Upstream("sheet down".to_string()));
            }
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    fn cache(ttl: Duration) -> (Arc<ScriptedSource>, CatalogCache) {
        let source = Arc::new(ScriptedSource::default());
        source.set(&[
            ("SPO3B", "Spotify Prémium 3 Bulan", "45000", "Music"),
            ("nfx1", "Netflix  Standard", "50000", "Video"),
            ("yt1", "YouTube Premium", "20000", "Video"),
        ]);
        let cache = CatalogCache::new(source.clone(), ttl);
        (source, cache)
    }

    #[test]
    fn normalize_folds_case_accents_and_spaces() {
        assert_eq!(normalize("  Prémium   Café "), "premium cafe");
        assert_eq!(normalize("SPO3B"), "spo3b");
    }

    #[tokio::test]
    async fn lookup_is_case_and_accent_insensitive() {
        let (_, cache) = cache(Duration::from_secs(300));
        cache.refresh(false).await.unwrap();

        assert_eq!(cache.lookup("spo3b").unwrap().unit_price, 45000);
        assert_eq!(cache.lookup(" NFX1 ").unwrap().name, "Netflix  Standard");
        assert!(cache.lookup("missing").is_none());
        assert!(cache.lookup("").is_none());
    }

    #[tokio::test]
    async fn search_matches_name_code_and_category() {
        let (_, cache) = cache(Duration::from_secs(300));
        cache.refresh(false).await.unwrap();

        assert_eq!(cache.search("premium").len(), 2);
        assert_eq!(cache.search("netflix standard").len(), 1);
        assert_eq!(cache.search("video").len(), 2);
        assert!(cache.search("game").is_empty());
    }

    #[tokio::test]
    async fn category_filter_keeps_sheet_order() {
        let (_, cache) = cache(Duration::from_secs(300));
        cache.refresh(false).await.unwrap();

        let video: Vec<_> = cache.in_category("vid").into_iter().map(|p| p.code).collect();
        assert_eq!(video, vec!["nfx1", "yt1"]);
        assert_eq!(cache.in_category("").len(), 3);
        assert!(cache.in_category("games").is_empty());
    }

    #[tokio::test]
    async fn categories_are_sorted_and_distinct() {
        let (_, cache) = cache(Duration::from_secs(300));
        cache.refresh(false).await.unwrap();

        let categories: Vec<_> = cache.categories().into_iter().collect();
        assert_eq!(categories, vec!["Music", "Video"]);
    }

    #[tokio::test]
    async fn refresh_within_ttl_is_a_no_op() {
        let (source, cache) = cache(Duration::from_secs(300));
        cache.refresh(false).await.unwrap();
        cache.refresh(false).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        cache.refresh(true).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_cache_refetches() {
        let (source, cache) = cache(Duration::ZERO);
        cache.refresh(false).await.unwrap();
        cache.refresh(false).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let (source, cache) = cache(Duration::from_secs(300));
        cache.refresh(false).await.unwrap();

        *source.fail.lock().unwrap() = true;
        assert!(cache.refresh(true).await.is_err());
        assert_eq!(cache.len(), 3);
        assert!(cache.lookup("yt1").is_some());
    }

    #[tokio::test]
    async fn refresh_replaces_the_whole_table() {
        let (source, cache) = cache(Duration::from_secs(300));
        cache.refresh(false).await.unwrap();

        source.set(&[("new1", "New Thing", "1000", "")]);
        cache.refresh(true).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.lookup("spo3b").is_none());
        assert!(cache.categories().is_empty());
    }
}
