// Catalog service
// Store listings and product pages read through the cache, plus the prewarm
// warmers that keep them hot.
// Author: kelexine (https://github.com/kelexine)

use super::client::MarketplaceClient;
use crate::cache::{AccessMeta, CacheOptions, CacheService};
use crate::config::{PrewarmConfig, UpstreamConfig};
use crate::error::{CacheError, Result};
use crate::prewarm::Warmer;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Cache key for a tenant's store listing.
pub fn store_key(tenant: &str) -> String {
    format!("store:{}", tenant)
}

/// Cache key for one page of a tenant's products.
pub fn products_key(tenant: &str, page: u32) -> String {
    format!("products:store:{}:page{}", tenant, page)
}

/// Tenants addressed by a purely numeric identifier are store ids,
/// anything else is a slug.
fn tenant_meta(tenant: &str) -> AccessMeta {
    if !tenant.is_empty() && tenant.bytes().all(|b| b.is_ascii_digit()) {
        AccessMeta::id(tenant)
    } else {
        AccessMeta::slug(tenant)
    }
}

/// Owns the store and product producers.
#[derive(Clone)]
pub struct CatalogService {
    cache: CacheService,
    client: Arc<MarketplaceClient>,
    listing_ttl: u64,
    products_ttl: u64,
    product_pages: u32,
}

impl CatalogService {
    pub fn new(
        cache: CacheService,
        client: MarketplaceClient,
        upstream: &UpstreamConfig,
        prewarm: &PrewarmConfig,
    ) -> Self {
        Self {
            cache,
            client: Arc::new(client),
            listing_ttl: upstream.listing_ttl_seconds,
            products_ttl: upstream.products_ttl_seconds,
            product_pages: prewarm.product_pages.max(1),
        }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    /// Store listing for `tenant`, counted as an access to that tenant.
    pub async fn store_listing(&self, tenant: &str, force: bool) -> Result<Value> {
        self.load_listing(tenant, force, Some(tenant_meta(tenant))).await
    }

    /// One page of products for `tenant`, counted as an access to that tenant.
    pub async fn product_page(&self, tenant: &str, page: u32, force: bool) -> Result<Value> {
        self.load_products(tenant, page, force, Some(tenant_meta(tenant)))
            .await
    }

    async fn load_listing(
        &self,
        tenant: &str,
        force: bool,
        meta: Option<AccessMeta>,
    ) -> Result<Value> {
        let tenant = validate_tenant(tenant)?;
        let client = Arc::clone(&self.client);
        let owned = tenant.to_string();

        let opts = self.options(self.listing_ttl, force, meta);
        self.cache
            .cache_or_fetch(
                &store_key(tenant),
                move || async move { client.store(&owned).await.map_err(anyhow::Error::from) },
                opts,
            )
            .await
    }

    async fn load_products(
        &self,
        tenant: &str,
        page: u32,
        force: bool,
        meta: Option<AccessMeta>,
    ) -> Result<Value> {
        let tenant = validate_tenant(tenant)?;
        let page = page.max(1);
        let client = Arc::clone(&self.client);
        let owned = tenant.to_string();

        let opts = self.options(self.products_ttl, force, meta);
        self.cache
            .cache_or_fetch(
                &products_key(tenant, page),
                move || async move {
                    client
                        .products(&owned, page)
                        .await
                        .map_err(anyhow::Error::from)
                },
                opts,
            )
            .await
    }

    fn options(&self, ttl: u64, force: bool, meta: Option<AccessMeta>) -> CacheOptions {
        let opts = self
            .cache
            .options()
            .ttl(i64::try_from(ttl).unwrap_or(i64::MAX))
            .force_refresh(force);
        match meta {
            Some(meta) => opts.meta(meta),
            None => opts,
        }
    }

    /// The prewarm callbacks for this catalog: the store listing and the
    /// first `product_pages` product pages.
    ///
    /// Both force a refresh and pass no access metadata, so prewarming never
    /// feeds back into the popularity ranking.
    pub fn warmers(&self) -> Vec<Warmer> {
        let listing = self.clone();
        let products = self.clone();

        vec![
            Warmer::new("store_listing", move |tenant: String| {
                let catalog = listing.clone();
                async move {
                    catalog.load_listing(&tenant, true, None).await?;
                    Ok::<(), anyhow::Error>(())
                }
            }),
            Warmer::new("product_pages", move |tenant: String| {
                let catalog = products.clone();
                async move {
                    for page in 1..=catalog.product_pages {
                        catalog.load_products(&tenant, page, true, None).await?;
                    }
                    debug!(
                        "[PREWARM] tenant={} product pages 1..={} warmed",
                        tenant, catalog.product_pages
                    );
                    Ok::<(), anyhow::Error>(())
                }
            }),
        ]
    }

    /// Drop every cached entry of `tenant`. Returns the number of keys removed.
    pub async fn invalidate_tenant(&self, tenant: &str) -> Result<u64> {
        let tenant = validate_tenant(tenant)?;
        let deleted = self.cache.invalidate_by_pattern(&store_key(tenant)).await
            + self
                .cache
                .invalidate_by_pattern(&format!("products:store:{}:*", tenant))
                .await;
        info!("Invalidated tenant={} ({} keys)", tenant, deleted);
        Ok(deleted)
    }
}

fn validate_tenant(tenant: &str) -> Result<&str> {
    let tenant = tenant.trim();
    if tenant.is_empty() {
        return Err(CacheError::InvalidKey("tenant must not be empty".to_string()));
    }
    if tenant.contains(['*', '?', ':']) {
        return Err(CacheError::InvalidKey(format!(
            "tenant {:?} contains reserved characters",
            tenant
        )));
    }
    Ok(tenant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};

    fn catalog(base_url: &str, store: Arc<MemoryStore>) -> CatalogService {
        let upstream = UpstreamConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        };
        let prewarm = PrewarmConfig {
            product_pages: 2,
            ..Default::default()
        };
        let store: Arc<dyn KeyValueStore> = store;
        let cache = CacheService::new(Some(store), CacheOptions::default());
        CatalogService::new(
            cache,
            MarketplaceClient::new(&upstream).unwrap(),
            &upstream,
            &prewarm,
        )
    }

    #[test]
    fn test_keys() {
        assert_eq!(store_key("pizza-place"), "store:pizza-place");
        assert_eq!(products_key("17", 3), "products:store:17:page3");
    }

    #[test]
    fn test_tenant_meta() {
        assert_eq!(tenant_meta("17"), AccessMeta::id("17"));
        assert_eq!(tenant_meta("pizza-place"), AccessMeta::slug("pizza-place"));
        assert_eq!(tenant_meta("17a"), AccessMeta::slug("17a"));
    }

    #[test]
    fn test_validate_tenant() {
        assert_eq!(validate_tenant(" shop ").unwrap(), "shop");
        assert!(validate_tenant("").is_err());
        assert!(validate_tenant("shop*").is_err());
        assert!(validate_tenant("a:b").is_err());
    }

    #[tokio::test]
    async fn test_listing_is_cached_and_tracked() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/stores/pizza-place")
            .with_status(200)
            .with_body(r#"{"slug":"pizza-place","name":"Pizza Place"}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::new(100));
        let catalog = catalog(&server.url(), Arc::clone(&store));

        let first = catalog.store_listing("pizza-place", false).await.unwrap();
        let second = catalog.store_listing("pizza-place", false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first["name"], "Pizza Place");
        assert!(store.get("store:pizza-place").await.unwrap().is_some());
        mock.assert_async().await;

        let top = catalog.cache().list_top_tenants(None);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].store_slug.as_deref(), Some("pizza-place"));
        assert_eq!(top[0].hits, 2);
    }

    #[tokio::test]
    async fn test_warmers_refresh_without_tracking() {
        let mut server = mockito::Server::new_async().await;
        let listing = server
            .mock("GET", "/stores/17")
            .with_status(200)
            .with_body(r#"{"id":"17"}"#)
            .expect(1)
            .create_async()
            .await;
        let pages = server
            .mock("GET", "/stores/17/products")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"items":[]}"#)
            .expect(2)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::new(100));
        let catalog = catalog(&server.url(), Arc::clone(&store));

        let warmers = catalog.warmers();
        assert_eq!(warmers.len(), 2);
        for warmer in &warmers {
            warmer.call("17").await.unwrap();
        }

        listing.assert_async().await;
        pages.assert_async().await;
        assert!(store.get("products:store:17:page1").await.unwrap().is_some());
        assert!(store.get("products:store:17:page2").await.unwrap().is_some());
        assert!(catalog.cache().tracker().is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_tenant() {
        let store = Arc::new(MemoryStore::new(100));
        store.set_with_expiry("store:shop", "{}", 60).await.unwrap();
        store
            .set_with_expiry("products:store:shop:page1", "{}", 60)
            .await
            .unwrap();
        store
            .set_with_expiry("products:store:shop:page2", "{}", 60)
            .await
            .unwrap();
        store
            .set_with_expiry("products:store:shopper:page1", "{}", 60)
            .await
            .unwrap();

        let catalog = catalog("http://127.0.0.1:9", Arc::clone(&store));
        assert_eq!(catalog.invalidate_tenant("shop").await.unwrap(), 3);
        assert!(store.get("products:store:shopper:page1").await.unwrap().is_some());
    }
}
