//! Collaborator contracts for the reconciliation pipeline + sqlx/Postgres
//! implementations.
//!
//! The pipeline core only sees the three traits below; the concrete SQL,
//! schema names, and pooling live here.

use anyhow::Context;
use async_trait::async_trait;
use skusweep_core::{DeleteCategory, InventoryDocument, ProductCategory, SkuRecord};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::info;

pub const CRATE_NAME: &str = "skusweep-catalog";

/// Price list that qualifies a SKU as currently sellable.
pub const SALE_PRICE_LIST: &str = "Sale_plist00";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Read-only source-of-truth queries the pipeline consumes.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Every SKU present in both inventory tables.
    async fn fetch_all_skus(&self) -> Result<Vec<String>, CatalogError>;

    /// The subset of the given identifiers known to the inventory tables.
    async fn fetch_skus_matching(&self, skus: &[String]) -> Result<Vec<String>, CatalogError>;

    /// The subset of the given identifiers that is active, non-marketplace,
    /// and priced on the sale price list, tagged with its product type.
    async fn fetch_valid_skus(&self, skus: &[String]) -> Result<Vec<SkuRecord>, CatalogError>;
}

/// Destructive writes against the category-specific inventory tables.
#[async_trait]
pub trait InventoryTables: Send + Sync {
    async fn delete_by_skus(
        &self,
        category: DeleteCategory,
        skus: &[String],
    ) -> Result<u64, CatalogError>;
}

/// Document store holding one inventory document per SKU.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, sku_id: &str) -> Result<Option<InventoryDocument>, CatalogError>;
    async fn save(&self, doc: &InventoryDocument) -> Result<(), CatalogError>;
}

/// Schema names for the three relational namespaces. Values come from
/// configuration, never from user input.
#[derive(Debug, Clone)]
pub struct SchemaConfig {
    pub catalog_schema: String,
    pub pricing_schema: String,
    pub inventory_schema: String,
}

/// Postgres-backed implementation of [`CatalogSource`] and
/// [`InventoryTables`]. Two pools: one for the inventory schema, one for the
/// catalog/pricing schemas.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    inventory_pool: PgPool,
    catalog_pool: PgPool,
    schemas: SchemaConfig,
}

impl PgCatalog {
    pub fn new(inventory_pool: PgPool, catalog_pool: PgPool, schemas: SchemaConfig) -> Self {
        Self {
            inventory_pool,
            catalog_pool,
            schemas,
        }
    }

    pub async fn connect(
        inventory_url: &str,
        catalog_url: &str,
        schemas: SchemaConfig,
    ) -> anyhow::Result<Self> {
        let inventory_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(inventory_url)
            .await
            .context("connecting to inventory database")?;
        let catalog_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(catalog_url)
            .await
            .context("connecting to catalog database")?;
        Ok(Self::new(inventory_pool, catalog_pool, schemas))
    }

    fn all_skus_sql(&self) -> String {
        format!(
            "SELECT oi.sku_id \
             FROM {iuo}.online_inventory oi \
             INNER JOIN {iuo}.btvta_inventory bt ON oi.sku_id = bt.sku_id",
            iuo = self.schemas.inventory_schema
        )
    }

    fn matching_skus_sql(&self) -> String {
        format!(
            "SELECT DISTINCT oi.sku_id \
             FROM {iuo}.online_inventory oi \
             INNER JOIN {iuo}.btvta_inventory bt ON oi.sku_id = bt.sku_id \
             WHERE oi.sku_id = ANY($1)",
            iuo = self.schemas.inventory_schema
        )
    }

    fn valid_skus_sql(&self) -> String {
        format!(
            "SELECT DISTINCT ds.sku_id, ldp.product_type \
             FROM {cata}.lp_dcs_product ldp \
             INNER JOIN {cata}.dcs_prd_chldsku dpc ON ldp.product_id = dpc.product_id \
             INNER JOIN {cata}.lp_dcs_sku lds ON dpc.sku_id = lds.sku_id \
             INNER JOIN {cata}.dcs_sku ds ON ds.sku_id = lds.sku_id \
             INNER JOIN {core}.dcs_price dp ON dp.sku_id = ds.sku_id AND dp.price_list = $2 \
             INNER JOIN {cata}.dcs_sku_sites dss ON dss.sku_id = ds.sku_id \
             WHERE dpc.sku_id = ANY($1) \
             AND ldp.is_active = 1 AND lds.is_active = 1 AND ldp.is_market_place = 0",
            cata = self.schemas.catalog_schema,
            core = self.schemas.pricing_schema
        )
    }

    fn delete_sql(&self, category: DeleteCategory) -> String {
        let table = match category {
            DeleteCategory::BigTicket => "online_inventory",
            DeleteCategory::SoftLine => "btvta_inventory",
        };
        format!(
            "DELETE FROM {iuo}.{table} WHERE sku_id = ANY($1)",
            iuo = self.schemas.inventory_schema
        )
    }
}

#[async_trait]
impl CatalogSource for PgCatalog {
    async fn fetch_all_skus(&self) -> Result<Vec<String>, CatalogError> {
        let rows = sqlx::query(&self.all_skus_sql())
            .fetch_all(&self.inventory_pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("sku_id").map_err(CatalogError::from))
            .collect()
    }

    async fn fetch_skus_matching(&self, skus: &[String]) -> Result<Vec<String>, CatalogError> {
        if skus.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&self.matching_skus_sql())
            .bind(skus)
            .fetch_all(&self.inventory_pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("sku_id").map_err(CatalogError::from))
            .collect()
    }

    async fn fetch_valid_skus(&self, skus: &[String]) -> Result<Vec<SkuRecord>, CatalogError> {
        if skus.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&self.valid_skus_sql())
            .bind(skus)
            .bind(SALE_PRICE_LIST)
            .fetch_all(&self.catalog_pool)
            .await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let sku_id: String = row.try_get("sku_id")?;
            let product_type: i32 = row.try_get("product_type")?;
            records.push(SkuRecord::new(sku_id, ProductCategory::from_code(product_type)));
        }
        Ok(records)
    }
}

#[async_trait]
impl InventoryTables for PgCatalog {
    async fn delete_by_skus(
        &self,
        category: DeleteCategory,
        skus: &[String],
    ) -> Result<u64, CatalogError> {
        if skus.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(&self.delete_sql(category))
            .bind(skus)
            .execute(&self.inventory_pool)
            .await?;
        info!(
            ?category,
            requested = skus.len(),
            deleted = result.rows_affected(),
            "deleted sku rows"
        );
        Ok(result.rows_affected())
    }
}

/// Postgres JSONB implementation of [`DocumentStore`] over the
/// `inventory_documents` table (sku_id text primary key, doc jsonb).
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connecting to document database")?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, sku_id: &str) -> Result<Option<InventoryDocument>, CatalogError> {
        let row = sqlx::query("SELECT doc FROM inventory_documents WHERE sku_id = $1")
            .bind(sku_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let doc: serde_json::Value = row.try_get("doc")?;
        let doc = serde_json::from_value(doc)
            .with_context(|| format!("deserializing inventory document for {sku_id}"))?;
        Ok(Some(doc))
    }

    async fn save(&self, doc: &InventoryDocument) -> Result<(), CatalogError> {
        let value = serde_json::to_value(doc)
            .with_context(|| format!("serializing inventory document for {}", doc.id))?;
        sqlx::query(
            "INSERT INTO inventory_documents (sku_id, doc) VALUES ($1, $2) \
             ON CONFLICT (sku_id) DO UPDATE SET doc = EXCLUDED.doc",
        )
        .bind(&doc.id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PgCatalog {
        let schemas = SchemaConfig {
            catalog_schema: "atg_cata".into(),
            pricing_schema: "atg_core".into(),
            inventory_schema: "iuo".into(),
        };
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/unused").unwrap();
        PgCatalog::new(pool.clone(), pool, schemas)
    }

    #[tokio::test]
    async fn queries_are_schema_qualified() {
        let catalog = catalog();
        assert!(catalog.all_skus_sql().contains("iuo.online_inventory"));
        assert!(catalog.all_skus_sql().contains("iuo.btvta_inventory"));
        assert!(catalog.valid_skus_sql().contains("atg_cata.lp_dcs_product"));
        assert!(catalog.valid_skus_sql().contains("atg_core.dcs_price"));
    }

    #[tokio::test]
    async fn valid_sku_query_filters_on_activity_and_marketplace() {
        let sql = catalog().valid_skus_sql();
        assert!(sql.contains("ldp.is_active = 1"));
        assert!(sql.contains("lds.is_active = 1"));
        assert!(sql.contains("ldp.is_market_place = 0"));
    }

    #[tokio::test]
    async fn delete_targets_the_category_table() {
        let catalog = catalog();
        assert_eq!(
            catalog.delete_sql(DeleteCategory::BigTicket),
            "DELETE FROM iuo.online_inventory WHERE sku_id = ANY($1)"
        );
        assert_eq!(
            catalog.delete_sql(DeleteCategory::SoftLine),
            "DELETE FROM iuo.btvta_inventory WHERE sku_id = ANY($1)"
        );
    }
}
