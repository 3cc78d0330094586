use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::connection::DbPool;
use crate::repositories::{encode_timestamp, RepositoryError};

/// Catalog: parents sold through variants, plain products, and one bundle.
const SEED_PRODUCTS: &[SeedProduct] = &[
    SeedProduct { id: "tee", sku: "TEE", name: "Organic Tee", parent: None, is_bundle: false },
    SeedProduct { id: "tee-m", sku: "TEE-M", name: "Organic Tee (M)", parent: Some("tee"), is_bundle: false },
    SeedProduct { id: "tee-l", sku: "TEE-L", name: "Organic Tee (L)", parent: Some("tee"), is_bundle: false },
    SeedProduct { id: "jeans", sku: "JNS", name: "Selvedge Jeans", parent: None, is_bundle: false },
    SeedProduct { id: "jeans-32", sku: "JNS-32", name: "Selvedge Jeans 32", parent: Some("jeans"), is_bundle: false },
    SeedProduct { id: "belt", sku: "BLT", name: "Leather Belt", parent: None, is_bundle: false },
    SeedProduct { id: "belt-m", sku: "BLT-M", name: "Leather Belt (M)", parent: Some("belt"), is_bundle: false },
    SeedProduct { id: "cap", sku: "CAP", name: "Canvas Cap", parent: None, is_bundle: false },
    SeedProduct { id: "socks", sku: "SCK", name: "Wool Socks", parent: None, is_bundle: false },
    SeedProduct { id: "sticker", sku: "STK", name: "Sticker Pack", parent: None, is_bundle: false },
    SeedProduct { id: "kit", sku: "KIT", name: "Starter Kit", parent: None, is_bundle: true },
];

const SEED_RELATIONS: &[(&str, &str, i64)] = &[
    ("tee", "socks", 1),
    ("tee", "sticker", 2),
    ("tee", "cap", 3),
    ("tee", "kit", 4),
    ("cap", "tee", 1),
    ("jeans", "belt", 1),
];

/// Orders placed `days_ago` before the anchor. Lines flagged `true` are bundle components.
const SEED_ORDERS: &[SeedOrder] = &[
    SeedOrder { id: "demo-o-01", channel: "web", status: "completed", days_ago: 1, total_minor: 3_400, lines: &[("tee-m", false), ("cap", false)] },
    SeedOrder { id: "demo-o-02", channel: "web", status: "completed", days_ago: 2, total_minor: 3_900, lines: &[("tee-m", false), ("cap", false)] },
    SeedOrder { id: "demo-o-03", channel: "web", status: "completed", days_ago: 4, total_minor: 3_400, lines: &[("tee-l", false), ("cap", false)] },
    SeedOrder { id: "demo-o-04", channel: "web", status: "completed", days_ago: 7, total_minor: 4_100, lines: &[("tee-m", false), ("cap", false)] },
    SeedOrder { id: "demo-o-05", channel: "web", status: "completed", days_ago: 9, total_minor: 3_400, lines: &[("tee-l", false), ("cap", false)] },
    SeedOrder { id: "demo-o-06", channel: "web", status: "completed", days_ago: 3, total_minor: 12_900, lines: &[("jeans-32", false), ("belt-m", false)] },
    SeedOrder { id: "demo-o-07", channel: "web", status: "completed", days_ago: 6, total_minor: 12_900, lines: &[("jeans-32", false), ("belt-m", false)] },
    SeedOrder { id: "demo-o-08", channel: "web", status: "completed", days_ago: 12, total_minor: 13_800, lines: &[("jeans-32", false), ("belt-m", false)] },
    SeedOrder { id: "demo-o-09", channel: "web", status: "completed", days_ago: 15, total_minor: 12_900, lines: &[("jeans-32", false), ("belt-m", false)] },
    SeedOrder { id: "demo-o-10", channel: "web", status: "completed", days_ago: 10, total_minor: 11_200, lines: &[("tee-l", false), ("jeans-32", false)] },
    SeedOrder { id: "demo-o-11", channel: "web", status: "completed", days_ago: 20, total_minor: 11_200, lines: &[("tee-m", false), ("jeans-32", false)] },
    SeedOrder { id: "demo-o-12", channel: "web", status: "completed", days_ago: 30, total_minor: 11_900, lines: &[("tee-l", false), ("jeans-32", false), ("jeans-32", false)] },
    SeedOrder { id: "demo-o-13", channel: "web", status: "completed", days_ago: 5, total_minor: 1_800, lines: &[("cap", false), ("socks", false)] },
    SeedOrder { id: "demo-o-14", channel: "web", status: "completed", days_ago: 8, total_minor: 1_800, lines: &[("cap", false), ("socks", false)] },
    SeedOrder { id: "demo-o-15", channel: "web", status: "completed", days_ago: 11, total_minor: 6_500, lines: &[("kit", false), ("tee-m", false), ("cap", false), ("sticker", true)] },
    SeedOrder { id: "demo-o-16", channel: "web", status: "completed", days_ago: 13, total_minor: 6_500, lines: &[("kit", false), ("tee-m", false), ("cap", false), ("sticker", true)] },
    SeedOrder { id: "demo-o-17", channel: "web", status: "completed", days_ago: 16, total_minor: 6_500, lines: &[("kit", false), ("tee-l", false), ("cap", false), ("sticker", true)] },
    SeedOrder { id: "demo-o-18", channel: "web", status: "cancelled", days_ago: 2, total_minor: 2_900, lines: &[("tee-m", false), ("socks", false)] },
    SeedOrder { id: "demo-o-19", channel: "web", status: "completed", days_ago: 200, total_minor: 1_800, lines: &[("socks", false), ("cap", false)] },
    SeedOrder { id: "demo-o-20", channel: "store", status: "completed", days_ago: 3, total_minor: 1_800, lines: &[("socks", false), ("cap", false)] },
    SeedOrder { id: "demo-o-21", channel: "store", status: "completed", days_ago: 5, total_minor: 1_800, lines: &[("socks", false), ("cap", false)] },
    SeedOrder { id: "demo-o-22", channel: "store", status: "completed", days_ago: 9, total_minor: 1_800, lines: &[("socks", false), ("cap", false)] },
];

/// Completed `web` orders inside the default 90 day window.
pub const DEMO_WEB_ORDERS_IN_WINDOW: usize = 17;

/// Deterministic demo corpus for the `web` and `store` channels.
///
/// Placement times are relative to an anchor so the corpus always falls
/// inside the calculation window of a run made at that anchor.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Load the demo corpus, replacing any earlier copy of it.
    pub async fn load(pool: &DbPool, anchor: DateTime<Utc>) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        Self::delete_seed_rows(&mut tx).await?;

        // Parents before variants so the self reference resolves.
        for product in SEED_PRODUCTS.iter().filter(|product| product.parent.is_none()) {
            insert_product(&mut tx, product).await?;
        }
        for product in SEED_PRODUCTS.iter().filter(|product| product.parent.is_some()) {
            insert_product(&mut tx, product).await?;
        }

        let mut lines_seeded = 0;
        for order in SEED_ORDERS {
            sqlx::query(
                "INSERT INTO sales_order (id, channel_id, status, total_minor, placed_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order.id)
            .bind(order.channel)
            .bind(order.status)
            .bind(order.total_minor)
            .bind(encode_timestamp(anchor - Duration::days(order.days_ago)))
            .execute(&mut *tx)
            .await?;

            for (index, (product_id, bundle_component)) in order.lines.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO order_line (id, order_id, product_id, quantity, is_bundle_component)
                     VALUES (?, ?, ?, 1, ?)",
                )
                .bind(format!("{}-l{}", order.id, index + 1))
                .bind(order.id)
                .bind(*product_id)
                .bind(*bundle_component)
                .execute(&mut *tx)
                .await?;
                lines_seeded += 1;
            }
        }

        for (product_id, related_product_id, position) in SEED_RELATIONS {
            sqlx::query(
                "INSERT INTO product_relation (product_id, related_product_id, position)
                 VALUES (?, ?, ?)",
            )
            .bind(*product_id)
            .bind(*related_product_id)
            .bind(*position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(SeedResult {
            anchor,
            products_seeded: SEED_PRODUCTS.len(),
            orders_seeded: SEED_ORDERS.len(),
            lines_seeded,
            relations_seeded: SEED_RELATIONS.len(),
        })
    }

    /// Verify that the demo corpus is present and complete.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let product_ids = SEED_PRODUCTS.iter().map(|product| product.id).collect::<Vec<_>>();
        let products = count_in(pool, "SELECT COUNT(1) FROM product WHERE id IN ", &product_ids).await?;
        checks.push(("demo-products", products == SEED_PRODUCTS.len() as i64));

        let bundles: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM product WHERE id = 'kit' AND is_bundle = 1")
            .fetch_one(pool)
            .await?;
        checks.push(("demo-bundle-flag", bundles == 1));

        let order_ids = SEED_ORDERS.iter().map(|order| order.id).collect::<Vec<_>>();
        let orders = count_in(pool, "SELECT COUNT(1) FROM sales_order WHERE id IN ", &order_ids).await?;
        checks.push(("demo-orders", orders == SEED_ORDERS.len() as i64));

        let expected_lines = SEED_ORDERS.iter().map(|order| order.lines.len()).sum::<usize>() as i64;
        let lines = count_in(pool, "SELECT COUNT(1) FROM order_line WHERE order_id IN ", &order_ids).await?;
        checks.push(("demo-order-lines", lines == expected_lines));

        let relations: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM product_relation WHERE product_id IN ('tee', 'cap', 'jeans')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("demo-relations", relations == SEED_RELATIONS.len() as i64));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove the demo corpus.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        Self::delete_seed_rows(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_seed_rows(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    ) -> Result<(), RepositoryError> {
        let order_ids = sql_array_from_ids(&SEED_ORDERS.iter().map(|order| order.id).collect::<Vec<_>>());
        let product_ids =
            sql_array_from_ids(&SEED_PRODUCTS.iter().map(|product| product.id).collect::<Vec<_>>());

        sqlx::query(&format!("DELETE FROM order_line WHERE order_id IN {order_ids}"))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&format!("DELETE FROM sales_order WHERE id IN {order_ids}"))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&format!("DELETE FROM product_relation WHERE product_id IN {product_ids}"))
            .execute(&mut **tx)
            .await?;
        sqlx::query(&format!("DELETE FROM product WHERE id IN {product_ids}"))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

async fn insert_product(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product: &SeedProduct,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO product (id, sku, name, parent_product_id, is_bundle) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(product.id)
    .bind(product.sku)
    .bind(product.name)
    .bind(product.parent)
    .bind(product.is_bundle)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn count_in(pool: &DbPool, prefix: &str, ids: &[&str]) -> Result<i64, RepositoryError> {
    let count: i64 = sqlx::query_scalar(&format!("{prefix}{}", sql_array_from_ids(ids)))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Clone, Copy)]
struct SeedProduct {
    id: &'static str,
    sku: &'static str,
    name: &'static str,
    parent: Option<&'static str>,
    is_bundle: bool,
}

#[derive(Debug, Clone, Copy)]
struct SeedOrder {
    id: &'static str,
    channel: &'static str,
    status: &'static str,
    days_ago: i64,
    total_minor: i64,
    lines: &'static [(&'static str, bool)],
}

#[derive(Debug, Serialize)]
pub struct SeedResult {
    pub anchor: DateTime<Utc>,
    pub products_seeded: usize,
    pub orders_seeded: usize,
    pub lines_seeded: usize,
    pub relations_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn demo_orders_in_window_match_the_published_count() {
        let in_window = SEED_ORDERS
            .iter()
            .filter(|order| order.channel == "web" && order.status == "completed" && order.days_ago <= 90)
            .count();
        assert_eq!(in_window, DEMO_WEB_ORDERS_IN_WINDOW);
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        let anchor = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid");

        let first = DemoSeedDataset::load(&pool, anchor).await.expect("load seed fixtures");
        let first_verification = DemoSeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.orders_seeded, SEED_ORDERS.len());

        let second = DemoSeedDataset::load(&pool, anchor + Duration::days(1)).await.expect("reload");
        let second_verification = DemoSeedDataset::verify(&pool).await.expect("re-verify");
        assert!(second_verification.all_present);
        assert_eq!(first.lines_seeded, second.lines_seeded);
        assert_eq!(first_verification.checks, second_verification.checks);

        let latest: String = sqlx::query_scalar("SELECT MAX(placed_at) FROM sales_order")
            .fetch_one(&pool)
            .await
            .expect("latest order");
        assert_eq!(latest, encode_timestamp(anchor));

        pool.close().await;
    }

    #[tokio::test]
    async fn clean_removes_the_demo_corpus() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        DemoSeedDataset::load(&pool, Utc::now()).await.expect("load seed fixtures");
        DemoSeedDataset::clean(&pool).await.expect("clean");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let orders: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM sales_order")
            .fetch_one(&pool)
            .await
            .expect("count orders");
        assert_eq!(orders, 0);

        pool.close().await;
    }
}
