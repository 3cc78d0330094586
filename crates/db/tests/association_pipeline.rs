use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use copurchase_core::associations::{
    AssociationCalculationPipeline, AssociationStore, CalculationSettingsStore, DisplayContext,
    OrderCorpusReader, RecommendationQueryService,
};
use copurchase_core::domain::association::ProductAssociation;
use copurchase_core::domain::product::{ChannelId, ProductId};
use copurchase_core::domain::settings::CalculationSettings;
use copurchase_db::repositories::{
    SqlAssociationStore, SqlBundleClassifier, SqlOrderCorpusReader, SqlRelatedProductsSource,
    SqlSettingsStore,
};
use copurchase_db::{
    connect_with_settings, migrations, DbPool, DemoSeedDataset, DEMO_WEB_ORDERS_IN_WINDOW,
};

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid anchor")
}

async fn seeded_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoSeedDataset::load(&pool, anchor()).await.expect("seed demo corpus");
    pool
}

fn pipeline(pool: &DbPool) -> AssociationCalculationPipeline {
    AssociationCalculationPipeline::new(
        Arc::new(SqlOrderCorpusReader::new(pool.clone())),
        Arc::new(SqlBundleClassifier::new(pool.clone())),
        Arc::new(SqlAssociationStore::new(pool.clone())),
    )
}

fn query_service(pool: &DbPool) -> RecommendationQueryService {
    RecommendationQueryService::new(
        Arc::new(SqlAssociationStore::new(pool.clone())),
        Arc::new(SqlBundleClassifier::new(pool.clone())),
    )
    .with_related_products(Arc::new(SqlRelatedProductsSource::new(pool.clone())))
}

fn ids(values: &[&str]) -> Vec<ProductId> {
    values.iter().map(|value| ProductId::new(*value)).collect()
}

fn stored(source: &str, target: &str, final_score: f64) -> ProductAssociation {
    ProductAssociation {
        source_product_id: ProductId::new(source),
        target_product_id: ProductId::new(target),
        channel_id: ChannelId::new("web"),
        cooccurrence_count: 4,
        frequency_score: final_score,
        recency_score: final_score,
        value_score: final_score,
        final_score,
        lift: None,
        last_calculated: anchor(),
    }
}

/// Rows as a previous run would have left them for the demo catalog.
async fn store_prior_web_set(pool: &DbPool) {
    SqlAssociationStore::new(pool.clone())
        .replace_channel_associations(
            &ChannelId::new("web"),
            vec![
                stored("tee", "kit", 0.9),
                stored("tee", "jeans", 0.6),
                stored("cap", "tee", 0.5),
                stored("jeans", "belt", 0.7),
                stored("jeans", "tee", 0.4),
                stored("belt", "jeans", 0.7),
            ],
        )
        .await
        .expect("store prior set");
}

async fn web_row_count(pool: &DbPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(1) FROM product_association WHERE channel_id = 'web'")
        .fetch_one(pool)
        .await
        .expect("count rows")
}

#[tokio::test]
async fn demo_corpus_pairs_never_beat_resolved_target_support() {
    let pool = seeded_pool().await;
    let web = ChannelId::new("web");
    let settings = CalculationSettings::default();

    let summary = pipeline(&pool).run_at(&web, &settings, anchor()).await.expect("pipeline run");
    assert_eq!(summary.orders_considered, DEMO_WEB_ORDERS_IN_WINDOW);
    assert!(summary.pairs_evaluated > 0);
    assert_eq!(summary.associations_written, 0, "every target is sold at least once per co-occurrence");
    assert_eq!(web_row_count(&pool).await, 0);

    pool.close().await;
}

#[tokio::test]
async fn target_sold_only_through_variants_gets_lift_of_one_and_is_dropped() {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    sqlx::query(
        "INSERT INTO product (id, sku, name, parent_product_id, is_bundle) VALUES
            ('tee', 'TEE', 'Tee', NULL, 0),
            ('tee-m', 'TEE-M', 'Tee (M)', 'tee', 0),
            ('cap', 'CAP', 'Cap', NULL, 0)",
    )
    .execute(&pool)
    .await
    .expect("products");
    for day in 1..=5 {
        let order_id = format!("o-{day}");
        sqlx::query(
            "INSERT INTO sales_order (id, channel_id, status, total_minor, placed_at)
             VALUES (?, 'web', 'completed', 3000, ?)",
        )
        .bind(&order_id)
        .bind((anchor() - chrono::Duration::days(day)).to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .execute(&pool)
        .await
        .expect("order");
        for product in ["tee-m", "cap"] {
            sqlx::query(
                "INSERT INTO order_line (id, order_id, product_id, quantity, is_bundle_component)
                 VALUES (?, ?, ?, 1, 0)",
            )
            .bind(format!("{order_id}-{product}"))
            .bind(&order_id)
            .bind(product)
            .execute(&pool)
            .await
            .expect("line");
        }
    }

    let web = ChannelId::new("web");
    let since = anchor() - chrono::Duration::days(90);
    let support = SqlOrderCorpusReader::new(pool.clone())
        .count_product_lines(&web, since, &ProductId::new("tee"))
        .await
        .expect("support");
    assert_eq!(support, 5);

    let permissive = CalculationSettings { min_cooccurrence: 1, min_score: 0.0, ..CalculationSettings::default() };
    let summary = pipeline(&pool).run_at(&web, &permissive, anchor()).await.expect("pipeline run");
    assert_eq!(summary.orders_considered, 5);
    assert_eq!(summary.pairs_evaluated, 2);
    assert_eq!(summary.associations_written, 0, "cap->tee and tee->cap both have lift 1.0");
    assert_eq!(web_row_count(&pool).await, 0);

    pool.close().await;
}

#[tokio::test]
async fn rerun_replaces_rather_than_accumulates() {
    let pool = seeded_pool().await;
    store_prior_web_set(&pool).await;
    assert_eq!(web_row_count(&pool).await, 6);

    let summary = pipeline(&pool)
        .run_at(&ChannelId::new("web"), &CalculationSettings::default(), anchor())
        .await
        .expect("rerun");
    assert_eq!(summary.associations_written, 0);
    assert_eq!(web_row_count(&pool).await, 0, "stale rows never survive a run with orders");

    pool.close().await;
}

#[tokio::test]
async fn channel_without_orders_in_window_keeps_prior_set() {
    let pool = seeded_pool().await;
    store_prior_web_set(&pool).await;
    let web = ChannelId::new("web");

    let much_later = anchor() + chrono::Duration::days(365);
    let summary = pipeline(&pool)
        .run_at(&web, &CalculationSettings::default(), much_later)
        .await
        .expect("empty run");
    assert_eq!(summary.orders_considered, 0);
    assert_eq!(summary.associations_written, 0);

    let store = SqlAssociationStore::new(pool.clone());
    let rows = store.top_associations(&web, &ProductId::new("cap"), 10).await.expect("read");
    assert_eq!(rows.len(), 1, "previous set still served");

    pool.close().await;
}

#[tokio::test]
async fn recommendations_combine_associations_fallback_and_cart_scoring() {
    let pool = seeded_pool().await;
    store_prior_web_set(&pool).await;
    let settings = CalculationSettings::default();

    let service = query_service(&pool);
    let context = DisplayContext::new(ChannelId::new("web"));

    let tee = service.recommendations_for_product(&ProductId::new("tee"), &context, &settings).await;
    assert_eq!(tee, ids(&["jeans", "socks", "sticker", "cap"]), "kit is a bundle and never surfaces");

    let cap = service.recommendations_for_product(&ProductId::new("cap"), &context, &settings).await;
    assert_eq!(cap, ids(&["tee"]));

    let kit = service.recommendations_for_product(&ProductId::new("kit"), &context, &settings).await;
    assert!(kit.is_empty());

    let cart = service
        .recommendations_for_cart(&ids(&["tee", "cap"]), &context, &settings)
        .await;
    assert_eq!(cart, ids(&["jeans"]));

    let no_fallback = CalculationSettings { fallback_to_related_products: false, ..settings.clone() };
    let tee_only =
        service.recommendations_for_product(&ProductId::new("tee"), &context, &no_fallback).await;
    assert_eq!(tee_only, ids(&["jeans"]));

    pool.close().await;
}

#[tokio::test]
async fn settings_store_drives_the_run_and_records_it() {
    let pool = seeded_pool().await;
    let settings_store = SqlSettingsStore::new(pool.clone());
    let settings =
        settings_store.ensure_defaults(&CalculationSettings::default()).await.expect("bootstrap");

    let summary = pipeline(&pool)
        .run_at(&ChannelId::new("web"), &settings, anchor())
        .await
        .expect("pipeline run");
    settings_store.record_run(&summary).await.expect("record run");

    let last = settings_store.last_run().await.expect("last run").expect("recorded");
    assert_eq!(last.channel_id, "web");
    assert_eq!(last.associations_written, 0);
    assert_eq!(last.duration_ms, summary.duration_ms);

    pool.close().await;
}

#[tokio::test]
async fn query_failures_degrade_to_empty_lists() {
    let pool = seeded_pool().await;
    let service = query_service(&pool);
    pool.close().await;

    let context = DisplayContext::new(ChannelId::new("web"));
    let settings = CalculationSettings::default();
    assert!(service.recommendations_for_product(&ProductId::new("tee"), &context, &settings).await.is_empty());
    assert!(service.recommendations_for_cart(&ids(&["tee"]), &context, &settings).await.is_empty());
}
