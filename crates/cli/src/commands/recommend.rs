use std::sync::Arc;

use copurchase_core::associations::{
    CalculationSettingsStore, DisplayContext, RecommendationQueryService,
};
use copurchase_core::domain::product::{ChannelId, ProductId};
use copurchase_core::domain::settings::CalculationSettings;
use copurchase_core::errors::AssociationError;
use copurchase_db::repositories::{
    SqlAssociationStore, SqlBundleClassifier, SqlRelatedProductsSource, SqlSettingsStore,
};
use serde_json::json;
use tracing::warn;

use crate::commands::{build_runtime, load_config, open_database, CommandError, CommandResult};

/// One product id asks for "bought together" items; several are treated as a cart.
pub fn run(channel: &str, products: &[String]) -> CommandResult {
    let products: Vec<ProductId> = products
        .iter()
        .map(|product| product.trim())
        .filter(|product| !product.is_empty())
        .map(ProductId::new)
        .collect();
    if products.is_empty() {
        return CommandResult::failure(
            "recommend",
            "invalid_arguments",
            "at least one --product is required",
            2,
        );
    }

    let config = match load_config("recommend") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("recommend") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let context = DisplayContext::new(ChannelId::new(channel.trim()));

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let settings = settings_or_defaults(
            SqlSettingsStore::new(pool.clone()).load().await,
            &config.calculation,
        );

        let service = RecommendationQueryService::new(
            Arc::new(SqlAssociationStore::new(pool.clone())),
            Arc::new(SqlBundleClassifier::new(pool.clone())),
        )
        .with_related_products(Arc::new(SqlRelatedProductsSource::new(pool.clone())));

        let recommendations = match products.as_slice() {
            [product] => service.recommendations_for_product(product, &context, &settings).await,
            cart => service.recommendations_for_cart(cart, &context, &settings).await,
        };
        pool.close().await;

        Ok::<_, CommandError>(recommendations)
    });

    match result {
        Ok(recommendations) => CommandResult::success_with_data(
            "recommend",
            format!("{} recommendations", recommendations.len()),
            Some(json!({
                "channel_id": context.channel_id,
                "products": products,
                "recommendations": recommendations,
            })),
        ),
        Err(error) => CommandResult::from_error("recommend", error),
    }
}

/// Reads never create the settings row; configured defaults stand in until it exists.
fn settings_or_defaults(
    loaded: Result<Option<CalculationSettings>, AssociationError>,
    defaults: &CalculationSettings,
) -> CalculationSettings {
    match loaded {
        Ok(Some(settings)) => settings,
        Ok(None) => defaults.clone(),
        Err(error) => {
            warn!(
                event_name = "association.settings.load_failed",
                error = %error,
                "falling back to configured calculation settings"
            );
            defaults.clone()
        }
    }
}
