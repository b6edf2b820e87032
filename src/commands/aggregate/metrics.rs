use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::util::now_utc_string;

/// Extractions at or below this confidence are left out of popularity counts.
pub const MIN_MENTION_CONFIDENCE: f64 = 0.5;

/// Rating count, average rating, review count, and mention count for every product.
pub fn update_product_metrics(connection: &Connection) -> Result<usize> {
    info!("updating product metrics");

    let updated = connection
        .execute(
            "
            UPDATE coffee_products
            SET
              total_ratings = (
                SELECT COUNT(*) FROM product_reviews pr
                WHERE pr.product_id = coffee_products.id AND pr.overall_rating IS NOT NULL
              ),
              avg_rating = COALESCE((
                SELECT AVG(pr.overall_rating) FROM product_reviews pr
                WHERE pr.product_id = coffee_products.id AND pr.overall_rating IS NOT NULL
              ), 0),
              total_reviews = (
                SELECT COUNT(*) FROM product_reviews pr
                WHERE pr.product_id = coffee_products.id
              ),
              mention_count = (
                SELECT COUNT(*) FROM coffee_mentions cm
                WHERE cm.coffee_product_id = coffee_products.id
              ),
              updated_at = ?1
            ",
            [now_utc_string()],
        )
        .context("failed to update product metrics")?;

    info!(updated, "updated product metrics");
    Ok(updated)
}

pub fn update_flavor_popularity(connection: &Connection) -> Result<usize> {
    info!("updating flavor popularity");

    let updated = connection
        .execute(
            "
            UPDATE flavor_terms
            SET total_mentions = (
              SELECT COUNT(*) FROM flavor_extractions fe
              WHERE fe.flavor_term_id = flavor_terms.id AND fe.confidence_score > ?1
            )
            ",
            [MIN_MENTION_CONFIDENCE],
        )
        .context("failed to update flavor popularity")?;

    info!(updated, "updated flavor popularity");
    Ok(updated)
}

/// Product count, average product rating, and distinct mentioning posts per entity.
pub fn update_entity_metrics(connection: &Connection) -> Result<usize> {
    info!("updating entity metrics");

    let updated = connection
        .execute(
            "
            UPDATE entities
            SET
              product_count = (
                SELECT COUNT(*) FROM coffee_products cp WHERE cp.entity_id = entities.id
              ),
              avg_product_rating = COALESCE((
                SELECT AVG(cp.avg_rating) FROM coffee_products cp WHERE cp.entity_id = entities.id
              ), 0),
              total_reviews = (
                SELECT COUNT(DISTINCT cm.post_id) FROM coffee_mentions cm
                WHERE cm.roaster_id = entities.id
              ),
              updated_at = ?1
            ",
            [now_utc_string()],
        )
        .context("failed to update entity metrics")?;

    info!(updated, "updated entity metrics");
    Ok(updated)
}
