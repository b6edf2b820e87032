use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::model::{EntityType, ExtractedFlavor, ExtractedRoaster, Extraction};
use crate::nlp::MAX_CONTEXT_CHARS;
use crate::util::{now_utc_string, title_case, truncate_chars};

use super::cache::{CachedEntity, PendingEntries, ReferenceCache};
use super::matching::{
    FUZZY_MATCH_THRESHOLD, fuzzy_match_score, normalize_name, origin_key, sentiment_to_rating,
    slugify,
};

/// Reviews linked between commits inside one batch.
pub const COMMIT_EVERY: usize = 10;
pub const ROASTER_MENTION_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct UnlinkedReview {
    pub id: i64,
    pub post_id: String,
    pub cleaned_text: String,
    pub sentiment_score: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct LinkStats {
    pub reviews_linked: usize,
    pub reviews_without_extraction: usize,
    pub reviews_failed: usize,
    pub flavors_linked: usize,
    pub roasters_linked: usize,
    pub retailers_linked: usize,
    pub origins_linked: usize,
    pub products_linked: usize,
}

impl LinkStats {
    fn absorb(&mut self, other: LinkStats) {
        self.reviews_linked += other.reviews_linked;
        self.reviews_without_extraction += other.reviews_without_extraction;
        self.reviews_failed += other.reviews_failed;
        self.flavors_linked += other.flavors_linked;
        self.roasters_linked += other.roasters_linked;
        self.retailers_linked += other.retailers_linked;
        self.origins_linked += other.origins_linked;
        self.products_linked += other.products_linked;
    }
}

/// Resolves extracted mentions against the reference tables and writes link rows.
#[derive(Debug)]
pub struct EntityLinker {
    cache: ReferenceCache,
    pending: PendingEntries,
    failed: HashSet<i64>,
    stats: LinkStats,
}

impl EntityLinker {
    pub fn new(connection: &Connection) -> Result<Self> {
        Ok(Self {
            cache: ReferenceCache::load(connection)?,
            pending: PendingEntries::default(),
            failed: HashSet::new(),
            stats: LinkStats::default(),
        })
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn find_flavor_id(&self, term: &str) -> Option<i64> {
        let key = term.trim().to_lowercase();
        let found = self.cache.flavor_id(&key);
        if found.is_none() {
            warn!(term, "flavor term not found in reference table");
        }
        found
    }

    fn lookup_entity(&self, key: &str) -> Option<&CachedEntity> {
        self.pending
            .entities
            .get(key)
            .or_else(|| self.cache.entity(key))
    }

    /// Exact normalized hit, then the best same-type fuzzy match above the
    /// threshold, otherwise a new (or slug-colliding) entity row.
    pub fn find_or_create_entity(
        &mut self,
        connection: &Connection,
        name: &str,
        entity_type: EntityType,
    ) -> Result<i64> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            bail!("cannot link an entity with an empty name");
        }

        if let Some(entity) = self.lookup_entity(&normalized) {
            return Ok(entity.id);
        }

        let mut best: Option<(&CachedEntity, f64)> = None;
        let candidates = self
            .cache
            .entity_entries()
            .chain(self.pending.entities.iter());
        for (key, entity) in candidates {
            if entity.entity_type != entity_type {
                continue;
            }
            let score = fuzzy_match_score(&normalized, key);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((entity, score));
            }
        }

        if let Some((entity, score)) = best
            && score > FUZZY_MATCH_THRESHOLD
        {
            info!(
                name,
                matched = %entity.name,
                score,
                "fuzzy matched entity"
            );
            return Ok(entity.id);
        }

        let slug = slugify(name);
        info!(name, entity_type = %entity_type, slug = %slug, "creating entity");

        let now = now_utc_string();
        let id: i64 = connection
            .query_row(
                "
                INSERT INTO entities(entity_type, name, slug, verified, created_at, updated_at)
                VALUES(?1, ?2, ?3, 0, ?4, ?4)
                ON CONFLICT(slug) DO UPDATE SET
                  name=excluded.name,
                  updated_at=excluded.updated_at
                RETURNING id
                ",
                params![entity_type.as_str(), name, slug, now],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to upsert entity {name}"))?;

        self.pending.entities.insert(
            normalized,
            CachedEntity {
                id,
                name: name.to_string(),
                slug,
                entity_type,
            },
        );

        Ok(id)
    }

    pub fn find_or_create_origin(
        &mut self,
        connection: &Connection,
        country: &str,
        region: Option<&str>,
    ) -> Result<i64> {
        let key = origin_key(country, region);

        if let Some(id) = self
            .pending
            .origins
            .get(&key)
            .copied()
            .or_else(|| self.cache.origin_id(&key))
        {
            return Ok(id);
        }

        let id: i64 = connection
            .query_row(
                "
                INSERT INTO origins(country, region, normalized_name)
                VALUES(?1, ?2, ?3)
                ON CONFLICT(normalized_name) DO UPDATE SET country=excluded.country
                RETURNING id
                ",
                params![title_case(country.trim()), region.map(title_case), key],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to upsert origin {key}"))?;

        self.pending.origins.insert(key, id);
        Ok(id)
    }

    /// Inserts `flavor_extractions`; returns the flavor ids of newly created rows.
    pub fn link_flavors(
        &self,
        connection: &Connection,
        review: &UnlinkedReview,
        flavors: &[ExtractedFlavor],
    ) -> Vec<i64> {
        let mut linked = Vec::<i64>::new();
        let created_at = now_utc_string();

        for (index, flavor) in flavors.iter().enumerate() {
            let Some(flavor_id) = self.find_flavor_id(&flavor.term) else {
                continue;
            };

            let inserted = connection
                .query_row(
                    "
                    INSERT INTO flavor_extractions(
                      processed_review_id, post_id, flavor_term_id, mention_text,
                      sentence_context, intensity, sentiment, confidence_score,
                      is_primary_flavor, mention_order, created_at
                    )
                    VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT DO NOTHING
                    RETURNING id
                    ",
                    params![
                        review.id,
                        review.post_id,
                        flavor_id,
                        flavor.term,
                        truncate_chars(&flavor.context, MAX_CONTEXT_CHARS),
                        flavor.intensity.as_str(),
                        flavor.sentiment,
                        flavor.confidence,
                        flavor.is_primary,
                        (index + 1) as i64,
                        created_at,
                    ],
                    |row| row.get::<_, i64>(0),
                )
                .optional();

            match inserted {
                Ok(Some(_)) => {
                    debug!(term = %flavor.term, flavor_id, "linked flavor");
                    linked.push(flavor_id);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(term = %flavor.term, error = %err, "failed to link flavor");
                }
            }
        }

        linked
    }

    /// Resolves each roaster to an entity and records a `coffee_mentions` row.
    pub fn link_roasters(
        &mut self,
        connection: &Connection,
        review: &UnlinkedReview,
        roasters: &[ExtractedRoaster],
    ) -> Result<Vec<i64>> {
        let mut linked = Vec::<i64>::new();

        for roaster in roasters {
            let entity_id = self.find_or_create_entity(connection, &roaster.name, EntityType::Roaster)?;

            if let Err(err) = insert_mention(connection, review, entity_id, &roaster.name, &roaster.context) {
                error!(roaster = %roaster.name, error = %err, "failed to link roaster");
                continue;
            }

            if !linked.contains(&entity_id) {
                debug!(roaster = %roaster.name, entity_id, "linked roaster");
                linked.push(entity_id);
            }
        }

        Ok(linked)
    }

    /// Retailers from imported menus are linked when their name appears in the text.
    pub fn link_retailers(&self, connection: &Connection, review: &UnlinkedReview) -> Vec<i64> {
        let mut linked = Vec::<i64>::new();

        for retailer in self.cache.retailers() {
            if !retailer.pattern.is_match(&review.cleaned_text) || linked.contains(&retailer.entity_id) {
                continue;
            }

            let context = review
                .cleaned_text
                .split('.')
                .find(|segment| retailer.pattern.is_match(segment))
                .map(str::trim)
                .unwrap_or_default();

            match insert_mention(connection, review, retailer.entity_id, &retailer.name, context) {
                Ok(()) => linked.push(retailer.entity_id),
                Err(err) => error!(retailer = %retailer.name, error = %err, "failed to link retailer"),
            }
        }

        linked
    }

    pub fn link_origins(&mut self, connection: &Connection, origins: &[String]) -> Result<Vec<i64>> {
        let mut linked = Vec::<i64>::new();
        for origin in origins {
            let origin_id = self.find_or_create_origin(connection, origin, None)?;
            if !linked.contains(&origin_id) {
                debug!(origin = %origin, origin_id, "linked origin");
                linked.push(origin_id);
            }
        }
        Ok(linked)
    }

    /// Products of the mentioned entities whose name occurs in the review text.
    /// Returns the product ids that received a new `product_reviews` row.
    pub fn link_products(
        &self,
        connection: &Connection,
        review: &UnlinkedReview,
        entity_ids: &[i64],
    ) -> Result<Vec<i64>> {
        let mut linked = Vec::<i64>::new();
        if entity_ids.is_empty() {
            return Ok(linked);
        }

        let rating = sentiment_to_rating(review.sentiment_score);
        let created_at = now_utc_string();

        for product in self.cache.products() {
            if !entity_ids.contains(&product.entity_id) || !product.pattern.is_match(&review.cleaned_text) {
                continue;
            }

            let inserted = connection
                .query_row(
                    "
                    INSERT INTO product_reviews(
                      product_id, post_id, processed_review_id, overall_rating, sentiment, created_at
                    )
                    VALUES(?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(product_id, post_id) DO NOTHING
                    RETURNING id
                    ",
                    params![
                        product.id,
                        review.post_id,
                        review.id,
                        rating,
                        review.sentiment_score,
                        created_at,
                    ],
                    |row| row.get::<_, i64>(0),
                )
                .optional()
                .with_context(|| format!("failed to insert product review for {}", product.name))?;

            connection
                .execute(
                    "
                    UPDATE coffee_mentions
                    SET coffee_product_id = ?1
                    WHERE post_id = ?2 AND roaster_id = ?3
                    ",
                    params![product.id, review.post_id, product.entity_id],
                )
                .with_context(|| format!("failed to attach product {} to mention", product.name))?;

            if inserted.is_some() {
                debug!(product = %product.name, product_id = product.id, "linked product");
                linked.push(product.id);
            }
        }

        Ok(linked)
    }

    /// Links one review inside the caller's savepoint. Returns `Ok(None)` when
    /// the review has no stored extraction; it is still stamped as linked.
    pub fn link_single_review(
        &mut self,
        connection: &Connection,
        review: &UnlinkedReview,
    ) -> Result<Option<LinkStats>> {
        self.pending = PendingEntries::default();

        let Some(extraction) = load_extraction(connection, review.id)? else {
            warn!(post_id = %review.post_id, review_id = review.id, "no extraction found for review");
            stamp_linked(connection, review.id, &[], &[], &[])?;
            return Ok(None);
        };

        let flavor_ids = self.link_flavors(connection, review, &extraction.flavors);
        let roaster_ids = self.link_roasters(connection, review, &extraction.roasters)?;
        let retailer_ids = self.link_retailers(connection, review);
        let origin_ids = self.link_origins(connection, &extraction.origins)?;

        let mut entity_ids = roaster_ids.clone();
        entity_ids.extend(retailer_ids.iter().copied().filter(|id| !roaster_ids.contains(id)));
        let product_ids = self.link_products(connection, review, &entity_ids)?;

        stamp_linked(connection, review.id, &flavor_ids, &roaster_ids, &origin_ids)?;

        Ok(Some(LinkStats {
            reviews_linked: 1,
            flavors_linked: flavor_ids.len(),
            roasters_linked: roaster_ids.len(),
            retailers_linked: retailer_ids.len(),
            origins_linked: origin_ids.len(),
            products_linked: product_ids.len(),
            ..LinkStats::default()
        }))
    }

    /// Links up to `batch_size` unlinked reviews, newest first. Each review runs
    /// in its own savepoint; the transaction commits every `COMMIT_EVERY` reviews.
    /// Returns the number of reviews selected.
    pub fn process_batch(&mut self, connection: &mut Connection, batch_size: usize) -> Result<usize> {
        let reviews = load_unlinked_reviews(connection, batch_size, &self.failed)?;
        if reviews.is_empty() {
            info!("no unlinked reviews to process");
            return Ok(0);
        }

        info!(reviews = reviews.len(), "linking batch");
        let mut batch_stats = LinkStats::default();

        for (chunk_index, chunk) in reviews.chunks(COMMIT_EVERY).enumerate() {
            let mut tx = connection.transaction()?;

            for review in chunk {
                let savepoint = tx.savepoint()?;
                let outcome = self.link_single_review(&savepoint, review);
                let outcome = match outcome {
                    Ok(stats) => savepoint.commit().map(|()| stats).map_err(anyhow::Error::from),
                    Err(err) => Err(err),
                };

                match outcome {
                    Ok(stats) => {
                        let pending = std::mem::take(&mut self.pending);
                        if !pending.is_empty() {
                            self.cache.merge(pending);
                        }
                        match stats {
                            Some(stats) => batch_stats.absorb(stats),
                            None => batch_stats.reviews_without_extraction += 1,
                        }
                    }
                    Err(err) => {
                        self.pending = PendingEntries::default();
                        self.failed.insert(review.id);
                        batch_stats.reviews_failed += 1;
                        error!(post_id = %review.post_id, error = %err, "failed to link review; rolled back");
                    }
                }
            }

            tx.commit()?;
            info!(
                committed = chunk_index * COMMIT_EVERY + chunk.len(),
                "committed linked reviews"
            );
        }

        info!(
            linked = batch_stats.reviews_linked,
            failed = batch_stats.reviews_failed,
            flavors = batch_stats.flavors_linked,
            roasters = batch_stats.roasters_linked,
            origins = batch_stats.origins_linked,
            products = batch_stats.products_linked,
            "batch linked"
        );
        self.stats.absorb(batch_stats);
        Ok(reviews.len())
    }

    /// Repeats batches until nothing is left to link or `total_limit` reviews were selected.
    pub fn run(&mut self, connection: &mut Connection, batch_size: usize, total_limit: usize) -> Result<usize> {
        let mut total = 0;

        while total < total_limit {
            let size = batch_size.min(total_limit - total);
            let selected = self.process_batch(connection, size)?;
            if selected == 0 {
                break;
            }
            total += selected;
        }

        if total >= total_limit {
            info!(limit = total_limit, "reached review limit");
        }
        info!(total, cached_entity_keys = self.cache.entity_key_count(), "entity linking finished");
        Ok(total)
    }
}

fn insert_mention(
    connection: &Connection,
    review: &UnlinkedReview,
    entity_id: i64,
    mention_text: &str,
    context: &str,
) -> Result<()> {
    connection.execute(
        "
        INSERT INTO coffee_mentions(
          post_id, roaster_id, mention_text, mention_context, confidence_score, created_at
        )
        VALUES(?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT DO NOTHING
        ",
        params![
            review.post_id,
            entity_id,
            mention_text,
            truncate_chars(context, MAX_CONTEXT_CHARS),
            ROASTER_MENTION_CONFIDENCE,
            now_utc_string(),
        ],
    )?;
    Ok(())
}

fn stamp_linked(
    connection: &Connection,
    review_id: i64,
    flavor_ids: &[i64],
    roaster_ids: &[i64],
    origin_ids: &[i64],
) -> Result<()> {
    connection
        .execute(
            "
            UPDATE processed_reviews
            SET mentioned_flavor_ids = ?1,
                mentioned_roaster_ids = ?2,
                mentioned_origins = ?3,
                linked_at = ?4
            WHERE id = ?5
            ",
            params![
                serde_json::to_string(flavor_ids)?,
                serde_json::to_string(roaster_ids)?,
                serde_json::to_string(origin_ids)?,
                now_utc_string(),
                review_id,
            ],
        )
        .with_context(|| format!("failed to stamp processed review {review_id}"))?;
    Ok(())
}

fn parse_json_column<T: serde::de::DeserializeOwned + Default>(
    raw: Option<String>,
    column: &str,
    review_id: i64,
) -> Result<T> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(value) => serde_json::from_str(value)
            .with_context(|| format!("invalid {column} json for processed review {review_id}")),
    }
}

pub fn load_extraction(connection: &Connection, review_id: i64) -> Result<Option<Extraction>> {
    let row = connection
        .query_row(
            "
            SELECT flavors, roasters, origins, brew_methods, process_methods, price, keywords
            FROM nlp_extractions
            WHERE processed_review_id = ?1
            ",
            [review_id],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("failed to load extraction for processed review {review_id}"))?;

    let Some((flavors, roasters, origins, brew_methods, process_methods, price, keywords)) = row else {
        return Ok(None);
    };

    Ok(Some(Extraction {
        flavors: parse_json_column(flavors, "flavors", review_id)?,
        roasters: parse_json_column(roasters, "roasters", review_id)?,
        origins: parse_json_column(origins, "origins", review_id)?,
        brew_methods: parse_json_column(brew_methods, "brew_methods", review_id)?,
        process_methods: parse_json_column(process_methods, "process_methods", review_id)?,
        price,
        keywords: parse_json_column(keywords, "keywords", review_id)?,
    }))
}

/// Processed reviews without `linked_at`, newest first, minus reviews that failed this run.
pub fn load_unlinked_reviews(
    connection: &Connection,
    limit: usize,
    exclude: &HashSet<i64>,
) -> Result<Vec<UnlinkedReview>> {
    let mut statement = connection.prepare(
        "
        SELECT id, post_id, cleaned_text, sentiment_score
        FROM processed_reviews
        WHERE linked_at IS NULL
        ORDER BY processed_at DESC, id DESC
        LIMIT ?1
        ",
    )?;

    let fetch_limit = (limit + exclude.len()) as i64;
    let mut rows = statement.query([fetch_limit])?;
    let mut out = Vec::<UnlinkedReview>::new();

    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        if exclude.contains(&id) {
            continue;
        }
        out.push(UnlinkedReview {
            id,
            post_id: row.get(1)?,
            cleaned_text: row.get(2)?,
            sentiment_score: row.get(3)?,
        });
        if out.len() == limit {
            break;
        }
    }

    Ok(out)
}
