use chrono::NaiveDate;
use rusqlite::{Connection, params};

use super::rankings::period_bounds;
use super::*;
use crate::db::open_in_memory;

fn flavor_id(connection: &Connection, term: &str) -> i64 {
    connection
        .query_row("SELECT id FROM flavor_terms WHERE term = ?1", [term], |row| row.get(0))
        .expect("seeded flavor term")
}

/// One raw post + processed review per call so the extraction uniqueness key never collides.
fn add_extraction(
    connection: &Connection,
    post_id: &str,
    term: &str,
    confidence: f64,
    sentiment: f64,
    created_at: &str,
) {
    connection
        .execute(
            "INSERT INTO raw_posts(id, source, scraped_at) VALUES(?1, 'reddit', ?2)",
            params![post_id, created_at],
        )
        .expect("raw post");
    connection
        .execute(
            "INSERT INTO processed_reviews(post_id, cleaned_text, processed_at) VALUES(?1, 'text', ?2)",
            params![post_id, created_at],
        )
        .expect("processed review");
    let review_id = connection.last_insert_rowid();
    connection
        .execute(
            "
            INSERT INTO flavor_extractions(
              processed_review_id, post_id, flavor_term_id, sentiment, confidence_score, created_at
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![review_id, post_id, flavor_id(connection, term), sentiment, confidence, created_at],
        )
        .expect("flavor extraction");
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
}

#[test]
fn period_bounds_end_today() {
    assert_eq!(
        period_bounds(RankingPeriod::Week, today()),
        ("2026-10-12".to_string(), "2026-10-19".to_string())
    );
    assert_eq!(period_bounds(RankingPeriod::Month, today()).0, "2026-09-19");
    assert_eq!(period_bounds(RankingPeriod::Year, today()).0, "2025-10-19");
}

#[test]
fn flavor_popularity_counts_confident_mentions_and_resets_stale_totals() {
    let connection = open_in_memory().expect("schema");
    connection
        .execute("UPDATE flavor_terms SET total_mentions = 9 WHERE term = 'caramel'", [])
        .expect("stale total");

    add_extraction(&connection, "p1", "chocolate", 0.75, 0.2, "2026-10-15T10:00:00Z");
    add_extraction(&connection, "p2", "chocolate", 0.6, 0.2, "2026-10-15T11:00:00Z");
    add_extraction(&connection, "p3", "chocolate", 0.4, 0.2, "2026-10-15T12:00:00Z");

    update_flavor_popularity(&connection).expect("popularity");

    let top = top_flavors(&connection, 10).expect("top flavors");
    assert_eq!(
        top,
        vec![FlavorMentions {
            term: "chocolate".to_string(),
            total_mentions: 2,
        }]
    );
}

#[test]
fn product_and_entity_metrics_roll_up_reviews_and_mentions() {
    let connection = open_in_memory().expect("schema");
    connection
        .execute(
            "
            INSERT INTO entities(entity_type, name, slug, created_at, updated_at)
            VALUES('retailer', 'Starbucks', 'starbucks', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
            ",
            [],
        )
        .expect("entity");
    let entity_id = connection.last_insert_rowid();

    for slug in ["latte", "mocha"] {
        connection
            .execute(
                "INSERT INTO coffee_products(entity_id, name, slug, updated_at) VALUES(?1, ?2, ?2, '2026-01-01T00:00:00Z')",
                params![entity_id, slug],
            )
            .expect("product");
    }
    let latte: i64 = connection
        .query_row("SELECT id FROM coffee_products WHERE slug = 'latte'", [], |row| row.get(0))
        .expect("latte");

    for (post_id, rating) in [("p1", Some(4.0)), ("p2", Some(2.0)), ("p3", None)] {
        connection
            .execute(
                "
                INSERT INTO product_reviews(product_id, post_id, overall_rating, created_at)
                VALUES(?1, ?2, ?3, '2026-10-01T00:00:00Z')
                ",
                params![latte, post_id, rating],
            )
            .expect("product review");
    }
    for post_id in ["p1", "p2"] {
        connection
            .execute(
                "
                INSERT INTO coffee_mentions(post_id, roaster_id, coffee_product_id, created_at)
                VALUES(?1, ?2, ?3, '2026-10-01T00:00:00Z')
                ",
                params![post_id, entity_id, latte],
            )
            .expect("mention");
    }

    assert_eq!(update_product_metrics(&connection).expect("product metrics"), 2);
    update_entity_metrics(&connection).expect("entity metrics");

    let (ratings, avg, reviews, mentions): (i64, f64, i64, i64) = connection
        .query_row(
            "SELECT total_ratings, avg_rating, total_reviews, mention_count FROM coffee_products WHERE id = ?1",
            [latte],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .expect("latte metrics");
    assert_eq!((ratings, reviews, mentions), (2, 3, 2));
    assert!((avg - 3.0).abs() < 1e-9);

    let mocha_avg: f64 = connection
        .query_row("SELECT avg_rating FROM coffee_products WHERE slug = 'mocha'", [], |row| row.get(0))
        .expect("mocha");
    assert_eq!(mocha_avg, 0.0);

    let (product_count, avg_product_rating, total_reviews): (i64, f64, i64) = connection
        .query_row(
            "SELECT product_count, avg_product_rating, total_reviews FROM entities WHERE id = ?1",
            [entity_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("entity metrics");
    assert_eq!(product_count, 2);
    assert!((avg_product_rating - 1.5).abs() < 1e-9);
    assert_eq!(total_reviews, 2);
}

fn ranking(connection: &Connection, period: &str, term: &str) -> (i64, i64, i64, i64) {
    connection
        .query_row(
            "
            SELECT fr.mention_count, fr.popularity_rank, fr.positive_mentions, fr.negative_mentions
            FROM flavor_rankings fr
            JOIN flavor_terms ft ON ft.id = fr.flavor_id
            WHERE fr.period_type = ?1 AND ft.term = ?2
            ",
            params![period, term],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .expect("ranking row")
}

#[test]
fn rankings_window_by_period_and_rank_by_mentions() {
    let connection = open_in_memory().expect("schema");
    add_extraction(&connection, "c1", "chocolate", 0.75, 0.5, "2026-10-15T10:00:00Z");
    add_extraction(&connection, "c2", "chocolate", 0.75, -0.5, "2026-10-16T10:00:00Z");
    add_extraction(&connection, "k1", "caramel", 0.75, 0.4, "2026-10-18T10:00:00Z");
    for index in 0..3 {
        add_extraction(&connection, &format!("b{index}"), "berry", 0.75, 0.0, "2026-09-25T10:00:00Z");
    }
    add_extraction(&connection, "low", "lemon", 0.5, 0.0, "2026-10-18T10:00:00Z");

    let aggregator = DataAggregator::new(today());
    let counts = aggregator
        .run_all(&connection, &[RankingPeriod::Week, RankingPeriod::Month])
        .expect("aggregation");
    assert_eq!(counts.rankings_upserted.get("week"), Some(&2));
    assert_eq!(counts.rankings_upserted.get("month"), Some(&3));

    assert_eq!(ranking(&connection, "week", "chocolate"), (2, 1, 1, 1));
    assert_eq!(ranking(&connection, "week", "caramel"), (1, 2, 1, 0));
    assert_eq!(ranking(&connection, "month", "berry"), (3, 1, 0, 0));
    assert_eq!(ranking(&connection, "month", "chocolate").1, 2);

    aggregator
        .run_all(&connection, &[RankingPeriod::Week, RankingPeriod::Month])
        .expect("second aggregation");
    let rows: i64 = connection
        .query_row("SELECT COUNT(*) FROM flavor_rankings", [], |row| row.get(0))
        .expect("count");
    assert_eq!(rows, 5);
}

#[test]
fn equal_mention_counts_share_a_rank() {
    let connection = open_in_memory().expect("schema");
    add_extraction(&connection, "a", "lime", 0.75, 0.0, "2026-10-18T10:00:00Z");
    add_extraction(&connection, "b", "rose", 0.75, 0.0, "2026-10-18T10:00:00Z");

    compute_flavor_rankings(&connection, RankingPeriod::Week, today()).expect("rankings");
    assert_eq!(ranking(&connection, "week", "lime").1, 1);
    assert_eq!(ranking(&connection, "week", "rose").1, 1);
}
