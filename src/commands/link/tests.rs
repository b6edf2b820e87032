use rusqlite::{Connection, params};

use super::linker::{EntityLinker, load_unlinked_reviews};
use super::matching::{
    fuzzy_match_score, normalize_name, origin_key, phrase_pattern, sentiment_to_rating, slugify,
};
use super::*;
use crate::db::open_in_memory;
use crate::model::{ExtractedFlavor, ExtractedRoaster, Extraction, Intensity};

fn flavor(term: &str, confidence: f64) -> ExtractedFlavor {
    ExtractedFlavor {
        term: term.to_string(),
        intensity: Intensity::Moderate,
        confidence,
        sentiment: 0.4,
        context: format!("Lovely {term} notes in this cup."),
        is_primary: true,
    }
}

fn roaster(name: &str) -> ExtractedRoaster {
    ExtractedRoaster {
        name: name.to_string(),
        context: format!("Bought it from {name}"),
    }
}

fn seed_review(
    connection: &Connection,
    post_id: &str,
    text: &str,
    sentiment: f64,
    processed_at: &str,
    extraction: Option<&Extraction>,
) -> i64 {
    connection
        .execute(
            "INSERT INTO raw_posts(id, source, title, body, scraped_at) VALUES(?1, 'reddit', '', ?2, ?3)",
            params![post_id, text, processed_at],
        )
        .expect("raw post");
    connection
        .execute(
            "
            INSERT INTO processed_reviews(post_id, cleaned_text, sentiment_score, word_count, processed_at)
            VALUES(?1, ?2, ?3, 5, ?4)
            ",
            params![post_id, text, sentiment, processed_at],
        )
        .expect("processed review");
    let review_id = connection.last_insert_rowid();

    if let Some(extraction) = extraction {
        connection
            .execute(
                "
                INSERT INTO nlp_extractions(processed_review_id, post_id, flavors, roasters, origins)
                VALUES(?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    review_id,
                    post_id,
                    serde_json::to_string(&extraction.flavors).expect("flavors json"),
                    serde_json::to_string(&extraction.roasters).expect("roasters json"),
                    serde_json::to_string(&extraction.origins).expect("origins json"),
                ],
            )
            .expect("extraction");
    }

    review_id
}

fn insert_entity(connection: &Connection, name: &str, slug: &str, entity_type: &str) -> i64 {
    connection
        .execute(
            "
            INSERT INTO entities(entity_type, name, slug, created_at, updated_at)
            VALUES(?1, ?2, ?3, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
            ",
            params![entity_type, name, slug],
        )
        .expect("entity");
    connection.last_insert_rowid()
}

fn count(connection: &Connection, sql: &str) -> i64 {
    connection.query_row(sql, [], |row| row.get(0)).expect("count query")
}

#[test]
fn name_helpers_normalize_and_slug() {
    assert_eq!(normalize_name("  Peet's Coffee-House "), "peets coffee house");
    assert_eq!(slugify("Peet's Coffee"), "peets-coffee");
    assert_eq!(origin_key("Costa Rica", None), "costa rica_general");
    assert_eq!(origin_key("Ethiopia", Some("Yirgacheffe")), "ethiopia_yirgacheffe");
    assert!((fuzzy_match_score("Blue Bottle", "blue bottle") - 1.0).abs() < f64::EPSILON);
    assert!(fuzzy_match_score("blue botle", "blue bottle") > 0.85);
    assert!(fuzzy_match_score("onyx", "verve") < 0.5);
}

#[test]
fn sentiment_maps_onto_one_to_five_rating() {
    assert_eq!(sentiment_to_rating(-1.0), 1.0);
    assert_eq!(sentiment_to_rating(0.0), 3.0);
    assert_eq!(sentiment_to_rating(0.5), 4.0);
    assert_eq!(sentiment_to_rating(1.0), 5.0);
    assert_eq!(sentiment_to_rating(3.0), 5.0);
}

#[test]
fn name_patterns_match_names_with_punctuated_edges() {
    let sized = phrase_pattern("Iced Coffee (Grande)").expect("pattern");
    assert!(sized.is_match("I ordered an Iced Coffee (Grande) today"));
    assert!(sized.is_match("iced coffee (grande)"));

    let branded = phrase_pattern("Pumpkin Spice Latte®").expect("pattern");
    assert!(branded.is_match("the Pumpkin Spice Latte® is back"));
    assert!(!branded.is_match("the Pumpkin Spice Latte is back"));

    let plain = phrase_pattern("Mocha").expect("pattern");
    assert!(plain.is_match("a mocha please"));
    assert!(!plain.is_match("mochaccino"));
}

#[test]
fn flavors_link_through_synonyms_once_per_term() {
    let mut connection = open_in_memory().expect("schema");
    let extraction = Extraction {
        flavors: vec![flavor("chocolate", 0.75), flavor("cocoa", 0.6), flavor("marzipan", 0.6)],
        ..Extraction::default()
    };
    let review_id = seed_review(&connection, "p1", "chocolate and cocoa", 0.4, "2026-10-01T00:00:00Z", Some(&extraction));

    let stats = link_reviews(&mut connection, 50, 500).expect("linking");
    assert_eq!(stats.reviews_linked, 1);
    assert_eq!(stats.flavors_linked, 1);

    let (term, order): (String, i64) = connection
        .query_row(
            "
            SELECT ft.term, fe.mention_order
            FROM flavor_extractions fe
            JOIN flavor_terms ft ON ft.id = fe.flavor_term_id
            WHERE fe.processed_review_id = ?1
            ",
            [review_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("single flavor extraction");
    assert_eq!(term, "chocolate");
    assert_eq!(order, 1);

    let linked_at: Option<String> = connection
        .query_row("SELECT linked_at FROM processed_reviews WHERE id = ?1", [review_id], |row| row.get(0))
        .expect("linked_at");
    assert!(linked_at.is_some());
}

#[test]
fn roaster_names_fuzzy_match_existing_entities_of_same_type() {
    let mut connection = open_in_memory().expect("schema");
    let blue_bottle = insert_entity(&connection, "Blue Bottle", "blue-bottle", "roaster");

    let extraction = Extraction {
        roasters: vec![roaster("Blue Botle")],
        ..Extraction::default()
    };
    seed_review(&connection, "p1", "blue botle beans", 0.0, "2026-10-01T00:00:00Z", Some(&extraction));

    link_reviews(&mut connection, 50, 500).expect("linking");

    assert_eq!(count(&connection, "SELECT COUNT(*) FROM entities"), 1);
    let roaster_id: i64 = connection
        .query_row("SELECT roaster_id FROM coffee_mentions WHERE post_id = 'p1'", [], |row| row.get(0))
        .expect("mention");
    assert_eq!(roaster_id, blue_bottle);
}

#[test]
fn fuzzy_matching_ignores_other_entity_types() {
    let connection = open_in_memory().expect("schema");
    insert_entity(&connection, "Blue Bottle", "blue-bottle", "roaster");

    let mut linker = EntityLinker::new(&connection).expect("linker");
    let cafe_id = linker
        .find_or_create_entity(&connection, "Blue Botle", crate::model::EntityType::Cafe)
        .expect("cafe entity");

    let slug: String = connection
        .query_row("SELECT slug FROM entities WHERE id = ?1", [cafe_id], |row| row.get(0))
        .expect("slug");
    assert_eq!(slug, "blue-botle");
}

#[test]
fn new_roasters_are_created_once_and_reused_across_reviews() {
    let mut connection = open_in_memory().expect("schema");
    let extraction = Extraction {
        roasters: vec![roaster("Onyx")],
        origins: vec!["Kenya".to_string()],
        ..Extraction::default()
    };
    seed_review(&connection, "p1", "onyx kenya", 0.2, "2026-10-01T00:00:00Z", Some(&extraction));
    seed_review(&connection, "p2", "onyx kenya again", 0.2, "2026-10-02T00:00:00Z", Some(&extraction));

    let stats = link_reviews(&mut connection, 50, 500).expect("linking");
    assert_eq!(stats.reviews_linked, 2);
    assert_eq!(stats.roasters_linked, 2);
    assert_eq!(stats.origins_linked, 2);

    assert_eq!(count(&connection, "SELECT COUNT(*) FROM entities WHERE slug = 'onyx'"), 1);
    assert_eq!(count(&connection, "SELECT COUNT(*) FROM coffee_mentions"), 2);

    let (country, normalized): (String, String) = connection
        .query_row("SELECT country, normalized_name FROM origins", [], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("single origin");
    assert_eq!(country, "Kenya");
    assert_eq!(normalized, "kenya_general");

    let roaster_ids: String = connection
        .query_row("SELECT mentioned_roaster_ids FROM processed_reviews WHERE post_id = 'p1'", [], |row| row.get(0))
        .expect("roaster ids");
    let ids: Vec<i64> = serde_json::from_str(&roaster_ids).expect("roaster ids json");
    assert_eq!(ids.len(), 1);

    assert!(load_unlinked_reviews(&connection, 10, &Default::default()).expect("load").is_empty());
}

#[test]
fn retailer_products_named_in_text_get_product_reviews() {
    let mut connection = open_in_memory().expect("schema");
    let starbucks = insert_entity(&connection, "Starbucks", "starbucks", "retailer");
    connection
        .execute(
            "
            INSERT INTO coffee_products(entity_id, name, slug, updated_at)
            VALUES(?1, 'Caramel Macchiato', 'caramel-macchiato', '2026-01-01T00:00:00Z')
            ",
            [starbucks],
        )
        .expect("product");
    let product_id = connection.last_insert_rowid();

    seed_review(
        &connection,
        "p1",
        "The Starbucks caramel macchiato was lovely today",
        0.5,
        "2026-10-01T00:00:00Z",
        Some(&Extraction::default()),
    );

    let stats = link_reviews(&mut connection, 50, 500).expect("linking");
    assert_eq!(stats.retailers_linked, 1);
    assert_eq!(stats.products_linked, 1);

    let rating: f64 = connection
        .query_row("SELECT overall_rating FROM product_reviews WHERE product_id = ?1", [product_id], |row| row.get(0))
        .expect("product review");
    assert_eq!(rating, 4.0);

    let mention_product: Option<i64> = connection
        .query_row(
            "SELECT coffee_product_id FROM coffee_mentions WHERE post_id = 'p1' AND roaster_id = ?1",
            [starbucks],
            |row| row.get(0),
        )
        .expect("mention");
    assert_eq!(mention_product, Some(product_id));
}

#[test]
fn trademarked_product_names_get_product_reviews() {
    let mut connection = open_in_memory().expect("schema");
    let starbucks = insert_entity(&connection, "Starbucks", "starbucks", "retailer");
    connection
        .execute(
            "
            INSERT INTO coffee_products(entity_id, name, slug, updated_at)
            VALUES(?1, 'Pumpkin Spice Latte®', 'pumpkin-spice-latte', '2026-01-01T00:00:00Z')
            ",
            [starbucks],
        )
        .expect("product");
    let product_id = connection.last_insert_rowid();

    seed_review(
        &connection,
        "p1",
        "At Starbucks the Pumpkin Spice Latte® is back and it is great",
        0.5,
        "2026-10-01T00:00:00Z",
        Some(&Extraction::default()),
    );

    let stats = link_reviews(&mut connection, 50, 500).expect("linking");
    assert_eq!(stats.products_linked, 1);
    assert_eq!(
        count(
            &connection,
            &format!("SELECT COUNT(*) FROM product_reviews WHERE product_id = {product_id}")
        ),
        1
    );
}

#[test]
fn failed_review_rolls_back_and_its_entities_stay_out_of_the_cache() {
    let mut connection = open_in_memory().expect("schema");
    connection
        .execute_batch(
            "
            CREATE TRIGGER reject_atlantis BEFORE INSERT ON origins
            WHEN NEW.country = 'Atlantis'
            BEGIN
              SELECT RAISE(ABORT, 'rejected origin');
            END;
            ",
        )
        .expect("trigger");

    let failing = Extraction {
        roasters: vec![roaster("Gamma Roasters")],
        origins: vec!["Atlantis".to_string()],
        ..Extraction::default()
    };
    let succeeding = Extraction {
        roasters: vec![roaster("Gamma Roasters")],
        ..Extraction::default()
    };
    let failing_id = seed_review(&connection, "newer", "gamma atlantis", 0.0, "2026-10-02T00:00:00Z", Some(&failing));
    seed_review(&connection, "older", "gamma roasters", 0.0, "2026-10-01T00:00:00Z", Some(&succeeding));

    let stats = link_reviews(&mut connection, 50, 500).expect("linking continues past failures");
    assert_eq!(stats.reviews_failed, 1);
    assert_eq!(stats.reviews_linked, 1);

    assert_eq!(count(&connection, "SELECT COUNT(*) FROM entities WHERE slug = 'gamma-roasters'"), 1);
    assert_eq!(count(&connection, "SELECT COUNT(*) FROM coffee_mentions WHERE post_id = 'newer'"), 0);
    let older_roaster: i64 = connection
        .query_row("SELECT roaster_id FROM coffee_mentions WHERE post_id = 'older'", [], |row| row.get(0))
        .expect("older mention");
    let entity_id: i64 = connection
        .query_row("SELECT id FROM entities WHERE slug = 'gamma-roasters'", [], |row| row.get(0))
        .expect("entity");
    assert_eq!(older_roaster, entity_id);

    let linked_at: Option<String> = connection
        .query_row("SELECT linked_at FROM processed_reviews WHERE id = ?1", [failing_id], |row| row.get(0))
        .expect("linked_at");
    assert!(linked_at.is_none());
}

#[test]
fn reviews_without_extraction_are_stamped_and_not_reselected() {
    let mut connection = open_in_memory().expect("schema");
    seed_review(&connection, "p1", "nothing extracted", 0.0, "2026-10-01T00:00:00Z", None);

    let stats = link_reviews(&mut connection, 50, 500).expect("linking");
    assert_eq!(stats.reviews_without_extraction, 1);
    assert_eq!(stats.reviews_linked, 0);
    assert_eq!(count(&connection, "SELECT COUNT(*) FROM processed_reviews WHERE linked_at IS NULL"), 0);
}

#[test]
fn total_limit_caps_the_number_of_reviews_selected() {
    let mut connection = open_in_memory().expect("schema");
    for (index, day) in ["01", "02", "03"].iter().enumerate() {
        seed_review(
            &connection,
            &format!("p{index}"),
            "plain text",
            0.0,
            &format!("2026-10-{day}T00:00:00Z"),
            Some(&Extraction::default()),
        );
    }

    let stats = link_reviews(&mut connection, 50, 2).expect("linking");
    assert_eq!(stats.reviews_linked, 2);

    let remaining: String = connection
        .query_row("SELECT post_id FROM processed_reviews WHERE linked_at IS NULL", [], |row| row.get(0))
        .expect("one unlinked review");
    assert_eq!(remaining, "p0");
}

#[test]
fn coverage_counts_reviews_with_flavors_and_roasters() {
    let mut connection = open_in_memory().expect("schema");
    let extraction = Extraction {
        flavors: vec![flavor("caramel", 0.75)],
        roasters: vec![roaster("Verve")],
        ..Extraction::default()
    };
    seed_review(&connection, "p1", "caramel verve", 0.3, "2026-10-01T00:00:00Z", Some(&extraction));
    seed_review(&connection, "p2", "plain", 0.0, "2026-10-02T00:00:00Z", Some(&Extraction::default()));

    link_reviews(&mut connection, 50, 500).expect("linking");
    let coverage = link_coverage(&connection).expect("coverage");
    assert_eq!(
        coverage,
        LinkCoverage {
            reviews_with_flavors: 1,
            reviews_with_roasters: 1,
        }
    );
}
