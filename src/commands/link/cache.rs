use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::model::EntityType;

use super::matching::{normalize_name, phrase_pattern};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntity {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub entity_type: EntityType,
}

#[derive(Debug)]
pub struct CachedProduct {
    pub id: i64,
    pub entity_id: i64,
    pub name: String,
    pub pattern: Regex,
}

#[derive(Debug)]
pub struct NamedPattern {
    pub entity_id: i64,
    pub name: String,
    pub pattern: Regex,
}

/// Entities and origins created while linking one review. They are folded into
/// the main cache only once that review's savepoint has been released.
#[derive(Debug, Default)]
pub struct PendingEntries {
    pub entities: BTreeMap<String, CachedEntity>,
    pub origins: BTreeMap<String, i64>,
}

impl PendingEntries {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.origins.is_empty()
    }
}

/// In-memory lookups over the reference tables, loaded once per linker.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    flavors: HashMap<String, i64>,
    entities: BTreeMap<String, CachedEntity>,
    origins: BTreeMap<String, i64>,
    products: Vec<CachedProduct>,
    retailers: Vec<NamedPattern>,
}

impl ReferenceCache {
    pub fn load(connection: &Connection) -> Result<Self> {
        info!("loading reference data into cache");
        let mut cache = Self::default();
        cache.load_flavors(connection)?;
        cache.load_entities(connection)?;
        cache.load_origins(connection)?;
        cache.load_products(connection)?;

        info!(
            flavor_keys = cache.flavors.len(),
            entity_keys = cache.entities.len(),
            origin_keys = cache.origins.len(),
            products = cache.products.len(),
            retailers = cache.retailers.len(),
            "reference cache ready"
        );
        Ok(cache)
    }

    fn load_flavors(&mut self, connection: &Connection) -> Result<()> {
        let mut statement =
            connection.prepare("SELECT id, term, normalized_term, synonyms FROM flavor_terms")?;
        let mut rows = statement.query([])?;

        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let term: String = row.get(1)?;
            let normalized_term: String = row.get(2)?;
            let synonyms_raw: Option<String> = row.get(3)?;

            self.flavors.insert(term.trim().to_lowercase(), id);
            self.flavors.insert(normalized_term.trim().to_lowercase(), id);

            let synonyms: Vec<String> = match synonyms_raw.as_deref() {
                Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
                    .with_context(|| format!("invalid synonyms for flavor term {term}"))?,
                _ => Vec::new(),
            };
            for synonym in synonyms {
                self.flavors.insert(synonym.trim().to_lowercase(), id);
            }
        }

        Ok(())
    }

    fn load_entities(&mut self, connection: &Connection) -> Result<()> {
        let mut statement =
            connection.prepare("SELECT id, name, slug, entity_type FROM entities ORDER BY id ASC")?;
        let mut rows = statement.query([])?;

        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let slug: String = row.get(2)?;
            let entity_type_raw: String = row.get(3)?;

            let entity_type = match entity_type_raw.parse::<EntityType>() {
                Ok(value) => value,
                Err(err) => {
                    warn!(entity_id = id, error = %err, "skipping entity with unknown type");
                    continue;
                }
            };

            if entity_type == EntityType::Retailer {
                self.retailers.push(NamedPattern {
                    entity_id: id,
                    name: name.clone(),
                    pattern: phrase_pattern(&name)?,
                });
            }

            let entity = CachedEntity {
                id,
                name,
                slug,
                entity_type,
            };
            self.insert_entity(entity);
        }

        Ok(())
    }

    fn load_origins(&mut self, connection: &Connection) -> Result<()> {
        let mut statement =
            connection.prepare("SELECT id, country, normalized_name FROM origins ORDER BY id ASC")?;
        let mut rows = statement.query([])?;

        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let country: String = row.get(1)?;
            let normalized_name: String = row.get(2)?;

            self.origins.insert(normalized_name.to_lowercase(), id);
            self.origins.entry(country.to_lowercase()).or_insert(id);
        }

        Ok(())
    }

    fn load_products(&mut self, connection: &Connection) -> Result<()> {
        let mut statement =
            connection.prepare("SELECT id, entity_id, name FROM coffee_products ORDER BY id ASC")?;
        let mut rows = statement.query([])?;

        while let Some(row) = rows.next()? {
            let name: String = row.get(2)?;
            if name.trim().is_empty() {
                continue;
            }
            self.products.push(CachedProduct {
                id: row.get(0)?,
                entity_id: row.get(1)?,
                pattern: phrase_pattern(&name)?,
                name,
            });
        }

        Ok(())
    }

    fn insert_entity(&mut self, entity: CachedEntity) {
        self.entities
            .insert(entity.slug.to_lowercase(), entity.clone());
        self.entities.insert(normalize_name(&entity.name), entity);
    }

    pub fn flavor_id(&self, key: &str) -> Option<i64> {
        self.flavors.get(key).copied()
    }

    pub fn entity(&self, key: &str) -> Option<&CachedEntity> {
        self.entities.get(key)
    }

    /// Every cached entity key in sorted order.
    pub fn entity_entries(&self) -> impl Iterator<Item = (&String, &CachedEntity)> {
        self.entities.iter()
    }

    pub fn origin_id(&self, key: &str) -> Option<i64> {
        self.origins.get(key).copied()
    }

    pub fn products(&self) -> &[CachedProduct] {
        &self.products
    }

    pub fn retailers(&self) -> &[NamedPattern] {
        &self.retailers
    }

    pub fn entity_key_count(&self) -> usize {
        self.entities.len()
    }

    pub fn merge(&mut self, pending: PendingEntries) {
        for (key, entity) in pending.entities {
            self.entities.insert(entity.slug.to_lowercase(), entity.clone());
            self.entities.insert(key, entity);
        }
        self.origins.extend(pending.origins);
    }
}
