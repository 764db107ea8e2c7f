use crate::models::{EnrichedProduct, MetadataRecord, Product};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

fn normalize_key(key: &str) -> &str {
    key.trim()
}

/// Left-joins products with external metadata on `product_id == id`.
///
/// Every product appears exactly once in the output, in input order. When the
/// metadata holds several records for one key, the first one wins. Products
/// without a match keep the default enrichment attributes.
pub fn enrich_products(
    products: Vec<Product>,
    metadata: &[MetadataRecord],
) -> Vec<EnrichedProduct> {
    if metadata.is_empty() {
        log::warn!("No metadata fetched from API. Skipping enrichment.");
        return products
            .into_iter()
            .map(EnrichedProduct::with_defaults)
            .collect();
    }

    let mut by_key: HashMap<&str, &MetadataRecord> = HashMap::with_capacity(metadata.len());
    let mut duplicates = 0usize;
    for record in metadata {
        match by_key.entry(normalize_key(&record.id)) {
            Entry::Occupied(_) => duplicates += 1,
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }
    if duplicates > 0 {
        log::warn!(
            "Metadata contains {} duplicate ids; keeping the first occurrence of each.",
            duplicates
        );
    }

    let product_keys: BTreeSet<String> = products
        .iter()
        .map(|p| p.product_id.to_string())
        .collect();
    let missing_in_metadata: BTreeSet<&str> = product_keys
        .iter()
        .map(String::as_str)
        .filter(|key| !by_key.contains_key(key))
        .collect();
    let missing_in_products: BTreeSet<&str> = by_key
        .keys()
        .copied()
        .filter(|key| !product_keys.contains(*key))
        .collect();
    log::info!(
        "{} products have no metadata; {} metadata ids match no product.",
        missing_in_metadata.len(),
        missing_in_products.len()
    );
    log::debug!("Product IDs missing in metadata: {:?}", missing_in_metadata);
    log::debug!("Metadata IDs missing in products: {:?}", missing_in_products);

    products
        .into_iter()
        .map(|product| {
            let key = product.product_id.to_string();
            match by_key.get(normalize_key(&key)) {
                Some(record) => EnrichedProduct::with_metadata(product, record),
                None => EnrichedProduct::with_defaults(product),
            }
        })
        .collect()
}
