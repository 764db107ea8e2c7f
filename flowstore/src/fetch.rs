use crate::models::MetadataRecord;
use async_trait::async_trait;

/// An external source of product enrichment attributes.
///
/// Fetching is best-effort: implementations return whatever they managed to
/// collect (possibly nothing) instead of an error, and callers treat an empty
/// collection as a valid enrichment state.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_metadata(&self) -> Vec<MetadataRecord>;
}

/// Source used when no metadata endpoint is configured.
pub struct NullMetadataSource;

#[async_trait]
impl MetadataSource for NullMetadataSource {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn fetch_metadata(&self) -> Vec<MetadataRecord> {
        Vec::new()
    }
}

/// Serves a fixed set of records. Handy for replaying captured API responses.
pub struct StaticMetadataSource {
    records: Vec<MetadataRecord>,
}

impl StaticMetadataSource {
    pub fn new(records: Vec<MetadataRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl MetadataSource for StaticMetadataSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_metadata(&self) -> Vec<MetadataRecord> {
        self.records.clone()
    }
}
