//! Translation seam: structured query → broker representations.
//!
//! Compiling a structured query into CQL or other languages is done by an
//! external service; the dispatcher only needs the resulting map.

use std::collections::HashMap;
use std::future::Future;

use fed_core::entities::StructuredQuery;
use fed_core::enums::MediaType;

use crate::error::TranslationError;

/// Produces every representation the brokers may need, keyed by media type.
pub trait QueryTranslator: Send + Sync {
    fn translate(
        &self,
        query: &StructuredQuery,
    ) -> impl Future<Output = Result<HashMap<MediaType, String>, TranslationError>> + Send;
}

/// Forwards the structured query itself as `application/sq+json`, plus any
/// fixed representations registered up front (for example a CQL library
/// compiled elsewhere).
#[derive(Debug, Clone, Default)]
pub struct PassthroughTranslator {
    fixed: HashMap<MediaType, String>,
}

impl PassthroughTranslator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a representation returned for every query. A fixed
    /// `application/sq+json` entry is ignored in favour of the query itself.
    #[must_use]
    pub fn with_representation(mut self, media_type: MediaType, content: impl Into<String>) -> Self {
        self.fixed.insert(media_type, content.into());
        self
    }
}

impl QueryTranslator for PassthroughTranslator {
    async fn translate(
        &self,
        query: &StructuredQuery,
    ) -> Result<HashMap<MediaType, String>, TranslationError> {
        let body = query
            .to_body()
            .map_err(|e| TranslationError::Failed(e.to_string()))?;
        let mut representations = self.fixed.clone();
        representations.insert(MediaType::StructuredQuery, body);
        Ok(representations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn passthrough_keeps_query_and_fixed_entries() {
        let translator = PassthroughTranslator::new()
            .with_representation(MediaType::Cql, "library Retrieve")
            .with_representation(MediaType::StructuredQuery, "ignored");
        let query = StructuredQuery(serde_json::json!({"version": "1"}));

        let map = translator.translate(&query).await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&MediaType::Cql], "library Retrieve");
        assert_eq!(map[&MediaType::StructuredQuery], query.to_body().unwrap());
    }
}
