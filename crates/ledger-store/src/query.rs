use std::collections::BTreeMap;

/// Ordering of query results by insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Builder for constructing document queries.
///
/// Filters documents of one kind by equality on indexed fields.
#[derive(Debug, Clone)]
pub struct DocumentQuery {
    /// Document kind to search.
    pub kind: String,

    /// Required `field = value` pairs.
    pub fields: BTreeMap<String, String>,

    /// Result ordering.
    pub order: SortOrder,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,

    /// Number of documents to skip.
    pub offset: Option<usize>,
}

impl DocumentQuery {
    /// Creates a query for all documents of a kind.
    pub fn for_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
            order: SortOrder::default(),
            limit: None,
            offset: None,
        }
    }

    /// Requires an indexed field to equal a value.
    pub fn field(mut self, field: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(field.into(), value.to_string());
        self
    }

    /// Returns newest documents first.
    pub fn newest_first(mut self) -> Self {
        self.order = SortOrder::NewestFirst;
        self
    }

    /// Limits the number of documents returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many documents before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns a copy without pagination, for counting.
    pub fn without_pagination(&self) -> Self {
        Self {
            limit: None,
            offset: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_for_kind() {
        let query = DocumentQuery::for_kind("Order");
        assert_eq!(query.kind, "Order");
        assert!(query.fields.is_empty());
        assert_eq!(query.order, SortOrder::OldestFirst);
    }

    #[test]
    fn query_builder_chain() {
        let query = DocumentQuery::for_kind("Transaction")
            .field("invoice_id", "inv-1")
            .field("status", "Pending")
            .newest_first()
            .limit(10)
            .offset(20);

        assert_eq!(query.fields.get("invoice_id").map(String::as_str), Some("inv-1"));
        assert_eq!(query.fields.get("status").map(String::as_str), Some("Pending"));
        assert_eq!(query.order, SortOrder::NewestFirst);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(20));

        let unpaged = query.without_pagination();
        assert_eq!(unpaged.limit, None);
        assert_eq!(unpaged.offset, None);
        assert_eq!(unpaged.fields.len(), 2);
    }
}
