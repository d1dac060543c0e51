//! Per-query accumulation of streamed result fragments.

use filmq_protocol::{QueryId, QuerySelection};
use std::collections::{BTreeMap, BTreeSet};

/// Finalized results: "query_N" key to the accumulated text.
pub type ResultDocument = BTreeMap<String, String>;

#[derive(Debug, Default, Clone)]
struct QueryEntry {
    text: String,
    fragments: usize,
    complete: bool,
}

/// Collects result fragments for a fixed set of queries.
///
/// Fragments for a query are appended in arrival order, separated by a line
/// break. An entry becomes complete on its end marker and accepts nothing
/// afterwards.
#[derive(Debug, Clone)]
pub struct ResultAccumulator {
    expected: BTreeSet<QueryId>,
    entries: BTreeMap<QueryId, QueryEntry>,
}

impl ResultAccumulator {
    /// Creates an accumulator expecting the queries implied by `selection`.
    pub fn new(selection: QuerySelection) -> Self {
        Self::for_queries(selection.queries())
    }

    pub fn for_queries(queries: impl IntoIterator<Item = QueryId>) -> Self {
        Self {
            expected: queries.into_iter().collect(),
            entries: BTreeMap::new(),
        }
    }

    /// Returns whether `query` is one of the queries this accumulator waits for.
    pub fn is_expected(&self, query: QueryId) -> bool {
        self.expected.contains(&query)
    }

    /// Appends a fragment to `query`'s entry, creating it on first use.
    ///
    /// Returns `false` if the query is already complete; the fragment is dropped.
    pub fn append(&mut self, query: QueryId, fragment: &str) -> bool {
        let entry = self.entries.entry(query).or_default();
        if entry.complete {
            return false;
        }
        if entry.fragments > 0 {
            entry.text.push('\n');
        }
        entry.text.push_str(fragment);
        entry.fragments += 1;
        true
    }

    /// Marks `query` complete. Returns `false` if it already was.
    pub fn mark_complete(&mut self, query: QueryId) -> bool {
        let entry = self.entries.entry(query).or_default();
        if entry.complete {
            return false;
        }
        entry.complete = true;
        true
    }

    pub fn is_query_complete(&self, query: QueryId) -> bool {
        self.entries.get(&query).is_some_and(|e| e.complete)
    }

    /// Returns whether every expected query has received its end marker.
    pub fn is_complete(&self) -> bool {
        self.expected.iter().all(|q| self.is_query_complete(*q))
    }

    /// Expected queries still waiting for their end marker.
    pub fn pending(&self) -> Vec<QueryId> {
        self.expected
            .iter()
            .copied()
            .filter(|q| !self.is_query_complete(*q))
            .collect()
    }

    /// Accumulated text for `query`, complete or not.
    pub fn text(&self, query: QueryId) -> Option<&str> {
        self.entries.get(&query).map(|e| e.text.as_str())
    }

    /// Number of fragments received for `query`.
    pub fn fragments(&self, query: QueryId) -> usize {
        self.entries.get(&query).map_or(0, |e| e.fragments)
    }

    /// Builds the result document from complete entries only.
    pub fn finalize(&self) -> ResultDocument {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.complete)
            .map(|(query, entry)| (query.key(), entry.text.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_are_joined_in_order() {
        let mut acc = ResultAccumulator::new(QuerySelection::All);
        assert!(acc.append(QueryId::Q1, "\"Roma\",\"['Drama']\""));
        assert!(acc.append(QueryId::Q1, "\"Tetro\",\"['Drama', 'Mystery']\""));

        assert_eq!(
            acc.text(QueryId::Q1).unwrap(),
            "\"Roma\",\"['Drama']\"\n\"Tetro\",\"['Drama', 'Mystery']\""
        );
        assert_eq!(acc.fragments(QueryId::Q1), 2);
    }

    #[test]
    fn test_fragments_do_not_leak_between_queries() {
        let mut acc = ResultAccumulator::new(QuerySelection::All);
        acc.append(QueryId::Q2, "\"France\",\"2256831838\"");
        acc.append(QueryId::Q3, "\"Left for Dead\",\"1.0\"");

        assert_eq!(acc.text(QueryId::Q2).unwrap(), "\"France\",\"2256831838\"");
        assert_eq!(acc.text(QueryId::Q3).unwrap(), "\"Left for Dead\",\"1.0\"");
        assert!(acc.text(QueryId::Q1).is_none());
    }

    #[test]
    fn test_completion_requires_every_expected_query() {
        let mut acc = ResultAccumulator::new(QuerySelection::All);
        for query in &QueryId::ALL[..4] {
            acc.mark_complete(*query);
        }
        assert!(!acc.is_complete());
        assert_eq!(acc.pending(), vec![QueryId::Q5]);

        acc.mark_complete(QueryId::Q5);
        assert!(acc.is_complete());
        assert!(acc.pending().is_empty());
    }

    #[test]
    fn test_single_query_selection() {
        let mut acc = ResultAccumulator::new(QuerySelection::Single(QueryId::Q4));
        assert!(!acc.is_complete());

        acc.append(QueryId::Q4, "\"Ricardo Darín\",\"17\"");
        acc.mark_complete(QueryId::Q4);
        assert!(acc.is_complete());
    }

    #[test]
    fn test_expected_queries() {
        let acc = ResultAccumulator::new(QuerySelection::Single(QueryId::Q3));
        assert!(acc.is_expected(QueryId::Q3));
        assert!(!acc.is_expected(QueryId::Q2));

        let acc = ResultAccumulator::new(QuerySelection::All);
        assert!(QueryId::ALL.iter().all(|q| acc.is_expected(*q)));
    }

    #[test]
    fn test_complete_entry_rejects_more_input() {
        let mut acc = ResultAccumulator::new(QuerySelection::All);
        acc.append(QueryId::Q5, "\"POSITIVE\",\"5703.69\"");
        assert!(acc.mark_complete(QueryId::Q5));
        assert!(!acc.mark_complete(QueryId::Q5));
        assert!(!acc.append(QueryId::Q5, "late"));

        assert_eq!(acc.text(QueryId::Q5).unwrap(), "\"POSITIVE\",\"5703.69\"");
    }

    #[test]
    fn test_finalize_omits_incomplete_entries() {
        let mut acc = ResultAccumulator::new(QuerySelection::All);
        acc.append(QueryId::Q1, "a");
        acc.mark_complete(QueryId::Q1);
        acc.append(QueryId::Q2, "b");
        acc.mark_complete(QueryId::Q3);

        let doc = acc.finalize();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc["query_1"], "a");
        assert_eq!(doc["query_3"], "");
        assert!(!doc.contains_key("query_2"));
    }
}
