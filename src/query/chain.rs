//! Chain multiple Solr queries into successive inner joins

use crate::query::{SolrQuery, SolrSubqueryError, SubQuery};
use std::collections::VecDeque;
use std::fmt;
use url::Url;

/// Folds queries left to right: yields `q1`, then `(q1) AND (q2)`,
/// then `((q1) AND (q2)) AND (q3)`, and so on.
///
/// A join error is yielded once, after which the chain is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryChain {
    queries: VecDeque<SolrQuery>,
    iteration: usize,
    poisoned: bool,
}

impl QueryChain {
    pub fn new(queries: Vec<SolrQuery>) -> QueryChain {
        QueryChain {
            queries: queries.into(),
            iteration: 0,
            poisoned: false,
        }
    }

    /// Append a query to the end of the chain
    pub fn add_subquery<U>(&mut self, url: U) -> Result<(), SolrSubqueryError>
    where
        U: TryInto<Url>,
        U::Error: fmt::Display,
    {
        let query = SolrQuery::new(url)?;
        self.queries.push_back(query);
        Ok(())
    }

    /// Number of queries still to be folded (including the running join)
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Consume the chain and return the final join
    pub fn fold_all(self) -> Result<SolrQuery, SolrSubqueryError> {
        let mut last = None;
        for query in self {
            last = Some(query?);
        }
        last.ok_or(SolrSubqueryError::EmptyChain)
    }
}

impl Iterator for QueryChain {
    type Item = Result<SolrQuery, SolrSubqueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }

        if self.iteration == 0 {
            let first = self.queries.front().cloned()?;
            self.iteration += 1;
            return Some(Ok(first));
        }

        let first = self.queries.pop_front()?;
        let Some(second) = self.queries.pop_front() else {
            // Keep the running join so a later add_subquery resumes from it
            self.queries.push_front(first);
            return None;
        };

        match first.inner_join(&second) {
            Ok(joined) => {
                self.iteration += 1;
                self.queries.push_front(joined.clone());
                Some(Ok(joined))
            }
            Err(e) => {
                self.poisoned = true;
                Some(Err(e))
            }
        }
    }
}
