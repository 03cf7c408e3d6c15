//! Solr subquery composition
//!
//! A [`SolrQuery`] wraps a Solr select URL together with its negation, so
//! that two queries against the same collection can be combined into an
//! inner join (`(a) AND (b)`) whose inverse is the left-exclusive join
//! (`(a) NOT (b)`).

pub mod chain;
pub mod error;

pub use chain::QueryChain;
pub use error::SolrSubqueryError;

use std::fmt;
use url::Url;

/// The query parameter holding the Solr query expression
const Q: &str = "q";

/// A Solr boolean operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => write!(f, "AND"),
            Operator::Or => write!(f, "OR"),
            Operator::Not => write!(f, "NOT"),
        }
    }
}

/// Decoded access to query-string parameters
pub trait QueryParam {
    /// All decoded values for `param_name`, in order of appearance
    fn params(&self, param_name: &str) -> Vec<String>;

    /// Replace every value of `param.0` with `param.1`, keeping the order of other pairs
    fn set_param(&mut self, param: (&str, &str));
}

impl QueryParam for Url {
    fn params(&self, param_name: &str) -> Vec<String> {
        self.query_pairs()
            .filter(|(k, _)| k == param_name)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    fn set_param(&mut self, param: (&str, &str)) {
        let pairs: Vec<(String, String)> = self
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut serializer = self.query_pairs_mut();
        serializer.clear();
        for (key, value) in &pairs {
            if key == param.0 {
                serializer.append_pair(key, param.1);
            } else {
                serializer.append_pair(key, value);
            }
        }
    }
}

/// A Solr select request and its negation
#[derive(Debug, Clone, PartialEq)]
pub struct SolrQuery {
    /// The request URL
    pub url: Url,

    /// The same request selecting the complement
    negation: Url,
}

impl SolrQuery {
    /// Create a query from a URL or anything convertible into one
    pub fn new<U>(url: U) -> Result<SolrQuery, SolrSubqueryError>
    where
        U: TryInto<Url>,
        U::Error: fmt::Display,
    {
        let url: Url = url
            .try_into()
            .map_err(|e| SolrSubqueryError::InvalidUrl(e.to_string()))?;

        let q = single_q(&url)?;
        let mut negation = url.clone();
        negation.set_param((Q, &format!("{} ({})", Operator::Not, q)));

        Ok(SolrQuery { url, negation })
    }

    /// Parse a query from a string
    pub fn parse(input: &str) -> Result<SolrQuery, SolrSubqueryError> {
        Self::new(input)
    }

    /// The left join if null query: swaps the request with its negation
    pub fn inverse(&self) -> SolrQuery {
        SolrQuery {
            url: self.negation.clone(),
            negation: self.url.clone(),
        }
    }

    /// The decoded `q` expression of this request
    pub fn q_param(&self) -> Result<String, SolrSubqueryError> {
        single_q(&self.url)
    }
}

impl fmt::Display for SolrQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

fn single_q(url: &Url) -> Result<String, SolrSubqueryError> {
    let mut q_params = url.params(Q);
    match q_params.len() {
        0 => Err(SolrSubqueryError::MissingQQueryParameter),
        1 => Ok(q_params.remove(0)),
        _ => Err(SolrSubqueryError::MultipleQQueryParameters),
    }
}

/// Combination of two queries against the same Solr handler
pub trait SubQuery {
    /// Merge `self` and `other` as `(self) <operator> (other)`, using `other`'s parameters
    fn merge_queries(
        &self,
        other: &SolrQuery,
        operator: Operator,
    ) -> Result<SolrQuery, SolrSubqueryError>;

    /// Inner join: `(self) AND (other)`, whose inverse is `(self) NOT (other)`
    fn inner_join(&self, other: &SolrQuery) -> Result<SolrQuery, SolrSubqueryError>;

    fn check_has_same_host(&self, other: &SolrQuery) -> Result<(), SolrSubqueryError>;
    fn check_has_same_port(&self, other: &SolrQuery) -> Result<(), SolrSubqueryError>;
    fn check_has_same_path(&self, other: &SolrQuery) -> Result<(), SolrSubqueryError>;
}

impl SubQuery for SolrQuery {
    fn merge_queries(
        &self,
        other: &SolrQuery,
        operator: Operator,
    ) -> Result<SolrQuery, SolrSubqueryError> {
        self.check_has_same_host(other)?;
        self.check_has_same_port(other)?;
        self.check_has_same_path(other)?;

        let self_q = self.q_param()?;
        let other_q = other.q_param()?;

        let mut merged = other.url.clone();
        merged.set_param((Q, &format!("({}) {} ({})", self_q, operator, other_q)));

        SolrQuery::new(merged)
    }

    fn inner_join(&self, other: &SolrQuery) -> Result<SolrQuery, SolrSubqueryError> {
        let positive = self.merge_queries(other, Operator::And)?;
        let negative = self.merge_queries(other, Operator::Not)?;

        Ok(SolrQuery {
            url: positive.url,
            negation: negative.url,
        })
    }

    fn check_has_same_host(&self, other: &SolrQuery) -> Result<(), SolrSubqueryError> {
        if self.url.host() == other.url.host() {
            Ok(())
        } else {
            Err(SolrSubqueryError::DifferentHosts(
                self.url.host_str().map(str::to_string),
                other.url.host_str().map(str::to_string),
            ))
        }
    }

    fn check_has_same_port(&self, other: &SolrQuery) -> Result<(), SolrSubqueryError> {
        if self.url.port() == other.url.port() {
            Ok(())
        } else {
            Err(SolrSubqueryError::DifferentPorts(
                self.url.port(),
                other.url.port(),
            ))
        }
    }

    fn check_has_same_path(&self, other: &SolrQuery) -> Result<(), SolrSubqueryError> {
        if self.url.path() == other.url.path() {
            Ok(())
        } else {
            Err(SolrSubqueryError::DifferentPaths(
                self.url.path().to_string(),
                other.url.path().to_string(),
            ))
        }
    }
}
