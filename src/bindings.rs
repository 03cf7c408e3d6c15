//! Python module exposing query composition
//!
//! Built by `maturin` with the `extension-module` feature; the module is
//! importable as `solr_subquery` and provides `SolrQuery` and `SolrQueryChain`.

use crate::query::{QueryChain, SolrQuery, SolrSubqueryError, SubQuery};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

impl From<SolrSubqueryError> for PyErr {
    fn from(err: SolrSubqueryError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// A Solr select request and its negation
#[pyclass(name = "SolrQuery")]
#[derive(Debug, Clone, PartialEq)]
pub struct PySolrQuery {
    query: SolrQuery,
}

#[pymethods]
impl PySolrQuery {
    #[new]
    fn new(url: &str) -> Result<Self, SolrSubqueryError> {
        Ok(SolrQuery::new(url)?.into())
    }

    fn inner_join(&self, other: &PySolrQuery) -> Result<Self, SolrSubqueryError> {
        Ok(self.query.inner_join(&other.query)?.into())
    }

    fn inverse(&self) -> Self {
        self.query.inverse().into()
    }

    fn url(&self) -> String {
        self.query.url.to_string()
    }

    fn __str__(&self) -> String {
        self.url()
    }

    fn __repr__(&self) -> String {
        format!("SolrQuery('{}')", self.query.url)
    }
}

/// Successive inner joins of a list of queries
#[pyclass(name = "SolrQueryChain")]
#[derive(Debug, Clone, PartialEq)]
pub struct PySolrQueryChain {
    chain: QueryChain,
}

impl PySolrQueryChain {
    fn next_query(&mut self) -> Result<Option<PySolrQuery>, SolrSubqueryError> {
        self.chain
            .next()
            .transpose()
            .map(|query| query.map(PySolrQuery::from))
    }
}

#[pymethods]
impl PySolrQueryChain {
    #[new]
    fn new(queries: Vec<PySolrQuery>) -> Self {
        QueryChain::new(queries.into_iter().map(|q| q.query).collect()).into()
    }

    fn add_subquery(&mut self, url: &str) -> Result<(), SolrSubqueryError> {
        self.chain.add_subquery(url)
    }

    fn __len__(&self) -> usize {
        self.chain.len()
    }

    fn __iter__(slf: PyRef<'_, Self>) -> PyRef<'_, Self> {
        slf
    }

    /// The next join; a join error raises `ValueError` once and ends iteration
    fn __next__(mut slf: PyRefMut<'_, Self>) -> PyResult<Option<PySolrQuery>> {
        Ok(slf.next_query()?)
    }
}

impl From<SolrQuery> for PySolrQuery {
    fn from(query: SolrQuery) -> Self {
        Self { query }
    }
}

impl From<PySolrQuery> for SolrQuery {
    fn from(query: PySolrQuery) -> Self {
        query.query
    }
}

impl From<QueryChain> for PySolrQueryChain {
    fn from(chain: QueryChain) -> Self {
        Self { chain }
    }
}

#[pymodule]
fn solr_subquery(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySolrQuery>()?;
    m.add_class::<PySolrQueryChain>()?;
    Ok(())
}
