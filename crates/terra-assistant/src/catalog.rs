//! Country directory query and client-side pagination.
//!
//! The directory data comes from a public GraphQL endpoint that serves the
//! full country list in one response; there is no server-side pagination.
//! Pages are plain slices over the fetched set.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Fields the directory renders for each country.
pub const COUNTRIES_QUERY: &str =
    "{ countries { name emoji capital currency continent { name } languages { name } } }";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("catalog response missing data")]
    MissingData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continent {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub name: String,
}

/// One country row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    pub emoji: String,
    pub capital: Option<String>,
    pub currency: Option<String>,
    pub continent: Continent,
    #[serde(default)]
    pub languages: Vec<Language>,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<CountriesData>,
}

#[derive(Debug, Deserialize)]
struct CountriesData {
    countries: Vec<Country>,
}

/// Read-only client for the countries GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct CountryCatalog {
    http: reqwest::Client,
    endpoint: String,
}

impl CountryCatalog {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Fetch the complete country list. Callers paginate locally with
    /// [`page`].
    pub async fn fetch_all(&self) -> Result<Vec<Country>, CatalogError> {
        let response: GraphQlResponse = self
            .http
            .post(&self.endpoint)
            .json(&GraphQlRequest {
                query: COUNTRIES_QUERY,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let countries = response.data.ok_or(CatalogError::MissingData)?.countries;
        debug!(count = countries.len(), "fetched country catalog");
        Ok(countries)
    }
}

/// Slice one page out of the full result set. Pages are zero-indexed; the
/// last page may be short and out-of-range pages are empty.
pub fn page(countries: &[Country], page: usize, per_page: usize) -> &[Country] {
    if per_page == 0 {
        return &[];
    }
    let start = page.saturating_mul(per_page).min(countries.len());
    let end = start.saturating_add(per_page).min(countries.len());
    &countries[start..end]
}

/// Number of pages needed to show `total` rows.
pub fn page_count(total: usize, per_page: usize) -> usize {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(per_page)
}
