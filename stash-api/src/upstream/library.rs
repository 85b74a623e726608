//! Library service client: book metadata and the paged catalog.

use async_trait::async_trait;
use serde::Deserialize;
use stash_core::{
    Catalog, CatalogItem, CatalogPage, MetadataResolver, ObjectMetadata, StashResult,
};
use std::time::Duration;

use super::{authorized, optional_json, required_json, unavailable};
use crate::config::UpstreamEndpoint;
use crate::constants::LIBRARY_SERVICE;

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct SourceResponse {
    id: i32,
}

#[derive(Debug, Deserialize)]
struct AuthorResponse {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    middle_name: Option<String>,
}

impl AuthorResponse {
    fn full_name(&self) -> String {
        [
            self.last_name.as_str(),
            self.first_name.as_str(),
            self.middle_name.as_deref().unwrap_or(""),
        ]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Debug, Deserialize)]
struct BookResponse {
    id: i32,
    title: String,
    source: SourceResponse,
    remote_id: i32,
    #[serde(default)]
    available_types: Vec<String>,
    #[serde(default)]
    authors: Vec<AuthorResponse>,
}

#[derive(Debug, Deserialize)]
struct BaseBookResponse {
    id: i32,
    #[serde(default)]
    available_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BookPageResponse {
    items: Vec<BaseBookResponse>,
    page: u32,
    pages: u32,
}

// ============================================================================
// DOMAIN
// ============================================================================

/// A book as the library describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: i32,
    pub title: String,
    /// Library source the file must be downloaded from
    pub source_id: i32,
    /// Id of the book inside that source
    pub remote_id: i32,
    pub available_types: Vec<String>,
    pub authors: Vec<String>,
}

impl Book {
    pub fn metadata(&self) -> ObjectMetadata {
        ObjectMetadata {
            object_id: self.id,
            title: self.title.clone(),
            authors: self.authors.clone(),
        }
    }
}

impl From<BookResponse> for Book {
    fn from(book: BookResponse) -> Self {
        Self {
            id: book.id,
            title: book.title,
            source_id: book.source.id,
            remote_id: book.remote_id,
            available_types: book.available_types,
            authors: book.authors.iter().map(AuthorResponse::full_name).collect(),
        }
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Client for the library service.
#[derive(Debug, Clone)]
pub struct LibraryClient {
    http: reqwest::Client,
    endpoint: UpstreamEndpoint,
    timeout: Duration,
}

impl LibraryClient {
    pub fn new(http: reqwest::Client, endpoint: UpstreamEndpoint, timeout: Duration) -> Self {
        Self {
            http,
            endpoint,
            timeout,
        }
    }

    /// Fetch a book. `Ok(None)` when the library does not know it.
    pub async fn book(&self, book_id: i32) -> StashResult<Option<Book>> {
        let request = self
            .http
            .get(self.endpoint.join(&format!("api/v1/books/{}", book_id)))
            .timeout(self.timeout);

        let response = authorized(request, &self.endpoint)
            .send()
            .await
            .map_err(|e| unavailable(LIBRARY_SERVICE, e))?;

        let book: Option<BookResponse> = optional_json(LIBRARY_SERVICE, response).await?;
        Ok(book.map(Book::from))
    }
}

#[async_trait]
impl MetadataResolver for LibraryClient {
    async fn metadata(&self, object_id: i32) -> StashResult<Option<ObjectMetadata>> {
        Ok(self.book(object_id).await?.map(|book| book.metadata()))
    }
}

#[async_trait]
impl Catalog for LibraryClient {
    async fn page(&self, page: u32, size: u32) -> StashResult<CatalogPage> {
        let request = self
            .http
            .get(self.endpoint.join("api/v1/books/base/"))
            .query(&[
                ("page", page.to_string()),
                ("size", size.to_string()),
                ("is_deleted", "false".to_string()),
            ])
            .timeout(self.timeout);

        let response = authorized(request, &self.endpoint)
            .send()
            .await
            .map_err(|e| unavailable(LIBRARY_SERVICE, e))?;

        let body: BookPageResponse = required_json(LIBRARY_SERVICE, response).await?;
        Ok(CatalogPage {
            items: body
                .items
                .into_iter()
                .map(|item| CatalogItem {
                    id: item.id,
                    available_types: item.available_types,
                })
                .collect(),
            page: body.page,
            pages: body.pages,
        })
    }
}
