//! Record listing and CRUD.
//!
//! Listing pages through the store with a fixed page size until a page comes
//! back short. Fetching is deliberately forgiving: an unknown collection is an
//! empty result, and a transport failure mid-pagination yields the records
//! accumulated so far rather than nothing. Callers that need completeness
//! must check [`Fetched::complete`].

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{Result, client::RecbaseClient, error::RecbaseError, record::Record};

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    items: Vec<Record>,
}

/// Result of [`RecbaseClient::fetch_all`].
#[derive(Debug, Default)]
pub struct Fetched {
    /// Records accumulated across pages, in server order.
    pub records: Vec<Record>,
    /// False when pagination aborted on a transport error and `records`
    /// holds a partial result.
    pub complete: bool,
}

impl RecbaseClient {
    /// Fetches one page of records from a collection.
    pub async fn list_page(
        &self,
        collection: &str,
        filter: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Record>> {
        let path = format!("/api/collections/{collection}/records");
        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("perPage", per_page.to_string()),
            ("skipTotal", "1".to_string()),
        ];
        if let Some(filter) = filter {
            query.push(("filter", filter.to_string()));
        }
        let response: ListPage = self
            .send_json(reqwest::Method::GET, &path, &query, None, None)
            .await?;
        Ok(response.items)
    }

    /// Fetches all records from a collection, following pagination until a
    /// page returns fewer records than the page size.
    ///
    /// - an unknown collection (404) yields an empty, complete result with a warning
    /// - any other error aborts pagination for this collection only, returning
    ///   whatever was accumulated so far with `complete == false`
    pub async fn fetch_all(&self, collection: &str, filter: Option<&str>) -> Fetched {
        let per_page = self.config.page_size;
        let (records, error) =
            collect_pages(per_page as usize, async |page| {
                self.list_page(collection, filter, page, per_page).await
            })
            .await;
        match error {
            None => {
                debug!(collection, count = records.len(), "fetch_all");
                Fetched {
                    records,
                    complete: true,
                }
            }
            Some(err) if err.is_not_found() => {
                warn!(collection, "collection does not exist, skipping");
                Fetched {
                    records,
                    complete: true,
                }
            }
            Some(err) => {
                warn!(collection, partial = records.len(), %err, "fetch aborted");
                Fetched {
                    records,
                    complete: false,
                }
            }
        }
    }

    /// Looks up a record by identity. Returns `Ok(None)` if it does not exist.
    pub async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        let path = format!("/api/collections/{collection}/records/{id}");
        match self
            .send_json::<Record>(reqwest::Method::GET, &path, &[], None, None)
            .await
        {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Creates a record. The body may carry an explicit `id` to preserve identity.
    pub async fn create_record(
        &self,
        collection: &str,
        body: &serde_json::Map<String, Value>,
    ) -> Result<Record> {
        let path = format!("/api/collections/{collection}/records");
        let body = Self::to_body(body)?;
        self.send_json(reqwest::Method::POST, &path, &[], Some(body), None)
            .await
    }

    /// Issues a partial update of a record by identity.
    pub async fn update_record(
        &self,
        collection: &str,
        id: &str,
        body: &serde_json::Map<String, Value>,
    ) -> Result<Record> {
        let path = format!("/api/collections/{collection}/records/{id}");
        let body = Self::to_body(body)?;
        self.send_json(reqwest::Method::PATCH, &path, &[], Some(body), None)
            .await
    }
}

/// Pagination loop: fetches pages starting at 1 until a page returns fewer
/// than `page_size` items, or the fetch fails. Returns everything accumulated
/// plus the terminating error, if any.
pub(crate) async fn collect_pages<T, F>(
    page_size: usize,
    mut fetch: F,
) -> (Vec<T>, Option<RecbaseError>)
where
    F: AsyncFnMut(u32) -> Result<Vec<T>>,
{
    let mut records = Vec::new();
    let mut page = 1u32;
    loop {
        match fetch(page).await {
            Ok(items) => {
                let short = items.len() < page_size;
                records.extend(items);
                if short {
                    return (records, None);
                }
                page += 1;
            }
            Err(err) => return (records, Some(err)),
        }
    }
}
