//! Lazy pagination over OpenStack listing calls
//!
//! A [`Pager`] is primed with the first page by the call that initiated the
//! listing and then follows next links lazily. It is not restartable;
//! re-listing a kind requires a fresh listing call.

use anyhow::Result;
use serde_json::Value;

use crate::openstack::ServiceClient;

/// One batch of raw resource records.
#[derive(Debug, Clone)]
pub struct Page {
    items: Vec<Value>,
}

impl Page {
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lazy multi-page cursor for one listing call.
#[derive(Debug)]
pub struct Pager {
    client: ServiceClient,
    items_key: &'static str,
    first: Option<Page>,
    next_url: Option<String>,
}

impl Pager {
    /// Perform the initial listing request and prime the pager with the
    /// first page. This is the only request made eagerly; every following
    /// page is fetched on demand by [`Pager::next_page`].
    pub(crate) async fn open(
        client: &ServiceClient,
        url: &url::Url,
        items_key: &'static str,
    ) -> Result<Self> {
        let body = client.get(url).await?;
        let (page, next_url) = split_page(&body, items_key);
        Ok(Self {
            client: client.clone(),
            items_key,
            first: Some(page),
            next_url,
        })
    }

    /// An already-exhausted pager, for exercising callers without a server.
    #[cfg(test)]
    pub(crate) fn empty(client: ServiceClient, items_key: &'static str) -> Self {
        Self {
            client,
            items_key,
            first: None,
            next_url: None,
        }
    }

    /// Next page of records, or `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        if let Some(first) = self.first.take() {
            return Ok(Some(first));
        }

        let Some(href) = self.next_url.take() else {
            return Ok(None);
        };

        let url = self.client.resolve(&href)?;
        let body = self.client.get(&url).await?;
        let (page, next_url) = split_page(&body, self.items_key);
        self.next_url = next_url;
        Ok(Some(page))
    }

    /// Drain every remaining page into a flat list of raw records.
    pub async fn all_pages(mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page.items.into_iter());
        }
        Ok(items)
    }
}

/// Split a listing response into its records and the next-page link.
///
/// OpenStack APIs use two link styles: a `<kind>_links` array with a
/// `rel: "next"` entry (compute, share, network), and a top-level `next`
/// href (image).
fn split_page(body: &Value, items_key: &str) -> (Page, Option<String>) {
    let items = body
        .get(items_key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let next_url = next_link(body, items_key);

    (Page { items }, next_url)
}

fn next_link(body: &Value, items_key: &str) -> Option<String> {
    if let Some(links) = body
        .get(format!("{items_key}_links"))
        .and_then(Value::as_array)
    {
        return links
            .iter()
            .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))
            .and_then(|link| link.get("href"))
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    body.get("next")
        .and_then(Value::as_str)
        .map(str::to_string)
}
