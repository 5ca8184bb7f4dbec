//! PostgREST table access.

use reqwest::Method;
use serde_json::Value;
use url::Url;

use super::{Endpoint, check};
use crate::error::{AppError, AppResult};
use crate::gateway::{Filter, Query};

/// Apply select, filters, ordering and limit as PostgREST query parameters
pub(crate) fn query_url(mut url: Url, query: &Query) -> Url {
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("select", "*");
        for filter in &query.filters {
            pairs.append_pair(&filter.column, &format!("eq.{}", filter.value));
        }
        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
                .collect::<Vec<_>>()
                .join(",");
            pairs.append_pair("order", &order);
        }
        if let Some(limit) = query.limit {
            pairs.append_pair("limit", &limit.to_string());
        }
    }
    url
}

fn filtered_url(mut url: Url, filters: &[Filter]) -> Url {
    {
        let mut pairs = url.query_pairs_mut();
        for filter in filters {
            pairs.append_pair(&filter.column, &format!("eq.{}", filter.value));
        }
    }
    url
}

fn table_url(endpoint: &Endpoint, table: &str) -> AppResult<Url> {
    endpoint.url(&format!("rest/v1/{}", table))
}

pub(crate) async fn select(endpoint: &Endpoint, bearer: Option<&str>, query: &Query) -> AppResult<Vec<Value>> {
    let url = query_url(table_url(endpoint, &query.table)?, query);
    let response = check(endpoint.request(Method::GET, url, bearer).send().await?).await?;
    Ok(response.json::<Vec<Value>>().await?)
}

pub(crate) async fn insert(endpoint: &Endpoint, bearer: Option<&str>, table: &str, row: Value) -> AppResult<Value> {
    let url = table_url(endpoint, table)?;
    let response = endpoint
        .request(Method::POST, url, bearer)
        .header("Prefer", "return=representation")
        .json(&vec![row])
        .send()
        .await?;
    let mut rows = check(response).await?.json::<Vec<Value>>().await?;
    if rows.is_empty() {
        return Err(AppError::gateway(200, format!("insert into {} returned no row", table)));
    }
    Ok(rows.swap_remove(0))
}

pub(crate) async fn update(
    endpoint: &Endpoint,
    bearer: Option<&str>,
    table: &str,
    patch: Value,
    filters: &[Filter],
) -> AppResult<Vec<Value>> {
    ensure_filtered(table, filters)?;
    let url = filtered_url(table_url(endpoint, table)?, filters);
    let response = endpoint
        .request(Method::PATCH, url, bearer)
        .header("Prefer", "return=representation")
        .json(&patch)
        .send()
        .await?;
    Ok(check(response).await?.json::<Vec<Value>>().await?)
}

pub(crate) async fn delete(endpoint: &Endpoint, bearer: Option<&str>, table: &str, filters: &[Filter]) -> AppResult<()> {
    ensure_filtered(table, filters)?;
    let url = filtered_url(table_url(endpoint, table)?, filters);
    check(endpoint.request(Method::DELETE, url, bearer).send().await?).await?;
    Ok(())
}

/// Unfiltered writes would touch every visible row
fn ensure_filtered(table: &str, filters: &[Filter]) -> AppResult<()> {
    if filters.is_empty() {
        return Err(AppError::gateway(400, format!("refusing unfiltered write on {}", table)));
    }
    Ok(())
}
