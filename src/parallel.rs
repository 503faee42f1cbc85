//! Concurrent search: one tokio task per searchable table.
//!
//! Tasks share a single [`SharedRecorder`] and [`Cancellation`] token, so
//! the threshold is global across tasks and the first failure stops the
//! rest. Within a task the traversal is the same depth-first walk the
//! sequential search uses. Identifiers per name are unique, but their order
//! depends on task scheduling.

use std::sync::Arc;

use anyhow::{Context, Result};
use graphfind_core::recorder::{Cancellation, SharedRecorder};
use graphfind_core::search::{Catalog, Searcher, Session};
use graphfind_core::store::Store;
use graphfind_core::{SearchRequest, SearchableResponse};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Searches every item of `request` concurrently.
pub async fn find_concurrent<S>(
    store: Arc<S>,
    session: Arc<Session>,
    request: &SearchRequest,
) -> Result<SearchableResponse>
where
    S: Store + ?Sized + 'static,
{
    let mut request = request.clone();
    request.prepare()?;
    let request = Arc::new(request);

    let catalog = Arc::new(Catalog::load(store.as_ref(), &session).await?);
    let recorder = SharedRecorder::new(request.threshold);
    let token = Arc::new(Cancellation::new());

    let mut tasks = JoinSet::new();
    for index in 0..request.items.len() {
        let store = Arc::clone(&store);
        let catalog = Arc::clone(&catalog);
        let request = Arc::clone(&request);
        let token = Arc::clone(&token);
        let mut recorder = recorder.clone();
        tasks.spawn(async move {
            let item = &request.items[index];
            debug!(item = %item.name, "search task started");
            let mut searcher =
                Searcher::new(store.as_ref(), &catalog, &request, &mut recorder, &token);
            let result = searcher.search_item(item).await;
            result.with_context(|| format!("search of '{}' failed", item.name))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(result) => result,
            Err(e) => Err(anyhow::Error::new(e).context("search task panicked")),
        };
        if let Err(e) = outcome {
            warn!(error = %e, "search task failed, cancelling remaining tasks");
            token.cancel();
            tasks.abort_all();
            return Err(e);
        }
    }

    let response = recorder.into_response();
    info!(
        keyword = %request.keyword,
        items = request.items.len(),
        classes = response.len(),
        matches = response.count(),
        "concurrent search complete"
    );
    Ok(response)
}
