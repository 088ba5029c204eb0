use pc_backend::{SearchBackend, SearchSource};
use pc_core::{Caller, Row, SearchBundle};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Key added to expense rows saying which ledger they came from.
pub const EXPENSE_SOURCE_KEY: &str = "expense_source";

/// Fans one query out to every search RPC and gathers the results.
#[derive(Clone)]
pub struct SearchAggregator {
    backend: Arc<dyn SearchBackend>,
}

impl SearchAggregator {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Runs all searches concurrently. A failing source contributes no rows
    /// and never cancels the others.
    #[instrument(skip(self, caller, query), fields(user_id = %caller.user_id))]
    pub async fn search_all(&self, caller: &Caller, query: &str) -> SearchBundle {
        let (notes, claims, aged_care, workcover, payments, attachments) = tokio::join!(
            self.search_source(caller, SearchSource::Notes, query),
            self.search_source(caller, SearchSource::Claims, query),
            self.search_source(caller, SearchSource::Expenses, query),
            self.search_source(caller, SearchSource::WorkcoverExpenses, query),
            self.search_source(caller, SearchSource::Payments, query),
            self.search_source(caller, SearchSource::Attachments, query),
        );

        let mut expenses = tag_expense_source(aged_care, "aged_care");
        expenses.extend(tag_expense_source(workcover, "workcover"));

        let bundle = SearchBundle {
            notes,
            claims,
            expenses,
            payments,
            attachments,
        };
        debug!(counts = ?bundle.counts(), "search fan-out complete");
        bundle
    }

    async fn search_source(&self, caller: &Caller, source: SearchSource, query: &str) -> Vec<Row> {
        let limit = source.default_limit();
        match self.backend.search(caller, source, query, limit).await {
            Ok(mut rows) => {
                rows.truncate(limit as usize);
                rows
            }
            Err(e) => {
                warn!(rpc = source.rpc_name(), error = %e, "search failed; continuing without it");
                Vec::new()
            }
        }
    }
}

fn tag_expense_source(rows: Vec<Row>, source: &str) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            row.entry(EXPENSE_SOURCE_KEY)
                .or_insert_with(|| Value::String(source.to_string()));
            row
        })
        .collect()
}
