//! Natural-language outlet questions answered with generated SQL.

use super::guard::SqlGuard;
use super::store::{format_rows, OutletStore};
use crate::config::Prompts;
use crate::error::{BaristaError, Result};
use crate::llm::{ChatMessage, ChatModel, CompletionRequest};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Answer to an outlet question, shaped like the `/outlets` response body.
#[derive(Debug, Clone, Serialize)]
pub struct OutletAnswer {
    /// Stringified result rows.
    pub results: String,
    pub query: String,
    /// The SQL that was run. Empty when the generated SQL was rejected.
    pub sql_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Text-to-SQL pipeline: prompt, guard, execute.
pub struct Text2Sql {
    model: Arc<dyn ChatModel>,
    store: Arc<OutletStore>,
    guard: SqlGuard,
    prompts: Prompts,
    temperature: f32,
    top_k: usize,
}

impl Text2Sql {
    pub fn new(model: Arc<dyn ChatModel>, store: OutletStore, prompts: Prompts) -> Result<Self> {
        Ok(Self {
            model,
            store: Arc::new(store),
            guard: SqlGuard::new()?,
            prompts,
            temperature: 0.3,
            top_k: 5,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Run a store call on the blocking thread pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&OutletStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| BaristaError::OutletStore(format!("store task failed: {}", e)))?
    }

    /// Ask the model for SQL answering `question`.
    async fn generate_sql(&self, question: &str) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("schema".to_string(), self.with_store(|store| store.schema()).await?);
        vars.insert("question".to_string(), question.to_string());
        vars.insert("top_k".to_string(), self.top_k.to_string());

        let system = self.prompts.render_with_custom(&self.prompts.sql.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.sql.user, &vars);

        let request = CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .with_temperature(self.temperature);

        let reply = self.model.complete(&request).await?;
        reply
            .content
            .ok_or_else(|| BaristaError::Model("Empty response from SQL model".to_string()))
    }

    /// Answer a question. Unsafe or failing SQL yields an answer with an
    /// `error` and no rows; only generation and storage failures are errors.
    #[instrument(skip(self))]
    pub async fn answer(&self, question: &str) -> Result<OutletAnswer> {
        let generated = self.generate_sql(question).await?;
        info!("Generated SQL: {}", generated);

        let sql = match self.guard.sanitize(&generated) {
            Ok(sql) => sql,
            Err(e) => {
                warn!("Rejected generated SQL: {}", e);
                return Ok(OutletAnswer {
                    results: "[]".to_string(),
                    query: question.to_string(),
                    sql_query: String::new(),
                    error: Some("The question could not be turned into a safe query.".to_string()),
                });
            }
        };

        let statement = sql.clone();
        match self.with_store(move |store| store.query(&statement)).await {
            Ok(rows) => {
                let results = format_rows(&rows);
                info!("SQL result: {}", results);
                Ok(OutletAnswer {
                    results,
                    query: question.to_string(),
                    sql_query: sql,
                    error: None,
                })
            }
            Err(e @ (BaristaError::Database(_) | BaristaError::UnsafeSql(_))) => {
                warn!("Generated SQL failed: {}", e);
                Ok(OutletAnswer {
                    results: "[]".to_string(),
                    query: question.to_string(),
                    sql_query: sql,
                    error: Some("The query could not be run against the outlet database.".to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }
}
