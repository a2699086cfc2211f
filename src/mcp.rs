use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    corpus::{Corpus, DEFAULT_TOP_K, SearchResult},
    error,
};

#[derive(Clone)]
pub struct LecternMcpServer {
    corpus: Arc<Corpus>,
    tool_router: ToolRouter<Self>,
}

impl LecternMcpServer {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self {
            corpus,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl LecternMcpServer {
    /// Semantic search over ingested course materials.
    #[tool(
        name = "lectern_search",
        description = "Search ingested course materials by meaning. Restrict to one subject when the question is about a specific course."
    )]
    pub async fn lectern_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let limit = params.limit.unwrap_or(DEFAULT_TOP_K);

        let results = self
            .corpus
            .try_search(&params.query, params.subject.as_deref(), limit)
            .map_err(|e| mcp_error("search failed", e))?;

        let summary = format_search_summary(&results, &params.query);
        let structured = serde_json::to_value(SearchResponse {
            query: params.query,
            subject: params.subject,
            result_count: results.len(),
            results,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Grounding context block for a question within one subject.
    #[tool(
        name = "lectern_context",
        description = "Return the most relevant passages for a question within one subject, formatted as grounding context. Returns a fixed 'No specific information found' sentence when nothing matches."
    )]
    pub async fn lectern_context(
        &self,
        params: Parameters<ContextParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let context = self.corpus.get_context(
            &params.query,
            &params.subject,
            params.limit.unwrap_or(DEFAULT_TOP_K),
        );
        Ok(CallToolResult::success(vec![Content::text(context)]))
    }

    /// Subjects present in the corpus.
    #[tool(
        name = "lectern_subjects",
        description = "List the subjects that have ingested materials, with their descriptions and source documents."
    )]
    pub async fn lectern_subjects(
        &self,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let subjects: Vec<SubjectInfo> = self
            .corpus
            .available_subjects()
            .into_iter()
            .map(|name| SubjectInfo {
                description: self.corpus.subject_description(&name),
                sources: self.corpus.subject_sources(&name),
                name,
            })
            .collect();

        let summary = if subjects.is_empty() {
            "No subjects have been ingested.".to_string()
        } else {
            subjects
                .iter()
                .map(|s| match &s.description {
                    Some(description) => format!("{}: {description}", s.name),
                    None => s.name.clone(),
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(json!({ "subjects": subjects }));
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for LecternMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("lectern", env!("CARGO_PKG_VERSION"))
                    .with_title("lectern MCP"),
            )
            .with_instructions(
                "Call lectern_subjects to see what is available, then lectern_context to ground answers in the course materials.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Search query string.
    pub query: String,
    /// Restrict results to this subject.
    pub subject: Option<String>,
    /// Maximum number of results (default: 3).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextParams {
    /// The question to find context for.
    pub query: String,
    /// Subject whose materials are searched.
    pub subject: String,
    /// Maximum number of passages (default: 3).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query: String,
    subject: Option<String>,
    result_count: usize,
    results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
struct SubjectInfo {
    name: String,
    description: Option<String>,
    sources: Vec<String>,
}

fn format_search_summary(results: &[SearchResult], query: &str) -> String {
    if results.is_empty() {
        return format!("No results found for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!(
        "Found {} result{} for \"{query}\":",
        results.len(),
        suffix
    ));

    for r in results {
        lines.push(format!(
            "{:.3} [{}] {} (page {})",
            r.distance, r.subject, r.source, r.page
        ));
    }

    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(corpus: Corpus) -> error::Result<()> {
    let server = LecternMcpServer::new(Arc::new(corpus));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}
