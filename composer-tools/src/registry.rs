//! Runtime registry for tool metadata and execution.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Metadata describing a registered tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolMetadata {
    id: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ToolMetadata {
    /// Creates metadata for the supplied identifier and version.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidMetadata`] if either field is empty.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> ToolResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ToolError::InvalidMetadata {
                reason: "tool id cannot be empty".into(),
            });
        }

        let version = version.into();
        if version.trim().is_empty() {
            return Err(ToolError::InvalidMetadata {
                reason: "tool version cannot be empty".into(),
            });
        }

        Ok(Self {
            id,
            version,
            description: None,
        })
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the tool id preprocessors refer to.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the semantic version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Trait implemented by tool executors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with the given JSON arguments, returning JSON output.
    async fn invoke(&self, args: Value) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(Value) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, args: Value) -> ToolResult<Value> {
        (self)(args).await
    }
}

/// Client that executes one preprocessor call.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Runs `tool_id` with `args`.
    async fn invoke(&self, tool_id: &str, args: Value) -> ToolResult<Value>;
}

/// Handle returned by the registry for direct invocation.
#[derive(Clone)]
pub struct ToolHandle {
    metadata: ToolMetadata,
    executor: Arc<dyn Tool>,
}

impl ToolHandle {
    /// Returns the associated metadata.
    #[must_use]
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Executes the underlying tool implementation.
    ///
    /// # Errors
    ///
    /// Propagates any error returned by the underlying implementation.
    pub async fn invoke(&self, args: Value) -> ToolResult<Value> {
        self.executor.invoke(args).await
    }
}

/// Registry that stores tool implementations keyed by id.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<HashMap<String, ToolHandle>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<_> = inner.keys().cloned().collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &ids)
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the id is already present.
    pub fn register_tool<T>(&self, metadata: ToolMetadata, tool: T) -> ToolResult<()>
    where
        T: Tool + 'static,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = metadata.id().to_owned();
        if inner.contains_key(&id) {
            return Err(ToolError::DuplicateTool { id });
        }

        debug!(tool = %id, version = metadata.version(), "tool registered");
        inner.insert(
            id,
            ToolHandle {
                metadata,
                executor: Arc::new(tool),
            },
        );

        Ok(())
    }

    /// Returns a handle to the tool matching the supplied id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ToolHandle> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(id).cloned()
    }

    /// Lists the metadata of all registered tools, sorted by id.
    #[must_use]
    pub fn list(&self) -> Vec<ToolMetadata> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut tools: Vec<_> = inner
            .values()
            .map(|handle| handle.metadata.clone())
            .collect();
        tools.sort_by(|a, b| a.id.cmp(&b.id));
        tools
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(&self, tool_id: &str, args: Value) -> ToolResult<Value> {
        let handle = self.get(tool_id).ok_or_else(|| ToolError::UnknownTool {
            id: tool_id.to_owned(),
        })?;
        handle.invoke(args).await
    }
}

/// Errors produced by tool registration, invocation, and extraction.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool metadata failed validation.
    #[error("invalid tool metadata: {reason}")]
    InvalidMetadata {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool id collided with an existing registration.
    #[error("tool `{id}` is already registered")]
    DuplicateTool {
        /// Id of the offending tool.
        id: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{id}` is not registered")]
    UnknownTool {
        /// Id of the missing tool.
        id: String,
    },

    /// Tool execution failed or returned an error payload.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },

    /// The extraction path did not match the tool result.
    #[error("cannot extract `{expr}` from tool result: {reason}")]
    Extraction {
        /// The offending path expression.
        expr: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The call did not finish in time.
    #[error("tool call timed out after {millis} ms")]
    Timeout {
        /// Configured timeout.
        millis: u64,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_path;
    use serde_json::json;

    fn search_metadata() -> ToolMetadata {
        ToolMetadata::new("search", "1.0.0")
            .unwrap()
            .with_description("Looks up passages for a query")
    }

    fn search_registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry
            .register_tool(search_metadata(), |args: Value| async move {
                let query = args["q"].as_str().unwrap_or_default().to_owned();
                Ok(json!({ "hits": [{ "text": format!("notes on {query}") }] }))
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn preprocessor_calls_go_through_the_invoker() {
        let registry = search_registry();
        let invoker: &dyn ToolInvoker = &registry;

        let output = invoker
            .invoke("search", json!({ "q": "otters" }))
            .await
            .unwrap();
        let saved = extract_path(&output, "$.hits[0].text").unwrap();
        assert_eq!(saved, json!("notes on otters"));
    }

    #[tokio::test]
    async fn tool_ids_are_registered_once() {
        let registry = search_registry();

        let err = registry
            .register_tool(
                ToolMetadata::new("search", "2.0.0").unwrap(),
                |_: Value| async move { Ok(Value::Null) },
            )
            .expect_err("tool id is taken");
        assert!(matches!(err, ToolError::DuplicateTool { id } if id == "search"));

        let output = registry.invoke("search", json!({ "q": "a" })).await.unwrap();
        assert_eq!(output["hits"][0]["text"], "notes on a");
        assert_eq!(registry.get("search").unwrap().metadata().version(), "1.0.0");
    }

    #[tokio::test]
    async fn unregistered_tool_ids_fail_the_call() {
        let registry = search_registry();
        let err = registry
            .invoke("summarize", json!({ "text": "{{draft}}" }))
            .await
            .expect_err("no such tool");

        assert!(matches!(err, ToolError::UnknownTool { ref id } if id == "summarize"));
        assert_eq!(err.to_string(), "tool `summarize` is not registered");
    }

    #[tokio::test]
    async fn tool_errors_propagate() {
        let registry = ToolRegistry::new();
        registry
            .register_tool(search_metadata(), |_: Value| async move {
                Err::<Value, _>(ToolError::execution("backend down"))
            })
            .unwrap();

        let err = registry
            .invoke("search", Value::Null)
            .await
            .expect_err("fails");
        assert_eq!(err.to_string(), "tool execution failed: backend down");
    }

    #[test]
    fn invalid_metadata_errors() {
        let err = ToolMetadata::new("", "1.0.0").expect_err("empty id should error");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));

        let err = ToolMetadata::new("search", " ").expect_err("empty version should error");
        assert!(matches!(err, ToolError::InvalidMetadata { .. }));
    }

    #[test]
    fn lists_sorted_metadata() {
        let registry = search_registry();
        registry
            .register_tool(ToolMetadata::new("fetch", "1").unwrap(), |v: Value| async move {
                Ok(v)
            })
            .unwrap();
        let ids: Vec<_> = registry.list().iter().map(|m| m.id().to_owned()).collect();
        assert_eq!(ids, vec!["fetch", "search"]);
    }
}
