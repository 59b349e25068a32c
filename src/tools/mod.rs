//! Tool System - named, schema-described capabilities an agent can invoke
//!
//! Information Hiding:
//! - Tool execution details hidden behind trait
//! - Parameter schemas are advisory, for the model's benefit only
//! - Closure-backed tools keep handlers stateless beyond what they capture

pub mod macros;
pub mod registry;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub use registry::ToolRegistry;

/// Tool parameter schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: String,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

/// Tool metadata - describes what the tool does and how to use it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    /// JSON-schema object describing the parameters.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut property = Map::new();
            property.insert("type".to_string(), json!(param.param_type));
            property.insert("description".to_string(), json!(param.description));
            if param.param_type == "array" {
                property.insert("items".to_string(), json!({}));
            }
            if let Some(values) = &param.enum_values {
                property.insert("enum".to_string(), json!(values));
            }
            properties.insert(param.name.clone(), Value::Object(property));

            if param.required {
                required.push(json!(param.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Shape expected in the `tools` field of a chat completion request.
    pub fn to_openai_function(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_schema(),
            }
        })
    }
}

impl fmt::Display for ToolMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

/// Tool trait - All tools must implement this
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> ToolMetadata;

    /// Invoke the tool with whatever arguments were supplied.
    async fn execute(&self, args: Value) -> Result<Value>;
}

pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Tool backed by an async closure. Handlers capture `Arc`-shared reference
/// data; the tool itself holds nothing else.
#[derive(Clone)]
pub struct FnTool {
    metadata: ToolMetadata,
    handler: ToolHandler,
}

impl FnTool {
    pub fn new<F, Fut>(metadata: ToolMetadata, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            metadata,
            handler: Arc::new(move |args| handler(args).boxed()),
        }
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.metadata.name)
            .finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn metadata(&self) -> ToolMetadata {
        self.metadata.clone()
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        (self.handler)(args).await
    }
}

/// Deserialize tool arguments into a typed struct, naming the tool on failure.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| anyhow::anyhow!("invalid arguments for '{}': {}", tool, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
    }

    fn echo_tool() -> FnTool {
        FnTool::new(
            crate::tool_metadata!("echo", "Echo text back", {
                text: string @required => "Text to echo",
            }),
            |args| async move {
                let args: EchoArgs = parse_args("echo", args)?;
                Ok(json!({ "echo": args.text }))
            },
        )
    }

    #[tokio::test]
    async fn test_fn_tool_executes_handler() {
        let tool = echo_tool();
        let result = tool.execute(json!({"text": "hi"})).await.unwrap();
        assert_eq!(result, json!({"echo": "hi"}));
    }

    #[tokio::test]
    async fn test_fn_tool_reports_bad_arguments() {
        let tool = echo_tool();
        let err = tool.execute(json!({"text": 5})).await.unwrap_err();
        assert!(err.to_string().contains("invalid arguments for 'echo'"));
    }

    #[test]
    fn test_openai_function_shape() {
        let function = echo_tool().metadata().to_openai_function();
        assert_eq!(function["type"], "function");
        assert_eq!(function["function"]["name"], "echo");
        assert_eq!(function["function"]["parameters"]["type"], "object");
        assert_eq!(function["function"]["parameters"]["required"], json!(["text"]));
        assert_eq!(
            function["function"]["parameters"]["properties"]["text"]["type"],
            "string"
        );
    }
}
