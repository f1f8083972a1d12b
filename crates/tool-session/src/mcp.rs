use async_trait::async_trait;
use barry_model::ToolDescriptor;
use rmcp::ClientHandler;
use rmcp::model::{CallToolRequestParams, RawContent, Tool as McpTool};
use rmcp::service::{RoleClient, RunningService, ServiceExt};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use serde_json::{Map, Value};
use tokio::process::Command;

use crate::config::WorkerConfig;
use crate::error::Error;
use crate::worker::{
    ContentPart, ToolOutput, WorkerConnection, WorkerLauncher,
};

/// The client side of the MCP handshake.
///
/// Workers never send requests back to us, so the default handler is all
/// we need.
#[derive(Clone, Copy, Debug, Default)]
struct BarryClientHandler;

impl ClientHandler for BarryClientHandler {}

/// Launches workers speaking MCP over their standard streams.
#[derive(Clone, Copy, Debug, Default)]
pub struct McpLauncher;

#[async_trait]
impl WorkerLauncher for McpLauncher {
    async fn launch(
        &self,
        config: &WorkerConfig,
    ) -> Result<Box<dyn WorkerConnection>, Error> {
        let args = config.args().to_vec();
        let envs = config.envs();
        let working_dir = config.working_dir().map(ToOwned::to_owned);
        let command =
            Command::new(config.interpreter()).configure(move |cmd| {
                cmd.args(&args).envs(envs);
                if let Some(dir) = &working_dir {
                    cmd.current_dir(dir);
                }
            });

        debug!("spawning worker: {command:?}");
        let transport = TokioChildProcess::new(command).map_err(|err| {
            let reason = format!("failed to spawn worker: {err}");
            Error::protocol().with_reason(reason)
        })?;
        let service = BarryClientHandler.serve(transport).await.map_err(|err| {
            Error::protocol().with_reason(format!("handshake failed: {err}"))
        })?;
        debug!("worker initialized: {:?}", service.peer_info());

        Ok(Box::new(McpConnection { service }))
    }
}

struct McpConnection {
    service: RunningService<RoleClient, BarryClientHandler>,
}

fn descriptor_from_mcp(tool: McpTool) -> ToolDescriptor {
    ToolDescriptor::from_input_schema(
        tool.name.to_string(),
        tool.description.as_deref().unwrap_or_default(),
        Value::Object((*tool.input_schema).clone()),
    )
}

#[async_trait]
impl WorkerConnection for McpConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        let tools = self.service.list_all_tools().await.map_err(|err| {
            let reason = format!("failed to list tools: {err}");
            Error::protocol().with_reason(reason)
        })?;
        Ok(tools.into_iter().map(descriptor_from_mcp).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, Error> {
        let result = self
            .service
            .call_tool(CallToolRequestParams {
                name: name.to_owned().into(),
                arguments: Some(arguments),
                task: None,
                meta: None,
            })
            .await
            .map_err(|err| {
                Error::tool_execution().with_reason(err.to_string())
            })?;

        let parts = result
            .content
            .iter()
            .map(|content| match &content.raw {
                RawContent::Text(text) => ContentPart::Text(text.text.clone()),
                RawContent::Image(image) => ContentPart::Binary {
                    mime_type: image.mime_type.clone(),
                },
                RawContent::Audio(audio) => ContentPart::Binary {
                    mime_type: audio.mime_type.clone(),
                },
                _ => ContentPart::Binary {
                    mime_type: "application/octet-stream".to_owned(),
                },
            })
            .collect();
        Ok(ToolOutput {
            parts,
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn shutdown(self: Box<Self>) -> Result<(), Error> {
        let quit_reason = self.service.cancel().await.map_err(|err| {
            let reason = format!("failed to stop worker: {err}");
            Error::protocol().with_reason(reason)
        })?;
        trace!("worker stopped: {quit_reason:?}");
        Ok(())
    }
}
