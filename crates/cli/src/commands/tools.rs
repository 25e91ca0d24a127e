//! `hassai tools`: list the Home Assistant tool catalogue.

use hassai_config::AppConfig;
use hassai_core::tool::{ToolDescriptor, ToolGateway};
use hassai_mcp::McpToolGateway;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let gateway = McpToolGateway::from_config(&config.home_assistant)?;

    let tools = gateway.list_tools().await?;

    println!("{} tool(s) via {:?} transport\n", tools.len(), gateway.transport());
    for tool in &tools {
        println!("{}", summary_line(tool));
    }

    Ok(())
}

fn summary_line(tool: &ToolDescriptor) -> String {
    let first_line = tool.description.lines().next().unwrap_or_default().trim();
    if first_line.is_empty() {
        format!("  {}", tool.name)
    } else {
        format!("  {:<28} {}", tool.name, first_line)
    }
}
