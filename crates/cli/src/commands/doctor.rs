//! `hassai doctor`: diagnose configuration and connectivity.

use hassai_config::AppConfig;
use hassai_core::provider::Provider;
use hassai_core::tool::ToolGateway;
use hassai_mcp::McpToolGateway;
use hassai_providers::OpenRouterProvider;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("hassAI Doctor: System Diagnostics");
    println!("=================================\n");

    let mut issues = 0;

    let config_path = std::env::var("HASSAI_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| AppConfig::config_dir().join("config.toml"));
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ℹ️  No config file at {}; using defaults and environment", config_path.display());
        println!("     A starting point:\n");
        for line in AppConfig::default_toml().lines() {
            println!("       {line}");
        }
        println!();
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the configuration before running further checks.");
            return Ok(());
        }
    };

    match config.ensure_complete() {
        Ok(()) => println!("  ✅ Required settings present"),
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Completion service
    match OpenRouterProvider::from_config(&config.openrouter) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ OpenRouter reachable (model {})", provider.model()),
            Ok(false) => {
                println!("  ❌ OpenRouter answered but rejected the request");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ OpenRouter unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ⚠️  OpenRouter skipped: {e}");
            issues += 1;
        }
    }

    // Tool service
    match McpToolGateway::from_config(&config.home_assistant) {
        Ok(gateway) => match gateway.list_tools().await {
            Ok(tools) => println!(
                "  ✅ Home Assistant MCP reachable ({} tools, {:?} transport)",
                tools.len(),
                gateway.transport()
            ),
            Err(e) => {
                println!("  ❌ Home Assistant MCP unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ⚠️  Home Assistant MCP skipped: {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
