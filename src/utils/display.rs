use crate::agents::AgentResponse;
use colored::*;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.len()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_warning(text: &str) {
    println!("{}", text.yellow());
}

/// Status line, routing target, then the full envelope as pretty JSON.
pub fn print_response(response: &AgentResponse) {
    if response.success {
        print_success(&format!(
            "✓ success (confidence {:.2})",
            response.confidence
        ));
    } else {
        print_error(&format!(
            "✗ {}: {}",
            response.error_code_str().unwrap_or("ERROR"),
            response.error.as_deref().unwrap_or_default()
        ));
    }

    if let Some(target) = response
        .metadata
        .get("routing")
        .and_then(|routing| routing.get("target_agent"))
        .and_then(|target| target.as_str())
    {
        print_info(&format!("routed to {}", target));
    }
    if response.escalation_needed {
        print_warning("escalation needed");
    }

    match serde_json::to_string_pretty(&response.to_json()) {
        Ok(json) => println!("{}", json),
        Err(e) => print_error(&format!("failed to render response: {}", e)),
    }
}
