use colored::Colorize;
use declarative::ResourceState;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

// ============================================================================
// Resource States
// ============================================================================

/// Symbol shown next to a resource in a given state
pub fn state_symbol(state: ResourceState) -> &'static str {
    match state {
        ResourceState::Created => "✓",
        ResourceState::Deleted => "−",
        ResourceState::Failed => "✗",
        ResourceState::Creating | ResourceState::Deleting => "…",
        ResourceState::NotCreated => "○",
    }
}

/// Colored symbol and label for a resource state
pub fn state_label(state: ResourceState) -> String {
    let symbol = state_symbol(state);
    let text = format!("{symbol} {state}");
    match state {
        ResourceState::Created => text.green().to_string(),
        ResourceState::Failed => text.red().to_string(),
        ResourceState::Creating | ResourceState::Deleting => text.yellow().to_string(),
        ResourceState::Deleted | ResourceState::NotCreated => text.dimmed().to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
