use colored::Colorize;
use declarative::Error;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print an engine error with its category and what to do about it
pub fn failure(err: &Error) {
    let category = err.category();
    eprintln!();
    eprintln!("{} {}", "✗".red().bold(), category.description().red().bold());
    eprintln!("  {err}");
    if let Some(key) = err.failing_key() {
        eprintln!("  {} {}", "stopped at".dimmed(), key.to_string().bold());
    }
    if err.aborts_before_mutation() {
        eprintln!("  {}", "Nothing on the host was changed".dimmed());
    }
    eprintln!("  {}", category.advice().dimmed());
}
