// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Colored status lines shared by the commands
//!
//! ```rust
//! use histsync_cli::output;
//!
//! output::header("Linking targets");
//! output::detail("History", "/var/lib/histsync/history");
//! output::success("Linked 3 targets");
//! ```

use console::style;

/// Print a success message with a green check mark
pub fn success(msg: &str) {
    println!("{} {}", style("✅").green().bold(), msg);
}

/// Print an error message to stderr
pub fn error(msg: &str) {
    eprintln!("{} {}", style("❌").red().bold(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", style("ℹ️").cyan(), msg);
}

pub fn warning(msg: &str) {
    println!("{} {}", style("⚠️").yellow(), msg);
}

/// Print an indented `key: value` line with the value highlighted
pub fn detail(key: &str, value: &str) {
    println!("  {}: {}", key, style(value).cyan());
}

pub fn header(msg: &str) {
    println!("{} {}", style("🔗").green().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_functions_do_not_panic() {
        console::set_colors_enabled(false);
        success("done");
        error("failed");
        info("note");
        warning("careful");
        detail("key", "value");
        header("title");
    }
}
