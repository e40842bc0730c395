use std::fmt::Write as _;

use console::style;

use super::Config;

/// Mask an API key, keeping only the first and last four characters
#[inline]
pub fn mask_key(key: Option<&str>) -> String {
    let Some(key) = key else {
        return "***".to_string();
    };

    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "***".to_string();
    }

    let head: String = chars.iter().take(4).collect();
    let tail: String = chars.iter().skip(chars.len() - 4).collect();
    format!("{}...{}", head, tail)
}

impl Config {
    /// Human-readable configuration summary with secrets masked
    #[inline]
    pub fn summary(&self) -> String {
        let settings = self.active_provider();
        let mut out = String::new();

        // Writing into a String cannot fail
        let _ = writeln!(out, "Provider: {}", self.provider.display_name());
        let _ = writeln!(out, "  API Key: {}", mask_key(settings.api_key.as_deref()));
        let _ = writeln!(out, "  Embedding Model: {}", settings.embedding_model);
        let _ = writeln!(out, "  Chat Model: {}", settings.chat_model);
        let _ = writeln!(out, "  API Base URL: {}", settings.base_url);
        let _ = writeln!(out, "Storage: {}", self.storage);
        let _ = writeln!(out, "  Collection: {}", self.collection);
        let _ = writeln!(out, "Document Processing:");
        let _ = writeln!(out, "  Chunk Size: {}", self.chunking.chunk_size);
        let _ = writeln!(out, "  Chunk Overlap: {}", self.chunking.chunk_overlap);
        let _ = writeln!(out, "  Search K: {}", self.search_k);
        let _ = write!(out, "Log Level: {}", self.log_level);

        out
    }
}

#[inline]
pub fn show_config(config: &Config) {
    println!("{}", style("⚙️  Current Configuration").bold().cyan());
    println!();
    for line in config.summary().lines() {
        if line.starts_with(' ') {
            println!("{}", line);
        } else {
            println!("{}", style(line).bold().yellow());
        }
    }
}
