//! `.e2e.env` support.
//!
//! A `KEY=VALUE` file consulted after the process environment, so a
//! variable that is already set always wins. Blank lines and `#` comments
//! are skipped, an `export ` prefix is tolerated, and one pair of matching
//! surrounding quotes is stripped from values.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

/// Default file name, looked up in the working directory.
pub const DEFAULT_DOTENV_FILE: &str = ".e2e.env";

/// Parse dotenv text into a map. Malformed lines are skipped; later
/// duplicates override earlier ones.
pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for (line_no, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            debug!(line = line_no + 1, "Skipping malformed dotenv line");
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            debug!(line = line_no + 1, "Skipping dotenv line with invalid key");
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Load a dotenv file; a missing file yields an empty map.
pub fn load_dotenv(path: &Path) -> std::io::Result<HashMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let vars = parse_dotenv(&content);
            debug!(path = %path.display(), count = vars.len(), "Loaded dotenv file");
            Ok(vars)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e),
    }
}
