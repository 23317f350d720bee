use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;
use url::Url;

use crate::mcp::types::ServerEndpoint;

/// The `mcp` configuration section.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct McpSettings {
    /// Servers in priority order; earlier entries win duplicate tool names.
    #[serde(default)]
    pub servers: Vec<McpServerEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct McpServerEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

impl McpSettings {
    /// Usable endpoints in configured order.
    ///
    /// URLs get `${VAR}` expansion. Entries missing a name or a valid URL,
    /// and repeats of an earlier name, are skipped with a warning.
    pub fn endpoints(&self) -> Vec<ServerEndpoint> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.servers.len());

        for (index, entry) in self.servers.iter().enumerate() {
            let name = entry.name.trim();
            let url = expand_env_placeholders(entry.url.trim());

            if name.is_empty() || url.is_empty() {
                warn!(index, name = %name, "Skipping MCP server entry without name or url");
                continue;
            }
            if let Err(e) = Url::parse(&url) {
                warn!(index, name = %name, error = %e, "Skipping MCP server entry with invalid url");
                continue;
            }
            if !seen.insert(name.to_string()) {
                warn!(index, name = %name, "Skipping duplicate MCP server name");
                continue;
            }
            out.push(ServerEndpoint::new(name, url));
        }

        out
    }
}

/// Expand "${VAR}" placeholders from the process environment.
/// Unknown variables are left in place.
pub fn expand_env_placeholders(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match std::env::var(key) {
            Ok(value) if !key.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
