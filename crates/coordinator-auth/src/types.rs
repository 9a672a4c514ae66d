//! Credential table types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One principal's static token grant, as loaded from
/// `COORD_STATIC_TOKENS_PATH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub principal: String,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<f64>,
    #[serde(default)]
    pub disabled: bool,
}

/// Static token table: `token -> grant`. Serialized form is a flat JSON
/// object so it can be hand-edited and reloaded without a schema migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticTokenTable(pub HashMap<String, TokenEntry>);

impl StaticTokenTable {
    pub fn load_from_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn get(&self, token: &str) -> Option<&TokenEntry> {
        self.0.get(token)
    }
}

/// The authenticated identity and scope a request was validated under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub scope: Vec<String>,
}
