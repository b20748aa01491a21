// 🔤 Identifier Resolver - Raw source names → boundary canonical names
// Static alias table, pass-through for anything not listed. No fuzzy matching.

use crate::error::{Phase, PipelineError, Result};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct IdentifierResolver {
    aliases: HashMap<String, String>,
}

impl IdentifierResolver {
    /// Build a resolver; empty keys or values are rejected
    pub fn new(aliases: &BTreeMap<String, String>) -> Result<Self> {
        let mut table = HashMap::with_capacity(aliases.len());

        for (raw, canonical) in aliases {
            if raw.is_empty() || canonical.is_empty() {
                return Err(PipelineError::configuration(
                    Phase::Resolve,
                    raw.as_str(),
                    format!("alias entry '{}' -> '{}' has an empty side", raw, canonical),
                ));
            }
            table.insert(raw.clone(), canonical.clone());
        }

        Ok(IdentifierResolver { aliases: table })
    }

    /// Map a raw name to its canonical form (identity if unmapped)
    pub fn resolve<'a>(&'a self, raw_name: &'a str) -> &'a str {
        self.aliases
            .get(raw_name)
            .map(String::as_str)
            .unwrap_or(raw_name)
    }

    pub fn is_aliased(&self, raw_name: &str) -> bool {
        self.aliases.contains_key(raw_name)
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}
