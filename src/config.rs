use std::{collections::HashSet, path::PathBuf};

use anyhow::Context;
use derive_builder::Builder;

pub const DEFAULT_CATALOGUE_PATH: &str = "restaurants.json";

/// Telegram user ids allowed to change the catalogue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminSet(HashSet<u64>);

impl AdminSet {
    /// Parses `"123, 456"`. Entries that aren't plain integers are skipped.
    pub fn parse(raw: &str) -> Self {
        let ids = raw
            .split(',')
            .filter_map(|id| {
                let id = id.trim();
                if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                id.parse().ok()
            })
            .collect();
        Self(ids)
    }

    pub fn contains(&self, user: u64) -> bool {
        self.0.contains(&user)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<u64> for AdminSet {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct Config {
    /// Bot API token
    token: String,
    #[builder(default = "PathBuf::from(DEFAULT_CATALOGUE_PATH)")]
    catalogue_path: PathBuf,
    #[builder(default)]
    admins: AdminSet,
}

impl Config {
    /// Reads `TELEGRAM_BOT_TOKEN`, `ADMIN_IDS` and `RESTAURANT_DATA_FILE`.
    /// Only the token is required.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .context("TELEGRAM_BOT_TOKEN env not found")?;

        let mut builder = ConfigBuilder::default();
        builder
            .token(token)
            .admins(AdminSet::parse(&lookup("ADMIN_IDS").unwrap_or_default()));
        if let Some(path) = lookup("RESTAURANT_DATA_FILE").filter(|p| !p.trim().is_empty()) {
            builder.catalogue_path(path);
        }

        builder
            .build()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn catalogue_path(&self) -> &PathBuf {
        &self.catalogue_path
    }

    pub fn admins(&self) -> &AdminSet {
        &self.admins
    }
}
