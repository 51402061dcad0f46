use std::{cmp::Reverse, fmt, str::FromStr};

use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A star rating between 1 and 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(star: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&star).then_some(Self(star))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Every valid rating, lowest first.
    pub fn all() -> impl Iterator<Item = Rating> {
        (Self::MIN..=Self::MAX).map(Self)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Rating {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Ok(star) = s.trim().parse::<u8>() else {
            return Err("rating is not a number");
        };
        Self::new(star).ok_or("rating must be between 1 and 5")
    }
}

// stored as "1".."5" on disk
impl Serialize for Rating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts `"3"` or `3`. Anything else is dropped to "unrated" instead of
/// rejecting the whole catalogue.
fn lenient_rating<'de, D>(deserializer: D) -> Result<Option<Rating>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let rating = match &raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.parse().ok(),
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u8::try_from(n).ok()).and_then(Rating::new),
        Some(_) => None,
    };
    if rating.is_none() {
        tracing::warn!("ignoring invalid rating value {}", raw.unwrap_or_default());
    }
    Ok(rating)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    #[serde(default)]
    pub location: String,
    #[serde(
        default,
        deserialize_with = "lenient_rating",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating: Option<Rating>,
    /// Keys we don't know about, kept so a save doesn't drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Restaurant {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }
}

/// Every restaurant keyed by its name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalogue(IndexMap<String, Restaurant>);

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, name: &str) -> Option<&Restaurant> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Replaces any entry with the same name. The old entry's position is kept
    /// but its rating is not.
    pub fn insert(&mut self, name: impl Into<String>, restaurant: Restaurant) {
        self.0.insert(name.into(), restaurant);
    }

    pub fn remove(&mut self, name: &str) -> Option<Restaurant> {
        self.0.shift_remove(name)
    }

    /// Returns false when no restaurant has this name.
    pub fn set_location(&mut self, name: &str, location: impl Into<String>) -> bool {
        match self.0.get_mut(name) {
            Some(restaurant) => {
                restaurant.location = location.into();
                true
            }
            None => false,
        }
    }

    /// Returns false when no restaurant has this name.
    pub fn rate(&mut self, name: &str, rating: Rating) -> bool {
        match self.0.get_mut(name) {
            Some(restaurant) => {
                restaurant.rating = Some(rating);
                true
            }
            None => false,
        }
    }

    /// Rated restaurants, best first. Equal ratings keep catalogue order.
    pub fn recommended(&self) -> Vec<(&str, &Restaurant, Rating)> {
        let mut rated = self
            .0
            .iter()
            .filter_map(|(name, rest)| rest.rating.map(|r| (name.as_str(), rest, r)))
            .collect::<Vec<_>>();
        rated.sort_by_key(|(_, _, rating)| Reverse(*rating));
        rated
    }

    /// Names fuzzy-matching `pattern`, best match first.
    pub fn search(&self, pattern: &str) -> Vec<&str> {
        let matcher = SkimMatcherV2::default();
        let mut hits = self
            .names()
            .filter_map(|name| matcher.fuzzy_match(name, pattern).map(|score| (score, name)))
            .collect::<Vec<_>>();
        hits.sort_by_key(|(score, _)| Reverse(*score));
        hits.into_iter().map(|(_, name)| name).collect()
    }
}

impl FromIterator<(String, Restaurant)> for Catalogue {
    fn from_iter<T: IntoIterator<Item = (String, Restaurant)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
