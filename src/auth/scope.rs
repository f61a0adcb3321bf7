use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

pub const PLAYLIST_MODIFY_PUBLIC: &str = "playlist-modify-public";
pub const PLAYLIST_MODIFY_PRIVATE: &str = "playlist-modify-private";
pub const PLAYLIST_READ_PRIVATE: &str = "playlist-read-private";

/// Set of OAuth scope names.
///
/// Parsed from and rendered to the space-separated form used on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scopes(BTreeSet<String>);

impl Scopes {
    pub fn none() -> Self {
        Scopes::default()
    }

    pub fn parse(raw: &str) -> Self {
        raw.split_whitespace().collect()
    }

    /// True when every scope in `required` is granted by `self`.
    pub fn covers(&self, required: &Scopes) -> bool {
        required.0.is_subset(&self.0)
    }

    pub fn union(&self, other: &Scopes) -> Scopes {
        Scopes(self.0.union(&other.0).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'a> FromIterator<&'a str> for Scopes {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Scopes(iter.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.iter().collect::<Vec<_>>().join(" ");
        f.write_str(&joined)
    }
}
