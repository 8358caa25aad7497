//! Core domain types for Lorebook harvests.

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for harvest run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Stage / FrontierEntry
// ---------------------------------------------------------------------------

/// The four page kinds a champion is harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    List,
    Detail,
    Bio,
    Story,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::List => "list",
            Stage::Detail => "detail",
            Stage::Bio => "bio",
            Stage::Story => "story",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending fetch: which page, for which language, expected to be which kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub lang: String,
    pub url: Url,
    pub stage: Stage,
}

impl FrontierEntry {
    pub fn new(lang: impl Into<String>, url: Url, stage: Stage) -> Self {
        Self {
            lang: lang.into(),
            url,
            stage,
        }
    }
}

// ---------------------------------------------------------------------------
// ChampionRecord
// ---------------------------------------------------------------------------

/// One fully harvested champion in one language.
///
/// Identified by `(champion, lang)`; never updated once persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChampionRecord {
    /// Stable slug taken from the champion's list-page link.
    pub champion: String,
    /// Display name.
    pub name: String,
    /// Language code, e.g. `en_US`.
    pub lang: String,
    pub race: String,
    pub title: String,
    pub role: String,
    pub region: String,
    pub quote: String,
    pub short_bio: String,
    /// Long biography as an HTML fragment.
    pub bio: String,
    /// Story as an HTML fragment; empty when the champion has none.
    pub story: String,
    /// Display names of related champions, in page order.
    pub related_champions: Vec<String>,
}

impl ChampionRecord {
    /// Related champions in the comma-joined storage encoding.
    pub fn related_joined(&self) -> String {
        self.related_champions.join(",")
    }

    /// Split the comma-joined storage encoding, dropping empty entries.
    pub fn split_related(joined: &str) -> Vec<String> {
        joined
            .split(',')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PartialRecord
// ---------------------------------------------------------------------------

/// Fields extracted from a champion's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub name: String,
    pub title: String,
    pub role: String,
    pub race: String,
    pub region: String,
    pub quote: String,
    pub short_bio: String,
    pub related_champions: Vec<String>,
}

/// A champion record under construction.
///
/// Each stage fills its own named fields; nothing is merged by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRecord {
    pub champion: String,
    pub lang: String,
    pub detail: Option<DetailFields>,
    pub bio: Option<String>,
    pub story: Option<String>,
}

impl PartialRecord {
    /// Start a record with only its routing context.
    pub fn new(champion: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            champion: champion.into(),
            lang: lang.into(),
            detail: None,
            bio: None,
            story: None,
        }
    }

    pub fn with_detail(mut self, detail: DetailFields) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = Some(bio.into());
        self
    }

    pub fn with_story(mut self, story: impl Into<String>) -> Self {
        self.story = Some(story.into());
        self
    }

    /// Display name if the detail stage has run.
    pub fn name(&self) -> Option<&str> {
        self.detail.as_ref().map(|d| d.name.as_str())
    }

    /// Close the record. Fields no stage produced become empty strings.
    pub fn finish(self) -> ChampionRecord {
        let detail = self.detail.unwrap_or_default();
        ChampionRecord {
            champion: self.champion,
            name: detail.name,
            lang: self.lang,
            race: detail.race,
            title: detail.title,
            role: detail.role,
            region: detail.region,
            quote: detail.quote,
            short_bio: detail.short_bio,
            bio: self.bio.unwrap_or_default(),
            story: self.story.unwrap_or_default(),
            related_champions: detail.related_champions,
        }
    }
}
