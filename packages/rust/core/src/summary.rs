//! Run summary: `meta.json` plus one lore export per language.
//!
//! The publication builder consumes these files. Each export groups a
//! language's champions by region (regions and champions sorted by name).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use lorebook_shared::{ChampionRecord, LorebookError, Result};
use lorebook_storage::Storage;

/// File name of the run metadata document.
pub const META_FILE: &str = "meta.json";

/// Subdirectory holding per-language exports.
pub const EXPORT_DIR: &str = "exports";

/// Run metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Records across all languages.
    pub tot_champ_count: usize,
    /// Largest per-language record count.
    pub champ_count: usize,
    /// Languages present, sorted.
    pub langs: Vec<String>,
    /// True when every language has the same count.
    pub allchamps: bool,
    /// Export artifact names, in `langs` order.
    pub books: Vec<String>,
    pub per_lang: BTreeMap<String, usize>,
}

impl RunMeta {
    /// Build the metadata from per-language counts.
    pub fn from_counts(counts: &BTreeMap<String, usize>) -> Self {
        let champ_count = counts.values().copied().max().unwrap_or(0);
        Self {
            tot_champ_count: counts.values().sum(),
            champ_count,
            langs: counts.keys().cloned().collect(),
            allchamps: counts.values().all(|&count| count == champ_count),
            books: counts
                .iter()
                .map(|(lang, &count)| export_file_name(lang, count))
                .collect(),
            per_lang: counts.clone(),
        }
    }
}

/// `lore_<lang>_<count>.json`
pub fn export_file_name(lang: &str, count: usize) -> String {
    format!("lore_{lang}_{count}.json")
}

/// One region's champions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSection {
    pub region: String,
    pub champions: Vec<ChampionRecord>,
}

/// A language's export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoreExport {
    pub lang: String,
    pub champion_count: usize,
    pub regions: Vec<RegionSection>,
}

impl LoreExport {
    /// Group records by region; regions and champions within them sorted by name.
    pub fn from_records(lang: &str, records: Vec<ChampionRecord>) -> Self {
        let champion_count = records.len();
        let mut by_region: BTreeMap<String, Vec<ChampionRecord>> = BTreeMap::new();
        for record in records {
            by_region.entry(record.region.clone()).or_default().push(record);
        }

        let regions = by_region
            .into_iter()
            .map(|(region, mut champions)| {
                champions.sort_by(|a, b| a.name.cmp(&b.name));
                RegionSection { region, champions }
            })
            .collect();

        Self {
            lang: lang.to_string(),
            champion_count,
            regions,
        }
    }
}

/// Files written by [`write_summary`].
#[derive(Debug, Clone)]
pub struct SummaryOutput {
    pub meta: RunMeta,
    pub meta_path: PathBuf,
    pub exports: Vec<PathBuf>,
}

/// Write `meta.json` and every language export under `out_dir`.
#[instrument(skip(storage), fields(out_dir = %out_dir.display()))]
pub async fn write_summary(storage: &Storage, out_dir: &Path) -> Result<SummaryOutput> {
    let counts = storage.count_by_language().await?;
    let meta = RunMeta::from_counts(&counts);

    let export_dir = out_dir.join(EXPORT_DIR);
    std::fs::create_dir_all(&export_dir).map_err(|e| LorebookError::io(&export_dir, e))?;

    let mut exports = Vec::with_capacity(meta.books.len());
    for (lang, book) in meta.langs.iter().zip(&meta.books) {
        let records = storage.list_champions(Some(lang)).await?;
        let export = LoreExport::from_records(lang, records);
        let path = export_dir.join(book);
        write_json(&path, &export)?;
        info!(lang, champions = export.champion_count, path = %path.display(), "export written");
        exports.push(path);
    }

    let meta_path = out_dir.join(META_FILE);
    write_json(&meta_path, &meta)?;
    info!(
        langs = meta.langs.len(),
        total = meta.tot_champ_count,
        allchamps = meta.allchamps,
        "summary written"
    );

    Ok(SummaryOutput {
        meta,
        meta_path,
        exports,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| LorebookError::parse(format!("failed to encode {}: {e}", path.display())))?;
    std::fs::write(path, json).map_err(|e| LorebookError::io(path, e))
}
