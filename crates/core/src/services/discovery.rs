use chrono::NaiveDate;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::cache::historical::HistoricalSeriesCache;
use crate::cache::store::JsonStore;
use crate::models::asset::{AssetType, Portfolio};

/// One entry of the prioritized historical-refresh worklist.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTask {
    pub symbol: String,
    /// `None` when the symbol has never been fetched.
    pub last_date: Option<NaiveDate>,
    pub missing_days: Option<i64>,
    pub data_points: usize,
}

/// Derives the working set of symbols to keep fresh by scanning persisted
/// portfolio holdings and uploaded trade files.
///
/// The universe is recomputed fresh on every call — portfolio and file state
/// can change between calls, and discovery must always reflect current
/// holdings. Every per-file and per-row failure is logged and skipped; a
/// single malformed input never fails the whole scan.
pub struct AssetDiscovery {
    /// Upload directory whose CSVs carry a direct `Symbol` column.
    symbol_column_dir: PathBuf,
    /// Upload directory whose CSVs embed the ticker in a free-text
    /// `Description` field.
    description_dir: PathBuf,
    /// Extracts the leading ticker from descriptions shaped like
    /// "AAPL - Apple Inc: Bought 10 shares".
    ticker_re: Regex,
}

impl AssetDiscovery {
    pub fn new(symbol_column_dir: impl Into<PathBuf>, description_dir: impl Into<PathBuf>) -> Self {
        Self {
            symbol_column_dir: symbol_column_dir.into(),
            description_dir: description_dir.into(),
            ticker_re: Regex::new(r"^([A-Z][A-Z0-9.]{0,9})\s+-\s+")
                .unwrap_or_else(|e| unreachable!("invalid ticker regex: {e}")),
        }
    }

    /// Symbols of every holding with positive quantity, uppercased.
    pub fn unique_symbols_from_portfolios(
        &self,
        portfolios: &JsonStore<Portfolio>,
    ) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        for (_, entry) in portfolios.iter() {
            for holding in &entry.value.holdings {
                if holding.quantity > 0.0 && !holding.symbol.trim().is_empty() {
                    symbols.insert(holding.symbol.trim().to_uppercase());
                }
            }
        }
        symbols
    }

    /// Best-known asset type per symbol, taken from portfolio holdings.
    /// Symbols seen only in uploaded files default to `Stock`.
    pub fn symbol_asset_types(
        &self,
        portfolios: &JsonStore<Portfolio>,
    ) -> BTreeMap<String, AssetType> {
        let mut types = BTreeMap::new();
        for (_, entry) in portfolios.iter() {
            for holding in &entry.value.holdings {
                if holding.quantity > 0.0 {
                    types.insert(holding.symbol.to_uppercase(), holding.asset_type);
                }
            }
        }
        types
    }

    /// Symbols parsed out of both upload directories.
    pub fn unique_symbols_from_uploaded_files(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        self.scan_dir(&self.symbol_column_dir, "Symbol", false, &mut symbols);
        self.scan_dir(&self.description_dir, "Description", true, &mut symbols);
        symbols
    }

    /// Union of portfolio and uploaded-file symbols.
    pub fn all_unique_symbols(&self, portfolios: &JsonStore<Portfolio>) -> BTreeSet<String> {
        let mut symbols = self.unique_symbols_from_portfolios(portfolios);
        symbols.extend(self.unique_symbols_from_uploaded_files());
        symbols
    }

    /// Cross-reference the symbol universe against the historical cache and
    /// return only the symbols needing a refresh, most-stale-first
    /// (never-fetched symbols ahead of everything else).
    pub fn symbols_needing_update(
        &self,
        portfolios: &JsonStore<Portfolio>,
        historical: &HistoricalSeriesCache,
    ) -> Vec<RefreshTask> {
        let mut tasks: Vec<RefreshTask> = self
            .all_unique_symbols(portfolios)
            .into_iter()
            .filter_map(|symbol| {
                let freshness = historical.needs_update(&symbol);
                if !freshness.needs_update {
                    return None;
                }
                Some(RefreshTask {
                    data_points: historical.point_count(&symbol),
                    last_date: freshness.last_date,
                    missing_days: freshness.missing_days,
                    symbol,
                })
            })
            .collect();

        tasks.sort_by(|a, b| match (a.missing_days, b.missing_days) {
            (None, None) => a.symbol.cmp(&b.symbol),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.symbol.cmp(&b.symbol)),
        });
        tasks
    }

    /// Scan one directory of CSVs, collecting symbols from `column`. When
    /// `extract` is set the column holds free text and the ticker is pulled
    /// out by regex instead of taken verbatim.
    fn scan_dir(&self, dir: &Path, column: &str, extract: bool, out: &mut BTreeSet<String>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "upload directory not readable, skipping");
                return;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(e) => e.path(),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Err(e) = self.scan_file(&path, column, extract, out) {
                warn!(file = %path.display(), error = %e, "skipping malformed trade file");
            }
        }
    }

    fn scan_file(
        &self,
        path: &Path,
        column: &str,
        extract: bool,
        out: &mut BTreeSet<String>,
    ) -> Result<(), csv::Error> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

        let headers = reader.headers()?;
        let Some(col_idx) = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(column))
        else {
            debug!(file = %path.display(), column, "no matching header column, skipping file");
            return Ok(());
        };

        for record in reader.records() {
            // One bad row never fails the file scan.
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping malformed row");
                    continue;
                }
            };
            let Some(field) = record.get(col_idx) else {
                continue;
            };

            let symbol = if extract {
                match self.ticker_re.captures(field.trim()) {
                    Some(caps) => caps[1].to_string(),
                    None => continue,
                }
            } else {
                field.trim().to_uppercase()
            };

            if !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
            {
                out.insert(symbol);
            }
        }
        Ok(())
    }
}
