// ═══════════════════════════════════════════════════════════════════
// Asset Discovery Tests — portfolio scan, trade-file scan, worklist
// ═══════════════════════════════════════════════════════════════════

use chrono::{TimeZone, Utc};
use std::path::Path;
use tempfile::tempdir;

use market_data_core::cache::historical::HistoricalSeriesCache;
use market_data_core::cache::store::JsonStore;
use market_data_core::clock::Clock;
use market_data_core::models::asset::{AssetType, Holding, Portfolio};
use market_data_core::models::price::PricePoint;
use market_data_core::services::discovery::AssetDiscovery;

/// Clock pinned to Friday 2024-01-05 noon UTC.
fn test_clock() -> Clock {
    Clock::fixed(Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap())
}

fn portfolio_store(dir: &Path, portfolios: Vec<Portfolio>) -> JsonStore<Portfolio> {
    let mut store = JsonStore::open(dir.join("portfolios.json"), test_clock());
    for p in portfolios {
        store.set(p.id.to_string(), p).unwrap();
    }
    store
}

fn discovery(dir: &Path) -> AssetDiscovery {
    AssetDiscovery::new(dir.join("uploads/questrade"), dir.join("uploads/wealthsimple"))
}

fn write_upload(dir: &Path, sub: &str, name: &str, content: &str) {
    let dir = dir.join(sub);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), content).unwrap();
}

fn bar(date: chrono::NaiveDate, close: f64) -> PricePoint {
    PricePoint::flat(date, close)
}

// ═══════════════════════════════════════════════════════════════════
// Portfolio scan
// ═══════════════════════════════════════════════════════════════════

mod portfolio_scan {
    use super::*;

    #[test]
    fn collects_positive_quantity_holdings_uppercased() {
        let dir = tempdir().unwrap();
        let store = portfolio_store(
            dir.path(),
            vec![Portfolio::new(
                "main",
                vec![
                    Holding::new("btc", 0.5, AssetType::Crypto),
                    Holding::new("eth", 0.0, AssetType::Crypto),
                ],
            )],
        );

        let symbols = discovery(dir.path()).unique_symbols_from_portfolios(&store);
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["BTC"]);
    }

    #[test]
    fn negative_quantity_is_excluded() {
        let dir = tempdir().unwrap();
        let store = portfolio_store(
            dir.path(),
            vec![Portfolio::new(
                "short",
                vec![Holding::new("TSLA", -10.0, AssetType::Stock)],
            )],
        );

        assert!(discovery(dir.path())
            .unique_symbols_from_portfolios(&store)
            .is_empty());
    }

    #[test]
    fn union_across_portfolios_dedupes() {
        let dir = tempdir().unwrap();
        let store = portfolio_store(
            dir.path(),
            vec![
                Portfolio::new(
                    "a",
                    vec![
                        Holding::new("AAPL", 1.0, AssetType::Stock),
                        Holding::new("BTC", 0.1, AssetType::Crypto),
                    ],
                ),
                Portfolio::new(
                    "b",
                    vec![
                        Holding::new("aapl", 5.0, AssetType::Stock),
                        Holding::new("SHOP", 2.0, AssetType::Stock),
                    ],
                ),
            ],
        );

        let symbols = discovery(dir.path()).unique_symbols_from_portfolios(&store);
        assert_eq!(
            symbols.into_iter().collect::<Vec<_>>(),
            vec!["AAPL", "BTC", "SHOP"]
        );
    }

    #[test]
    fn asset_types_come_from_holdings() {
        let dir = tempdir().unwrap();
        let store = portfolio_store(
            dir.path(),
            vec![Portfolio::new(
                "main",
                vec![
                    Holding::new("BTC", 0.5, AssetType::Crypto),
                    Holding::new("AAPL", 1.0, AssetType::Stock),
                ],
            )],
        );

        let types = discovery(dir.path()).symbol_asset_types(&store);
        assert_eq!(types.get("BTC"), Some(&AssetType::Crypto));
        assert_eq!(types.get("AAPL"), Some(&AssetType::Stock));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Trade-file scan
// ═══════════════════════════════════════════════════════════════════

mod trade_file_scan {
    use super::*;

    #[test]
    fn reads_direct_symbol_column() {
        let dir = tempdir().unwrap();
        write_upload(
            dir.path(),
            "uploads/questrade",
            "trades.csv",
            "Date,Symbol,Quantity,Price\n\
             2024-01-02,AAPL,10,185.50\n\
             2024-01-03,shop,5,97.20\n\
             2024-01-04,AAPL,2,186.00\n",
        );

        let symbols = discovery(dir.path()).unique_symbols_from_uploaded_files();
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["AAPL", "SHOP"]);
    }

    #[test]
    fn extracts_ticker_from_description_column() {
        let dir = tempdir().unwrap();
        write_upload(
            dir.path(),
            "uploads/wealthsimple",
            "activity.csv",
            "Date,Description,Amount\n\
             2024-01-02,AAPL - Apple Inc: Bought 10 shares,-1855.00\n\
             2024-01-03,VFV.TO - Vanguard S&P 500: Bought 3 units,-350.10\n\
             2024-01-04,Monthly account fee,-10.00\n",
        );

        let symbols = discovery(dir.path()).unique_symbols_from_uploaded_files();
        assert_eq!(
            symbols.into_iter().collect::<Vec<_>>(),
            vec!["AAPL", "VFV.TO"]
        );
    }

    #[test]
    fn both_formats_are_unioned() {
        let dir = tempdir().unwrap();
        write_upload(
            dir.path(),
            "uploads/questrade",
            "trades.csv",
            "Symbol\nMSFT\n",
        );
        write_upload(
            dir.path(),
            "uploads/wealthsimple",
            "activity.csv",
            "Description\nBTC - Bitcoin: Bought 0.1,\n",
        );

        let symbols = discovery(dir.path()).unique_symbols_from_uploaded_files();
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["BTC", "MSFT"]);
    }

    #[test]
    fn missing_directories_yield_empty_set() {
        let dir = tempdir().unwrap();
        assert!(discovery(dir.path())
            .unique_symbols_from_uploaded_files()
            .is_empty());
    }

    #[test]
    fn empty_and_malformed_files_are_skipped() {
        let dir = tempdir().unwrap();
        write_upload(dir.path(), "uploads/questrade", "empty.csv", "");
        write_upload(
            dir.path(),
            "uploads/questrade",
            "no-symbol-column.csv",
            "Date,Amount\n2024-01-02,5\n",
        );
        std::fs::write(
            dir.path().join("uploads/questrade/binary.csv"),
            [0xff, 0xfe, 0x00, 0x01, 0xff],
        )
        .unwrap();
        write_upload(
            dir.path(),
            "uploads/questrade",
            "good.csv",
            "Symbol\nNVDA\n",
        );

        // The bad files never poison the scan of the good one.
        let symbols = discovery(dir.path()).unique_symbols_from_uploaded_files();
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["NVDA"]);
    }

    #[test]
    fn non_csv_files_are_ignored() {
        let dir = tempdir().unwrap();
        write_upload(dir.path(), "uploads/questrade", "notes.txt", "Symbol\nFAKE\n");
        assert!(discovery(dir.path())
            .unique_symbols_from_uploaded_files()
            .is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Universe & worklist
// ═══════════════════════════════════════════════════════════════════

mod worklist {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn all_unique_symbols_unions_both_sources() {
        let dir = tempdir().unwrap();
        let store = portfolio_store(
            dir.path(),
            vec![Portfolio::new(
                "main",
                vec![Holding::new("BTC", 0.5, AssetType::Crypto)],
            )],
        );
        write_upload(dir.path(), "uploads/questrade", "t.csv", "Symbol\nAAPL\n");

        let symbols = discovery(dir.path()).all_unique_symbols(&store);
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["AAPL", "BTC"]);
    }

    #[test]
    fn universe_reflects_current_state_not_a_cached_copy() {
        let dir = tempdir().unwrap();
        let mut store = portfolio_store(dir.path(), vec![]);
        let disco = discovery(dir.path());

        assert!(disco.all_unique_symbols(&store).is_empty());

        store
            .set(
                "p1",
                Portfolio::new("new", vec![Holding::new("ETH", 2.0, AssetType::Crypto)]),
            )
            .unwrap();
        write_upload(dir.path(), "uploads/questrade", "late.csv", "Symbol\nAMD\n");

        let symbols = disco.all_unique_symbols(&store);
        assert_eq!(symbols.into_iter().collect::<Vec<_>>(), vec!["AMD", "ETH"]);
    }

    #[test]
    fn worklist_contains_only_stale_symbols_most_stale_first() {
        let dir = tempdir().unwrap();
        let store = portfolio_store(
            dir.path(),
            vec![Portfolio::new(
                "main",
                vec![
                    Holding::new("FRESH", 1.0, AssetType::Stock),
                    Holding::new("BEHIND", 1.0, AssetType::Stock),
                    Holding::new("WAYBEHIND", 1.0, AssetType::Stock),
                    Holding::new("NEVER", 1.0, AssetType::Stock),
                ],
            )],
        );

        let mut historical =
            HistoricalSeriesCache::open(dir.path().join("historical.json"), test_clock());
        // Today is Friday 2024-01-05.
        historical.set("FRESH", vec![bar(d(2024, 1, 5), 1.0)]).unwrap();
        historical.set("BEHIND", vec![bar(d(2024, 1, 4), 1.0)]).unwrap();
        historical
            .set("WAYBEHIND", vec![bar(d(2023, 12, 22), 1.0)])
            .unwrap();

        let tasks = discovery(dir.path()).symbols_needing_update(&store, &historical);
        let order: Vec<&str> = tasks.iter().map(|t| t.symbol.as_str()).collect();

        assert_eq!(order, vec!["NEVER", "WAYBEHIND", "BEHIND"]);
        assert_eq!(tasks[0].last_date, None);
        assert_eq!(tasks[0].data_points, 0);
        assert_eq!(tasks[1].missing_days, Some(10));
        assert_eq!(tasks[2].missing_days, Some(1));
        assert_eq!(tasks[2].data_points, 1);
    }

    #[test]
    fn empty_universe_yields_empty_worklist() {
        let dir = tempdir().unwrap();
        let store = portfolio_store(dir.path(), vec![]);
        let historical =
            HistoricalSeriesCache::open(dir.path().join("historical.json"), test_clock());

        assert!(discovery(dir.path())
            .symbols_needing_update(&store, &historical)
            .is_empty());
    }
}
