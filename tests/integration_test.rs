//! End-to-end simulation tests against in-memory price tables.
//!
//! Tests cover:
//! - Monthly savings scenario with dividends (golden values)
//! - Determinism of repeated runs
//! - Flat markets, contribution accounting and cash interest
//! - Fatal errors: insufficient cash, missing quotes, degenerate ranges
//! - Value conservation of the rebalance pass (property test)

mod common;

use approx::assert_relative_eq;
use common::*;
use psym::domain::directive::AllocationTarget;
use psym::domain::error::{PsymError, SimulationError};
use psym::domain::interpreter::{JournalKind, rebalance};
use psym::domain::portfolio::Portfolio;
use psym::domain::rule_parser::parse;
use psym::domain::simulation::{SimulationResult, simulate};
use psym::ports::price_port::PriceProvider;

fn run_savings() -> SimulationResult {
    let directives = parse(SAVINGS_RULES).unwrap();
    simulate(
        date(2000, 1, 1),
        date(2000, 12, 31),
        Portfolio::empty(),
        &directives,
        &savings_table(),
    )
    .unwrap()
}

mod savings_scenario {
    use super::*;

    #[test]
    fn final_value_and_return() {
        let result = run_savings();
        let last = result.final_snapshot().unwrap();

        assert_eq!(last.date, date(2000, 12, 31));
        assert_relative_eq!(last.contributed, 1200.0, epsilon = 1e-9);
        assert_relative_eq!(last.total, 1206.0, epsilon = 1e-6);
        assert_relative_eq!(result.annualized_return, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn deposits_land_on_first_business_days() {
        let result = run_savings();
        let deposit_dates: Vec<_> = result
            .journal
            .iter()
            .filter(|e| e.kind == JournalKind::Deposit)
            .map(|e| e.date)
            .collect();
        assert_eq!(deposit_dates.len(), 12);
        assert_eq!(deposit_dates[0], date(2000, 1, 3));
        assert_eq!(deposit_dates[3], date(2000, 4, 3));
        assert_eq!(deposit_dates[6], date(2000, 7, 3));
        assert_eq!(deposit_dates[11], date(2000, 12, 1));
    }

    #[test]
    fn dividend_lands_as_cash_then_reinvests() {
        let result = run_savings();
        let dividends: Vec<_> = result
            .journal
            .iter()
            .filter(|e| e.kind == JournalKind::Dividend)
            .collect();
        assert_eq!(dividends.len(), 1);
        assert_eq!(dividends[0].date, date(2000, 7, 1));
        assert_relative_eq!(dividends[0].shares, 12.0, epsilon = 1e-9);
        assert_relative_eq!(dividends[0].amount, 6.0, epsilon = 1e-9);

        let on = |d| result.snapshots.iter().find(|s| s.date == d).unwrap();
        assert_relative_eq!(on(date(2000, 7, 1)).cash, 6.0, epsilon = 1e-9);
        assert!(on(date(2000, 7, 2)).cash.abs() < 1e-6);
    }

    #[test]
    fn breakdown_is_all_vti() {
        let result = run_savings();
        let rows = result.breakdown();
        assert_eq!(rows[0].ticker, "VTI");
        assert_relative_eq!(rows[0].shares, 24.12, epsilon = 1e-6);
        assert_relative_eq!(rows[0].pct, 100.0, epsilon = 1e-6);
        assert_eq!(rows.last().unwrap().ticker, "CASH");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let a = run_savings();
        let b = run_savings();
        assert_eq!(a.snapshots, b.snapshots);
        assert_eq!(a.journal, b.journal);
        assert_eq!(a.annualized_return.to_bits(), b.annualized_return.to_bits());
    }
}

mod accounting {
    use super::*;

    #[test]
    fn flat_market_has_zero_return() {
        let directives = parse("balance VTI: 60%, BND: 30%, CASH: 10%").unwrap();
        let table = flat_table(&[("VTI", 200.0), ("BND", 80.0)], date(2010, 1, 1), date(2014, 12, 31));
        let result = simulate(
            date(2010, 1, 1),
            date(2014, 12, 31),
            Portfolio::new(10_000.0),
            &directives,
            &table,
        )
        .unwrap();
        assert_relative_eq!(result.annualized_return, 0.0, epsilon = 1e-9);
        let last = result.final_snapshot().unwrap();
        assert_relative_eq!(last.cash, 1_000.0, epsilon = 1e-6);
        assert_relative_eq!(result.portfolio.shares("VTI"), 30.0, epsilon = 1e-9);
        assert_relative_eq!(result.portfolio.shares("BND"), 37.5, epsilon = 1e-9);
    }

    #[test]
    fn monthly_deposits_accumulate_exactly() {
        let directives = parse("2000-01-01 [BMS] deposit $100").unwrap();
        let table = flat_table(&[("VTI", 10.0)], date(2000, 1, 1), date(2000, 12, 31));
        let result = simulate(
            date(2000, 1, 1),
            date(2000, 6, 30),
            Portfolio::empty(),
            &directives,
            &table,
        )
        .unwrap();

        let mut months = 0;
        for pair in result.snapshots.windows(2) {
            let step = pair[1].contributed - pair[0].contributed;
            if step != 0.0 {
                months += 1;
                assert_eq!(step, 100.0);
            }
        }
        // January's deposit lands on the 3rd, after the first snapshot.
        assert_eq!(months, 6);
        assert_eq!(result.final_snapshot().unwrap().contributed, 600.0);
    }

    #[test]
    fn counted_deposits_split_the_total() {
        let directives = parse("2000-01-01 [4xMS] deposit $1k").unwrap();
        let table = flat_table(&[("VTI", 10.0)], date(2000, 1, 1), date(2000, 12, 31));
        let result = simulate(
            date(2000, 1, 1),
            date(2000, 12, 31),
            Portfolio::empty(),
            &directives,
            &table,
        )
        .unwrap();
        let deposits = result
            .journal
            .iter()
            .filter(|e| e.kind == JournalKind::Deposit)
            .count();
        assert_eq!(deposits, 4);
        assert_relative_eq!(result.portfolio.contributed(), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn flat_return_when_run_opens_on_a_deposit_day() {
        let directives = parse("2000-01-01 [BMS] deposit $100\nbalance VTI: 100%\n").unwrap();
        let table = flat_table(&[("VTI", 50.0)], date(1999, 12, 31), date(2000, 12, 31));
        // 2000-01-03 is the first business day, so January's deposit lands
        // before the first snapshot.
        let result = simulate(
            date(2000, 1, 3),
            date(2000, 12, 31),
            Portfolio::empty(),
            &directives,
            &table,
        )
        .unwrap();
        assert_eq!(result.initial_value, 0.0);
        assert_relative_eq!(result.snapshots[0].total, 100.0, epsilon = 1e-9);
        assert_relative_eq!(result.annualized_return, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn counted_deposits_anchored_before_start_keep_their_dates() {
        let directives = parse("2020-01-01 [12xMS] deposit $12k").unwrap();
        let table = flat_table(&[("VTI", 10.0)], date(2020, 1, 1), date(2021, 12, 31));
        let result = simulate(
            date(2020, 6, 1),
            date(2021, 12, 31),
            Portfolio::empty(),
            &directives,
            &table,
        )
        .unwrap();
        let deposits: Vec<_> = result
            .journal
            .iter()
            .filter(|e| e.kind == JournalKind::Deposit)
            .collect();
        assert_eq!(deposits.len(), 7);
        assert_eq!(deposits[0].date, date(2020, 6, 1));
        assert_eq!(deposits[6].date, date(2020, 12, 1));
        assert_relative_eq!(result.portfolio.contributed(), 7000.0, epsilon = 1e-9);
    }

    #[test]
    fn cash_interest_is_not_contribution() {
        let directives = parse("cash-interest 12%").unwrap();
        let table = flat_table(&[("VTI", 10.0)], date(2000, 1, 1), date(2000, 12, 31));
        let result = simulate(
            date(2000, 1, 1),
            date(2000, 12, 31),
            Portfolio::new(1000.0),
            &directives,
            &table,
        )
        .unwrap();
        let interest = result
            .journal
            .iter()
            .filter(|e| e.kind == JournalKind::Interest)
            .count();
        assert_eq!(interest, 12);
        assert_relative_eq!(result.portfolio.cash(), 1000.0 * 1.01_f64.powi(12), epsilon = 1e-6);
        assert_eq!(result.portfolio.contributed(), 0.0);
    }

    #[test]
    fn allocation_switch_sells_old_holdings() {
        let source = "balance VTI: 100%\n2005-01-03 balance BND: 100%\n";
        let directives = parse(source).unwrap();
        let table = flat_table(&[("VTI", 100.0), ("BND", 50.0)], date(2005, 1, 1), date(2005, 12, 31));
        let result = simulate(
            date(2005, 1, 1),
            date(2005, 12, 31),
            Portfolio::new(1000.0),
            &directives,
            &table,
        )
        .unwrap();
        assert_eq!(result.portfolio.shares("VTI"), 0.0);
        assert_relative_eq!(result.portfolio.shares("BND"), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn rising_prices_give_positive_return() {
        let directives = parse("balance VTI: 100%").unwrap();
        let start = date(2001, 1, 1);
        let table = daily_table("VTI", start, date(2002, 1, 1), |d| {
            100.0 * (1.0 + (d - start).num_days() as f64 / 365.0)
        });
        let result = simulate(start, date(2002, 1, 1), Portfolio::new(100.0), &directives, &table)
            .unwrap();
        assert_relative_eq!(result.annualized_return, 100.0, epsilon = 1e-6);
    }
}

mod failures {
    use super::*;

    #[test]
    fn withdraw_exceeding_cash_names_date_and_line() {
        let directives = parse("dividends\n2000-03-01 withdraw $5k\n").unwrap();
        let table = flat_table(&[("VTI", 10.0)], date(2000, 1, 1), date(2000, 12, 31));
        let err = simulate(
            date(2000, 1, 1),
            date(2000, 12, 31),
            Portfolio::new(100.0),
            &directives,
            &table,
        )
        .unwrap_err();
        match err {
            PsymError::Simulation(SimulationError::InsufficientCash {
                date: d,
                line,
                requested,
                available,
            }) => {
                assert_eq!(d, date(2000, 3, 1));
                assert_eq!(line, 2);
                assert_eq!(requested, 5000.0);
                assert_eq!(available, 100.0);
            }
            other => panic!("expected InsufficientCash, got {:?}", other),
        }
    }

    #[test]
    fn missing_quote_is_fatal() {
        let directives = parse("balance VTI: 50%, NEW: 50%").unwrap();
        let mut table = flat_table(&[("VTI", 10.0)], date(2000, 1, 1), date(2000, 12, 31));
        add_daily(&mut table, "NEW", date(2000, 6, 1), date(2000, 12, 31), |_| 5.0);
        let err = simulate(
            date(2000, 1, 1),
            date(2000, 12, 31),
            Portfolio::new(100.0),
            &directives,
            &table,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PsymError::Simulation(SimulationError::PriceUnavailable { ref ticker, .. }) if ticker == "NEW"
        ));
    }

    #[test]
    fn nothing_invested_is_degenerate() {
        let directives = parse("dividends").unwrap();
        let table = flat_table(&[("VTI", 10.0)], date(2000, 1, 1), date(2000, 12, 31));
        let err = simulate(
            date(2000, 1, 1),
            date(2000, 12, 31),
            Portfolio::empty(),
            &directives,
            &table,
        )
        .unwrap_err();
        assert!(matches!(err, PsymError::DegenerateRange(_)));
    }
}

mod conservation {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    const TICKERS: [&str; 3] = ["AAA", "BBB", "CCC"];

    proptest! {
        #[test]
        fn rebalance_conserves_value(
            cash in 0.0f64..1e6,
            shares in prop::collection::vec(0.0f64..1000.0, 3),
            prices in prop::collection::vec(0.5f64..500.0, 3),
            raw in prop::collection::vec(0.0f64..1.0, 4),
        ) {
            let sum: f64 = raw.iter().sum();
            prop_assume!(sum > 1e-3);

            let day = date(2020, 1, 2);
            let mut table = psym::adapters::price_table::PriceTable::new();
            let mut portfolio = Portfolio::new(cash);
            let mut weights = BTreeMap::new();
            for i in 0..3 {
                table.insert_close(TICKERS[i], day, prices[i]);
                portfolio = portfolio.with_holding(TICKERS[i], shares[i]);
                weights.insert(TICKERS[i].to_string(), raw[i] / sum);
            }
            weights.insert("CASH".to_string(), raw[3] / sum);
            let target = AllocationTarget::new(weights);

            let before = portfolio.value(day, &table).unwrap();
            rebalance(&target, day, 1, &mut portfolio, &table).unwrap();
            let after = portfolio.value(day, &table).unwrap();

            let tolerance = 1e-6 * before.max(1.0);
            prop_assert!((before - after).abs() <= tolerance);
            prop_assert!(portfolio.cash() >= 0.0);
            for ticker in TICKERS {
                let value = portfolio.shares(ticker) * table.price(ticker, day).unwrap();
                prop_assert!((value - target.weight(ticker) * before).abs() <= tolerance);
            }
        }
    }
}
