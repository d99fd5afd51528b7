//! psym: portfolio rule interpreter and simulator.
//!
//! A rule file schedules deposits, withdrawals, allocation targets and
//! dividend handling; the simulator replays it day by day over historical
//! quotes and reports the annualized return.
//!
//! Pure logic lives in [`domain`], I/O seams are traits in [`ports`], and
//! concrete implementations are in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
