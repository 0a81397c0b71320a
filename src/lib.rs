// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! # Reserve Ledger
//!
//! A small bank service that holds per-user balances as an append-only
//! ledger and exposes a two-phase reservation protocol, so that an external
//! matching engine can move funds among several users atomically once every
//! counterparty is known to have sufficient credit.
//!
//! A reservation withholds a signed amount against a user's balance for 60
//! seconds. A later commit promotes a whole set of reservations into durable
//! ledger entries, all-or-nothing; a cancel discards them; an expired
//! reservation simply stops counting.
//!
//! ## Core Components
//!
//! - [`store`]: transactional access to the MySQL tables, scoped
//!   transactions, and the row-lock discipline
//! - [`balance`]: the append-only ledger and the cached balance it feeds
//! - [`reserve`]: reservation create / commit / cancel under concurrency
//! - [`user`]: registration and `bank_id` resolution
//! - [`server`]: the JSON-over-HTTP adaptor with its stable error strings
//!
//! ## Example
//!
//! ```no_run
//! use reserve_ledger_rs::{balance, reserve, user};
//!
//! # async fn demo(pool: &sqlx::MySqlPool) -> Result<(), reserve_ledger_rs::BankError> {
//! user::register(pool, "alice").await?;
//! let alice = user::find_by_bank_id(pool, "alice").await?;
//!
//! balance::add_credit(pool, alice, 1_000).await?;
//!
//! // Withhold 400, then make it durable.
//! let rid = reserve::create(pool, alice, -400, "app:demo, price:-400".into()).await?;
//! reserve::commit(pool, vec![rid]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! There is no shared in-memory state: one task per request, one
//! transaction per task, and every ordering guarantee comes from `FOR
//! UPDATE` row locks taken in ascending `user_id` order. Balances can never
//! go negative under any interleaving of reservations, commits, cancels and
//! top-ups.

pub mod balance;
mod base;
pub mod error;
pub mod reserve;
pub mod server;
pub mod store;
pub mod user;

pub use base::{ReserveId, UserId};
pub use error::BankError;
