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

//! Reservation engine.
//!
//! A reservation is a tentative, time-bounded claim on a user's future
//! balance change. It is admitted by [`create`] (with a solvency check for
//! withdrawals), and leaves the table through exactly one of [`commit`]
//! (promoted into ledger entries) or [`cancel`] (discarded). Expiry is
//! implicit: nothing reaps rows, every semantic query filters on
//! `expire_at`.
//!
//! # Invariants
//!
//! - A negative reservation is only admitted while
//!   `ledger_balance + pending_withdrawals + amount >= 0` holds under the
//!   user's row lock; positive reservations never count against it.
//! - Commit and cancel are all-or-nothing over their whole id set.
//! - At most one terminal operation succeeds per reservation.

use crate::balance;
use crate::base::{ReserveId, UserId};
use crate::error::BankError;
use crate::store;
use chrono::TimeDelta;
use sqlx::{MySql, MySqlPool, QueryBuilder, Transaction};

/// A reservation row as materialised under lock during commit/cancel.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Reservation {
    pub id: ReserveId,
    pub user_id: UserId,
    pub amount: i64,
    pub note: String,
}

/// Admits a reservation for `amount` against the user's balance.
///
/// For a withdrawal (`amount < 0`) the solvency check runs under the user
/// row lock: the ledger sum plus all pending withdrawals must still cover
/// the new amount. Only reservations that will outlive this reservation's
/// own expiry horizon count as pending; ones about to lapse release their
/// funds early.
pub async fn create(
    pool: &MySqlPool,
    user_id: UserId,
    amount: i64,
    note: String,
) -> Result<ReserveId, BankError> {
    if amount == 0 {
        return Err(BankError::BadArgs("price is 0"));
    }

    store::in_transaction(pool, move |tx| {
        Box::pin(async move {
            store::lock_user(tx, user_id).await?;

            let now = store::now_tokyo();
            let expire = now + TimeDelta::seconds(store::RESERVE_TTL_SECS);
            let is_minus = amount < 0;

            if is_minus {
                let fixed: i64 = sqlx::query_scalar(
                    "SELECT CAST(IFNULL(SUM(amount), 0) AS SIGNED) FROM credit WHERE user_id = ?",
                )
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await
                .map_err(BankError::store("calc credit failed"))?;

                let reserved: i64 = sqlx::query_scalar(
                    "SELECT CAST(IFNULL(SUM(amount), 0) AS SIGNED) FROM reserve \
                     WHERE user_id = ? AND is_minus = 1 AND expire_at >= ?",
                )
                .bind(user_id)
                .bind(expire)
                .fetch_one(&mut **tx)
                .await
                .map_err(BankError::store("calc reserve failed"))?;

                if fixed + reserved + amount < 0 {
                    return Err(BankError::CreditInsufficient);
                }
            }

            let result = sqlx::query(
                "INSERT INTO reserve (user_id, amount, note, is_minus, created_at, expire_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(amount)
            .bind(&note)
            .bind(is_minus)
            .bind(now)
            .bind(expire)
            .execute(&mut **tx)
            .await
            .map_err(BankError::store("insert reserve failed"))?;

            Ok(ReserveId(result.last_insert_id() as i64))
        })
    })
    .await
}

/// Promotes a whole set of reservations into ledger entries, atomically.
///
/// Two prechecks guard the set: a liveness count (any expired or missing
/// member fails the set with [`BankError::ReserveExpired`]) and a re-count
/// after the `FOR UPDATE` read (a member removed in between means another
/// terminal operation won; [`BankError::ReserveAlreadyCommitted`]). Solvency
/// is not re-checked here: it was established at admission and defended by
/// the reservation rows across their lifetime.
pub async fn commit(pool: &MySqlPool, reserve_ids: Vec<ReserveId>) -> Result<(), BankError> {
    if reserve_ids.is_empty() {
        return Err(BankError::BadArgs("reserve_ids is required"));
    }

    store::in_transaction(pool, move |tx| {
        Box::pin(async move {
            // Count before locking to avoid taking row locks that can't
            // lead to a successful commit.
            let live = count_reserves(tx, &reserve_ids, true).await?;
            if (live as usize) < reserve_ids.len() {
                return Err(BankError::ReserveExpired);
            }

            let reservations = fetch_for_update(tx, &reserve_ids).await?;
            if reservations.len() < reserve_ids.len() {
                return Err(BankError::ReserveAlreadyCommitted);
            }

            let users: Vec<UserId> = reservations.iter().map(|r| r.user_id).collect();
            store::lock_users(tx, &users).await?;

            for reservation in &reservations {
                balance::apply_delta(tx, reservation.user_id, reservation.amount, &reservation.note)
                    .await?;
            }

            delete_reserves(tx, &reserve_ids).await
        })
    })
    .await
}

/// Discards a whole set of reservations, atomically, with no ledger effect.
///
/// Unlike commit, the precheck ignores `expire_at`: an expired reservation
/// is already dead and cancelling it merely reaps the row. A missing id
/// fails the set with [`BankError::ReserveAlreadyCommitted`], whether it was
/// committed, cancelled, or never existed.
pub async fn cancel(pool: &MySqlPool, reserve_ids: Vec<ReserveId>) -> Result<(), BankError> {
    if reserve_ids.is_empty() {
        return Err(BankError::BadArgs("reserve_ids is required"));
    }

    store::in_transaction(pool, move |tx| {
        Box::pin(async move {
            let found = count_reserves(tx, &reserve_ids, false).await?;
            if (found as usize) < reserve_ids.len() {
                return Err(BankError::ReserveAlreadyCommitted);
            }

            let reservations = fetch_for_update(tx, &reserve_ids).await?;
            if reservations.len() < reserve_ids.len() {
                return Err(BankError::ReserveAlreadyCommitted);
            }

            // Users are still locked in ascending order so cancel can't
            // interleave with a concurrent create or commit on them.
            let users: Vec<UserId> = reservations.iter().map(|r| r.user_id).collect();
            store::lock_users(tx, &users).await?;

            delete_reserves(tx, &reserve_ids).await
        })
    })
    .await
}

/// Counts how many of `reserve_ids` exist, optionally only unexpired ones.
async fn count_reserves(
    tx: &mut Transaction<'static, MySql>,
    reserve_ids: &[ReserveId],
    live_only: bool,
) -> Result<i64, BankError> {
    let mut query = QueryBuilder::<MySql>::new("SELECT COUNT(id) FROM reserve WHERE id IN (");
    let mut ids = query.separated(", ");
    for id in reserve_ids {
        ids.push_bind(*id);
    }
    query.push(")");
    if live_only {
        query.push(" AND expire_at >= NOW()");
    }

    query
        .build_query_scalar()
        .fetch_one(&mut **tx)
        .await
        .map_err(BankError::store("count reserve failed"))
}

/// Materialises the reservation rows under `FOR UPDATE`.
async fn fetch_for_update(
    tx: &mut Transaction<'static, MySql>,
    reserve_ids: &[ReserveId],
) -> Result<Vec<Reservation>, BankError> {
    let mut query =
        QueryBuilder::<MySql>::new("SELECT id, user_id, amount, note FROM reserve WHERE id IN (");
    let mut ids = query.separated(", ");
    for id in reserve_ids {
        ids.push_bind(*id);
    }
    query.push(") FOR UPDATE");

    query
        .build_query_as::<Reservation>()
        .fetch_all(&mut **tx)
        .await
        .map_err(BankError::store("select reserves failed"))
}

async fn delete_reserves(
    tx: &mut Transaction<'static, MySql>,
    reserve_ids: &[ReserveId],
) -> Result<(), BankError> {
    let mut query = QueryBuilder::<MySql>::new("DELETE FROM reserve WHERE id IN (");
    let mut ids = query.separated(", ");
    for id in reserve_ids {
        ids.push_bind(*id);
    }
    query.push(")");

    query
        .build()
        .execute(&mut **tx)
        .await
        .map_err(BankError::store("delete reserve failed"))?;
    Ok(())
}
