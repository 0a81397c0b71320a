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

//! Balance engine.
//!
//! The ledger is the authoritative balance: an append-only sequence of
//! signed `credit` rows whose sum is mirrored into `user.credit` inside the
//! same transaction as every append. This module is the only writer of
//! either.

use crate::base::UserId;
use crate::error::BankError;
use crate::store;
use sqlx::{MySql, MySqlPool, Transaction};

/// Appends a ledger entry and refreshes the user's cached balance.
///
/// The caller must hold a `FOR UPDATE` lock on the user row for the duration
/// of `tx`. Solvency of a negative delta is the caller's responsibility and
/// must have been established under that same lock.
pub async fn apply_delta(
    tx: &mut Transaction<'static, MySql>,
    user_id: UserId,
    amount: i64,
    note: &str,
) -> Result<(), BankError> {
    sqlx::query("INSERT INTO credit (user_id, amount, note, created_at) VALUES (?, ?, ?, NOW())")
        .bind(user_id)
        .bind(amount)
        .bind(note)
        .execute(&mut **tx)
        .await
        .map_err(BankError::store("insert credit failed"))?;

    let total: i64 = sqlx::query_scalar(
        "SELECT CAST(IFNULL(SUM(amount), 0) AS SIGNED) FROM credit WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(BankError::store("calc credit failed"))?;

    sqlx::query("UPDATE user SET credit = ? WHERE id = ?")
        .bind(total)
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(BankError::store("update user.credit failed"))?;

    Ok(())
}

/// Top-up entry point backing the `add_credit` operation.
pub async fn add_credit(pool: &MySqlPool, user_id: UserId, price: i64) -> Result<(), BankError> {
    store::in_transaction(pool, move |tx| {
        Box::pin(async move {
            store::lock_user(tx, user_id).await?;
            apply_delta(tx, user_id, price, "by add credit API").await
        })
    })
    .await
}

/// Read-only solvency probe backing the `check` operation.
///
/// Reads the cached balance under a row lock and compares it against
/// `price`. Pending reservations are deliberately not considered: this asks
/// "is at least this much already confirmed?", nothing more.
pub async fn check(pool: &MySqlPool, user_id: UserId, price: i64) -> Result<(), BankError> {
    store::in_transaction(pool, move |tx| {
        Box::pin(async move {
            let credit: i64 =
                sqlx::query_scalar("SELECT credit FROM user WHERE id = ? LIMIT 1 FOR UPDATE")
                    .bind(user_id)
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(BankError::store("select credit failed"))?;

            if credit < price {
                return Err(BankError::CreditInsufficient);
            }
            Ok(())
        })
    })
    .await
}
