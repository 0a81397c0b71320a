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

//! User registration and `bank_id` resolution.
//!
//! A user row is created once at registration and never deleted. Its
//! `credit` column is a denormalised cache of the ledger sum; only the
//! balance engine writes it.

use crate::base::UserId;
use crate::error::BankError;
use sqlx::MySqlPool;

/// Creates a user with the given external identity.
///
/// `bank_id` is unique among users; a second registration with the same id
/// fails with [`BankError::DuplicateBankId`].
pub async fn register(pool: &MySqlPool, bank_id: &str) -> Result<(), BankError> {
    let result = sqlx::query("INSERT INTO user (bank_id, created_at) VALUES (?, NOW())")
        .bind(bank_id)
        .execute(pool)
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(BankError::DuplicateBankId)
        }
        Err(err) => Err(BankError::store("insert user failed")(err)),
    }
}

/// Resolves an external `bank_id` to the internal user id.
pub async fn find_by_bank_id(pool: &MySqlPool, bank_id: &str) -> Result<UserId, BankError> {
    sqlx::query_scalar::<_, UserId>("SELECT id FROM user WHERE bank_id = ? LIMIT 1")
        .bind(bank_id)
        .fetch_optional(pool)
        .await
        .map_err(BankError::store("get user failed"))?
        .ok_or(BankError::UserNotFound)
}
