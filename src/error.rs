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

//! Error types for bank operations.
//!
//! The domain variants display the exact strings of the wire protocol;
//! callers compare them byte-for-byte, so they must never change (including
//! the `commited` spelling).

use thiserror::Error;

/// Bank operation errors.
#[derive(Error, Debug)]
pub enum BankError {
    /// Registration with a `bank_id` that is already taken
    #[error("bank_id already exists")]
    DuplicateBankId,

    /// No user with the given `bank_id`
    #[error("user not found")]
    UserNotFound,

    /// Balance (plus pending withdrawals) cannot cover the requested amount.
    /// A business outcome, not a fault
    #[error("credit is insufficient")]
    CreditInsufficient,

    /// A reservation in the commit set is past its expiry
    #[error("reserve is already expired")]
    ReserveExpired,

    /// A reservation in the set was already committed or cancelled
    #[error("reserve is already commited")]
    ReserveAlreadyCommitted,

    /// Client-side argument failure; the message is the literal wire string
    #[error("{0}")]
    BadArgs(&'static str),

    /// Store or transaction failure. The wire sees a generic message;
    /// the detail is only logged
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl BankError {
    /// Wraps a store error with a static context string.
    ///
    /// Shaped for `map_err`: `query.await.map_err(BankError::store("calc credit failed"))`.
    pub(crate) fn store(context: &'static str) -> impl FnOnce(sqlx::Error) -> BankError {
        move |source| BankError::Store { context, source }
    }
}

#[cfg(test)]
mod tests {
    use super::BankError;

    #[test]
    fn error_display_matches_wire_strings() {
        assert_eq!(
            BankError::DuplicateBankId.to_string(),
            "bank_id already exists"
        );
        assert_eq!(BankError::UserNotFound.to_string(), "user not found");
        assert_eq!(
            BankError::CreditInsufficient.to_string(),
            "credit is insufficient"
        );
        assert_eq!(
            BankError::ReserveExpired.to_string(),
            "reserve is already expired"
        );
        assert_eq!(
            BankError::ReserveAlreadyCommitted.to_string(),
            "reserve is already commited"
        );
        assert_eq!(
            BankError::BadArgs("reserve_ids is required").to_string(),
            "reserve_ids is required"
        );
    }

    #[test]
    fn store_errors_carry_context() {
        let err = BankError::store("calc credit failed")(sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("calc credit failed: "));
    }
}
