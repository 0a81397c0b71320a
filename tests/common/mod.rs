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

#![allow(dead_code)]

//! Shared MySQL test harness.
//!
//! Reads `BANK_TEST_DATABASE_URL` (default
//! `mysql://root@127.0.0.1:3306/bank_test`), creates the schema if missing,
//! and mints unique `bank_id`s so tests can run concurrently against one
//! database without stepping on each other.

use reserve_ledger_rs::{user, ReserveId, UserId};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DEFAULT_DSN: &str = "mysql://root@127.0.0.1:3306/bank_test";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS user (
        id         BIGINT       NOT NULL AUTO_INCREMENT,
        bank_id    VARCHAR(191) NOT NULL,
        credit     BIGINT       NOT NULL DEFAULT 0,
        created_at DATETIME     NOT NULL,
        PRIMARY KEY (id),
        UNIQUE KEY uq_user_bank_id (bank_id)
    ) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4",
    "CREATE TABLE IF NOT EXISTS credit (
        id         BIGINT       NOT NULL AUTO_INCREMENT,
        user_id    BIGINT       NOT NULL,
        amount     BIGINT       NOT NULL,
        note       VARCHAR(255) NOT NULL,
        created_at DATETIME     NOT NULL,
        PRIMARY KEY (id),
        KEY idx_credit_user (user_id)
    ) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4",
    "CREATE TABLE IF NOT EXISTS reserve (
        id         BIGINT       NOT NULL AUTO_INCREMENT,
        user_id    BIGINT       NOT NULL,
        amount     BIGINT       NOT NULL,
        note       VARCHAR(255) NOT NULL,
        is_minus   TINYINT(1)   NOT NULL,
        created_at DATETIME     NOT NULL,
        expire_at  DATETIME     NOT NULL,
        PRIMARY KEY (id),
        KEY idx_reserve_user_minus_expire (user_id, is_minus, expire_at)
    ) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4",
];

/// Connects to the test database and makes sure the schema exists.
///
/// The pool applies the same session time zone as the production store so
/// that SQL `NOW()` agrees with the application clock.
pub async fn setup_pool() -> MySqlPool {
    let dsn =
        std::env::var("BANK_TEST_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DSN.to_string());

    let pool = MySqlPoolOptions::new()
        .max_connections(16)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("SET time_zone = '+09:00'")
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("SET SESSION TRANSACTION ISOLATION LEVEL READ COMMITTED")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&dsn)
        .await
        .expect("connect test database (set BANK_TEST_DATABASE_URL)");

    for ddl in SCHEMA {
        sqlx::query(ddl).execute(&pool).await.expect("create schema");
    }
    pool
}

/// Mints a bank_id that is unique across tests, processes and runs.
pub fn unique_bank_id(prefix: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{nanos}-{n}", std::process::id())
}

/// Registers a fresh user and returns its external and internal ids.
pub async fn register_user(pool: &MySqlPool, prefix: &str) -> (String, UserId) {
    let bank_id = unique_bank_id(prefix);
    user::register(pool, &bank_id).await.expect("register user");
    let user_id = user::find_by_bank_id(pool, &bank_id)
        .await
        .expect("resolve bank_id");
    (bank_id, user_id)
}

/// Authoritative balance: the sum of the user's ledger.
pub async fn ledger_sum(pool: &MySqlPool, user_id: UserId) -> i64 {
    sqlx::query_scalar("SELECT CAST(IFNULL(SUM(amount), 0) AS SIGNED) FROM credit WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("ledger sum")
}

/// The denormalised balance cache on the user row.
pub async fn credit_cache(pool: &MySqlPool, user_id: UserId) -> i64 {
    sqlx::query_scalar("SELECT credit FROM user WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("credit cache")
}

/// The user's ledger entries in insertion order.
pub async fn ledger_entries(pool: &MySqlPool, user_id: UserId) -> Vec<(i64, String)> {
    sqlx::query_as("SELECT amount, note FROM credit WHERE user_id = ? ORDER BY id")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .expect("ledger entries")
}

pub async fn reserve_exists(pool: &MySqlPool, reserve_id: ReserveId) -> bool {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(id) FROM reserve WHERE id = ?")
        .bind(reserve_id)
        .fetch_one(pool)
        .await
        .expect("count reserve");
    count > 0
}

/// Rewrites a reservation's expiry so tests don't have to sleep through the
/// real 60 second lifetime.
pub async fn set_expiry_offset(pool: &MySqlPool, reserve_id: ReserveId, offset_secs: i64) {
    sqlx::query("UPDATE reserve SET expire_at = DATE_ADD(NOW(), INTERVAL ? SECOND) WHERE id = ?")
        .bind(offset_secs)
        .bind(reserve_id)
        .execute(pool)
        .await
        .expect("set expiry");
}

/// Sleeps until just after a wall-clock second boundary.
///
/// Reservation accounting is second-granular, so tests that need several
/// reservations to share one admission window start from a fresh second.
pub async fn align_to_fresh_second() {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
    let into_second = Duration::from_nanos(now.subsec_nanos() as u64);
    tokio::time::sleep(Duration::from_secs(1) - into_second + Duration::from_millis(20)).await;
}

/// Asserts the ledger/cache invariant for a user.
pub async fn assert_cache_consistent(pool: &MySqlPool, user_id: UserId) {
    let sum = ledger_sum(pool, user_id).await;
    let cache = credit_cache(pool, user_id).await;
    assert_eq!(cache, sum, "user {user_id}: credit cache diverged from ledger");
}
