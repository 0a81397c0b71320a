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

use anyhow::Context;
use clap::Parser;
use reserve_ledger_rs::server;
use reserve_ledger_rs::store::{self, StoreConfig};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Bank service with a two-phase reservation protocol.
///
/// Expects the schema from `schema.sql` to be loaded already.
#[derive(Parser, Debug)]
#[command(name = "reserve-ledger-rs")]
#[command(about = "Bank service with a two-phase reservation protocol", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 5515)]
    port: u16,

    /// Database host
    #[arg(long, default_value = "127.0.0.1")]
    dbhost: String,

    /// Database port
    #[arg(long, default_value_t = 3306)]
    dbport: u16,

    /// Database user
    #[arg(long, default_value = "root")]
    dbuser: String,

    /// Database password
    #[arg(long, default_value = "")]
    dbpass: String,

    /// Database name
    #[arg(long, default_value = "bank")]
    dbname: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = StoreConfig {
        host: args.dbhost,
        port: args.dbport,
        user: args.dbuser,
        password: args.dbpass,
        database: args.dbname,
    };

    let pool = store::connect(&config).await.context("mysql connect failed")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr} failed"))?;

    info!("start server {addr}");
    axum::serve(listener, server::router(pool)).await?;
    Ok(())
}
