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

//! Request adaptor: the JSON-over-HTTP surface of the bank.
//!
//! Six POST endpoints map onto the engines; everything else is a JSON 404,
//! and a known path with the wrong method is a JSON 405. Success bodies are
//! `{"status":"ok", ...}`, failures `{"status":"ng","error":"<message>"}`
//! with the stable error strings callers compare against.
//!
//! Bodies are decoded as JSON from the raw bytes; the Content-Type header
//! is never consulted, so a well-formed body is accepted however it was
//! labelled. Missing request fields decode to zero values and fail the
//! explicit argument checks, so `{}` posted to `/register` yields
//! `"bank_id is required"`, not a parse error. Only a body that does not
//! decode at all is `"can't parse body"`.
//!
//! Note the insufficiency encoding on `check` and `reserve`: HTTP 200 with
//! an `ng` body. Running out of credit is a business outcome, not a server
//! fault, and callers rely on that distinction.

use crate::balance;
use crate::base::{ReserveId, UserId};
use crate::error::BankError;
use crate::reserve;
use crate::user;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pool: MySqlPool,
}

/// Builds the application router over a connected pool.
pub fn router(pool: MySqlPool) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/add_credit", post(add_credit))
        .route("/check", post(check))
        .route("/reserve", post(reserve))
        .route("/commit", post(commit))
        .route("/cancel", post(cancel))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(AppState { pool })
}

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    bank_id: String,
}

/// Shared body of `add_credit`, `check` and `reserve`.
#[derive(Debug, Deserialize)]
struct PriceRequest {
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    bank_id: String,
    #[serde(default)]
    price: i64,
}

/// Shared body of `commit` and `cancel`.
#[derive(Debug, Deserialize)]
struct ReserveSetRequest {
    #[serde(default)]
    reserve_ids: Vec<ReserveId>,
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReserveCreatedBody {
    status: &'static str,
    reserve_id: i64,
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    error: String,
}

// === Error handling ===

/// Wrapper converting [`BankError`] into wire responses.
pub struct ApiError(BankError);

impl From<BankError> for ApiError {
    fn from(err: BankError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            BankError::CreditInsufficient => {
                error_response(StatusCode::OK, "credit is insufficient")
            }
            BankError::UserNotFound => error_response(StatusCode::NOT_FOUND, "user not found"),
            BankError::DuplicateBankId
            | BankError::ReserveExpired
            | BankError::ReserveAlreadyCommitted => {
                error_response(StatusCode::BAD_REQUEST, &self.0.to_string())
            }
            BankError::BadArgs(message) => error_response(StatusCode::BAD_REQUEST, message),
            BankError::Store { .. } => {
                warn!("request failed. err: {}", self.0);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

fn success_response(body: impl Serialize) -> Response {
    let mut response = (StatusCode::OK, Json(body)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = ErrorBody {
        status: "ng",
        error: message.to_string(),
    };
    let mut response = (status, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Decodes a JSON body, collapsing any decode failure to the wire message.
///
/// Works on the raw bytes so that any well-formed JSON is accepted no
/// matter what Content-Type the caller sent, if any.
fn parse<T: DeserializeOwned>(body: &Bytes) -> Result<T, BankError> {
    serde_json::from_slice(body).map_err(|_| BankError::BadArgs("can't parse body"))
}

/// Rejects an empty `bank_id`, then resolves it to the internal user id.
async fn resolve_bank_id(pool: &MySqlPool, bank_id: &str) -> Result<UserId, BankError> {
    if bank_id.is_empty() {
        return Err(BankError::BadArgs("bank_id is required"));
    }
    user::find_by_bank_id(pool, bank_id).await
}

// === Handlers ===

async fn register(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: RegisterRequest = parse(&body)?;
    if req.bank_id.is_empty() {
        return Err(BankError::BadArgs("bank_id is required").into());
    }

    user::register(&state.pool, &req.bank_id).await?;
    Ok(success_response(StatusBody { status: "ok" }))
}

async fn add_credit(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: PriceRequest = parse(&body)?;
    if req.price <= 0 {
        return Err(BankError::BadArgs("price must be upper than 0").into());
    }

    let user_id = resolve_bank_id(&state.pool, &req.bank_id).await?;
    balance::add_credit(&state.pool, user_id, req.price).await?;
    Ok(success_response(StatusBody { status: "ok" }))
}

async fn check(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: PriceRequest = parse(&body)?;
    if req.price <= 0 {
        return Err(BankError::BadArgs("price must be upper than 0").into());
    }

    let user_id = resolve_bank_id(&state.pool, &req.bank_id).await?;
    balance::check(&state.pool, user_id, req.price).await?;
    Ok(success_response(StatusBody { status: "ok" }))
}

async fn reserve(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: PriceRequest = parse(&body)?;
    if req.price == 0 {
        return Err(BankError::BadArgs("price is 0").into());
    }

    let user_id = resolve_bank_id(&state.pool, &req.bank_id).await?;
    let note = format!("app:{}, price:{}", req.app_id, req.price);
    let reserve_id = reserve::create(&state.pool, user_id, req.price, note).await?;

    Ok(success_response(ReserveCreatedBody {
        status: "ok",
        reserve_id: reserve_id.0,
    }))
}

async fn commit(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: ReserveSetRequest = parse(&body)?;
    reserve::commit(&state.pool, req.reserve_ids).await?;
    Ok(success_response(StatusBody { status: "ok" }))
}

async fn cancel(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: ReserveSetRequest = parse(&body)?;
    reserve::cancel(&state.pool, req.reserve_ids).await?;
    Ok(success_response(StatusBody { status: "ok" }))
}

async fn not_found(uri: Uri) -> Response {
    info!("request not found {}", uri.path());
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}
