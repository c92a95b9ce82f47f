//! HTTP surface over [`TradeService`]
use super::error::TradeError;
use super::identity::{Identity, IdentityProvider};
use super::ledger::BookLedger;
use super::service::{InitiateTrade, RespondToTrade, TradeService};
use super::store::SledStore;
use super::trade::{Trade, TradeStatus};
use super::types::{BookId, TimeStamp, TradeId, UserId};
use super::witness::Witness;
use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Request, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub service: TradeService<SledStore, SledStore>,
    pub directory: Arc<SledStore>,
}

impl AppState {
    pub fn new(store: Arc<SledStore>) -> Self {
        Self {
            service: TradeService::new(Arc::clone(&store), Arc::clone(&store)),
            directory: store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/trades", get(list_mine).post(initiate))
        .route("/trades/{id}", get(get_one).put(respond).delete(cancel))
        .route("/trades/{id}/accept", put(accept))
        .route("/trades/{id}/reject", put(reject))
        .route("/trades/{id}/complete", put(complete))
        .route("/trades/{id}/history", get(history))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated(&'static str),
    MalformedBody(String),
    Trade(TradeError),
}

impl From<TradeError> for ApiError {
    fn from(err: TradeError) -> Self {
        ApiError::Trade(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Trade(TradeError::Unexpected(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated(reason) => (StatusCode::UNAUTHORIZED, reason.to_owned()),
            ApiError::MalformedBody(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Trade(err) => match err {
                TradeError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
                TradeError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
                TradeError::InvalidState(msg)
                | TradeError::InvalidArgument(msg)
                | TradeError::InvalidOperation(msg) => (StatusCode::BAD_REQUEST, msg),
                TradeError::Unexpected(err) => {
                    error!("request failed: {err:#}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Unexpected server error.".to_owned(),
                    )
                }
            },
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// The authenticated caller, resolved from `Authorization: Bearer <credential>`
pub struct Caller(pub Identity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
            .ok_or(ApiError::Unauthenticated(
                "Authentication failed: No token provided.",
            ))?;

        let directory = Arc::clone(&state.directory);
        match blocking(move || Ok(directory.resolve(&credential)?)).await? {
            Some(identity) => Ok(Caller(identity)),
            None => Err(ApiError::Unauthenticated(
                "Authentication failed: Invalid user.",
            )),
        }
    }
}

/// `Json` whose rejections answer 400 with a `{message}` body like every other error
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

// sled reads and transactions block, keep them off the async workers
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("blocking task did not finish")?
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateTradeRequest {
    pub requested_book_id: BookId,
    pub offered_book_id: Option<BookId>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondToTradeRequest {
    pub status: String,
    pub proposed_book_id: Option<BookId>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BookSummary {
    pub id: BookId,
    pub title: Option<String>,
    pub author: Option<String>,
    pub photo: Option<String>,
}

/// A trade with its parties and books resolved for display
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeView {
    pub id: TradeId,
    pub requester: UserSummary,
    pub owner: UserSummary,
    pub requested_book: BookSummary,
    pub offered_book: Option<BookSummary>,
    pub proposed_book_from_owner: Option<BookSummary>,
    pub status: TradeStatus,
    pub notes_from_requester: Option<String>,
    pub notes_from_owner: Option<String>,
    pub counter_accepted_by_requester: bool,
    pub requested_book_transferred: bool,
    pub trade_date: Option<TimeStamp<Utc>>,
    pub created_at: TimeStamp<Utc>,
    pub updated_at: TimeStamp<Utc>,
}

impl TradeView {
    pub fn populate<D>(trade: &Trade, directory: &D) -> anyhow::Result<Self>
    where
        D: IdentityProvider + BookLedger,
    {
        let book = |id: &BookId| -> anyhow::Result<BookSummary> {
            let found = directory.fetch_book(id)?;
            Ok(BookSummary {
                id: id.clone(),
                title: found.as_ref().map(|b| b.title.clone()),
                author: found.as_ref().map(|b| b.author.clone()),
                photo: found.map(|b| b.photo),
            })
        };
        let user = |id: &UserId| -> anyhow::Result<UserSummary> {
            let found = directory.profile(id)?;
            Ok(UserSummary {
                id: id.clone(),
                name: found.as_ref().map(|u| u.name.clone()),
                email: found.map(|u| u.email),
            })
        };

        Ok(Self {
            id: trade.id().clone(),
            requester: user(trade.requester())?,
            owner: user(trade.owner())?,
            requested_book: book(trade.requested_book())?,
            offered_book: trade.offered_book().map(&book).transpose()?,
            proposed_book_from_owner: trade.proposed_book_from_owner().map(&book).transpose()?,
            status: trade.status(),
            notes_from_requester: trade.notes_from_requester().map(str::to_owned),
            notes_from_owner: trade.notes_from_owner().map(str::to_owned),
            counter_accepted_by_requester: trade.counter_accepted_by_requester(),
            requested_book_transferred: trade.requested_book_transferred(),
            trade_date: trade.trade_date().cloned(),
            created_at: trade.created_at().clone(),
            updated_at: trade.updated_at().clone(),
        })
    }
}

fn view(state: &AppState, trade: &Trade) -> Result<Json<TradeView>, ApiError> {
    Ok(Json(TradeView::populate(trade, state.directory.as_ref())?))
}

async fn banner() -> &'static str {
    "Book Swap API is running"
}

async fn initiate(
    State(state): State<AppState>,
    Caller(caller): Caller,
    JsonBody(body): JsonBody<InitiateTradeRequest>,
) -> Result<(StatusCode, Json<TradeView>), ApiError> {
    let cmd = InitiateTrade {
        requested_book: body.requested_book_id,
        offered_book: body.offered_book_id,
        notes: body.notes,
    };
    let created = blocking(move || {
        let trade = state.service.initiate_trade(&caller, cmd)?;
        view(&state, &trade)
    })
    .await?;
    Ok((StatusCode::CREATED, created))
}

async fn list_mine(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<TradeView>>, ApiError> {
    blocking(move || {
        let views = state
            .service
            .list_trades(&caller)?
            .iter()
            .map(|trade| TradeView::populate(trade, state.directory.as_ref()))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Json(views))
    })
    .await
}

async fn get_one(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<TradeView>, ApiError> {
    blocking(move || {
        let trade = state.service.get_trade(&TradeId::from(id))?;
        view(&state, &trade)
    })
    .await
}

async fn respond(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RespondToTradeRequest>,
) -> Result<Json<TradeView>, ApiError> {
    let cmd = RespondToTrade {
        status: body.status,
        proposed_book: body.proposed_book_id,
        notes: body.notes,
    };
    blocking(move || {
        let trade = state
            .service
            .respond_to_trade(&caller, &TradeId::from(id), cmd)?;
        view(&state, &trade)
    })
    .await
}

async fn accept(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    blocking(move || Ok(state.service.accept_trade(&caller, &TradeId::from(id))?)).await?;
    Ok(Json(json!({ "message": "Trade accepted successfully!" })))
}

async fn reject(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    blocking(move || Ok(state.service.reject_trade(&caller, &TradeId::from(id))?)).await?;
    Ok(Json(json!({ "message": "Trade rejected successfully!" })))
}

async fn cancel(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<TradeView>, ApiError> {
    blocking(move || {
        let trade = state.service.cancel_trade(&caller, &TradeId::from(id))?;
        view(&state, &trade)
    })
    .await
}

async fn complete(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<TradeView>, ApiError> {
    blocking(move || {
        let trade = state.service.complete_trade(&caller, &TradeId::from(id))?;
        view(&state, &trade)
    })
    .await
}

async fn history(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<Witness>>, ApiError> {
    blocking(move || {
        let history = state.service.trade_history(&caller, &TradeId::from(id))?;
        Ok(Json(history))
    })
    .await
}
