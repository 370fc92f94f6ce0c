use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::context::CoreContext;
use crate::error::CoreError;
use crate::game::{ClockUpdate, GameSessions, GameView, InviteGameRequest, MoveRequest};
use crate::matchmaking::{MatchRequest, MatchRequestOutcome, MatchStatusView, MatchmakingQueue};
use crate::notify::BroadcastNotifier;
use crate::tournament::{SearchOutcome, TournamentConfig, TournamentCoordinator, TournamentView};
use crate::types::{Amount, GameRef, GameResult, QueueRef, TournamentRef, UserRef};
use crate::wallet::{WalletLedger, WalletView};

use super::dto::{
    AccountResponse, CancelBody, ClockBody, InviteBody, MatchRequestBody, MoveBody,
    OpenAccountRequest, SweepResponse,
};
use super::error::ApiError;
use super::events::stream_topic;
use super::logging::log_requests;

/// Header carrying the acting user's reference, set by the identity layer in
/// front of this service.
pub const USER_HEADER: &str = "x-user-ref";

/// Header carrying the shared secret of trusted internal callers (the rules
/// engine, the scheduler, back-office tooling).
pub const SERVICE_HEADER: &str = "x-service-token";

pub struct AppState {
    pub wallets: WalletLedger,
    pub queue: MatchmakingQueue,
    pub games: GameSessions,
    pub tournaments: TournamentCoordinator,
    pub events: Arc<BroadcastNotifier>,
    /// Without a token every `/internal` route answers 403.
    service_token: Option<String>,
}

impl AppState {
    /// `events` must be the notifier `ctx` publishes to.
    pub fn new(ctx: Arc<CoreContext>, events: Arc<BroadcastNotifier>) -> Self {
        Self {
            wallets: WalletLedger::new(ctx.clone()),
            queue: MatchmakingQueue::new(ctx.clone()),
            games: GameSessions::new(ctx.clone()),
            tournaments: TournamentCoordinator::new(ctx),
            events,
            service_token: None,
        }
    }

    pub fn with_service_token(mut self, token: Option<String>) -> Self {
        self.service_token = token.filter(|token| !token.is_empty());
        self
    }
}

/// The acting user, taken from [`USER_HEADER`].
pub struct ActingUser(pub UserRef);

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| ApiError::unauthorized(format!("missing {USER_HEADER} header")))?
            .to_str()
            .map_err(|_| ApiError::bad_request(format!("{USER_HEADER} is not valid text")))?;
        Ok(Self(raw.parse::<UserRef>()?))
    }
}

/// A trusted internal caller, authenticated by [`SERVICE_HEADER`].
pub struct ServiceCaller;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(SERVICE_HEADER)
            .ok_or_else(|| ApiError::unauthorized(format!("missing {SERVICE_HEADER} header")))?;
        match state.service_token.as_deref() {
            Some(expected) if presented.as_bytes() == expected.as_bytes() => Ok(Self),
            _ => Err(CoreError::Forbidden.into()),
        }
    }
}

pub struct WagerChessServer {
    router: Router,
}

impl WagerChessServer {
    pub fn new(state: Arc<AppState>) -> Self {
        let router = Router::new()
            .route("/accounts", post(open_account))
            .route("/wallet", get(wallet_balance))
            .route("/match-requests", post(create_match_request))
            .route(
                "/match-requests/:queue_ref",
                get(match_status).delete(cancel_match_request),
            )
            .route("/match-requests/:queue_ref/beacon", post(cancel_beacon))
            .route("/games/invites", post(create_invite))
            .route("/games/invites/:code/join", post(join_invite))
            .route("/games/:game_ref", get(get_game))
            .route("/games/:game_ref/moves", post(apply_move))
            .route("/games/:game_ref/clocks", post(update_clocks))
            .route("/games/:game_ref/leave", post(leave_game))
            .route("/tournaments", post(create_tournament))
            .route("/tournaments/:tournament_ref", get(get_tournament))
            .route("/tournaments/:tournament_ref/join", post(join_tournament))
            .route("/tournaments/:tournament_ref/start", post(start_tournament))
            .route("/tournaments/:tournament_ref/end", post(end_tournament))
            .route(
                "/tournaments/:tournament_ref/search",
                post(request_search).delete(cancel_search),
            )
            .route("/events/:kind/:reference", get(stream_topic))
            .nest("/internal", internal_routes())
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn(log_requests))
                    .layer(CorsLayer::permissive()),
            )
            .with_state(state);
        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Operations that move money or decide results on nobody's behalf. Every
/// handler here takes a [`ServiceCaller`].
fn internal_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", post(open_funded_account))
        .route("/games/:game_ref/result", post(resolve_game))
        .route("/games/:game_ref/cancel", post(cancel_game))
        .route("/sweep", post(sweep))
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Self-service sign-up; accounts always open empty.
async fn open_account(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    if !body.opening_balance.is_zero() {
        return Err(CoreError::Forbidden.into());
    }
    let user = state
        .wallets
        .open_account(&body.display_name, Amount::ZERO)
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn open_funded_account(
    State(state): State<Arc<AppState>>,
    _caller: ServiceCaller,
    Json(body): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let user = state
        .wallets
        .open_account(&body.display_name, body.opening_balance)
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn wallet_balance(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
) -> ApiResult<WalletView> {
    Ok(Json(state.wallets.balance(user).await?))
}

async fn create_match_request(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Json(body): Json<MatchRequestBody>,
) -> ApiResult<MatchRequestOutcome> {
    let outcome = state
        .queue
        .create_match_request(MatchRequest {
            user,
            legend_ref: body.legend_ref,
            opening_ref: body.opening_ref,
            initial_time_seconds: body.initial_time_seconds,
            increment_seconds: body.increment_seconds,
            stake_amount: body.stake_amount,
        })
        .await?;
    Ok(Json(outcome))
}

async fn match_status(
    State(state): State<Arc<AppState>>,
    Path(queue_ref): Path<QueueRef>,
) -> ApiResult<MatchStatusView> {
    Ok(Json(state.queue.get_match_status(queue_ref).await?))
}

async fn cancel_match_request(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(queue_ref): Path<QueueRef>,
) -> Result<StatusCode, ApiError> {
    state.queue.cancel_match_request(queue_ref, user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Always 204; failures are only logged.
async fn cancel_beacon(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(queue_ref): Path<QueueRef>,
) -> StatusCode {
    state.queue.cancel_beacon(queue_ref, user).await;
    StatusCode::NO_CONTENT
}

async fn create_invite(
    State(state): State<Arc<AppState>>,
    ActingUser(creator): ActingUser,
    Json(body): Json<InviteBody>,
) -> Result<(StatusCode, Json<GameView>), ApiError> {
    let view = state
        .games
        .create_invite_game(InviteGameRequest {
            creator,
            stake_amount: body.stake_amount,
            initial_time_seconds: body.initial_time_seconds,
            increment_seconds: body.increment_seconds,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn join_invite(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(code): Path<String>,
) -> ApiResult<GameView> {
    Ok(Json(state.games.join_by_invite(&code, user).await?))
}

async fn get_game(
    State(state): State<Arc<AppState>>,
    Path(game_ref): Path<GameRef>,
) -> ApiResult<GameView> {
    Ok(Json(state.games.get_game(game_ref).await?))
}

async fn apply_move(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(game_ref): Path<GameRef>,
    Json(body): Json<MoveBody>,
) -> ApiResult<GameView> {
    let view = state
        .games
        .apply_move(MoveRequest {
            game_ref,
            user,
            from: body.from,
            to: body.to,
            promotion: body.promotion,
            fen: body.fen,
            move_history: body.move_history,
            white_time_remaining: body.white_time_remaining,
            black_time_remaining: body.black_time_remaining,
        })
        .await?;
    Ok(Json(view))
}

async fn update_clocks(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(game_ref): Path<GameRef>,
    Json(body): Json<ClockBody>,
) -> ApiResult<GameView> {
    let view = state
        .games
        .update_clocks(ClockUpdate {
            game_ref,
            user,
            white_time_remaining: body.white_time_remaining,
            black_time_remaining: body.black_time_remaining,
            last_move_at: body.last_move_at,
        })
        .await?;
    Ok(Json(view))
}

/// Called by the rules layer once it has detected a terminal position.
async fn resolve_game(
    State(state): State<Arc<AppState>>,
    _caller: ServiceCaller,
    Path(game_ref): Path<GameRef>,
    Json(result): Json<GameResult>,
) -> ApiResult<GameView> {
    Ok(Json(state.games.resolve(game_ref, result).await?.into_view()))
}

/// Operator cancellation. Players leave through `/games/:game_ref/leave`.
async fn cancel_game(
    State(state): State<Arc<AppState>>,
    _caller: ServiceCaller,
    Path(game_ref): Path<GameRef>,
    Json(body): Json<CancelBody>,
) -> ApiResult<GameView> {
    Ok(Json(state.games.cancel(game_ref, body.reason).await?))
}

async fn leave_game(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(game_ref): Path<GameRef>,
) -> ApiResult<GameView> {
    Ok(Json(state.games.leave(game_ref, user).await?))
}

async fn create_tournament(
    State(state): State<Arc<AppState>>,
    ActingUser(creator): ActingUser,
    Json(config): Json<TournamentConfig>,
) -> Result<(StatusCode, Json<TournamentView>), ApiError> {
    let view = state.tournaments.create(creator, config).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_tournament(
    State(state): State<Arc<AppState>>,
    Path(tournament_ref): Path<TournamentRef>,
) -> ApiResult<TournamentView> {
    Ok(Json(state.tournaments.get_tournament(tournament_ref).await?))
}

async fn join_tournament(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(tournament_ref): Path<TournamentRef>,
) -> ApiResult<TournamentView> {
    Ok(Json(state.tournaments.join(tournament_ref, user).await?))
}

async fn start_tournament(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(tournament_ref): Path<TournamentRef>,
) -> ApiResult<TournamentView> {
    Ok(Json(state.tournaments.start(tournament_ref, user).await?))
}

async fn end_tournament(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(tournament_ref): Path<TournamentRef>,
) -> ApiResult<TournamentView> {
    Ok(Json(state.tournaments.end(tournament_ref, user).await?))
}

async fn request_search(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(tournament_ref): Path<TournamentRef>,
) -> ApiResult<SearchOutcome> {
    Ok(Json(
        state.tournaments.request_search(tournament_ref, user).await?,
    ))
}

async fn cancel_search(
    State(state): State<Arc<AppState>>,
    ActingUser(user): ActingUser,
    Path(tournament_ref): Path<TournamentRef>,
) -> Result<StatusCode, ApiError> {
    state.tournaments.cancel_search(tournament_ref, user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Manual trigger for the periodic sweep.
async fn sweep(
    State(state): State<Arc<AppState>>,
    _caller: ServiceCaller,
) -> ApiResult<SweepResponse> {
    let tickets = state.queue.cleanup_expired_entries().await?;
    let invites = state.games.expire_invites().await?;
    Ok(Json(SweepResponse {
        expired: tickets + invites,
    }))
}
