use std::sync::Arc;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{AppState, WagerChessServer, SERVICE_HEADER, USER_HEADER};
use crate::test_support::{blitz_request, dec, Harness};
use crate::types::{GameStatus, UserRef};

const SERVICE_TOKEN: &str = "rules-engine-secret";

fn router(h: &Harness) -> Router {
    let state = AppState::new(h.ctx.clone(), Arc::clone(&h.notifier))
        .with_service_token(Some(SERVICE_TOKEN.to_owned()));
    WagerChessServer::new(Arc::new(state)).into_router()
}

async fn call_as_service(
    router: &Router,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<StatusCode> {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    if let Some(token) = token {
        builder = builder.header(SERVICE_HEADER, token);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };
    Ok(router.clone().oneshot(request).await?.status())
}

async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    user: Option<UserRef>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };
    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

#[tokio::test]
async fn accounts_open_and_report_balances() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);

    let (status, account) = call(
        &app,
        Method::POST,
        "/accounts",
        None,
        Some(json!({ "display_name": "ana" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let user: UserRef = account["user_ref"]
        .as_str()
        .expect("user_ref")
        .parse()?;

    let (status, wallet) = call(&app, Method::GET, "/wallet", Some(user), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["available"], json!("0"));
    Ok(())
}

#[tokio::test]
async fn only_services_open_funded_accounts() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);
    let funded = json!({ "display_name": "mallory", "opening_balance": "1000000" });

    let (status, _) = call(&app, Method::POST, "/accounts", None, Some(funded.clone())).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let status = call_as_service(&app, "/internal/accounts", None, Some(funded.clone())).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let status =
        call_as_service(&app, "/internal/accounts", Some("guess"), Some(funded.clone())).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let status =
        call_as_service(&app, "/internal/accounts", Some(SERVICE_TOKEN), Some(funded)).await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn internal_routes_stay_closed_without_a_configured_token() -> Result<()> {
    let h = Harness::new();
    let state = AppState::new(h.ctx.clone(), Arc::clone(&h.notifier)).with_service_token(None);
    let app = WagerChessServer::new(Arc::new(state)).into_router();

    let status = call_as_service(&app, "/internal/sweep", Some(""), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let status = call_as_service(&app, "/internal/sweep", Some(SERVICE_TOKEN), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn players_cannot_decide_or_cancel_games() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);
    let white = h.funded_user("white", "500").await;
    let black = h.funded_user("black", "500").await;
    let outsider = h.funded_user("outsider", "500").await;
    h.queue().create_match_request(blitz_request(white, "50")).await?;
    let outcome = h.queue().create_match_request(blitz_request(black, "50")).await?;
    let game_ref = outcome.game_ref().expect("paired");
    let result = json!({ "outcome": "white_wins", "reason": "resignation" });

    for uri in [
        format!("/games/{game_ref}/result"),
        format!("/games/{game_ref}/cancel"),
        "/maintenance/sweep".to_owned(),
    ] {
        let (status, _) = call(&app, Method::POST, &uri, Some(white), Some(result.clone())).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri} is not a public route");
    }

    let uri = format!("/internal/games/{game_ref}/result");
    let status = call_as_service(&app, &uri, None, Some(result.clone())).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::POST, &uri, Some(white), Some(result.clone())).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let leave = format!("/games/{game_ref}/leave");
    let (status, _) = call(&app, Method::POST, &leave, None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::POST, &leave, Some(outsider), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(h.games().get_game(game_ref).await?.status, GameStatus::InProgress);
    assert_eq!(h.balance(white).await.locked, dec("50"));

    let status = call_as_service(&app, &uri, Some(SERVICE_TOKEN), Some(result)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.games().get_game(game_ref).await?.status, GameStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn missing_or_malformed_user_header_is_rejected() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);

    let (status, body) = call(&app, Method::GET, "/wallet", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], json!("unauthorized"));

    let request = Request::builder()
        .uri("/wallet")
        .header(USER_HEADER, "not-a-uuid")
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn matching_over_http_pairs_two_requests() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);
    let white = h.funded_user("white", "500").await;
    let black = h.funded_user("black", "500").await;
    let body = json!({
        "initial_time_seconds": 300,
        "increment_seconds": 0,
        "stake_amount": "50",
    });

    let (status, queued) = call(
        &app,
        Method::POST,
        "/match-requests",
        Some(white),
        Some(body.clone()),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queued["result"], json!("queued"));

    let (_, matched) = call(&app, Method::POST, "/match-requests", Some(black), Some(body)).await?;
    assert_eq!(matched["result"], json!("matched"));
    assert_eq!(matched["color"], json!("black"));

    let game_ref = matched["game_ref"].as_str().expect("game_ref");
    let (status, game) = call(&app, Method::GET, &format!("/games/{game_ref}"), None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(game["white"], json!(white.to_string()));
    Ok(())
}

#[tokio::test]
async fn core_errors_surface_as_status_codes() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);
    let broke = h.funded_user("broke", "10").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/match-requests",
        Some(broke),
        Some(json!({
            "initial_time_seconds": 300,
            "increment_seconds": 0,
            "stake_amount": "50",
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], json!("insufficient_funds"));

    let unknown = UserRef::new();
    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/games/{unknown}"),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn user_event_streams_are_private() -> Result<()> {
    let h = Harness::new();
    let app = router(&h);
    let owner = h.funded_user("owner", "0").await;
    let other = h.funded_user("other", "0").await;

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/events/user/{owner}"),
        Some(other),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .uri(format!("/events/user/{owner}"))
        .header(USER_HEADER, owner.to_string())
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
    Ok(())
}
