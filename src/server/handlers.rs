//! Request handlers
//!
//! Routes are resolved first; protected routes then run the authenticator
//! and only reach their handler with an [`AuthenticatedUser`]. Every error
//! body is `{"detail": "..."}`.

use super::AppState;
use crate::auth::{AuthError, AuthRequest, AuthenticatedUser};
use crate::messages::{MessageError, MessagePayload};
use crate::metrics;
use crate::router::{ApiRoute, RouterError};
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE, COOKIE, SET_COOKIE, WWW_AUTHENTICATE};
use hyper::{Request, Response, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

const EXPIRED_COOKIES: [&str; 2] = [
    "access_token=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax",
    "refresh_token=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax",
];

const EXPIRED_SECURE_COOKIES: [&str; 2] = [
    "access_token=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=None",
    "refresh_token=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=None",
];

/// Handle one HTTP request
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<String>, Infallible>
where
    B: Body,
    B::Error: Display,
{
    let span = tracing::info_span!(
        "http.request",
        http.method = %req.method(),
        http.target = %req.uri().path(),
    );

    Ok(route_request(req, state).instrument(span).await)
}

async fn route_request<B>(req: Request<B>, state: Arc<AppState>) -> Response<String>
where
    B: Body,
    B::Error: Display,
{
    let route = match ApiRoute::parse(req.method().as_str(), req.uri().path()) {
        Ok(route) => route,
        Err(e) => {
            debug!("{}", e);
            let response = match e {
                RouterError::NotFound(_) => detail(StatusCode::NOT_FOUND, "Not Found"),
                RouterError::MethodNotAllowed(_) => {
                    detail(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
                }
            };
            metrics::record_request("unmatched", response.status().as_u16());
            return response;
        }
    };

    let response = dispatch(&route, req, &state).await;
    info!(
        route = route.label(),
        status = response.status().as_u16(),
        "Request handled"
    );
    metrics::record_request(route.label(), response.status().as_u16());
    response
}

async fn dispatch<B>(route: &ApiRoute, req: Request<B>, state: &AppState) -> Response<String>
where
    B: Body,
    B::Error: Display,
{
    if !route.requires_auth() {
        return public(route, state);
    }

    let user = match state
        .authenticator
        .authenticate(&build_auth_request(&req))
        .await
    {
        Ok(user) => user,
        Err(e) => return auth_error(&e),
    };
    protected(route, req, &user, state).await
}

/// Handlers reachable without a token
fn public(route: &ApiRoute, state: &AppState) -> Response<String> {
    match route {
        ApiRoute::Health => text(StatusCode::OK, "ok".to_string()),
        ApiRoute::Metrics if state.metrics_enabled => metrics_response(),
        ApiRoute::Logout => logout(state.secure_cookies),
        _ => detail(StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Handlers that run only after authentication succeeded
async fn protected<B>(
    route: &ApiRoute,
    req: Request<B>,
    user: &AuthenticatedUser,
    state: &AppState,
) -> Response<String>
where
    B: Body,
    B::Error: Display,
{
    match route {
        ApiRoute::CurrentUser => json_response(
            StatusCode::OK,
            json!({"user_id": user.sub, "username": user.username}),
        ),
        ApiRoute::ListMessages => match state.messages.list_for_user(&user.sub).await {
            Ok(messages) => json_response(StatusCode::OK, json!({ "messages": messages })),
            Err(e) => message_error(&e),
        },
        ApiRoute::SendMessage => {
            let payload = match read_payload(req).await {
                Ok(payload) => payload,
                Err(response) => return response,
            };
            match state.messages.send(&user.sub, &payload.content).await {
                Ok((sent, reply)) => {
                    json_response(StatusCode::CREATED, json!({ "messages": [sent, reply] }))
                }
                Err(e) => message_error(&e),
            }
        }
        ApiRoute::EditMessage { id } => {
            let payload = match read_payload(req).await {
                Ok(payload) => payload,
                Err(response) => return response,
            };
            match state.messages.update(id, &user.sub, &payload.content).await {
                Ok(message) => json_response(StatusCode::OK, json!(message)),
                Err(e) => message_error(&e),
            }
        }
        ApiRoute::DeleteMessage { id } => match state.messages.delete(id, &user.sub).await {
            Ok(()) => json_response(StatusCode::OK, json!({"id_message": id, "status": "deleted"})),
            Err(e) => message_error(&e),
        },
        ApiRoute::Health | ApiRoute::Metrics | ApiRoute::Logout => {
            detail(StatusCode::NOT_FOUND, "Not Found")
        }
    }
}

/// Build AuthRequest from request headers
///
/// Repeated `Cookie` headers are joined with `"; "`; for other repeated
/// headers the first value wins.
pub fn build_auth_request<B>(req: &Request<B>) -> AuthRequest {
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in req.headers() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                if name == COOKIE {
                    existing.push_str("; ");
                    existing.push_str(value);
                }
            })
            .or_insert_with(|| value.to_string());
    }

    AuthRequest {
        headers,
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
    }
}

async fn read_payload<B>(req: Request<B>) -> Result<MessagePayload, Response<String>>
where
    B: Body,
    B::Error: Display,
{
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("Failed to read request body: {}", e);
            return Err(detail(StatusCode::BAD_REQUEST, "Failed to read request body"));
        }
    };

    serde_json::from_slice(&body).map_err(|e| {
        debug!("Invalid message payload: {}", e);
        detail(StatusCode::UNPROCESSABLE_ENTITY, "Invalid request body")
    })
}

fn logout(secure: bool) -> Response<String> {
    let mut response = json_response(StatusCode::OK, json!({"message": "Logout successful"}));
    let cookies = if secure {
        EXPIRED_SECURE_COOKIES
    } else {
        EXPIRED_COOKIES
    };
    for cookie in cookies {
        response
            .headers_mut()
            .append(SET_COOKIE, HeaderValue::from_static(cookie));
    }
    response
}

fn metrics_response() -> Response<String> {
    let mut response = text(StatusCode::OK, metrics::render());
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

fn auth_error(e: &AuthError) -> Response<String> {
    let mut response = detail(e.status(), e.detail());
    if e.status() == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

fn message_error(e: &MessageError) -> Response<String> {
    match e {
        MessageError::NotFound(_) => detail(StatusCode::NOT_FOUND, "Message not found"),
        MessageError::Forbidden(_) => {
            warn!("{}", e);
            detail(StatusCode::FORBIDDEN, "Not allowed to modify this message")
        }
    }
}

fn detail(status: StatusCode, detail: &str) -> Response<String> {
    json_response(status, json!({ "detail": detail }))
}

fn json_response(status: StatusCode, body: Value) -> Response<String> {
    let mut response = Response::new(body.to_string());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn text(status: StatusCode, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
