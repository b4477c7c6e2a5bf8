//! API Router
//!
//! Parses method and path into the route the server dispatches on.

use thiserror::Error;

/// Router errors
#[derive(Error, Debug, PartialEq)]
pub enum RouterError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
}

/// API routes
#[derive(Debug, Clone, PartialEq)]
pub enum ApiRoute {
    /// GET /health
    Health,
    /// GET /metrics
    Metrics,
    /// GET /users/me
    CurrentUser,
    /// POST /users/logout
    Logout,
    /// GET /messages
    ListMessages,
    /// POST /messages
    SendMessage,
    /// PUT /messages/{id}
    EditMessage { id: String },
    /// DELETE /messages/{id}
    DeleteMessage { id: String },
}

impl ApiRoute {
    /// Parse an HTTP request line into a route
    ///
    /// Trailing slashes are ignored, so `/messages/` and `/messages` match
    /// the same route.
    pub fn parse(method: &str, path: &str) -> Result<ApiRoute, RouterError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            ["health"] => Self::only(method, "GET", ApiRoute::Health, path),
            ["metrics"] => Self::only(method, "GET", ApiRoute::Metrics, path),
            ["users", "me"] => Self::only(method, "GET", ApiRoute::CurrentUser, path),
            ["users", "logout"] => Self::only(method, "POST", ApiRoute::Logout, path),
            ["messages"] => match method {
                "GET" => Ok(ApiRoute::ListMessages),
                "POST" => Ok(ApiRoute::SendMessage),
                _ => Err(Self::not_allowed(method, path)),
            },
            ["messages", id] => match method {
                "PUT" => Ok(ApiRoute::EditMessage { id: id.to_string() }),
                "DELETE" => Ok(ApiRoute::DeleteMessage { id: id.to_string() }),
                _ => Err(Self::not_allowed(method, path)),
            },
            _ => Err(RouterError::NotFound(path.to_string())),
        }
    }

    /// Whether the route needs an authenticated caller
    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            ApiRoute::Health | ApiRoute::Metrics | ApiRoute::Logout
        )
    }

    /// Low-cardinality label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            ApiRoute::Health => "health",
            ApiRoute::Metrics => "metrics",
            ApiRoute::CurrentUser => "users_me",
            ApiRoute::Logout => "users_logout",
            ApiRoute::ListMessages => "messages_list",
            ApiRoute::SendMessage => "messages_send",
            ApiRoute::EditMessage { .. } => "messages_edit",
            ApiRoute::DeleteMessage { .. } => "messages_delete",
        }
    }

    fn only(
        method: &str,
        allowed: &str,
        route: ApiRoute,
        path: &str,
    ) -> Result<ApiRoute, RouterError> {
        if method == allowed {
            Ok(route)
        } else {
            Err(Self::not_allowed(method, path))
        }
    }

    fn not_allowed(method: &str, path: &str) -> RouterError {
        RouterError::MethodNotAllowed(format!("{} {}", method, path))
    }
}
