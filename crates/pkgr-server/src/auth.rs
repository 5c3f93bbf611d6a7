use crate::config::AuthConfig;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use pkgr_core::{Id, PkgError};
use pkgr_http::ApiError;
use pkgr_runtime::Authorizer;
use std::collections::HashMap;
use std::sync::Arc;

/// Static API tokens, by token value.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: HashMap<String, Id>,
}

impl TokenStore {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self {
            tokens: cfg
                .tokens
                .iter()
                .map(|t| (t.token.clone(), t.user_id))
                .collect(),
        }
    }

    pub fn lookup(&self, token: &str) -> Option<Id> {
        self.tokens.get(token).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Resolve the caller's token into an [`Authorizer`] request extension.
///
/// Requests without credentials pass through untouched; both package
/// endpoints then answer 401 for want of an identity, while `/health` stays
/// open. Unknown tokens are rejected here.
pub async fn authenticate(
    State(tokens): State<Arc<TokenStore>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(req.headers()) else {
        return next.run(req).await;
    };

    match tokens.lookup(&token) {
        Some(user_id) => {
            req.extensions_mut().insert(Authorizer { user_id });
            next.run(req).await
        }
        None => {
            tracing::debug!(path = %req.uri().path(), "Rejected unknown token");
            ApiError(PkgError::Unauthorized("invalid token".to_string())).into_response()
        }
    }
}

/// `Authorization: Token <t>`, or `Bearer <t>`.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Token ")
        .or_else(|| value.strip_prefix("Bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}
