//! Interactive browser authorization
//!
//! `begin` hands the operator's browser to the vendor consent page with a
//! fresh anti-forgery `state`; `complete` validates the redirect and passes
//! the one-time code on for exchange. A single pending attempt exists at a
//! time and expires on its own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use oauth2::basic::BasicClient;
use oauth2::{CsrfToken, Scope};
use tokio::sync::Mutex;
use url::Url;

use super::{AuthError, TokenManager};

/// How long a consent URL stays redeemable after it was issued.
const PENDING_ATTEMPT_TTL: Duration = Duration::from_secs(600);

/// The one outstanding authorization attempt.
struct PendingAttempt {
    state: CsrfToken,
    expires_at: Instant,
}

pub struct AuthorizationFlow {
    oauth: BasicClient,
    scopes: Vec<Scope>,
    tokens: Arc<TokenManager>,
    pending: Mutex<Option<PendingAttempt>>,
}

impl AuthorizationFlow {
    pub fn new(oauth: BasicClient, scopes: Vec<Scope>, tokens: Arc<TokenManager>) -> Self {
        Self {
            oauth,
            scopes,
            tokens,
            pending: Mutex::new(None),
        }
    }

    /// Build the vendor consent URL and remember its `state`. A previous
    /// pending attempt is replaced; only the newest state validates.
    pub async fn begin(&self) -> Url {
        let (url, state) = self
            .oauth
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned())
            .url();

        let mut pending = self.pending.lock().await;
        if pending.is_some() {
            tracing::debug!("Replacing pending authorization attempt");
        }
        *pending = Some(PendingAttempt {
            state,
            expires_at: Instant::now() + PENDING_ATTEMPT_TTL,
        });

        tracing::info!("Authorization attempt started, waiting for redirect");
        url
    }

    /// Validate the redirect and exchange the code. The pending attempt is
    /// consumed up front, so a state (and its code) is checked at most once.
    pub async fn complete(&self, code: String, state: String) -> Result<(), AuthError> {
        let attempt = self.pending.lock().await.take();

        let Some(attempt) = attempt else {
            tracing::warn!("Redirect received with no pending authorization attempt");
            return Err(AuthError::StateMismatch);
        };
        if Instant::now() > attempt.expires_at {
            tracing::warn!("Pending authorization attempt expired before the redirect");
            return Err(AuthError::StateMismatch);
        }
        if attempt.state.secret() != &state {
            tracing::warn!("State mismatch on redirect, discarding code (possible CSRF)");
            return Err(AuthError::StateMismatch);
        }

        self.tokens.complete_authorization(code).await
    }
}
