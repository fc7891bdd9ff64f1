//! Credential state machine and token endpoint exchanges
//!
//! Owns the single live credential. Consumers only ever call
//! [`TokenManager::get_valid_token`]; the interactive flow feeds it via
//! [`TokenManager::complete_authorization`]. Refreshes are single-flight:
//! refresh tokens may be single-use, so a duplicate concurrent exchange could
//! invalidate the grant.

use std::time::Duration;

use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType};
use oauth2::reqwest::async_http_client;
use oauth2::{AuthorizationCode, RefreshToken, RequestTokenError, Scope};
use tokio::sync::{watch, Mutex};

use super::{AuthError, Credential, TokenStore};

/// Bound on any single call to the vendor token endpoint.
const TOKEN_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

type EndpointError =
    RequestTokenError<oauth2::reqwest::Error<reqwest::Error>, BasicErrorResponse>;

/// Outcome of a refresh, broadcast to every caller waiting on it.
type RefreshOutcome = Result<String, AuthError>;

/// Serialized credential state. `credential` is `None` when unauthenticated;
/// an expired credential means a refresh is due; `refreshing` marks one in
/// flight. `generation` ticks on re-authorization so a refresh that raced a
/// new consent cannot clobber the fresher credential.
struct Inner {
    credential: Option<Credential>,
    refreshing: Option<watch::Receiver<Option<RefreshOutcome>>>,
    generation: u64,
}

/// What a caller of `token()` decided to do while holding the state lock.
enum Plan {
    /// Credential is valid, hand out its access token.
    Ready(String),
    /// A refresh is in flight, await its outcome.
    Wait(watch::Receiver<Option<RefreshOutcome>>),
    /// This caller performs the refresh and reports to everyone else.
    Lead {
        tx: watch::Sender<Option<RefreshOutcome>>,
        generation: u64,
        refresh_token: Option<String>,
    },
}

/// How a refresh exchange failed.
enum RefreshFailure {
    /// The grant itself is dead (`invalid_grant`): clear everything.
    Terminal(String),
    /// Anything else: leave the credential alone, retry later.
    Transient(String),
}

pub struct TokenManager {
    oauth: BasicClient,
    store: TokenStore,
    scopes: Vec<Scope>,
    timeout: Duration,
    inner: Mutex<Inner>,
}

impl TokenManager {
    /// Restore state from the store. Absent or corrupt state boots the
    /// manager unauthenticated.
    pub fn new(oauth: BasicClient, store: TokenStore, scopes: Vec<Scope>) -> Self {
        let credential = store.load();
        match &credential {
            Some(c) if c.is_expired() => {
                tracing::info!("Restored credential (expired, will refresh on first use)");
            }
            Some(_) => tracing::info!("Restored credential (valid)"),
            None => tracing::info!("No stored credential, authorization required"),
        }

        Self {
            oauth,
            store,
            scopes,
            timeout: TOKEN_ENDPOINT_TIMEOUT,
            inner: Mutex::new(Inner {
                credential,
                refreshing: None,
                generation: 0,
            }),
        }
    }

    /// Whether a credential exists at all (it may still be expired).
    pub async fn is_authenticated(&self) -> bool {
        self.inner.lock().await.credential.is_some()
    }

    /// A valid access token, refreshing first if the stored one has expired.
    ///
    /// Fails immediately with [`AuthError::ReauthorizationRequired`] when
    /// unauthenticated; no network traffic happens in that case.
    pub async fn get_valid_token(&self) -> Result<String, AuthError> {
        self.token(false).await
    }

    /// A fresh access token, refreshing even if the local clock still
    /// considers the current one valid. Used after the vehicle API rejects a
    /// supposedly-valid token (clock skew, early revocation).
    pub async fn refresh_and_get(&self) -> Result<String, AuthError> {
        self.token(true).await
    }

    async fn token(&self, force: bool) -> Result<String, AuthError> {
        let plan = {
            let mut inner = self.inner.lock().await;

            // Join an in-flight refresh unless its leader died unreported
            // (the triggering request was cancelled mid-refresh).
            let joinable = inner.refreshing.as_ref().and_then(|rx| {
                let interrupted = rx.has_changed().is_err() && rx.borrow().is_none();
                (!interrupted).then(|| rx.clone())
            });
            if joinable.is_none() && inner.refreshing.is_some() {
                tracing::warn!("Previous refresh was interrupted, discarding it");
                inner.refreshing = None;
            }

            if let Some(rx) = joinable {
                Plan::Wait(rx)
            } else {
                match &inner.credential {
                    None => return Err(AuthError::ReauthorizationRequired),
                    Some(c) if !force && !c.is_expired() => Plan::Ready(c.access_token.clone()),
                    Some(c) => {
                        let generation = inner.generation;
                        let refresh_token = c.refresh_token.clone();
                        let (tx, rx) = watch::channel(None);
                        inner.refreshing = Some(rx);
                        Plan::Lead {
                            tx,
                            generation,
                            refresh_token,
                        }
                    }
                }
            }
        };

        match plan {
            Plan::Ready(token) => Ok(token),
            Plan::Wait(mut rx) => match rx.wait_for(Option::is_some).await {
                Ok(outcome) => match (*outcome).clone() {
                    Some(result) => result,
                    None => Err(AuthError::Transient("refresh outcome unavailable".to_string())),
                },
                Err(_) => Err(AuthError::Transient(
                    "in-flight refresh was abandoned".to_string(),
                )),
            },
            Plan::Lead {
                tx,
                generation,
                refresh_token,
            } => {
                let outcome = self.run_refresh(generation, refresh_token).await;
                let _ = tx.send(Some(outcome.clone()));
                outcome
            }
        }
    }

    /// Perform the refresh grant and apply the resulting state transition.
    /// Called with the state lock released; re-acquires it only to commit.
    async fn run_refresh(
        &self,
        generation: u64,
        refresh_token: Option<String>,
    ) -> RefreshOutcome {
        let exchanged = match refresh_token {
            Some(rt) => self.exchange_refresh(&rt).await.map(|mut credential| {
                // Vendor may omit the refresh token in a refresh response:
                // that means "keep using the old one", never "discard".
                if credential.refresh_token.is_none() {
                    credential.refresh_token = Some(rt);
                }
                credential
            }),
            None => Err(RefreshFailure::Terminal(
                "stored credential has no refresh token".to_string(),
            )),
        };

        match exchanged {
            Ok(credential) => {
                let superseded = {
                    let mut inner = self.inner.lock().await;
                    inner.refreshing = None;
                    if inner.generation == generation {
                        inner.credential = Some(credential.clone());
                        false
                    } else {
                        true
                    }
                };
                if superseded {
                    // A re-authorization landed while we were refreshing; its
                    // credential stays. Ours is still a fresh valid token.
                    tracing::debug!("Refresh outcome superseded by a newer authorization");
                    return Ok(credential.access_token);
                }
                self.warn_scope_shortfall(&credential);
                if let Err(e) = self.store.save(&credential) {
                    tracing::error!("Refreshed credential could not be persisted: {:#}", e);
                    return Err(AuthError::Storage(format!("{e:#}")));
                }
                tracing::info!("Access token refreshed");
                Ok(credential.access_token)
            }
            Err(RefreshFailure::Terminal(reason)) => {
                let superseded = {
                    let mut inner = self.inner.lock().await;
                    inner.refreshing = None;
                    if inner.generation == generation {
                        inner.credential = None;
                        false
                    } else {
                        true
                    }
                };
                if superseded {
                    // The rejected grant was already replaced by a newer
                    // consent; do not touch the new credential.
                    return Err(AuthError::Transient(
                        "refresh superseded by re-authorization, retry".to_string(),
                    ));
                }
                if let Err(e) = self.store.clear() {
                    tracing::error!("Failed to clear credential state: {:#}", e);
                }
                tracing::warn!(
                    "Refresh token rejected by vendor ({}), re-authorization required",
                    reason
                );
                Err(AuthError::ReauthorizationRequired)
            }
            Err(RefreshFailure::Transient(reason)) => {
                let mut inner = self.inner.lock().await;
                inner.refreshing = None;
                drop(inner);
                tracing::warn!("Token refresh failed, will retry on a later scrape: {}", reason);
                Err(AuthError::Transient(reason))
            }
        }
    }

    async fn exchange_refresh(&self, refresh_token: &str) -> Result<Credential, RefreshFailure> {
        tracing::debug!("Refreshing access token");
        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let request = self.oauth.exchange_refresh_token(&refresh_token);

        match tokio::time::timeout(self.timeout, request.request_async(async_http_client)).await {
            Ok(Ok(response)) => Ok(Credential::from_token_response(&response)),
            Ok(Err(err)) => Err(classify_refresh_error(&err)),
            Err(_) => Err(RefreshFailure::Transient(format!(
                "token endpoint timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Exchange an authorization code for the initial credential. Called only
    /// by the authorization flow, after state validation.
    ///
    /// Codes are single-use: failures are surfaced verbatim and never retried.
    pub async fn complete_authorization(&self, code: String) -> Result<(), AuthError> {
        let request = self.oauth.exchange_code(AuthorizationCode::new(code));
        let response =
            match tokio::time::timeout(self.timeout, request.request_async(async_http_client)).await
            {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => return Err(AuthError::Exchange(describe_endpoint_error(&err))),
                Err(_) => {
                    return Err(AuthError::Exchange(format!(
                        "token endpoint timed out after {}s",
                        self.timeout.as_secs()
                    )))
                }
            };

        let credential = Credential::from_token_response(&response);
        self.warn_scope_shortfall(&credential);
        {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.credential = Some(credential.clone());
        }
        self.store
            .save(&credential)
            .map_err(|e| AuthError::Storage(format!("{e:#}")))?;
        tracing::info!("Authorization complete, credential stored");
        Ok(())
    }

    fn warn_scope_shortfall(&self, credential: &Credential) {
        if credential.scope.is_empty() {
            return;
        }
        let missing: Vec<&str> = self
            .scopes
            .iter()
            .map(|s| s.as_str())
            .filter(|requested| !credential.scope.iter().any(|g| g.as_str() == *requested))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "Vendor granted fewer scopes than requested, missing: {}",
                missing.join(" ")
            );
        }
    }
}

fn classify_refresh_error(err: &EndpointError) -> RefreshFailure {
    match err {
        RequestTokenError::ServerResponse(resp)
            if matches!(resp.error(), BasicErrorResponseType::InvalidGrant) =>
        {
            RefreshFailure::Terminal(resp.to_string())
        }
        other => RefreshFailure::Transient(describe_endpoint_error(other)),
    }
}

fn describe_endpoint_error(err: &EndpointError) -> String {
    match err {
        RequestTokenError::ServerResponse(resp) => resp.to_string(),
        RequestTokenError::Request(e) => format!("request failed: {e}"),
        RequestTokenError::Parse(e, _) => format!("malformed token response: {e}"),
        RequestTokenError::Other(msg) => msg.clone(),
    }
}
