//! Ticket service: TGT caching and on-demand service tickets

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use super::{Credentials, TicketApi};
use crate::cache::{KeyValueStore, KeyValueStoreExt, SessionKeys};
use crate::error::{ApiError, ApiResult};
use crate::session::{Principal, Session};

/// Default budget for a whole ticket cascade
pub const DEFAULT_TICKET_TIMEOUT: Duration = Duration::from_secs(15);

/// Owns the ticket-granting ticket and mints service tickets from it.
///
/// The TGT and the credentials it was obtained with live in the key-value
/// store so they survive restarts. Service tickets are never stored.
pub struct TicketService {
    api: Arc<dyn TicketApi>,
    store: Arc<dyn KeyValueStore>,
    session: Session,
    cas_url: String,
    timeout: Duration,
}

impl TicketService {
    /// Create a ticket service. `cas_url` is the service that login tickets
    /// are minted for and validated against.
    pub fn new(
        api: Arc<dyn TicketApi>,
        store: Arc<dyn KeyValueStore>,
        session: Session,
        cas_url: impl Into<String>,
    ) -> Self {
        Self {
            api,
            store,
            session,
            cas_url: cas_url.into(),
            timeout: DEFAULT_TICKET_TIMEOUT,
        }
    }

    /// Override the cascade timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get a fresh service ticket scoped to `target_url`.
    ///
    /// Uses the cached TGT when there is one. A missing TGT, or one the server
    /// rejects, triggers a new credential exchange followed by exactly one more
    /// service ticket request.
    pub async fn get_service_ticket(&self, target_url: &str) -> ApiResult<String> {
        self.with_timeout_budget(self.cascade(target_url)).await
    }

    /// Log in: obtain a TGT, validate a ticket for the CAS service itself and
    /// start a session with the resolved principal.
    pub async fn login(&self, credentials: Credentials) -> ApiResult<Principal> {
        self.with_timeout_budget(async {
            let tgt = self.api.request_tgt(&credentials).await?;
            let st = self.api.request_st(&tgt, &self.cas_url).await?;
            let principal = self.validate(&st).await?;

            self.persist(SessionKeys::CREDENTIALS, &credentials).await;
            self.persist(SessionKeys::TGT, &tgt).await;
            self.persist(SessionKeys::PRINCIPAL, &principal).await;
            self.session.init(principal.clone()).await;

            info!("Logged in as {}", principal.username);
            Ok(principal)
        })
        .await
    }

    /// Validate a service ticket minted for the CAS service
    pub async fn validate(&self, st: &str) -> ApiResult<Principal> {
        self.api.validate(st, &self.cas_url).await
    }

    /// Restore the session persisted by a previous login, if any
    pub async fn restore_session(&self) -> Option<Principal> {
        let principal: Principal = match self.store.get_as(SessionKeys::PRINCIPAL).await {
            Ok(Some(principal)) => principal,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to restore session: {}", e);
                return None;
            }
        };
        self.session.init(principal.clone()).await;
        Some(principal)
    }

    /// Log out: invalidate the TGT on the server, clear the store and end
    /// the session. Server-side failures are logged, not returned.
    pub async fn logout(&self) -> ApiResult<()> {
        if let Some(tgt) = self.cached_tgt().await {
            if let Err(e) = self.api.destroy_tgt(&tgt).await {
                warn!("Failed to invalidate ticket-granting ticket: {}", e);
            }
        }

        match self.store.clear().await {
            Ok(removed) => debug!("Cleared {} stored entries", removed),
            Err(e) => warn!("Failed to clear store on logout: {}", e),
        }
        self.session.teardown().await;
        Ok(())
    }

    async fn cascade(&self, target_url: &str) -> ApiResult<String> {
        if let Some(tgt) = self.cached_tgt().await {
            match self.api.request_st(&tgt, target_url).await {
                Ok(st) => return Ok(st),
                Err(ApiError::AuthenticationFailure { .. }) => {
                    debug!("Cached ticket-granting ticket rejected, re-authenticating");
                }
                Err(e) => return Err(e),
            }
        }

        let tgt = self.renew_tgt().await?;
        self.api.request_st(&tgt, target_url).await
    }

    async fn renew_tgt(&self) -> ApiResult<String> {
        let credentials: Credentials = match self.store.get_as(SessionKeys::CREDENTIALS).await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                return Err(ApiError::AuthenticationFailure {
                    password_must_change: false,
                });
            }
            Err(e) => {
                warn!("Failed to read stored credentials: {}", e);
                return Err(ApiError::AuthenticationFailure {
                    password_must_change: false,
                });
            }
        };

        let tgt = self.api.request_tgt(&credentials).await?;
        self.persist(SessionKeys::TGT, &tgt).await;
        Ok(tgt)
    }

    async fn cached_tgt(&self) -> Option<String> {
        match self.store.get_as::<String>(SessionKeys::TGT).await {
            Ok(tgt) => tgt.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Failed to read cached ticket-granting ticket: {}", e);
                None
            }
        }
    }

    async fn persist<T: serde::Serialize + Sync>(&self, key: &str, value: &T) {
        if let Err(e) = self.store.set_as(key, value).await {
            warn!("Failed to persist {}: {}", key, e);
        }
    }

    async fn with_timeout_budget<T>(
        &self,
        fut: impl std::future::Future<Output = ApiResult<T>>,
    ) -> ApiResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ApiError::TicketTimeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::cas::MockTicketApi;
    use crate::session::Role;

    const CAS: &str = "https://cas.example/cas";
    const API: &str = "https://api.example/ws";

    async fn service_with(
        api: MockTicketApi,
    ) -> (TicketService, Arc<MockTicketApi>, Arc<MemoryStore>) {
        let api = Arc::new(api);
        let store = Arc::new(MemoryStore::new());
        let service = TicketService::new(api.clone(), store.clone(), Session::new(), CAS);
        (service, api, store)
    }

    async fn store_credentials(store: &MemoryStore) {
        store
            .set_as(SessionKeys::CREDENTIALS, &Credentials::new("tp012345", "pw"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_uses_cached_tgt() {
        let (service, api, store) = service_with(MockTicketApi::new()).await;
        store.set_as(SessionKeys::TGT, &"TGT-cached").await.unwrap();

        let st = service.get_service_ticket(API).await.unwrap();

        assert!(st.starts_with("ST-"));
        assert_eq!(api.tgt_requests().await, 0);
        assert_eq!(api.st_requests().await, vec![("TGT-cached".to_string(), API.to_string())]);
    }

    #[tokio::test]
    async fn test_missing_tgt_runs_credential_exchange() {
        let (service, api, store) = service_with(MockTicketApi::new()).await;
        store_credentials(&store).await;

        service.get_service_ticket(API).await.unwrap();

        assert_eq!(api.tgt_requests().await, 1);
        let persisted: Option<String> = store.get_as(SessionKeys::TGT).await.unwrap();
        assert_eq!(persisted.as_deref(), Some("TGT-1"));
    }

    #[tokio::test]
    async fn test_rejected_tgt_is_renewed_once() {
        let api = MockTicketApi::new().with_rejected_tgt("TGT-stale");
        let (service, api, store) = service_with(api).await;
        store_credentials(&store).await;
        store.set_as(SessionKeys::TGT, &"TGT-stale").await.unwrap();

        let st = service.get_service_ticket(API).await.unwrap();

        assert!(st.starts_with("ST-"));
        assert_eq!(api.tgt_requests().await, 1);
        assert_eq!(api.st_requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_one_renewal() {
        let api = MockTicketApi::new().rejecting_all_tgts();
        let (service, api, store) = service_with(api).await;
        store_credentials(&store).await;
        store.set_as(SessionKeys::TGT, &"TGT-stale").await.unwrap();

        let result = service.get_service_ticket(API).await;

        assert_eq!(
            result,
            Err(ApiError::AuthenticationFailure {
                password_must_change: false
            })
        );
        assert_eq!(api.tgt_requests().await, 1);
        assert_eq!(api.st_requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_no_credentials_is_authentication_failure() {
        let (service, api, _store) = service_with(MockTicketApi::new()).await;

        let result = service.get_service_ticket(API).await;

        assert!(matches!(result, Err(ApiError::AuthenticationFailure { .. })));
        assert!(api.st_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_network_error_is_not_renewed() {
        let api = MockTicketApi::new().with_st_error(ApiError::TicketAcquisition("down".into()));
        let (service, api, store) = service_with(api).await;
        store_credentials(&store).await;
        store.set_as(SessionKeys::TGT, &"TGT-ok").await.unwrap();

        let result = service.get_service_ticket(API).await;

        assert_eq!(result, Err(ApiError::TicketAcquisition("down".into())));
        assert_eq!(api.tgt_requests().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cascade_timeout() {
        let api = MockTicketApi::new().with_delay(Duration::from_secs(60));
        let (service, _api, store) = service_with(api).await;
        let service = service.with_timeout(Duration::from_secs(15));
        store.set_as(SessionKeys::TGT, &"TGT-slow").await.unwrap();

        let result = service.get_service_ticket(API).await;

        assert_eq!(result, Err(ApiError::TicketTimeout(Duration::from_secs(15))));
    }

    #[tokio::test]
    async fn test_login_persists_tgt_and_starts_session() {
        let api = MockTicketApi::new().with_roles(&[Role::Student]);
        let (service, api, store) = service_with(api).await;

        let principal = service
            .login(Credentials::new("tp012345", "pw"))
            .await
            .unwrap();

        assert!(principal.roles.contains(Role::Student));
        assert!(service.session().is_active().await);
        assert_eq!(api.st_requests().await[0].1, CAS);
        let tgt: Option<String> = store.get_as(SessionKeys::TGT).await.unwrap();
        assert_eq!(tgt.as_deref(), Some("TGT-1"));
        let creds: Option<Credentials> = store.get_as(SessionKeys::CREDENTIALS).await.unwrap();
        assert_eq!(creds.map(|c| c.username), Some("tp012345".to_string()));
    }

    #[tokio::test]
    async fn test_login_unauthorized_leaves_no_session() {
        let api = MockTicketApi::new().with_roles(&[]);
        let (service, _api, store) = service_with(api).await;

        let result = service.login(Credentials::new("guest", "pw")).await;

        assert_eq!(result, Err(ApiError::AuthorizationFailure));
        assert!(!service.session().is_active().await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_login_password_expired() {
        let api = MockTicketApi::new().with_tgt_error(ApiError::AuthenticationFailure {
            password_must_change: true,
        });
        let (service, _api, _store) = service_with(api).await;

        let result = service.login(Credentials::new("tp012345", "old")).await;

        assert_eq!(
            result,
            Err(ApiError::AuthenticationFailure {
                password_must_change: true
            })
        );
    }

    #[tokio::test]
    async fn test_restore_session() {
        let api = MockTicketApi::new().with_roles(&[Role::Lecturer]);
        let (service, _api, store) = service_with(api).await;
        service
            .login(Credentials::new("tp012345", "pw"))
            .await
            .unwrap();

        let fresh = TicketService::new(
            Arc::new(MockTicketApi::new()),
            store.clone(),
            Session::new(),
            CAS,
        );
        let restored = fresh.restore_session().await.unwrap();

        assert_eq!(restored.username, "tp012345");
        assert!(fresh.session().roles().await.contains(Role::Lecturer));
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let api = MockTicketApi::new().with_roles(&[Role::Student]);
        let (service, api, store) = service_with(api).await;
        service
            .login(Credentials::new("tp012345", "pw"))
            .await
            .unwrap();
        store.set("/student/profile", &serde_json::json!({})).await.unwrap();

        service.logout().await.unwrap();

        assert!(store.is_empty().await);
        assert!(!service.session().is_active().await);
        assert_eq!(api.destroyed().await, vec!["TGT-1".to_string()]);
    }
}
