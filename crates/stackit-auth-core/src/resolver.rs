//! Credential resolver - turns a profile override into a usable access token.
//!
//! Resolution: profile -> store read -> expiry check -> refresh -> write-back.
//! Refreshes are single-flight per profile: concurrent callers for the same
//! expired profile share one refresh-token exchange and its outcome. The
//! exchange runs as its own Tokio task, so it completes and writes back even
//! when every caller has given up waiting.

use crate::credential::Credential;
use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use crate::profile::{ProfileResolver, ResolvedProfile};
use crate::refresh::{OAuthTokenRefresher, RefreshConfig, TokenRefresher};
use crate::store::{CredentialStore, SecretBackend, SystemKeyring};
use chrono::Duration;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

type RefreshFuture = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;

type InFlight = Arc<Mutex<HashMap<String, RefreshFlight>>>;

struct RefreshFlight {
    id: u64,
    future: RefreshFuture,
}

/// Removes a finished flight from the map, including when its task panics.
struct FlightGuard {
    in_flight: InFlight,
    profile: String,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(&self.profile)
            .is_some_and(|flight| flight.id == self.id)
        {
            in_flight.remove(&self.profile);
        }
    }
}

/// Resolves currently valid STACKIT CLI credentials.
///
/// Safe to share across tasks (`Arc<CredentialResolver>`). Refreshing
/// requires a Tokio runtime.
pub struct CredentialResolver {
    environment: AuthEnvironment,
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    safety_margin: Duration,
    in_flight: InFlight,
    next_flight_id: AtomicU64,
}

impl CredentialResolver {
    pub fn new(
        environment: AuthEnvironment,
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            environment,
            store,
            refresher,
            safety_margin: RefreshConfig::default().safety_margin(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_flight_id: AtomicU64::new(0),
        }
    }

    /// Resolver over the process environment, the system keyring and the
    /// STACKIT token endpoint.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::with_config(
            AuthEnvironment::from_env()?,
            Arc::new(SystemKeyring::new()),
            &RefreshConfig::default(),
        )
    }

    pub fn with_config(
        environment: AuthEnvironment,
        secrets: Arc<dyn SecretBackend>,
        config: &RefreshConfig,
    ) -> Result<Self, AuthError> {
        let store = CredentialStore::for_environment(&environment, secrets);
        let refresher = OAuthTokenRefresher::new(config)?;
        Ok(Self::new(environment, Arc::new(store), Arc::new(refresher))
            .with_safety_margin(config.safety_margin()))
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Determine the active profile and which input selected it.
    pub fn resolve_profile(
        &self,
        profile_override: Option<&str>,
    ) -> Result<ResolvedProfile, AuthError> {
        ProfileResolver::new(&self.environment).resolve(profile_override)
    }

    /// Read the stored credential without refreshing it.
    pub fn inspect(&self, profile_override: Option<&str>) -> Result<Credential, AuthError> {
        let profile = self.resolve_profile(profile_override)?;
        self.store.read(&profile.name)
    }

    /// Return a credential whose access token is outside the safety margin,
    /// refreshing and writing it back first when needed.
    pub async fn resolve_credential(
        &self,
        profile_override: Option<&str>,
    ) -> Result<Credential, AuthError> {
        let profile = self.resolve_profile(profile_override)?;
        let credential = self.store.read(&profile.name)?;

        if !credential.is_expired(self.safety_margin) {
            debug!(
                profile = %profile.name,
                location = ?credential.storage_location,
                "Using stored access token"
            );
            return Ok(credential);
        }

        debug!(
            profile = %profile.name,
            expires_at = ?credential.expires_at,
            "Access token expired or about to expire"
        );
        self.refresh_single_flight(&profile.name, credential, false)
            .await
    }

    /// Return a currently valid access token.
    pub async fn resolve(&self, profile_override: Option<&str>) -> Result<String, AuthError> {
        self.resolve_credential(profile_override)
            .await
            .map(|credential| credential.access_token)
    }

    /// Pre-flight check: whether [`resolve`](Self::resolve) succeeds.
    ///
    /// A stale credential that refreshes successfully counts as authenticated.
    pub async fn is_authenticated(&self, profile_override: Option<&str>) -> bool {
        match self.resolve(profile_override).await {
            Ok(token) => !token.is_empty(),
            Err(e) => {
                debug!(error = %e, "Not authenticated");
                false
            }
        }
    }

    /// Refresh regardless of expiry and write the result back.
    pub async fn force_refresh(
        &self,
        profile_override: Option<&str>,
    ) -> Result<Credential, AuthError> {
        let profile = self.resolve_profile(profile_override)?;
        let credential = self.store.read(&profile.name)?;
        self.refresh_single_flight(&profile.name, credential, true)
            .await
    }

    async fn refresh_single_flight(
        &self,
        profile: &str,
        credential: Credential,
        force: bool,
    ) -> Result<Credential, AuthError> {
        let future = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(profile) {
                Some(flight) => {
                    debug!(profile, "Joining in-flight token refresh");
                    flight.future.clone()
                }
                None => {
                    let id = self.next_flight_id.fetch_add(1, Ordering::Relaxed);
                    let guard = FlightGuard {
                        in_flight: self.in_flight.clone(),
                        profile: profile.to_string(),
                        id,
                    };
                    let task = tokio::spawn(refresh_and_persist(
                        self.store.clone(),
                        self.refresher.clone(),
                        profile.to_string(),
                        credential,
                        self.safety_margin,
                        force,
                        guard,
                    ));
                    let future = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(AuthError::RefreshTransport(format!(
                                "refresh task failed: {}",
                                e
                            )))
                        })
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(
                        profile.to_string(),
                        RefreshFlight {
                            id,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        future.await
    }
}

async fn refresh_and_persist(
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    profile: String,
    credential: Credential,
    safety_margin: Duration,
    force: bool,
    _guard: FlightGuard,
) -> Result<Credential, AuthError> {
    let current = if force {
        credential
    } else {
        // An earlier flight, or the CLI in another process, may have stored
        // a fresh token since this caller read it.
        match store.read(&profile) {
            Ok(latest) if !latest.is_expired(safety_margin) => {
                debug!(profile = %profile, "Stored credential already refreshed");
                return Ok(latest);
            }
            Ok(latest) => latest,
            Err(e) => {
                warn!(profile = %profile, error = %e, "Re-reading credentials before refresh failed");
                credential
            }
        }
    };

    let mut refreshed = refresher.refresh(&current).await?;
    let location = store.write(&profile, &refreshed)?;
    refreshed.storage_location = Some(location);

    info!(
        profile = %profile,
        location = %location,
        expires_at = ?refreshed.expires_at,
        "Refreshed access token"
    );
    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StorageLocation;
    use crate::store::MemoryKeyring;
    use crate::{DEFAULT_PROFILE, KeyringError};
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use chrono::Utc;
    use reqwest::Client;
    use serde_json::{Value, json};
    use std::path::Path;
    use tempfile::{TempDir, tempdir};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Keyring capability that is never available.
    struct NoKeyring;

    impl SecretBackend for NoKeyring {
        fn get(&self, _service: &str, _key: &str) -> Result<String, KeyringError> {
            Err(KeyringError::NoEntry)
        }

        fn set(&self, _service: &str, _key: &str, _value: &str) -> Result<(), KeyringError> {
            Err(KeyringError::Platform("keyring locked".to_string()))
        }

        fn delete(&self, _service: &str, _key: &str) -> Result<(), KeyringError> {
            Err(KeyringError::Platform("keyring locked".to_string()))
        }
    }

    struct Fixture {
        resolver: Arc<CredentialResolver>,
        env: AuthEnvironment,
        _home: TempDir,
    }

    fn fixture(server: &MockServer, secrets: Arc<dyn SecretBackend>) -> Fixture {
        let home = tempdir().unwrap();
        let env = AuthEnvironment::new(home.path());
        let config = RefreshConfig {
            token_endpoint: format!("{}/oauth2/token", server.uri()),
            ..RefreshConfig::default()
        };
        let client = Client::builder()
            .no_proxy()
            .build()
            .expect("Failed to create HTTP client");
        let store = Arc::new(CredentialStore::for_environment(&env, secrets));
        let refresher = Arc::new(OAuthTokenRefresher::with_client(client, &config));
        let resolver = CredentialResolver::new(env.clone(), store, refresher)
            .with_safety_margin(config.safety_margin());
        Fixture {
            resolver: Arc::new(resolver),
            env,
            _home: home,
        }
    }

    fn write_credentials_file(env: &AuthEnvironment, profile: &str, record: Value) {
        let path = env.credentials_file(profile, DEFAULT_PROFILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, STANDARD.encode(record.to_string())).unwrap();
    }

    fn read_credentials_file(path: &Path) -> Value {
        let encoded = std::fs::read_to_string(path).unwrap();
        serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap()
    }

    fn expiring_record() -> Value {
        json!({
            "access_token": "A",
            "refresh_token": "R",
            "user_email": "e@x.com",
            "session_expires_at_unix": (Utc::now() + Duration::minutes(5)).timestamp().to_string(),
        })
    }

    async fn mount_token_endpoint(server: &MockServer, body: Value, delay_ms: u64, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body)
                    .set_delay(std::time::Duration::from_millis(delay_ms)),
            )
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_expiring_file_credential_is_refreshed_and_written_back() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, json!({"access_token": "A2", "expires_in": 3600}), 0, 1)
            .await;
        let fx = fixture(&server, Arc::new(NoKeyring));
        write_credentials_file(&fx.env, "default", expiring_record());

        let token = fx.resolver.resolve(Some("default")).await.unwrap();
        assert_eq!(token, "A2");

        let stored = read_credentials_file(&fx.env.credentials_file("default", DEFAULT_PROFILE));
        assert_eq!(stored["access_token"], "A2");
        assert_eq!(stored["refresh_token"], "R");
        assert_eq!(stored["user_email"], "e@x.com");
        let expiry: i64 = stored["session_expires_at_unix"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(expiry > (Utc::now() + Duration::minutes(55)).timestamp());
    }

    #[tokio::test]
    async fn test_valid_credential_skips_refresh() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, json!({"access_token": "never"}), 0, 0).await;
        let fx = fixture(&server, Arc::new(MemoryKeyring::new()));
        let mut record = expiring_record();
        record["session_expires_at_unix"] =
            json!((Utc::now() + Duration::hours(1)).timestamp().to_string());
        write_credentials_file(&fx.env, "default", record);

        let credential = fx.resolver.resolve_credential(None).await.unwrap();
        assert_eq!(credential.access_token, "A");
        assert_eq!(credential.source_profile, "default");
        assert_eq!(credential.storage_location, Some(StorageLocation::File));
    }

    #[tokio::test]
    async fn test_credential_without_expiry_is_never_refreshed() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, json!({"access_token": "never"}), 0, 0).await;
        let fx = fixture(&server, Arc::new(MemoryKeyring::new()));
        write_credentials_file(
            &fx.env,
            "default",
            json!({"access_token": "A", "refresh_token": "R", "user_email": "e@x.com"}),
        );

        assert_eq!(fx.resolver.resolve(None).await.unwrap(), "A");
        assert!(fx.resolver.is_authenticated(None).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_share_one_refresh() {
        let server = MockServer::start().await;
        mount_token_endpoint(
            &server,
            json!({"access_token": "A2", "refresh_token": "R2", "expires_in": 3600}),
            200,
            1,
        )
        .await;
        let fx = fixture(&server, Arc::new(MemoryKeyring::new()));
        write_credentials_file(&fx.env, "default", expiring_record());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = fx.resolver.clone();
                tokio::spawn(async move { resolver.resolve(None).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "A2");
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_refresh_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string("invalid_grant")
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let fx = fixture(&server, Arc::new(NoKeyring));
        write_credentials_file(&fx.env, "default", expiring_record());

        let results = futures::future::join_all((0..4).map(|_| fx.resolver.resolve(None))).await;
        for result in results {
            let err = result.unwrap_err();
            assert!(err.is_refresh_error());
            assert!(err.to_string().contains("invalid_grant"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_refresh_still_completes_and_writes_back() {
        let server = MockServer::start().await;
        mount_token_endpoint(
            &server,
            json!({"access_token": "A2", "refresh_token": "R2", "expires_in": 3600}),
            300,
            1,
        )
        .await;
        let fx = fixture(&server, Arc::new(NoKeyring));
        write_credentials_file(&fx.env, "default", expiring_record());

        let first =
            tokio::time::timeout(std::time::Duration::from_millis(50), fx.resolver.resolve(None))
                .await;
        assert!(first.is_err(), "caller deadline should fire before the response");

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;

        let stored = read_credentials_file(&fx.env.credentials_file("default", DEFAULT_PROFILE));
        assert_eq!(stored["access_token"], "A2");
        assert_eq!(stored["refresh_token"], "R2");
        assert_eq!(fx.resolver.resolve(None).await.unwrap(), "A2");
        assert!(fx.resolver.in_flight.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_caller_joining_after_abandoned_wait_gets_result() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, json!({"access_token": "A2", "expires_in": 3600}), 300, 1)
            .await;
        let fx = fixture(&server, Arc::new(NoKeyring));
        write_credentials_file(&fx.env, "default", expiring_record());

        let first =
            tokio::time::timeout(std::time::Duration::from_millis(50), fx.resolver.resolve(None))
                .await;
        assert!(first.is_err());

        // Joins the flight that is still running.
        assert_eq!(fx.resolver.resolve(None).await.unwrap(), "A2");
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_stored_credential_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;
        let fx = fixture(&server, Arc::new(NoKeyring));
        let record = expiring_record();
        write_credentials_file(&fx.env, "default", record.clone());

        let err = fx.resolver.resolve(None).await.unwrap_err();
        assert_eq!(
            err,
            AuthError::RefreshRejected {
                status: 500,
                body: "upstream down".to_string()
            }
        );
        assert!(!fx.resolver.is_authenticated(None).await);

        let stored = read_credentials_file(&fx.env.credentials_file("default", DEFAULT_PROFILE));
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_keyring_credential_written_back_to_keyring() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, json!({"access_token": "A2", "expires_in": 600}), 0, 1)
            .await;
        let secrets = Arc::new(MemoryKeyring::new());
        let service = "stackit-cli-provider/work";
        secrets.set(service, "access_token", "A").unwrap();
        secrets.set(service, "refresh_token", "R").unwrap();
        secrets.set(service, "user_email", "e@x.com").unwrap();
        secrets
            .set(
                service,
                "session_expires_at_unix",
                &(Utc::now() - Duration::minutes(1)).timestamp().to_string(),
            )
            .unwrap();
        let fx = fixture(&server, secrets.clone());

        let credential = fx.resolver.resolve_credential(Some("work")).await.unwrap();
        assert_eq!(credential.access_token, "A2");
        assert_eq!(credential.storage_location, Some(StorageLocation::Keyring));
        assert_eq!(secrets.get(service, "access_token").unwrap(), "A2");
        assert!(!fx.env.credentials_file("work", DEFAULT_PROFILE).exists());
    }

    #[tokio::test]
    async fn test_force_refresh_ignores_expiry() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, json!({"access_token": "A2"}), 0, 1).await;
        let fx = fixture(&server, Arc::new(NoKeyring));
        write_credentials_file(
            &fx.env,
            "default",
            json!({
                "access_token": "A",
                "refresh_token": "R",
                "user_email": "e@x.com",
                "session_expires_at_unix": (Utc::now() + Duration::hours(2)).timestamp().to_string(),
            }),
        );

        let credential = fx.resolver.force_refresh(None).await.unwrap();
        assert_eq!(credential.access_token, "A2");
        assert!(credential.expires_at.is_none());

        // The stale expiry must not survive the write-back.
        let stored = read_credentials_file(&fx.env.credentials_file("default", DEFAULT_PROFILE));
        assert!(stored.get("session_expires_at_unix").is_none());
    }

    #[tokio::test]
    async fn test_missing_credentials_is_not_authenticated() {
        let server = MockServer::start().await;
        let fx = fixture(&server, Arc::new(MemoryKeyring::new()));

        let err = fx.resolver.resolve(None).await.unwrap_err();
        assert!(matches!(err, AuthError::CredentialsNotFound { .. }));
        assert!(err.requires_login());
        assert!(!fx.resolver.is_authenticated(None).await);
    }

    #[tokio::test]
    async fn test_inspect_does_not_refresh() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, json!({"access_token": "never"}), 0, 0).await;
        let fx = fixture(&server, Arc::new(MemoryKeyring::new()));
        write_credentials_file(&fx.env, "default", expiring_record());

        let credential = fx.resolver.inspect(None).unwrap();
        assert_eq!(credential.access_token, "A");
        assert!(credential.is_expired(fx.resolver.safety_margin()));
    }
}
