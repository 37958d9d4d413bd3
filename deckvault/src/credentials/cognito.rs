//! Cognito Identity provider.
//!
//! Talks to the Cognito Identity JSON API directly: `GetId` resolves the
//! identity for the signed-in user's ID token, `GetCredentialsForIdentity`
//! mints the scoped credential. Wire error codes are mapped onto
//! [`ProviderError`] here and nowhere else.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::ProviderError;
use super::provider::IdentitySessionProvider;
use super::types::{IdentitySession, ScopedCredential, SessionUser};

const TARGET_PREFIX: &str = "AWSCognitoIdentityService";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Connection settings for the Cognito Identity API.
#[derive(Debug, Clone)]
pub struct CognitoConfig {
    pub region: String,
    pub identity_pool_id: String,
    /// User pool that issued the ID token. Without it requests carry no logins.
    pub user_pool_id: Option<String>,
    /// Endpoint override, e.g. a local emulator.
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

impl CognitoConfig {
    pub fn new(region: impl Into<String>, identity_pool_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            identity_pool_id: identity_pool_id.into(),
            user_pool_id: None,
            endpoint: None,
            timeout: Duration::from_secs(30),
        }
    }

    fn endpoint_url(&self) -> Result<Url, ProviderError> {
        let raw = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://cognito-identity.{}.amazonaws.com/", self.region),
        };
        Url::parse(&raw)
            .map_err(|e| ProviderError::InvalidResponse(format!("invalid Cognito endpoint {raw}: {e}")))
    }

    fn login_provider(&self) -> Option<String> {
        self.user_pool_id
            .as_ref()
            .map(|pool| format!("cognito-idp.{}.amazonaws.com/{}", self.region, pool))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetIdRequest<'a> {
    identity_pool_id: &'a str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    logins: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetIdResponse {
    identity_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetCredentialsRequest<'a> {
    identity_id: &'a str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    logins: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCredentialsResponse {
    identity_id: Option<String>,
    credentials: Option<WireCredentials>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireCredentials {
    access_key_id: Option<String>,
    secret_key: Option<String>,
    session_token: Option<String>,
    /// Seconds since the epoch.
    expiration: Option<f64>,
}

impl WireCredentials {
    fn into_scoped(self) -> ScopedCredential {
        let mut credential = ScopedCredential::new(
            self.access_key_id.unwrap_or_default(),
            self.secret_key.unwrap_or_default(),
        );
        credential.session_token = self.session_token;
        credential.expiration = self.expiration.and_then(epoch_seconds);
        credential
    }
}

fn epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999))
}

#[derive(Deserialize)]
struct WireError {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Map an error response onto a [`ProviderError`].
pub(crate) fn classify_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let parsed: Option<WireError> = serde_json::from_str(body).ok();
    let (code, message) = match parsed {
        Some(err) => (
            err.kind
                .map(|kind| kind.rsplit('#').next().unwrap_or_default().to_string())
                .unwrap_or_default(),
            err.message.unwrap_or_default(),
        ),
        None => (String::new(), body.trim().to_string()),
    };
    let detail = if message.is_empty() {
        format!("{code} (HTTP {status})")
    } else {
        format!("{code}: {message}")
    };

    match code.as_str() {
        "NotAuthorizedException" => ProviderError::NotAuthenticated(detail),
        "TooManyRequestsException" | "LimitExceededException" => {
            ProviderError::RateLimited(detail)
        }
        "ResourceNotFoundException" => ProviderError::SessionUnavailable(detail),
        _ if status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::RateLimited(detail)
        }
        _ => ProviderError::Transient(detail),
    }
}

/// Claims read from the ID token payload. The signature is verified by
/// Cognito itself when the token is presented.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    #[serde(rename = "cognito:username")]
    username: Option<String>,
    exp: Option<i64>,
}

fn decode_claims(token: &str) -> Result<IdTokenClaims, ProviderError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ProviderError::NotAuthenticated("malformed ID token".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ProviderError::NotAuthenticated(format!("malformed ID token: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ProviderError::NotAuthenticated(format!("malformed ID token claims: {e}")))
}

/// Identity provider backed by a Cognito identity pool.
pub struct CognitoIdentityProvider {
    client: reqwest::Client,
    config: CognitoConfig,
    endpoint: Url,
    id_token: RwLock<Option<String>>,
    identity_id: Mutex<Option<String>>,
}

impl CognitoIdentityProvider {
    pub fn new(config: CognitoConfig) -> Result<Self, ProviderError> {
        install_rustls_provider();
        let endpoint = config.endpoint_url()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transient(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            endpoint,
            id_token: RwLock::new(None),
            identity_id: Mutex::new(None),
        })
    }

    pub fn with_id_token(self, token: impl Into<String>) -> Self {
        self.set_id_token(token);
        self
    }

    /// Record a new sign-in. The resolved identity is dropped with the old token.
    pub fn set_id_token(&self, token: impl Into<String>) {
        *self.id_token.write() = Some(token.into());
        self.identity_id.lock().take();
    }

    /// Sign out.
    pub fn clear_id_token(&self) {
        self.id_token.write().take();
        self.identity_id.lock().take();
    }

    fn logins(&self) -> HashMap<String, String> {
        let mut logins = HashMap::new();
        if let (Some(provider), Some(token)) =
            (self.config.login_provider(), self.id_token.read().clone())
        {
            logins.insert(provider, token);
        }
        logins
    }

    async fn call<B, R>(&self, operation: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(serde_json::to_vec(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let err = classify_error(status, &text);
            debug!(operation, %status, error = %err, "Cognito request failed");
            return Err(err);
        }

        serde_json::from_str(&text).map_err(|e| {
            ProviderError::InvalidResponse(format!("{operation} response: {e}"))
        })
    }

    async fn resolve_identity(&self) -> Result<String, ProviderError> {
        if let Some(id) = self.identity_id.lock().clone() {
            return Ok(id);
        }

        let request = GetIdRequest {
            identity_pool_id: &self.config.identity_pool_id,
            logins: self.logins(),
        };
        let response: GetIdResponse = self.call("GetId", &request).await?;
        debug!(identity_id = %response.identity_id, "Resolved Cognito identity");
        *self.identity_id.lock() = Some(response.identity_id.clone());
        Ok(response.identity_id)
    }
}

#[async_trait]
impl IdentitySessionProvider for CognitoIdentityProvider {
    async fn current_user(&self) -> Result<SessionUser, ProviderError> {
        let token = self
            .id_token
            .read()
            .clone()
            .ok_or_else(|| ProviderError::NotAuthenticated("no signed-in user".to_string()))?;
        let claims = decode_claims(&token)?;

        if let Some(exp) = claims.exp
            && exp <= Utc::now().timestamp()
        {
            return Err(ProviderError::NotAuthenticated("ID token expired".to_string()));
        }

        Ok(SessionUser {
            user_id: claims.sub,
            username: claims.username,
            email: claims.email,
        })
    }

    #[instrument(skip(self), fields(pool = %self.config.identity_pool_id))]
    async fn fetch_session(&self) -> Result<IdentitySession, ProviderError> {
        let identity_id = self.resolve_identity().await?;
        let request = GetCredentialsRequest {
            identity_id: &identity_id,
            logins: self.logins(),
        };

        let response: GetCredentialsResponse =
            match self.call("GetCredentialsForIdentity", &request).await {
                Ok(response) => response,
                Err(err @ ProviderError::SessionUnavailable(_)) => {
                    warn!(identity_id = %identity_id, "Cognito identity not found; will resolve again");
                    self.identity_id.lock().take();
                    return Err(err);
                }
                Err(err) => return Err(err),
            };

        Ok(IdentitySession {
            credentials: response.credentials.map(WireCredentials::into_scoped),
            identity_id: response.identity_id.or(Some(identity_id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use rstest::rstest;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    type Recorded = Arc<Mutex<Vec<(String, String)>>>;

    fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
        head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    /// Read one HTTP request, returning its head and body.
    async fn read_request(socket: &mut TcpStream) -> (String, String) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = header(&text[..end], "content-length")
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return (text[..end].to_string(), text[end + 4..].to_string());
                }
            }
        }
        (String::from_utf8_lossy(&buf).into_owned(), String::new())
    }

    /// Local Cognito endpoint answering each connection with the next canned
    /// response. Records the target operation and body of every request.
    async fn stub_endpoint(responses: Vec<(u16, String)>) -> (String, Recorded) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
        let seen = recorded.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let (head, request_body) = read_request(&mut socket).await;
                let target = header(&head, "x-amz-target").unwrap_or_default().to_string();
                seen.lock().push((target, request_body));

                let reply = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: {CONTENT_TYPE}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/"), recorded)
    }

    fn token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    fn provider() -> CognitoIdentityProvider {
        let mut config = CognitoConfig::new("eu-west-1", "eu-west-1:pool");
        config.user_pool_id = Some("eu-west-1_ABC".to_string());
        CognitoIdentityProvider::new(config).unwrap()
    }

    #[rstest]
    #[case(StatusCode::BAD_REQUEST, r#"{"__type":"NotAuthorizedException","message":"Token expired"}"#, "not_authenticated")]
    #[case(StatusCode::BAD_REQUEST, r#"{"__type":"com.amazonaws#TooManyRequestsException","message":"slow down"}"#, "rate_limited")]
    #[case(StatusCode::BAD_REQUEST, r#"{"__type":"LimitExceededException"}"#, "rate_limited")]
    #[case(StatusCode::BAD_REQUEST, r#"{"__type":"ResourceNotFoundException","Message":"Identity not found"}"#, "session_unavailable")]
    #[case(StatusCode::TOO_MANY_REQUESTS, "throttled", "rate_limited")]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, r#"{"__type":"InternalErrorException"}"#, "transient")]
    #[case(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>", "transient")]
    fn maps_wire_errors(#[case] status: StatusCode, #[case] body: &str, #[case] expected: &str) {
        let kind = match classify_error(status, body) {
            ProviderError::NotAuthenticated(_) => "not_authenticated",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::SessionUnavailable(_) => "session_unavailable",
            ProviderError::Transient(_) => "transient",
            ProviderError::InvalidResponse(_) => "invalid_response",
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn error_detail_keeps_the_service_message() {
        let err = classify_error(
            StatusCode::BAD_REQUEST,
            r#"{"__type":"NotAuthorizedException","message":"Invalid login token"}"#,
        );
        assert_eq!(
            err,
            ProviderError::NotAuthenticated("NotAuthorizedException: Invalid login token".into())
        );
    }

    #[test]
    fn parses_credentials_payload() {
        let body = r#"{
            "IdentityId": "eu-west-1:abc",
            "Credentials": {
                "AccessKeyId": "ASIAEXAMPLE",
                "SecretKey": "secret",
                "SessionToken": "token",
                "Expiration": 1700000000.5
            }
        }"#;
        let response: GetCredentialsResponse = serde_json::from_str(body).unwrap();
        let credential = response.credentials.unwrap().into_scoped();

        assert_eq!(credential.access_key_id, "ASIAEXAMPLE");
        assert_eq!(credential.session_token.as_deref(), Some("token"));
        let expiration = credential.expiration.unwrap();
        assert_eq!(expiration.timestamp(), 1_700_000_000);
        assert_eq!(expiration.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn missing_secret_yields_incomplete_credential() {
        let body = r#"{"Credentials": {"AccessKeyId": "ASIA"}}"#;
        let response: GetCredentialsResponse = serde_json::from_str(body).unwrap();
        assert!(!response.credentials.unwrap().into_scoped().is_complete());
    }

    #[test]
    fn endpoint_defaults_to_regional_host() {
        let config = CognitoConfig::new("us-east-1", "pool");
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "https://cognito-identity.us-east-1.amazonaws.com/"
        );

        let mut custom = config.clone();
        custom.endpoint = Some("not a url".into());
        assert!(custom.endpoint_url().is_err());
    }

    #[test]
    fn logins_require_pool_and_token() {
        let provider = provider();
        assert!(provider.logins().is_empty());

        provider.set_id_token("tok");
        let logins = provider.logins();
        assert_eq!(
            logins.get("cognito-idp.eu-west-1.amazonaws.com/eu-west-1_ABC"),
            Some(&"tok".to_string())
        );
    }

    #[tokio::test]
    async fn current_user_reads_token_claims() {
        let exp = Utc::now().timestamp() + 600;
        let provider = provider().with_id_token(token(serde_json::json!({
            "sub": "user-123",
            "email": "jace@example.com",
            "cognito:username": "jace",
            "exp": exp,
        })));

        let user = provider.current_user().await.unwrap();
        assert_eq!(user.user_id, "user-123");
        assert_eq!(user.username.as_deref(), Some("jace"));
        assert_eq!(user.email.as_deref(), Some("jace@example.com"));
    }

    #[tokio::test]
    async fn expired_or_missing_token_is_not_authenticated() {
        let provider = provider();
        assert!(provider.current_user().await.unwrap_err().requires_relogin());

        provider.set_id_token(token(serde_json::json!({
            "sub": "user-123",
            "exp": Utc::now().timestamp() - 1,
        })));
        assert!(provider.current_user().await.unwrap_err().requires_relogin());

        provider.set_id_token("garbage");
        assert!(provider.current_user().await.unwrap_err().requires_relogin());

        provider.clear_id_token();
        assert!(provider.current_user().await.unwrap_err().requires_relogin());
    }

    #[tokio::test]
    async fn missing_identity_is_resolved_again_on_next_fetch() {
        let credentials = r#"{
            "IdentityId": "eu-west-1:def",
            "Credentials": {
                "AccessKeyId": "ASIAFRESH",
                "SecretKey": "secret",
                "SessionToken": "session",
                "Expiration": 1700000000
            }
        }"#;
        let (endpoint, recorded) = stub_endpoint(vec![
            (200, r#"{"IdentityId":"eu-west-1:abc"}"#.to_string()),
            (
                400,
                r#"{"__type":"ResourceNotFoundException","message":"Identity 'eu-west-1:abc' not found."}"#
                    .to_string(),
            ),
            (200, r#"{"IdentityId":"eu-west-1:def"}"#.to_string()),
            (200, credentials.to_string()),
        ])
        .await;

        let mut config = CognitoConfig::new("eu-west-1", "eu-west-1:pool");
        config.user_pool_id = Some("eu-west-1_ABC".to_string());
        config.endpoint = Some(endpoint);
        config.timeout = Duration::from_secs(5);
        let provider = CognitoIdentityProvider::new(config)
            .unwrap()
            .with_id_token("id-token");

        let err = provider.fetch_session().await.unwrap_err();
        assert!(matches!(err, ProviderError::SessionUnavailable(_)));
        assert!(provider.identity_id.lock().is_none());

        let session = provider.fetch_session().await.unwrap();
        assert_eq!(session.identity_id.as_deref(), Some("eu-west-1:def"));
        let credential = session.credentials.unwrap();
        assert_eq!(credential.access_key_id, "ASIAFRESH");
        assert_eq!(credential.session_token.as_deref(), Some("session"));
        assert_eq!(credential.expiration.unwrap().timestamp(), 1_700_000_000);

        let requests = recorded.lock().clone();
        let targets: Vec<&str> = requests.iter().map(|(target, _)| target.as_str()).collect();
        assert_eq!(
            targets,
            [
                "AWSCognitoIdentityService.GetId",
                "AWSCognitoIdentityService.GetCredentialsForIdentity",
                "AWSCognitoIdentityService.GetId",
                "AWSCognitoIdentityService.GetCredentialsForIdentity",
            ]
        );

        let get_id: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
        assert_eq!(get_id["IdentityPoolId"], "eu-west-1:pool");
        assert_eq!(
            get_id["Logins"]["cognito-idp.eu-west-1.amazonaws.com/eu-west-1_ABC"],
            "id-token"
        );
        let first: serde_json::Value = serde_json::from_str(&requests[1].1).unwrap();
        assert_eq!(first["IdentityId"], "eu-west-1:abc");
        let retried: serde_json::Value = serde_json::from_str(&requests[3].1).unwrap();
        assert_eq!(retried["IdentityId"], "eu-west-1:def");
    }

    #[tokio::test]
    async fn resolved_identity_is_reused_across_fetches() {
        let credentials = r#"{"Credentials":{"AccessKeyId":"ASIA","SecretKey":"s"}}"#;
        let (endpoint, recorded) = stub_endpoint(vec![
            (200, r#"{"IdentityId":"eu-west-1:abc"}"#.to_string()),
            (200, credentials.to_string()),
            (200, credentials.to_string()),
        ])
        .await;

        let mut config = CognitoConfig::new("eu-west-1", "eu-west-1:pool");
        config.endpoint = Some(endpoint);
        let provider = CognitoIdentityProvider::new(config).unwrap();

        for _ in 0..2 {
            let session = provider.fetch_session().await.unwrap();
            assert_eq!(session.identity_id.as_deref(), Some("eu-west-1:abc"));
        }

        let requests = recorded.lock().clone();
        let get_id_calls = requests
            .iter()
            .filter(|(target, _)| target.ends_with(".GetId"))
            .count();
        assert_eq!(get_id_calls, 1);
        assert_eq!(requests.len(), 3);
        let get_id: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
        assert!(get_id.get("Logins").is_none());
    }
}
