//! Core API endpoints, credentials and the web-app endpoint switch.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sigil_core::constants::DEFAULT_CORE_API_URL;
use sigil_core::error::FetchError;
use sigil_core::traits::{EndpointPolicy, HttpClient};
use sigil_core::types::HttpRequest;

/// Default mailing-list endpoint for backup reminders.
pub const DEFAULT_EMAILER_URL: &str = "https://blockstack-portal-emailer.appartisan.com/notifications";

/// Default per-address balance endpoint. Returns confirmed satoshis as plain text.
pub const DEFAULT_BALANCE_URL: &str = "https://blockchain.info/q/addressbalance/";

/// Value of the `Authorization` header for Core API calls.
pub fn authorization_header_value(password: &str) -> String {
    format!("bearer {password}")
}

/// Disables every Core API endpoint in web-app builds.
///
/// A web-app build has no local Core node, so anything under `core_api_url`
/// is never contacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreEndpointPolicy {
    pub webapp_build: bool,
    pub core_api_url: String,
}

impl CoreEndpointPolicy {
    pub fn new(webapp_build: bool, core_api_url: impl Into<String>) -> Self {
        Self {
            webapp_build,
            core_api_url: core_api_url.into(),
        }
    }

    /// Policy for a web-app build against the default Core API.
    pub fn webapp() -> Self {
        Self::new(true, DEFAULT_CORE_API_URL)
    }
}

impl Default for CoreEndpointPolicy {
    fn default() -> Self {
        Self::new(false, DEFAULT_CORE_API_URL)
    }
}

impl EndpointPolicy for CoreEndpointPolicy {
    fn is_disabled(&self, url: &str) -> bool {
        self.webapp_build && url.starts_with(self.core_api_url.trim_end_matches('/'))
    }
}

/// Endpoints used by the account operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUrls {
    /// Prefix that the address is appended to.
    pub balance_url: String,
    pub core_ping_url: String,
    pub core_password_protected_read_url: String,
    pub wallet_payment_address_url: String,
    pub core_wallet_balance_url: String,
    pub core_wallet_withdraw_url: String,
    pub emailer_url: String,
}

impl ServiceUrls {
    /// Core endpoints rooted at `core_api_url`, other services at their defaults.
    pub fn for_core_api(core_api_url: &str) -> Self {
        let base = core_api_url.trim_end_matches('/');
        Self {
            balance_url: DEFAULT_BALANCE_URL.to_string(),
            core_ping_url: format!("{base}/v1/node/ping"),
            core_password_protected_read_url: format!("{base}/v1/wallet/payment_address"),
            wallet_payment_address_url: format!("{base}/v1/wallet/payment_address"),
            core_wallet_balance_url: format!("{base}/v1/wallet/balance/0"),
            core_wallet_withdraw_url: format!("{base}/v1/wallet/balance"),
            emailer_url: DEFAULT_EMAILER_URL.to_string(),
        }
    }
}

impl Default for ServiceUrls {
    fn default() -> Self {
        Self::for_core_api(DEFAULT_CORE_API_URL)
    }
}

/// Whether the Core node answers its ping endpoint.
///
/// A disabled endpoint counts as running. Transport failures count as not running.
pub async fn is_core_running(http: &dyn HttpClient, policy: &dyn EndpointPolicy, ping_url: &str) -> bool {
    if policy.is_disabled(ping_url) {
        return true;
    }
    match http.send(HttpRequest::get(ping_url)).await {
        Ok(body) => {
            let alive = serde_json::from_str::<serde_json::Value>(&body)
                .map(|v| v["status"] == "alive")
                .unwrap_or(false);
            debug!(url = ping_url, alive, "core ping");
            alive
        }
        Err(e) => {
            warn!(url = ping_url, error = %e, "core ping failed");
            false
        }
    }
}

/// Check a Core API password against a protected endpoint.
///
/// `Some(false)` on 401/403, `None` when the node could not be asked at all.
/// A disabled endpoint always accepts.
pub async fn is_api_password_valid(
    http: &dyn HttpClient,
    policy: &dyn EndpointPolicy,
    url: &str,
    password: &str,
) -> Option<bool> {
    if policy.is_disabled(url) {
        return Some(true);
    }
    let request = HttpRequest::get(url).with_header("Authorization", authorization_header_value(password));
    match http.send(request).await {
        Ok(_) => Some(true),
        Err(FetchError::Status { status: 401 | 403, .. }) => Some(false),
        Err(e) => {
            warn!(url, error = %e, "could not verify core api password");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct CannedHttp {
        reply: Result<String, FetchError>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl CannedHttp {
        fn new(reply: Result<String, FetchError>) -> Self {
            Self {
                reply,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for CannedHttp {
        async fn send(&self, request: HttpRequest) -> Result<String, FetchError> {
            self.seen.lock().push(request);
            self.reply.clone()
        }
    }

    #[test]
    fn bearer_header() {
        assert_eq!(authorization_header_value("hunter2"), "bearer hunter2");
    }

    #[test]
    fn webapp_disables_core_urls_only() {
        let policy = CoreEndpointPolicy::webapp();
        assert!(policy.is_disabled("http://localhost:6270/v1/wallet/balance"));
        assert!(!policy.is_disabled("https://blockchain.info/q/addressbalance/1abc"));
    }

    #[test]
    fn desktop_build_enables_everything() {
        let policy = CoreEndpointPolicy::default();
        assert!(!policy.is_disabled("http://localhost:6270/v1/wallet/balance"));
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let policy = CoreEndpointPolicy::new(true, "http://core.local:6270/");
        assert!(policy.is_disabled("http://core.local:6270/v1/node/ping"));
    }

    #[test]
    fn urls_rooted_at_core_api() {
        let urls = ServiceUrls::for_core_api("http://core.local:6270/");
        assert_eq!(urls.core_ping_url, "http://core.local:6270/v1/node/ping");
        assert_eq!(urls.core_wallet_withdraw_url, "http://core.local:6270/v1/wallet/balance");
        assert_eq!(urls.emailer_url, DEFAULT_EMAILER_URL);
    }

    #[tokio::test]
    async fn disabled_ping_is_running_without_request() {
        let http = CannedHttp::new(Err(FetchError::Body("unused".into())));
        let policy = CoreEndpointPolicy::webapp();
        assert!(is_core_running(&http, &policy, "http://localhost:6270/v1/node/ping").await);
        assert!(http.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn ping_reads_status() {
        let http = CannedHttp::new(Ok(r#"{"status":"alive"}"#.into()));
        let policy = CoreEndpointPolicy::default();
        assert!(is_core_running(&http, &policy, "http://localhost:6270/v1/node/ping").await);

        let http = CannedHttp::new(Ok(r#"{"status":"starting"}"#.into()));
        assert!(!is_core_running(&http, &policy, "http://localhost:6270/v1/node/ping").await);
    }

    #[tokio::test]
    async fn password_check_outcomes() {
        let policy = CoreEndpointPolicy::default();
        let url = "http://localhost:6270/v1/wallet/payment_address";

        let ok = CannedHttp::new(Ok("{}".into()));
        assert_eq!(is_api_password_valid(&ok, &policy, url, "pw").await, Some(true));
        assert_eq!(ok.seen.lock()[0].header("Authorization"), Some("bearer pw"));

        let denied = CannedHttp::new(Err(FetchError::Status {
            url: url.into(),
            status: 401,
        }));
        assert_eq!(is_api_password_valid(&denied, &policy, url, "pw").await, Some(false));

        let down = CannedHttp::new(Err(FetchError::Request {
            url: url.into(),
            message: "connection refused".into(),
        }));
        assert_eq!(is_api_password_valid(&down, &policy, url, "pw").await, None);
    }

    #[tokio::test]
    async fn disabled_password_check_accepts() {
        let http = CannedHttp::new(Err(FetchError::Body("unused".into())));
        let policy = CoreEndpointPolicy::webapp();
        let url = "http://localhost:6270/v1/wallet/payment_address";
        assert_eq!(is_api_password_valid(&http, &policy, url, "x").await, Some(true));
        assert!(http.seen.lock().is_empty());
    }
}
