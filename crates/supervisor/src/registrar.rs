//! Reverse-proxy registration (C7): publishes a routable hostname for a
//! booted VM and tears it down again once the VM is evicted. Grounded on the
//! Caddy admin-API client the host orchestrator used to register per-VM
//! routes (`vm_supervisor/proxy/caddy.py`): a PUT of a `subroute` handler
//! keyed by an `@id` of `subroute-<hash>`, and removal by deleting that id.

use async_trait::async_trait;
use serde_json::json;
use shared::dto::VmHash;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RegistrarError {
    #[error("proxy registration request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("proxy admin api returned an error status: {0}")]
    Status(reqwest::StatusCode),
}

/// Publishes and retracts routable hostnames for booted VMs. A trait so the
/// HTTP edge can be exercised without a live Caddy instance.
#[async_trait]
pub trait ProxyRegistrar: Send + Sync + 'static {
    async fn register(&self, vm_hash: &VmHash, upstream: &str) -> Result<String, RegistrarError>;
    async fn unregister(&self, vm_hash: &VmHash) -> Result<(), RegistrarError>;
}

/// Lowercase, unpadded base32 of the hash's raw bytes, matching the base16
/// to base32 re-encoding the original proxy used to build a DNS-safe label.
fn base32_label(vm_hash: &VmHash) -> String {
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &vm_hash.to_bytes()).to_lowercase()
}

pub struct CaddyRegistrar {
    client: reqwest::Client,
    admin_url: String,
    domain: String,
}

impl CaddyRegistrar {
    pub fn new(admin_url: impl Into<String>, domain: impl Into<String>) -> Self {
        let mut admin_url = admin_url.into();
        if !admin_url.ends_with('/') {
            admin_url.push('/');
        }
        Self {
            client: reqwest::Client::new(),
            admin_url,
            domain: domain.into(),
        }
    }

    fn route_id(vm_hash: &VmHash) -> String {
        format!("subroute-{vm_hash}")
    }

    fn route_config(&self, host: &str, upstream: &str, vm_hash: &VmHash) -> serde_json::Value {
        json!({
            "@id": Self::route_id(vm_hash),
            "handle": [
                {
                    "handler": "subroute",
                    "routes": [
                        {
                            "handle": [
                                {
                                    "handler": "reverse_proxy",
                                    "headers": {
                                        "request": {
                                            "set": { "Host": ["{http.request.host}"] }
                                        }
                                    },
                                    "upstreams": [{ "dial": upstream }]
                                }
                            ]
                        }
                    ]
                }
            ],
            "match": [{ "host": [host] }],
            "terminal": true
        })
    }
}

#[async_trait]
impl ProxyRegistrar for CaddyRegistrar {
    async fn register(&self, vm_hash: &VmHash, upstream: &str) -> Result<String, RegistrarError> {
        let host = format!("{}.{}", base32_label(vm_hash), self.domain);
        let config = self.route_config(&host, upstream, vm_hash);
        let url = format!("{}config/apps/http/servers/srv0/routes/0", self.admin_url);

        let response = self
            .client
            .put(url)
            .timeout(Duration::from_secs(10))
            .json(&config)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RegistrarError::Status(response.status()));
        }
        Ok(host)
    }

    async fn unregister(&self, vm_hash: &VmHash) -> Result<(), RegistrarError> {
        let url = format!("{}id/{}", self.admin_url, Self::route_id(vm_hash));

        let response = self
            .client
            .delete(url)
            .timeout(Duration::from_secs(3))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RegistrarError::Status(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base32_label_is_lowercase_and_unpadded() {
        let hash = VmHash::parse("ab".repeat(32)).unwrap();
        let label = base32_label(&hash);
        assert_eq!(label, label.to_lowercase());
        assert!(!label.contains('='));
    }

    #[test]
    fn route_id_is_stable_for_a_hash() {
        let hash = VmHash::parse("cd".repeat(32)).unwrap();
        assert_eq!(CaddyRegistrar::route_id(&hash), format!("subroute-{hash}"));
    }

    #[tokio::test]
    async fn register_puts_a_route_keyed_by_hash_id() {
        let mut server = mockito::Server::new_async().await;
        let hash = VmHash::parse("ef".repeat(32)).unwrap();
        let expected_host = format!("{}.example.test", base32_label(&hash));

        let mock = server
            .mock("PUT", "/config/apps/http/servers/srv0/routes/0")
            .match_body(mockito::Matcher::PartialJson(json!({
                "@id": format!("subroute-{hash}"),
                "match": [{ "host": [expected_host] }],
            })))
            .with_status(200)
            .create_async()
            .await;

        let registrar = CaddyRegistrar::new(server.url(), "example.test");
        let host = registrar.register(&hash, "127.0.0.1:8080").await.unwrap();

        mock.assert_async().await;
        assert_eq!(host, expected_host);
    }

    #[tokio::test]
    async fn unregister_deletes_the_hash_keyed_route() {
        let mut server = mockito::Server::new_async().await;
        let hash = VmHash::parse("12".repeat(32)).unwrap();
        let mock = server
            .mock("DELETE", format!("/id/subroute-{hash}").as_str())
            .with_status(200)
            .create_async()
            .await;

        let registrar = CaddyRegistrar::new(server.url(), "example.test");
        registrar.unregister(&hash).await.unwrap();

        mock.assert_async().await;
    }
}
