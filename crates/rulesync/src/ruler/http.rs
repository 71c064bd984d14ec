//! Direct client for the Mimir ruler configuration API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use super::auth::Credentials;
use super::error::{truncate_body, RulerError};
use super::{Result, RulerBackend, RulerSettings, RulerTarget};
use crate::rules::{RuleGroupRef, SerializedRuleGroups};
use crate::sanitize::redact_url;

/// Header carrying the tenant id on multi-tenant rulers.
const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Only group names are read from listings; rule bodies are ignored.
#[derive(Debug, Deserialize)]
struct GroupName {
    name: String,
}

/// Ruler API backend for a single tenant.
pub struct HttpRuler {
    client: Client,
    base: Url,
    api_segments: Vec<String>,
    tenant_id: String,
    credentials: Credentials,
    request_timeout: u64,
}

impl HttpRuler {
    /// Creates a client for `target`. The URL must be an absolute http(s) URL.
    pub fn new(settings: &RulerSettings, target: RulerTarget) -> Result<Self> {
        let base = Url::parse(&target.url).map_err(|e| RulerError::InvalidAddress {
            address: redact_url(&target.url),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(RulerError::InvalidAddress {
                address: redact_url(&target.url),
                reason: "expected an http or https URL".to_string(),
            });
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout))
            .timeout(Duration::from_secs(settings.request_timeout))
            .build()
            .map_err(|e| RulerError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            api_segments: settings
                .api_path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            tenant_id: target.tenant_id,
            credentials: target.credentials,
            request_timeout: settings.request_timeout,
        })
    }

    /// Builds `<base>/<api path>/<segments...>`, escaping each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RulerError::InvalidAddress {
                    address: self.base.to_string(),
                    reason: "URL cannot carry a path".to_string(),
                })?;
            path.pop_if_empty();
            path.extend(self.api_segments.iter().map(String::as_str));
            path.extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(TENANT_HEADER, &self.tenant_id);

        match &self.credentials {
            Credentials::Anonymous => builder,
            Credentials::Bearer(token) => builder.bearer_auth(token.expose_secret()),
            Credentials::Basic { user, key } => builder.basic_auth(user, Some(key.expose_secret())),
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RulerError::Timeout(self.request_timeout)
            } else {
                RulerError::Network(e.to_string())
            }
        })
    }

    /// Maps non-success responses to errors. `allow_missing` turns 404 into `None`.
    async fn check(response: Response, allow_missing: bool) -> Result<Option<Response>> {
        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }
        if allow_missing && status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = truncate_body(&response.text().await.unwrap_or_default());
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RulerError::AuthFailed(
                format!("{} {}", status.as_u16(), body),
            )),
            _ => Err(RulerError::Rejected {
                status: status.as_u16(),
                body,
            }),
        }
    }

    /// Fetches `<api>[/<namespace>]` and returns group names per namespace.
    async fn fetch_listing(&self, segments: &[&str]) -> Result<BTreeMap<String, Vec<GroupName>>> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let Some(response) = Self::check(response, true).await? else {
            return Ok(BTreeMap::new());
        };

        let text = response
            .text()
            .await
            .map_err(|e| RulerError::Network(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_yaml::from_str::<Option<BTreeMap<String, Vec<GroupName>>>>(&text)
            .map(Option::unwrap_or_default)
            .map_err(|e| RulerError::Parse(e.to_string()))
    }

    async fn delete(&self, segments: &[&str]) -> Result<()> {
        let url = self.endpoint(segments)?;
        let response = self.send(self.request(Method::DELETE, url)).await?;
        Self::check(response, true).await?;
        Ok(())
    }
}

#[async_trait]
impl RulerBackend for HttpRuler {
    async fn list_rule_groups(&self) -> Result<Vec<RuleGroupRef>> {
        let listing = self.fetch_listing(&[]).await?;
        Ok(listing
            .into_iter()
            .flat_map(|(namespace, groups)| {
                groups
                    .into_iter()
                    .map(move |g| RuleGroupRef::new(namespace.clone(), g.name))
            })
            .collect())
    }

    async fn submit_groups(&self, namespace: &str, groups: &SerializedRuleGroups) -> Result<()> {
        if groups.is_empty() {
            return self.delete_namespace(namespace).await;
        }

        let desired = groups
            .decode()
            .map_err(|e| RulerError::Parse(e.to_string()))?;
        let existing: BTreeSet<String> = self
            .fetch_listing(&[namespace])
            .await?
            .into_values()
            .flatten()
            .map(|g| g.name)
            .collect();

        for group in &desired.groups {
            let body = serde_yaml::to_string(group).map_err(|e| RulerError::Parse(e.to_string()))?;
            let url = self.endpoint(&[namespace])?;
            let response = self
                .send(
                    self.request(Method::POST, url)
                        .header(reqwest::header::CONTENT_TYPE, "application/yaml")
                        .body(body),
                )
                .await?;
            Self::check(response, false).await?;
        }

        let wanted: BTreeSet<&str> = desired.groups.iter().map(|g| g.name.as_str()).collect();
        for stale in existing.iter().filter(|name| !wanted.contains(name.as_str())) {
            log::debug!("Removing group '{}' from namespace '{}'", stale, namespace);
            self.delete(&[namespace, stale.as_str()]).await?;
        }

        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.delete(&[namespace]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Rule, RuleGroup, RuleNamespace};
    use secrecy::SecretString;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        path: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Recorded {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    type Routes = Vec<(&'static str, &'static str, u16, &'static str)>;

    /// Minimal HTTP/1.1 server answering scripted (method, path) routes; anything
    /// else gets `202 Accepted`.
    async fn mock_ruler(routes: Routes) -> (String, Arc<Mutex<Vec<Recorded>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&recorded);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break None;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                };
                let Some(header_end) = header_end else {
                    continue;
                };

                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let mut lines = head.split("\r\n");
                let mut request_line = lines.next().unwrap().split(' ');
                let method = request_line.next().unwrap().to_string();
                let path = request_line.next().unwrap().to_string();
                let headers: Vec<(String, String)> = lines
                    .filter_map(|l| l.split_once(": "))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                let length = headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .map(|(_, v)| v.parse::<usize>().unwrap())
                    .unwrap_or(0);
                while buf.len() < header_end + length {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

                let (status, reply) = routes
                    .iter()
                    .find(|(m, p, _, _)| *m == method && *p == path)
                    .map(|(_, _, s, b)| (*s, *b))
                    .unwrap_or((202, ""));

                log.lock().unwrap().push(Recorded {
                    method,
                    path,
                    headers,
                    body,
                });

                let response = format!(
                    "HTTP/1.1 {} Scripted\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reply.len(),
                    reply
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), recorded)
    }

    fn ruler(url: &str, credentials: Credentials) -> HttpRuler {
        HttpRuler::new(
            &RulerSettings::default(),
            RulerTarget {
                tenant_id: "tenant-1".to_string(),
                url: url.to_string(),
                credentials,
            },
        )
        .unwrap()
    }

    fn groups(names: &[&str]) -> SerializedRuleGroups {
        SerializedRuleGroups::encode(&RuleNamespace {
            groups: names
                .iter()
                .map(|n| RuleGroup {
                    name: n.to_string(),
                    interval: None,
                    limit: None,
                    rules: vec![Rule::alert("Up", "up == 0")],
                })
                .collect(),
        })
        .unwrap()
    }

    const API: &str = "/prometheus/config/v1/rules";

    #[test]
    fn test_rejects_non_http_url() {
        let result = HttpRuler::new(
            &RulerSettings::default(),
            RulerTarget {
                tenant_id: "t".to_string(),
                url: "mailto:ops@example.com".to_string(),
                credentials: Credentials::Anonymous,
            },
        );
        assert!(matches!(result, Err(RulerError::InvalidAddress { .. })));
    }

    #[test]
    fn test_endpoint_escapes_segments_and_keeps_base_path() {
        let ruler = ruler("https://mimir.example.com/mimir/", Credentials::Anonymous);
        let url = ruler.endpoint(&["team/a b", "g1"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://mimir.example.com/mimir/prometheus/config/v1/rules/team%2Fa%20b/g1"
        );
    }

    #[tokio::test]
    async fn test_list_parses_namespaces_and_sends_tenant() {
        let listing = "ns-a:\n- name: g1\n  rules:\n  - alert: Up\n    expr: up == 0\n- name: g2\n  rules: []\nns-c:\n- name: g1\n  rules: []\n";
        let (url, recorded) = mock_ruler(vec![("GET", API, 200, listing)]).await;
        let ruler = ruler(
            &url,
            Credentials::Bearer(SecretString::from("t0ken".to_string())),
        );

        let refs = ruler.list_rule_groups().await.unwrap();
        assert_eq!(
            refs,
            vec![
                RuleGroupRef::new("ns-a", "g1"),
                RuleGroupRef::new("ns-a", "g2"),
                RuleGroupRef::new("ns-c", "g1"),
            ]
        );

        let calls = recorded.lock().unwrap();
        assert_eq!(calls[0].header("x-scope-orgid"), Some("tenant-1"));
        assert_eq!(calls[0].header("authorization"), Some("Bearer t0ken"));
    }

    #[tokio::test]
    async fn test_list_not_found_is_empty() {
        let (url, _) = mock_ruler(vec![("GET", API, 404, "no rule groups found")]).await;
        let refs = ruler(&url, Credentials::Anonymous).list_rule_groups().await.unwrap();
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn test_basic_auth_header() {
        let (url, recorded) = mock_ruler(vec![("GET", API, 200, "")]).await;
        let creds = Credentials::Basic {
            user: "user".to_string(),
            key: SecretString::from("pass".to_string()),
        };
        ruler(&url, creds).list_rule_groups().await.unwrap();

        let calls = recorded.lock().unwrap();
        // base64("user:pass")
        assert_eq!(calls[0].header("authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[tokio::test]
    async fn test_submit_posts_groups_and_prunes_stale_groups() {
        let ns_path = "/prometheus/config/v1/rules/ns-a";
        let (url, recorded) = mock_ruler(vec![(
            "GET",
            ns_path,
            200,
            "ns-a:\n- name: g1\n  rules: []\n- name: old\n  rules: []\n",
        )])
        .await;

        ruler(&url, Credentials::Anonymous)
            .submit_groups("ns-a", &groups(&["g1", "g2"]))
            .await
            .unwrap();

        let calls = recorded.lock().unwrap();
        let summary: Vec<(String, String)> = calls
            .iter()
            .map(|c| (c.method.clone(), c.path.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("GET".to_string(), ns_path.to_string()),
                ("POST".to_string(), ns_path.to_string()),
                ("POST".to_string(), ns_path.to_string()),
                ("DELETE".to_string(), format!("{}/old", ns_path)),
            ]
        );
        assert!(calls[1].body.contains("name: g1"));
        assert!(calls[2].body.contains("name: g2"));
        assert_eq!(calls[1].header("content-type"), Some("application/yaml"));
    }

    #[tokio::test]
    async fn test_empty_submission_deletes_namespace() {
        let (url, recorded) = mock_ruler(vec![]).await;
        ruler(&url, Credentials::Anonymous)
            .submit_groups("ns-a", &groups(&[]))
            .await
            .unwrap();

        let calls = recorded.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "DELETE");
        assert_eq!(calls[0].path, "/prometheus/config/v1/rules/ns-a");
    }

    #[tokio::test]
    async fn test_delete_missing_namespace_succeeds() {
        let (url, _) = mock_ruler(vec![(
            "DELETE",
            "/prometheus/config/v1/rules/gone",
            404,
            "not found",
        )])
        .await;
        ruler(&url, Credentials::Anonymous)
            .delete_namespace("gone")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (url, _) = mock_ruler(vec![
            ("GET", API, 401, "no org id"),
            ("DELETE", "/prometheus/config/v1/rules/busy", 503, "overloaded"),
        ])
        .await;
        let ruler = ruler(&url, Credentials::Anonymous);

        let err = ruler.list_rule_groups().await.unwrap_err();
        assert!(matches!(err, RulerError::AuthFailed(_)));

        let err = ruler.delete_namespace("busy").await.unwrap_err();
        match &err {
            RulerError::Rejected { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ruler(&format!("http://{}", addr), Credentials::Anonymous)
            .list_rule_groups()
            .await
            .unwrap_err();
        assert!(matches!(err, RulerError::Network(_)));
        assert!(err.is_retryable());
    }
}
