use reqwest::redirect::Policy;
use reqwest::tls::Version;
use reqwest::{Client, ClientBuilder, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::classifier::NetworkClassifier;

/// User agent sent with every probe
pub const DEFAULT_USER_AGENT: &str = "Nimbus-Health-Checker/1.0";

/// Settings shared by every client the transport builds
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub user_agent: String,
    pub connect_timeout: Option<Duration>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self { user_agent: DEFAULT_USER_AGENT.to_string(), connect_timeout: None }
    }
}

/// HTTP transport for probes.
///
/// Two clients are built from the same base configuration, one verifying
/// certificates and one not. Each request picks one from the classifier's
/// verdict for its own host, so a local bypass never touches the client
/// used for public targets. Redirects are never followed.
pub struct ProbeTransport {
    classifier: Arc<NetworkClassifier>,
    verifying: Client,
    local_only: Client,
}

impl ProbeTransport {
    pub fn new(classifier: Arc<NetworkClassifier>, options: &TransportOptions) -> reqwest::Result<Self> {
        Self::build(classifier, options, |builder| builder)
    }

    fn build(
        classifier: Arc<NetworkClassifier>,
        options: &TransportOptions,
        customize: impl Fn(ClientBuilder) -> ClientBuilder,
    ) -> reqwest::Result<Self> {
        let verifying = customize(base_builder(options)).build()?;
        let local_only = customize(base_builder(options)).danger_accept_invalid_certs(true).build()?;

        Ok(Self { classifier, verifying, local_only })
    }

    pub fn classifier(&self) -> &Arc<NetworkClassifier> {
        &self.classifier
    }

    /// Issue a GET to `url` and return the first response as-is
    pub async fn get(&self, url: Url) -> reqwest::Result<Response> {
        let skip_verification = self.classifier.is_local(&url).await;
        debug!(
            host = url.host_str().unwrap_or_default(),
            skip_verification, "Dispatching probe"
        );

        let client = if skip_verification { &self.local_only } else { &self.verifying };
        client.get(url).send().await
    }
}

fn base_builder(options: &TransportOptions) -> ClientBuilder {
    let mut builder = Client::builder()
        .redirect(Policy::none())
        .min_tls_version(Version::TLS_1_2)
        .user_agent(options.user_agent.clone());

    if let Some(connect_timeout) = options.connect_timeout {
        builder = builder.connect_timeout(connect_timeout);
    }

    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::classifier::{DEFAULT_DNS_CACHE_TTL, DnsCache, HostResolver};
    use crate::monitoring::types::error_chain;
    use async_trait::async_trait;
    use rcgen::CertifiedKey;
    use std::net::{IpAddr, SocketAddr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;
    use tokio_rustls::rustls::ServerConfig;
    use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TLS_HOST: &str = "nas.home.arpa";

    fn transport() -> ProbeTransport {
        let classifier = Arc::new(NetworkClassifier::new(DEFAULT_DNS_CACHE_TTL));
        ProbeTransport::new(classifier, &TransportOptions::default()).unwrap()
    }

    /// Resolver answering every hostname with one address
    struct FixedResolver(IpAddr);

    #[async_trait]
    impl HostResolver for FixedResolver {
        async fn resolve(&self, _: &str) -> std::io::Result<Vec<IpAddr>> {
            Ok(vec![self.0])
        }
    }

    /// Transport whose classifier sees `TLS_HOST` at `classified_as`, while
    /// connections to it land on `target`
    fn transport_for(target: SocketAddr, classified_as: &str) -> ProbeTransport {
        let resolver = Arc::new(FixedResolver(classified_as.parse().unwrap()));
        let classifier = Arc::new(NetworkClassifier::with_resolver(resolver, DnsCache::default()));
        ProbeTransport::build(classifier, &TransportOptions::default(), |builder| builder.resolve(TLS_HOST, target))
            .unwrap()
    }

    /// HTTPS responder presenting a freshly generated self-signed certificate
    async fn self_signed_server() -> SocketAddr {
        let CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(vec![TLS_HOST.to_string()]).unwrap();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert.der().clone()], key)
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let Ok(mut tls) = acceptor.accept(stream).await else { return };
                    let mut request = [0u8; 2048];
                    let _ = tls.read(&mut request).await;
                    let _ = tls
                        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                        .await;
                    let _ = tls.shutdown().await;
                });
            }
        });
        addr
    }

    fn tls_url(addr: SocketAddr) -> Url {
        Url::parse(&format!("https://{TLS_HOST}:{}/", addr.port())).unwrap()
    }

    #[tokio::test]
    async fn test_self_signed_certificate_accepted_for_local_target() {
        let addr = self_signed_server().await;

        let response = transport_for(addr, "192.168.1.20").get(tls_url(addr)).await.unwrap();

        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_self_signed_certificate_rejected_for_public_target() {
        let addr = self_signed_server().await;

        let err = transport_for(addr, "93.184.216.34").get(tls_url(addr)).await.unwrap_err();

        let chain = error_chain(&err);
        assert!(chain.to_lowercase().contains("certificate"), "unexpected error: {chain}");
    }

    #[tokio::test]
    async fn test_redirect_is_returned_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
        let response = transport().get(url).await.unwrap();

        assert_eq!(response.status().as_u16(), 302);
    }

    #[tokio::test]
    async fn test_sends_identifying_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let response = transport().get(url).await.unwrap();

        assert_eq!(response.status().as_u16(), 204);
    }

    #[tokio::test]
    async fn test_mock_server_host_is_classified_local() {
        let server = MockServer::start().await;
        let transport = transport();
        let url = Url::parse(&server.uri()).unwrap();

        assert!(transport.classifier().is_local(&url).await);
    }
}
