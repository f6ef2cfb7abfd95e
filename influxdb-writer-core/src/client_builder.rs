pub use std::time::Duration;
use std::sync::Arc;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::ClientBuilder as ReqwestClientBuilder;
use url::Url;

use crate::default_tags::{DefaultTags, TagResolver, env_resolver};
use crate::transport::HttpTransport;
use crate::util::parse_millis;
use crate::{Client, TimestampPrecision, WriteError, WriteOptions, WriteTransport};

const USER_AGENT: &str = "influxdb-writer/0.1";
const DEFAULT_HOST: &str = "http://localhost:8086";

pub struct ClientBuilder {
    host: String,
    token: String,
    auth_scheme: String,
    organization: String,
    bucket: String,
    timeout: Duration,
    idle_timeout: Option<Duration>,
    max_idle_connections: usize,
    default_headers: HeaderMap,
    ssl_root_certificates: Option<String>,
    proxy: Option<Url>,
    precision: TimestampPrecision,
    gzip_threshold: usize,
    write_options: WriteOptions,
    default_tags: DefaultTags,
    tag_resolver: TagResolver,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

        Self {
            host: DEFAULT_HOST.to_string(),
            token: String::new(),
            auth_scheme: "Token".to_string(),
            organization: String::new(),
            bucket: String::new(),
            timeout: Duration::from_secs(10),
            idle_timeout: Some(Duration::from_secs(90)),
            max_idle_connections: 100,
            default_headers,
            ssl_root_certificates: None,
            proxy: None,
            precision: TimestampPrecision::Nanoseconds,
            gzip_threshold: 1024,
            write_options: WriteOptions::default(),
            default_tags: DefaultTags::default(),
            tag_resolver: Arc::new(env_resolver),
        }
    }
}

fn invalid(name: &str, value: &str) -> WriteError {
    WriteError::InvalidParameter(name.to_string(), value.to_string())
}

impl ClientBuilder {
    /// Parses `http(s)://host:port?token=...&org=...&bucket=...` plus the
    /// optional `authScheme`, `precision`, `gzipThreshold`, `batchSize`,
    /// `flushInterval`, `jitterInterval`, `retryInterval`, `maxRetries`,
    /// `maxRetryDelay` and `exponentialBase` parameters. Intervals are in
    /// milliseconds.
    pub fn from_connection_string(s: &str) -> Result<Self, WriteError> {
        let mut uri: Url = s.parse()?;

        if !matches!(uri.scheme(), "http" | "https") {
            return Err(WriteError::InvalidScheme(uri.scheme().to_string()));
        }

        let mut client = ClientBuilder::default();

        for (k, v) in uri.query_pairs() {
            let options = client.write_options.clone();
            match k.as_ref() {
                "token" => client.token = v.to_string(),
                "authScheme" => client.auth_scheme = v.to_string(),
                "org" => client.organization = v.to_string(),
                "bucket" => client.bucket = v.to_string(),
                "precision" => client.precision = TimestampPrecision::try_from(&*v)?,
                "gzipThreshold" => {
                    client.gzip_threshold = v.parse().map_err(|_| invalid("gzipThreshold", &v))?
                },
                "batchSize" => {
                    let batch_size = v.parse().map_err(|_| invalid("batchSize", &v))?;
                    client.write_options = options.batch_size(batch_size)?;
                },
                "flushInterval" => {
                    client.write_options = options.flush_interval(parse_millis("flushInterval", &v)?)?;
                },
                "jitterInterval" => {
                    client.write_options = options.jitter_interval(parse_millis("jitterInterval", &v)?);
                },
                "retryInterval" => {
                    client.write_options = options.retry_interval(parse_millis("retryInterval", &v)?)?;
                },
                "maxRetries" => {
                    let max_retries = v.parse().map_err(|_| invalid("maxRetries", &v))?;
                    client.write_options = options.max_retries(max_retries);
                },
                "maxRetryDelay" => {
                    client.write_options = options.max_retry_delay(parse_millis("maxRetryDelay", &v)?);
                },
                "exponentialBase" => {
                    let base = v.parse().map_err(|_| invalid("exponentialBase", &v))?;
                    client.write_options = options.exponential_base(base)?;
                },
                _ => {}
            }
        }

        uri.set_query(None);
        uri.set_fragment(None);
        client.host = uri.to_string();

        Ok(client)
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: &str) -> Result<Self, WriteError> {
        let url: Url = host.parse()?;
        self.host = url.to_string();
        Ok(self)
    }

    pub fn token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    pub fn auth_scheme(mut self, scheme: &str) -> Self {
        self.auth_scheme = scheme.to_string();
        self
    }

    pub fn organization(mut self, organization: &str) -> Self {
        self.organization = organization.to_string();
        self
    }

    pub fn bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }

    pub fn precision(mut self, precision: TimestampPrecision) -> Self {
        self.precision = precision;
        self
    }

    pub fn gzip_threshold(mut self, gzip_threshold: usize) -> Self {
        self.gzip_threshold = gzip_threshold;
        self
    }

    pub fn write_options(mut self, write_options: WriteOptions) -> Self {
        self.write_options = write_options;
        self
    }

    pub fn default_tags(mut self, default_tags: DefaultTags) -> Self {
        self.default_tags = default_tags;
        self
    }

    /// Resolver for `${...}` default tag references; defaults to [`env_resolver`].
    pub fn tag_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.tag_resolver = Arc::new(resolver);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn max_idle_connections(mut self, max_idle_connections: usize) -> Self {
        self.max_idle_connections = max_idle_connections;
        self
    }

    pub fn proxy(mut self, proxy: &str) -> Result<Self, WriteError> {
        self.proxy = Some(proxy.parse()?);
        Ok(self)
    }

    pub fn ssl_root_certificates(mut self, path: &str) -> Self {
        self.ssl_root_certificates = Some(path.to_string());
        self
    }

    pub fn default_header(mut self, key: HeaderName, value: &str) -> Result<Self, WriteError> {
        self.default_headers.insert(key, HeaderValue::from_str(value)?);
        Ok(self)
    }

    pub fn build(mut self) -> Result<Client, WriteError> {
        if self.token.is_empty() {
            return Err(WriteError::MissingToken);
        }

        let mut authorization = HeaderValue::from_str(&format!("{} {}", self.auth_scheme, self.token))?;
        authorization.set_sensitive(true);
        self.default_headers.insert(header::AUTHORIZATION, authorization);

        let mut http_builder = ReqwestClientBuilder::new()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .pool_idle_timeout(self.idle_timeout)
            .pool_max_idle_per_host(self.max_idle_connections)
            .default_headers(std::mem::take(&mut self.default_headers))
            .gzip(true);

        if let Some(proxy_url) = &self.proxy {
            http_builder = http_builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }

        if let Some(cert_path) = &self.ssl_root_certificates {
            let cert_data = std::fs::read(cert_path)
                .map_err(|e| WriteError::SSLCertificateError(e.to_string()))?;
            let cert = reqwest::Certificate::from_pem(&cert_data)
                .map_err(|e| WriteError::SSLCertificateError(e.to_string()))?;
            http_builder = http_builder.add_root_certificate(cert);
        }

        let host: Url = self.host.parse()?;
        let transport = HttpTransport::new(&host, http_builder.build()?, self.gzip_threshold)?;
        Ok(self.build_with_transport(Arc::new(transport)))
    }

    /// Builds a client that writes through `transport` instead of HTTP.
    pub fn build_with_transport(self, transport: Arc<dyn WriteTransport>) -> Client {
        Client {
            org: self.organization,
            bucket: self.bucket,
            precision: self.precision,

            write_options: self.write_options,
            default_tags: self.default_tags,
            tag_resolver: self.tag_resolver,

            transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connection_string() {
        let builder = ClientBuilder::from_connection_string(
            "https://influx.example.com:8443?token=secret&org=my-org&bucket=my-bucket&precision=ms&batchSize=500&flushInterval=250&maxRetries=2&exponentialBase=3",
        ).unwrap();

        assert_eq!(builder.host, "https://influx.example.com:8443/");
        assert_eq!(builder.token, "secret");
        assert_eq!(builder.organization, "my-org");
        assert_eq!(builder.bucket, "my-bucket");
        assert_eq!(builder.precision, TimestampPrecision::Milliseconds);
        assert_eq!(builder.write_options.get_batch_size(), 500);
        assert_eq!(builder.write_options.get_flush_interval(), Duration::from_millis(250));
        assert_eq!(builder.write_options.get_max_retries(), 2);
        assert_eq!(builder.write_options.get_exponential_base(), 3.0);
    }

    #[test]
    fn rejects_bad_connection_strings() {
        assert!(matches!(
            ClientBuilder::from_connection_string("ftp://localhost"),
            Err(WriteError::InvalidScheme(_))
        ));
        assert!(matches!(
            ClientBuilder::from_connection_string("http://localhost?batchSize=lots"),
            Err(WriteError::InvalidParameter(_, _))
        ));
        assert!(matches!(
            ClientBuilder::from_connection_string("http://localhost?precision=h"),
            Err(WriteError::InvalidTimestampPrecision(_))
        ));
        assert!(ClientBuilder::from_connection_string("http://localhost?exponentialBase=0.5").is_err());
    }

    #[test]
    fn build_requires_token() {
        assert!(matches!(ClientBuilder::new().build(), Err(WriteError::MissingToken)));
    }

    #[test]
    fn build_with_token() {
        let client = ClientBuilder::new()
            .token("secret")
            .organization("my-org")
            .bucket("my-bucket")
            .build()
            .unwrap();
        assert_eq!(client.org(), "my-org");
        assert_eq!(client.bucket(), "my-bucket");
    }
}
