//! InfluxDB 1.x HTTP API transport.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use fluxmap::{ClientConfig, HttpTransport, Transport};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("http://localhost:8086")
//!     .with_credentials("admin", "secret")
//!     .with_timeout(Duration::from_secs(5));
//!
//! let transport = HttpTransport::new(config)?;
//! let info = transport.ping()?;
//! println!("InfluxDB {} {}", info.build, info.version);
//! # Ok(())
//! # }
//! ```

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ServerInfo, Transport};
use crate::error::{DecodeError, Result, TransportError};
use crate::line_protocol;
use crate::point::Point;
use crate::result::QueryResponse;

const VERSION_HEADER: &str = "X-Influxdb-Version";
const BUILD_HEADER: &str = "X-Influxdb-Build";

/// Connection settings for an InfluxDB server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server (e.g., `http://localhost:8086`).
    pub url: String,
    /// HTTP timeout for each request.
    pub timeout: Duration,
    /// Maximum number of retry attempts on connection errors and 5xx responses.
    pub max_retries: u32,
    /// Initial backoff duration between retries (doubles each attempt).
    pub retry_backoff: Duration,
    /// Basic-auth username and password.
    pub credentials: Option<(String, String)>,
    /// Extra HTTP headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl ClientConfig {
    /// Creates a new config with sensible defaults.
    ///
    /// Defaults: 30s timeout, 3 retries, 100ms initial backoff, no credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            credentials: None,
            headers: Vec::new(),
        }
    }

    /// Sets basic-auth credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Adds an HTTP header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the HTTP timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial retry backoff.
    #[must_use]
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }
}

/// [`Transport`] over the InfluxDB 1.x HTTP API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: ClientConfig,
    client: HttpClient,
}

impl HttpTransport {
    /// Creates a transport. No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ClientCreate` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::ClientCreate { source: e })?;
        Ok(Self { config, client })
    }

    /// The configuration this transport was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.url)
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some((username, password)) = &self.config.credentials {
            request = request.basic_auth(username, Some(password));
        }
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }
        request
    }

    /// Sends a request with exponential backoff retry.
    ///
    /// Connection errors and 5xx responses are retried; any other non-success
    /// status fails immediately with the server's error message.
    fn send(&self, build: impl Fn(&HttpClient) -> RequestBuilder) -> Result<Response> {
        let resp = self.dispatch(build)?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().unwrap_or_default();
        Err(TransportError::HttpStatus {
            status,
            message: error_message(&body),
        }
        .into())
    }

    /// Retry loop behind [`HttpTransport::send`]. Returns the first response
    /// that is neither a connection error nor a 5xx, whatever its status.
    fn dispatch(&self, build: impl Fn(&HttpClient) -> RequestBuilder) -> Result<Response> {
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 0;

        loop {
            let error = match self.authorize(build(&self.client)).send() {
                Ok(resp) if !resp.status().is_server_error() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().unwrap_or_default();
                    TransportError::HttpStatus {
                        status: status.as_u16(),
                        message: error_message(&body),
                    }
                }
                Err(e) => TransportError::RequestFailed { source: e },
            };

            if attempt >= self.config.max_retries {
                return Err(error.into());
            }
            attempt += 1;
            warn!(
                url = %self.config.url,
                attempt,
                max_retries = self.config.max_retries,
                error = %error,
                "request failed, retrying"
            );
            thread::sleep(backoff);
            backoff *= 2;
        }
    }
}

impl Transport for HttpTransport {
    fn url(&self) -> &str {
        &self.config.url
    }

    fn ping(&self) -> Result<ServerInfo> {
        let url = self.endpoint("ping");
        let resp = self.send(|client| client.get(&url))?;

        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        Ok(ServerInfo {
            version: header(VERSION_HEADER),
            build: header(BUILD_HEADER),
        })
    }

    fn query(&self, database: Option<&str>, statement: &str) -> Result<QueryResponse> {
        debug!(database, statement, "query");
        let url = self.endpoint("query");
        let mut params = vec![("q", statement)];
        if let Some(db) = database {
            params.push(("db", db));
        }

        let resp = self.dispatch(|client| client.post(&url).form(&params))?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| TransportError::RequestFailed { source: e })?;

        // A statement the server cannot parse is rejected with 400 and a
        // JSON error body.
        if status == StatusCode::BAD_REQUEST
            && let Ok(ErrorBody { error }) = serde_json::from_str(&body)
        {
            return Err(DecodeError::QueryExecution { message: error }.into());
        }
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                message: error_message(&body),
            }
            .into());
        }

        serde_json::from_str(&body)
            .map_err(|e| TransportError::InvalidResponse { source: e }.into())
    }

    fn execute(&self, statement: &str) -> Result<()> {
        self.query(None, statement)?.check()
    }

    fn write(&self, database: &str, retention_policy: Option<&str>, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let (body, precision) = line_protocol::encode_points(points)?;
        debug!(database, retention_policy, points = points.len(), %precision, "write");

        let url = self.endpoint("write");
        let mut params = vec![("db", database), ("precision", precision.as_str())];
        if let Some(rp) = retention_policy {
            params.push(("rp", rp));
        }

        self.send(|client| client.post(&url).query(&params).body(body.clone()))?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Extracts the `{"error": ...}` message InfluxDB puts in failed responses,
/// falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FluxError;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;

    struct Reply {
        status: &'static str,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    }

    fn reply(status: &'static str, body: &'static str) -> Reply {
        Reply {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// Serves one canned reply per connection and returns the raw requests.
    fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for reply in replies {
                let (mut stream, _) = listener.accept().unwrap();
                requests.push(read_request(&mut stream));

                let mut response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reply.body.len()
                );
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                response.push_str("\r\n");
                response.push_str(reply.body);
                stream.write_all(response.as_bytes()).unwrap();
            }
            requests
        });

        (url, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut reader = BufReader::new(stream);
        let mut request = String::new();
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
            let end = line == "\r\n";
            request.push_str(&line);
            if end {
                break;
            }
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();
        request + &String::from_utf8(body).unwrap()
    }

    fn transport(url: &str) -> HttpTransport {
        let config = ClientConfig::new(url)
            .with_max_retries(2)
            .with_retry_backoff(Duration::from_millis(1));
        HttpTransport::new(config).unwrap()
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("http://example.com:8086/")
            .with_credentials("admin", "secret")
            .with_header("X-Team", "ops")
            .with_timeout(Duration::from_secs(10))
            .with_max_retries(5);

        assert_eq!(config.url, "http://example.com:8086");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_backoff, Duration::from_millis(100));
        assert_eq!(
            config.credentials,
            Some(("admin".to_string(), "secret".to_string()))
        );
        assert_eq!(config.headers.len(), 1);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error":"database not found"}"#), "database not found");
        assert_eq!(error_message("bad gateway\n"), "bad gateway");
    }

    #[test]
    fn test_ping_reads_version_headers() {
        let (url, server) = serve(vec![Reply {
            status: "204 No Content",
            headers: vec![(VERSION_HEADER, "1.8.10"), (BUILD_HEADER, "OSS")],
            body: "",
        }]);

        let info = transport(&url).ping().unwrap();
        assert_eq!(info.version, "1.8.10");
        assert_eq!(info.build, "OSS");

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /ping "));
    }

    #[test]
    fn test_query_posts_form_and_parses_body() {
        let (url, server) = serve(vec![reply(
            "200 OK",
            r#"{"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"],"values":[["_internal"]]}]}]}"#,
        )]);

        let response = transport(&url).query(Some("telemetry"), "SHOW DATABASES").unwrap();
        assert_eq!(response.results[0].row_count(), 1);

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /query "));
        assert!(requests[0].contains("q=SHOW+DATABASES"));
        assert!(requests[0].contains("db=telemetry"));
    }

    #[test]
    fn test_execute_surfaces_statement_error() {
        let (url, server) = serve(vec![reply(
            "200 OK",
            r#"{"results":[{"statement_id":0,"error":"retention policy not found: rp"}]}"#,
        )]);

        let result = transport(&url).execute(r#"DROP RETENTION POLICY "rp" ON "db""#);
        assert!(matches!(
            result,
            Err(FluxError::Decode(DecodeError::QueryExecution { ref message })) if message == "retention policy not found: rp"
        ));
        server.join().unwrap();
    }

    #[test]
    fn test_rejected_query_is_query_execution_error() {
        let (url, server) = serve(vec![
            reply("400 Bad Request", r#"{"error":"error parsing query: found EOF, expected FROM at line 1, char 9"}"#),
            reply("401 Unauthorized", r#"{"error":"authorization failed"}"#),
        ]);
        let transport = transport(&url);

        assert!(matches!(
            transport.query(Some("telemetry"), "SELECT *"),
            Err(FluxError::Decode(DecodeError::QueryExecution { ref message }))
                if message.starts_with("error parsing query")
        ));
        assert!(matches!(
            transport.query(Some("telemetry"), "SHOW DATABASES"),
            Err(FluxError::Transport(TransportError::HttpStatus { status: 401, ref message }))
                if message == "authorization failed"
        ));
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_write_sends_line_protocol() {
        let (url, server) = serve(vec![reply("204 No Content", "")]);

        let point = Point::builder("cpu")
            .tag("host", "a")
            .field("usage", 0.5)
            .precision(crate::Precision::Milliseconds)
            .build()
            .unwrap();
        transport(&url).write("telemetry", Some("week"), &[point]).unwrap();

        let requests = server.join().unwrap();
        let request = &requests[0];
        assert!(request.starts_with("POST /write?"));
        assert!(request.contains("db=telemetry"));
        assert!(request.contains("rp=week"));
        assert!(request.contains("precision=ms"));
        assert!(request.ends_with("cpu,host=a usage=0.5"));
    }

    #[test]
    fn test_write_empty_batch_makes_no_request() {
        // Nothing listens on this port; any request would fail.
        let transport = transport("http://127.0.0.1:9");
        transport.write("telemetry", None, &[]).unwrap();
    }

    #[test]
    fn test_client_error_not_retried() {
        let (url, server) = serve(vec![reply("404 Not Found", r#"{"error":"database not found: nope"}"#)]);

        let result = transport(&url).write(
            "nope",
            None,
            &[Point::builder("m").field("v", 1).build().unwrap()],
        );
        assert!(matches!(
            result,
            Err(FluxError::Transport(TransportError::HttpStatus { status: 404, ref message }))
                if message == "database not found: nope"
        ));
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn test_server_error_retried() {
        let (url, server) = serve(vec![
            reply("503 Service Unavailable", "overloaded"),
            reply("204 No Content", ""),
        ]);

        let info = transport(&url).ping().unwrap();
        assert_eq!(info.version, "");
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_server_error_exhausts_retries() {
        let (url, server) = serve(vec![
            reply("500 Internal Server Error", "boom"),
            reply("500 Internal Server Error", "boom"),
            reply("500 Internal Server Error", "boom"),
        ]);

        let result = transport(&url).ping();
        assert!(matches!(
            result,
            Err(FluxError::Transport(TransportError::HttpStatus { status: 500, .. }))
        ));
        assert_eq!(server.join().unwrap().len(), 3);
    }
}
