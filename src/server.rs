//! HTTP server
//! Serves generated PAC files, on-demand resolution and the host/rule
//! management API

use crate::database::DatabaseManager;
use crate::error::PacError;
use crate::model::{HostInput, RuleInput};
use crate::pac::{self, PacFormat, PAC_CONTENT_TYPE};
use crate::resolver;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

type ResponseBody = BoxBody<Bytes, hyper::Error>;

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub http_port: u16,
    /// Bearer token guarding the management routes; `None` leaves them open
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: 8080,
            api_token: None,
        }
    }
}

/// PAC server
pub struct PacServer {
    config: ServerConfig,
    db_manager: Arc<DatabaseManager>,
}

impl PacServer {
    /// Create a new PAC server
    pub fn new(config: ServerConfig, db_manager: Arc<DatabaseManager>) -> Self {
        Self { config, db_manager }
    }

    /// Start the server and accept connections until an I/O error occurs
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = SocketAddr::new(self.config.bind_addr, self.config.http_port);
        let listener = TcpListener::bind(addr).await?;
        info!("PAC server listening on {}", addr);

        if self.config.api_token.is_none() {
            warn!("No API token configured, management routes are unauthenticated");
        }

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = self.clone();

            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, remote_addr).await {
                    debug!("HTTP connection error from {}: {}", remote_addr, e);
                }
            });
        }
    }

    /// Handle a single HTTP connection
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, remote_addr: SocketAddr) -> Result<()> {
        let io = TokioIo::new(stream);

        http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let server = self.clone();
                    async move { server.handle_request(req, remote_addr).await }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Turn request errors into status codes; never fails the connection
    async fn handle_request(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response<ResponseBody>, Infallible> {
        debug!("{} {} from {}", req.method(), req.uri(), remote_addr);

        match self.process_request(req).await {
            Ok(response) => Ok(response),
            Err(e) => {
                let status = match e.downcast_ref::<PacError>() {
                    Some(PacError::Validation { .. }) => StatusCode::BAD_REQUEST,
                    Some(PacError::HostNotFound { .. }) | Some(PacError::RuleNotFound { .. }) => {
                        StatusCode::NOT_FOUND
                    }
                    Some(PacError::HostInUse { .. }) => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };

                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!("Request error: {:#}", e);
                    Ok(Self::error_response(status, "Internal Server Error"))
                } else {
                    debug!("Rejected request: {}", e);
                    Ok(Self::error_response(status, &e.to_string()))
                }
            }
        }
    }

    /// Route a request
    async fn process_request(&self, req: Request<Incoming>) -> Result<Response<ResponseBody>> {
        let method = req.method().clone();
        let path = req.uri().path().trim_end_matches('/').to_string();
        let query = Self::query_params(&req);

        match (&method, path.as_str()) {
            (&Method::GET, "/health") => return Ok(Self::text_response(StatusCode::OK, "OK")),
            (&Method::GET, "/proxy.pac") => return self.pac_response(PacFormat::EmbeddedLogic),
            (&Method::GET, "/auto.pac") => return self.pac_response(PacFormat::PreExpanded),
            (&Method::GET, "/resolve") => {
                let host = query
                    .get("host")
                    .ok_or_else(|| PacError::validation("missing 'host' query parameter"))?;
                let url = query.get("url").map(String::as_str).unwrap_or("");
                let config = self.db_manager.load_config()?;
                return Ok(Self::text_response(
                    StatusCode::OK,
                    &resolver::resolve(&config, url, host),
                ));
            }
            _ => {}
        }

        if !self.is_authorized(&req) {
            return Ok(Self::error_response(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        match (&method, segments.as_slice()) {
            (&Method::GET, ["config"]) => Self::json_response(StatusCode::OK, &self.db_manager.load_config()?),

            (&Method::GET, ["hosts"]) => Self::json_response(StatusCode::OK, &self.db_manager.list_hosts()?),
            (&Method::POST, ["hosts"]) => {
                let input: HostInput = Self::read_json(req).await?;
                let host = self.db_manager.upsert_host(&input)?;
                info!("Saved host {} ({}:{})", host.id, host.host, host.port);
                Self::json_response(StatusCode::OK, &host)
            }
            (&Method::GET, ["hosts", id]) => {
                let id = Self::parse_id::<u32>(id)?;
                let host = self
                    .db_manager
                    .get_host(id)?
                    .ok_or(PacError::HostNotFound { id })?;
                Self::json_response(StatusCode::OK, &host)
            }
            (&Method::DELETE, ["hosts", id]) => {
                let id = Self::parse_id::<u32>(id)?;
                self.db_manager.delete_host(id)?;
                info!("Deleted host {}", id);
                Ok(Self::empty_response(StatusCode::NO_CONTENT))
            }

            (&Method::GET, ["rules"]) => {
                Self::json_response(StatusCode::OK, &self.db_manager.list_rule_records()?)
            }
            (&Method::POST, ["rules"]) => {
                let input: RuleInput = Self::read_json(req).await?;
                let rule = self.db_manager.upsert_rule(&input.into_rule()?)?;
                info!("Saved rule {} -> {:?}", rule.pattern, rule.host_ids);
                Self::json_response(StatusCode::OK, &rule)
            }
            (&Method::DELETE, ["rules"]) => {
                let pattern = query
                    .get("pattern")
                    .ok_or_else(|| PacError::validation("missing 'pattern' query parameter"))?;
                self.db_manager.delete_rule(pattern)?;
                info!("Deleted rule {}", pattern);
                Ok(Self::empty_response(StatusCode::NO_CONTENT))
            }
            (&Method::DELETE, ["rules", id]) => {
                let id = Self::parse_id::<i64>(id)?;
                self.db_manager.delete_rule_by_id(id)?;
                info!("Deleted rule #{}", id);
                Ok(Self::empty_response(StatusCode::NO_CONTENT))
            }

            _ => Ok(Self::error_response(StatusCode::NOT_FOUND, "Not Found")),
        }
    }

    /// Check the bearer token when one is configured
    fn is_authorized<T>(&self, req: &Request<T>) -> bool {
        let Some(token) = self.config.api_token.as_deref() else {
            return true;
        };

        req.headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|provided| provided == token)
            .unwrap_or(false)
    }

    fn query_params<T>(req: &Request<T>) -> HashMap<String, String> {
        req.uri()
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }

    fn parse_id<N: std::str::FromStr>(raw: &str) -> Result<N, PacError> {
        raw.parse()
            .map_err(|_| PacError::validation(format!("invalid id '{}'", raw)))
    }

    async fn read_json<D: serde::de::DeserializeOwned>(req: Request<Incoming>) -> Result<D> {
        let body = req.into_body().collect().await?.to_bytes();
        let value = serde_json::from_slice(&body)
            .map_err(|e| PacError::validation(format!("invalid JSON body: {}", e)))?;
        Ok(value)
    }

    /// Render the current configuration as a PAC file
    fn pac_response(&self, format: PacFormat) -> Result<Response<ResponseBody>> {
        let config = self.db_manager.load_config()?;
        let script = pac::render(&config, format)?;

        let mut response = Self::response(StatusCode::OK, PAC_CONTENT_TYPE, script);
        let disposition = format!("inline; filename=\"{}\"", format.file_name());
        response
            .headers_mut()
            .insert(CONTENT_DISPOSITION, HeaderValue::from_str(&disposition)?);

        Ok(response)
    }

    /// Create JSON response
    fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<ResponseBody>> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::response(status, JSON_CONTENT_TYPE, body))
    }

    /// Create text response
    fn text_response(status: StatusCode, body: &str) -> Response<ResponseBody> {
        Self::response(status, TEXT_CONTENT_TYPE, body.to_string())
    }

    /// Create error response
    fn error_response(status: StatusCode, message: &str) -> Response<ResponseBody> {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::response(status, JSON_CONTENT_TYPE, body)
    }

    fn empty_response(status: StatusCode) -> Response<ResponseBody> {
        let mut response = Response::new(Self::full_body(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn response(
        status: StatusCode,
        content_type: &'static str,
        body: impl Into<Bytes>,
    ) -> Response<ResponseBody> {
        let mut response = Response::new(Self::full_body(body.into()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }

    /// Create full body
    fn full_body(bytes: Bytes) -> ResponseBody {
        Full::new(bytes).map_err(|never| match never {}).boxed()
    }
}
