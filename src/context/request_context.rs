//! The per-request context handed to every middleware and handler.
//!
//! # Responsibilities
//! - Flatten headers, form fields and path captures into one string map
//! - Answer questions about the request (scheme, host, client ip, accept)
//! - Front the response writer (status, headers, body, capabilities)
//! - Carry the intercept signal back to the dispatcher
//!
//! # Design Decisions
//! - `data` is filled in a fixed order: headers, then form, then captures,
//!   so a capture always wins a name collision
//! - Header keys use canonical MIME form (`X-Forwarded-For`)
//! - Lookups of absent keys return "" rather than an `Option`

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, Version};
use hyper::upgrade::OnUpgrade;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::context::encode::{self, SerializationError, JSON_CONTENT_TYPE, XML_CONTENT_TYPE};
use crate::context::writer::{write_error, Capability, CloseNotify, ResponseWriter, WriterError};

static ACCEPTS_HTML: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(text/html|application/xhtml\+xml)(?:,|$)").unwrap());
static ACCEPTS_XML: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(application/xml|text/xml)(?:,|$)").unwrap());
static ACCEPTS_JSON: Lazy<Regex> = Lazy::new(|| Regex::new(r"(application/json)(?:,|$)").unwrap());

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub struct Context {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    path: String,
    data: HashMap<String, String>,
    form: HashMap<String, String>,
    body: Bytes,
    writer: Box<dyn ResponseWriter>,
    interrupt: Option<String>,
}

impl Context {
    /// Build a context from request parts and a fully drained body.
    pub fn new(parts: Parts, body: Bytes, writer: Box<dyn ResponseWriter>) -> Self {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let raw_path = parts.uri.path();
        let path = urlencoding::decode(raw_path)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw_path.to_string());

        let mut data = header_map(&parts.headers);
        let form = parse_form(&parts, &body);
        data.extend(form.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            remote_addr,
            path,
            data,
            form,
            body,
            writer,
            interrupt: None,
        }
    }

    pub fn from_request(request: Request<Bytes>, writer: Box<dyn ResponseWriter>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts, body, writer)
    }

    // Request data

    /// Value for `key` from headers, form or path captures; "" when absent.
    pub fn get(&self, key: &str) -> &str {
        self.data.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn data(&self) -> &HashMap<String, String> {
        &self.data
    }

    /// Form fields only: urlencoded body values followed by query values.
    pub fn form(&self) -> &HashMap<String, String> {
        &self.form
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Protocol name, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> String {
        format!("{:?}", self.version)
    }

    /// Path and query exactly as received.
    pub fn uri(&self) -> &str {
        self.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    }

    /// Percent-decoded request path, without query.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Alias of [`Context::path`].
    pub fn url(&self) -> &str {
        &self.path
    }

    /// `X-Forwarded-Proto`, then the request URI scheme, then "http".
    pub fn scheme(&self) -> String {
        match self.get("X-Forwarded-Proto") {
            "" => self.uri.scheme_str().unwrap_or("http").to_string(),
            forwarded => forwarded.to_string(),
        }
    }

    fn authority(&self) -> &str {
        self.headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    /// Host name without port; "localhost" when the request names none.
    pub fn host(&self) -> String {
        match self.authority().split(':').next() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => "localhost".to_string(),
        }
    }

    /// Port from the Host header; 80 when absent, 0 when unparseable.
    pub fn port(&self) -> u16 {
        let parts: Vec<&str> = self.authority().split(':').collect();
        match parts.as_slice() {
            [_, port] => port.parse().unwrap_or(0),
            _ => 80,
        }
    }

    /// `scheme://host`
    pub fn site(&self) -> String {
        format!("{}://{}", self.scheme(), self.host())
    }

    /// Alias of [`Context::host`].
    pub fn domain(&self) -> String {
        self.host()
    }

    /// Everything left of the last two labels: `api` for `api.example.com`.
    pub fn subdomain(&self) -> String {
        let host = self.host();
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() >= 3 {
            labels[..labels.len() - 2].join(".")
        } else {
            String::new()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn referer(&self) -> &str {
        self.get("Referer")
    }

    pub fn user_agent(&self) -> &str {
        self.get("User-Agent")
    }

    /// Addresses listed in `X-Forwarded-For`, client first.
    pub fn proxy(&self) -> Vec<String> {
        match self.get("X-Forwarded-For") {
            "" => Vec::new(),
            ips => ips.split(',').map(|ip| ip.trim().to_string()).collect(),
        }
    }

    /// Client address: first forwarded hop, then the peer, then 127.0.0.1.
    pub fn ip(&self) -> String {
        if let Some(first) = self.proxy().into_iter().next().filter(|ip| !ip.is_empty()) {
            // Strip a port, but leave bare IPv6 addresses alone.
            return match first.split_once(':') {
                Some((ip, port)) if !port.contains(':') => ip.to_string(),
                _ => first,
            };
        }
        self.remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn accepts_html(&self) -> bool {
        ACCEPTS_HTML.is_match(self.get("Accept"))
    }

    pub fn accepts_xml(&self) -> bool {
        ACCEPTS_XML.is_match(self.get("Accept"))
    }

    pub fn accepts_json(&self) -> bool {
        ACCEPTS_JSON.is_match(self.get("Accept"))
    }

    // Response

    /// Set a response header, replacing any previous value.
    pub fn header(&mut self, key: &str, value: &str) {
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.writer.headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = %key, "Invalid response header ignored"),
        }
    }

    pub fn response_headers(&self) -> &HeaderMap {
        self.writer.headers()
    }

    pub fn write_header(&mut self, status: StatusCode) {
        self.writer.set_status(status);
    }

    pub fn status(&self) -> StatusCode {
        self.writer.status()
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize, WriterError> {
        self.writer.write(data)
    }

    pub fn write_string(&mut self, data: &str) -> Result<(), WriterError> {
        self.writer.write(data.as_bytes()).map(|_| ())
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.writer.supports(capability)
    }

    /// Send everything written so far to the client.
    pub fn flush(&mut self) -> Result<(), WriterError> {
        self.writer.flush()
    }

    pub fn close_notify(&mut self) -> Result<CloseNotify, WriterError> {
        self.writer.close_notify()
    }

    /// Take over the connection for a protocol upgrade.
    pub fn hijack(&mut self) -> Result<OnUpgrade, WriterError> {
        self.writer.hijack()
    }

    /// Write `value` as JSON. On failure a 500 with the error message has
    /// been written and the error is returned for logging.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T, indent: bool) -> Result<(), SerializationError> {
        let encoded = encode::to_json(value, indent);
        self.write_encoded(encoded, JSON_CONTENT_TYPE)
    }

    /// Write `value` as XML, with the same failure behavior as [`Context::json`].
    pub fn xml<T: Serialize + ?Sized>(&mut self, value: &T, indent: bool) -> Result<(), SerializationError> {
        let encoded = encode::to_xml(value, indent);
        self.write_encoded(encoded, XML_CONTENT_TYPE)
    }

    fn write_encoded(
        &mut self,
        encoded: Result<Vec<u8>, SerializationError>,
        content_type: &'static str,
    ) -> Result<(), SerializationError> {
        match encoded {
            Ok(body) => {
                self.writer
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                if let Err(e) = self.writer.write(&body) {
                    tracing::debug!(error = %e, "Structured body not delivered");
                }
                Ok(())
            }
            Err(e) => {
                write_error(self.writer.as_mut(), StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
                Err(e)
            }
        }
    }

    /// Write `data` with `status`, flush, and stop the rest of the pipeline.
    pub fn intercept(&mut self, data: &[u8], status: StatusCode, reason: impl Into<String>) {
        self.writer.set_status(status);
        if let Err(e) = self.writer.write(data) {
            tracing::debug!(error = %e, "Intercept body not delivered");
        }
        match self.writer.flush() {
            Ok(()) | Err(WriterError::Unsupported(_)) => {}
            Err(e) => tracing::debug!(error = %e, "Intercept flush failed"),
        }
        self.interrupt = Some(reason.into());
    }

    pub fn is_intercepted(&self) -> bool {
        self.interrupt.is_some()
    }

    pub fn interrupt_reason(&self) -> Option<&str> {
        self.interrupt.as_deref()
    }

    /// Plain `404 page not found` response.
    pub fn not_found(&mut self) {
        write_error(self.writer.as_mut(), StatusCode::NOT_FOUND, "404 page not found");
    }

    pub fn is_committed(&self) -> bool {
        self.writer.is_committed()
    }

    pub(crate) fn writer_mut(&mut self) -> &mut dyn ResponseWriter {
        self.writer.as_mut()
    }

    /// Complete the response. Called by the dispatcher on every exit path.
    pub fn finish(&mut self) {
        self.writer.finish();
    }
}

/// `x-forwarded-for` → `X-Forwarded-For`
pub fn canonical_header_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            (canonical_header_key(name.as_str()), joined)
        })
        .collect()
}

fn parse_form(parts: &Parts, body: &Bytes) -> HashMap<String, String> {
    let mut form: HashMap<String, String> = HashMap::new();

    let has_form_body = matches!(parts.method, Method::POST | Method::PUT | Method::PATCH)
        && parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().starts_with(FORM_CONTENT_TYPE));

    // Repeated keys are concatenated, body values first.
    if has_form_body {
        for (key, value) in url::form_urlencoded::parse(body) {
            form.entry(key.into_owned()).or_default().push_str(&value);
        }
    }
    if let Some(query) = parts.uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            form.entry(key.into_owned()).or_default().push_str(&value);
        }
    }

    form
}
