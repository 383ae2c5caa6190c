//! Fluent URL construction and parsing.
//!
//! # Design
//! `UrlBuilder` accumulates components by value: every `setting_*`,
//! `appending_*` and `adding_*` method consumes the builder and hands it
//! back, and every one of them takes an `Option` so that "set it if I have
//! it" chains need no branching. `build` borrows, so one builder can stamp
//! out several URLs.
//!
//! Query values go through the sealed `QueryValue` trait: one rendering per
//! supported scalar kind, chosen at compile time.
//!
//! `build` returns a `RequestUrl` rather than a bare `url::Url`: the WHATWG
//! serializer drops a port equal to the scheme default, and a port the
//! caller set must survive into the request line and back through `parse`.
//! Path segments are percent-encoded one by one, so a segment containing
//! `%`, `?` or `#` comes back from `parse` unchanged.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::{form_urlencoded, ParseError, Position, Url};
use uuid::Uuid;

use crate::error::{UrlError, UrlErrorKind};

/// Bytes escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

mod sealed {
    pub trait Sealed {}
}

/// Scalar types accepted as query-item values.
pub trait QueryValue: sealed::Sealed {
    fn to_query_value(&self) -> String;
}

macro_rules! display_query_value {
    ($($ty:ty),+ $(,)?) => {$(
        impl sealed::Sealed for $ty {}

        impl QueryValue for $ty {
            fn to_query_value(&self) -> String {
                self.to_string()
            }
        }
    )+};
}

display_query_value!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, Uuid);

impl sealed::Sealed for &str {}

impl QueryValue for &str {
    fn to_query_value(&self) -> String {
        (*self).to_string()
    }
}

/// One `name[=value]` pair of a query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryItem {
    pub name: String,
    pub value: Option<String>,
}

impl QueryItem {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// An item without a value, serialized as a bare `name`.
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlBuilder {
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    path: Vec<String>,
    query: Vec<QueryItem>,
    date_format: Option<String>,
}

impl UrlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an absolute URL into its components.
    ///
    /// Strings without a scheme fail with `MissingScheme`, strings whose
    /// authority is empty with `MissingHost`, anything else the parser
    /// rejects with `Invalid`.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let url = parse_absolute(input)?;

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => {
                return Err(UrlError::new(UrlErrorKind::MissingHost)
                    .with_details(format!("`{input}` has no host"))
                    .with_user_info("url", input))
            }
        };

        let user = Some(url.username())
            .filter(|user| !user.is_empty())
            .map(str::to_string);
        let path = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            scheme: Some(url.scheme().to_string()),
            host: Some(host),
            port: explicit_port(input, &url),
            user,
            password: url.password().map(str::to_string),
            path,
            query: url.query().map(parse_query).unwrap_or_default(),
            date_format: None,
        })
    }

    pub fn from_url(url: &RequestUrl) -> Result<Self, UrlError> {
        Self::parse(url.as_str())
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn path_segments(&self) -> &[String] {
        &self.path
    }

    pub fn query_items(&self) -> &[QueryItem] {
        &self.query
    }

    pub fn setting_scheme(mut self, scheme: Option<&str>) -> Self {
        if let Some(scheme) = scheme {
            self.scheme = Some(scheme.to_string());
        }
        self
    }

    pub fn setting_host(mut self, host: Option<&str>) -> Self {
        if let Some(host) = host {
            self.host = Some(host.to_string());
        }
        self
    }

    pub fn setting_port(mut self, port: Option<u16>) -> Self {
        if port.is_some() {
            self.port = port;
        }
        self
    }

    pub fn setting_user(mut self, user: Option<&str>) -> Self {
        if let Some(user) = user {
            self.user = Some(user.to_string());
        }
        self
    }

    pub fn setting_password(mut self, password: Option<&str>) -> Self {
        if let Some(password) = password {
            self.password = Some(password.to_string());
        }
        self
    }

    /// Format used for dates added without an explicit format
    /// (chrono `strftime` syntax).
    pub fn with_date_format(mut self, format: Option<&str>) -> Self {
        if let Some(format) = format {
            self.date_format = Some(format.to_string());
        }
        self
    }

    /// Split on `/` and append each non-empty segment.
    pub fn appending_path(mut self, path: Option<&str>) -> Self {
        if let Some(path) = path {
            self.path.extend(
                path.split('/')
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string),
            );
        }
        self
    }

    pub fn adding_query_item<V: QueryValue>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.push_query(QueryItem::new(name, value.to_query_value())),
            None => self,
        }
    }

    /// Add any `Display` value, e.g. a decimal type.
    pub fn adding_query_display<V: fmt::Display>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.push_query(QueryItem::new(name, value.to_string())),
            None => self,
        }
    }

    /// Add a date rendered with `format`, else the builder's date format,
    /// else ISO-8601 in UTC.
    pub fn adding_query_date(
        self,
        name: &str,
        value: Option<DateTime<Utc>>,
        format: Option<&str>,
    ) -> Self {
        let Some(value) = value else {
            return self;
        };
        let rendered = render_date(value, format.or(self.date_format.as_deref()));
        self.push_query(QueryItem::new(name, rendered))
    }

    pub fn adding_query_flag(self, name: &str) -> Self {
        self.push_query(QueryItem::flag(name))
    }

    fn push_query(mut self, item: QueryItem) -> Self {
        self.query.push(item);
        self
    }

    /// Assemble the URL from the current components.
    ///
    /// `.` and `..` segments are rejected as `Invalid`: the URL machinery
    /// would resolve them and silently drop the segments around them.
    pub fn build(&self) -> Result<RequestUrl, UrlError> {
        let scheme = self
            .scheme
            .as_deref()
            .ok_or_else(|| UrlError::new(UrlErrorKind::MissingScheme))?;
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| UrlError::new(UrlErrorKind::MissingHost))?;
        if host.is_empty() {
            return Err(UrlError::new(UrlErrorKind::MissingHost));
        }
        if host.contains(['/', '?', '#', '@']) {
            return Err(invalid(format!("`{host}` is not a valid host")));
        }

        let base = format!("{scheme}://{host}");
        let mut url = Url::parse(&base).map_err(|err| {
            invalid(format!("`{base}` could not be parsed: {err}")).with_cause(err)
        })?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(invalid(format!("`{base}` has no usable authority")));
        }

        if let Some(port) = self.port {
            url.set_port(Some(port))
                .map_err(|()| invalid(format!("port {port} rejected for `{base}`")))?;
        }
        if let (Some(user), Some(password)) = (&self.user, &self.password) {
            url.set_username(user)
                .map_err(|()| invalid(format!("user rejected for `{base}`")))?;
            url.set_password(Some(password))
                .map_err(|()| invalid(format!("password rejected for `{base}`")))?;
        }

        if let Some(segment) = self
            .path
            .iter()
            .find(|segment| segment.as_str() == "." || segment.as_str() == "..")
        {
            return Err(invalid(format!("path segment `{segment}` would be resolved away")));
        }
        let path = self
            .path
            .iter()
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        url.set_path(&format!("/{path}"));

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for item in &self.query {
                match &item.value {
                    Some(value) => {
                        pairs.append_pair(&item.name, value);
                    }
                    None => {
                        pairs.append_key_only(&item.name);
                    }
                }
            }
        }

        Ok(RequestUrl::with_port(url, self.port))
    }
}

impl FromStr for UrlBuilder {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An absolute URL exactly as built or parsed, explicit port included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestUrl {
    url: Url,
    serialized: String,
    port: Option<u16>,
}

impl RequestUrl {
    /// Parse an absolute URL, keeping a written-out default port.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let url = parse_absolute(input)?;
        let port = explicit_port(input, &url);
        Ok(Self::with_port(url, port))
    }

    fn with_port(url: Url, port: Option<u16>) -> Self {
        let serialized = match port {
            Some(port) if url.port().is_none() => format!(
                "{}:{port}{}",
                &url[..Position::AfterHost],
                &url[Position::AfterHost..]
            ),
            _ => url.as_str().to_string(),
        };
        Self {
            port: port.or_else(|| url.port()),
            url,
            serialized,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// The normalized `url::Url`; its `port()` omits a default port.
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    pub fn into_url(self) -> Url {
        self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host_str(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// The port as written, even when it equals the scheme default.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn username(&self) -> &str {
        self.url.username()
    }

    pub fn password(&self) -> Option<&str> {
        self.url.password()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }
}

impl From<Url> for RequestUrl {
    fn from(url: Url) -> Self {
        let port = url.port();
        Self::with_port(url, port)
    }
}

impl FromStr for RequestUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for RequestUrl {
    fn as_ref(&self) -> &str {
        &self.serialized
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized)
    }
}

fn parse_absolute(input: &str) -> Result<Url, UrlError> {
    Url::parse(input).map_err(|err| {
        let kind = match err {
            ParseError::RelativeUrlWithoutBase => UrlErrorKind::MissingScheme,
            ParseError::EmptyHost => UrlErrorKind::MissingHost,
            _ => UrlErrorKind::Invalid,
        };
        UrlError::new(kind)
            .with_details(format!("`{input}` could not be parsed: {err}"))
            .with_user_info("url", input)
            .with_cause(err)
    })
}

/// The parsed port, or the scheme default when `input` spells it out.
fn explicit_port(input: &str, url: &Url) -> Option<u16> {
    if let Some(port) = url.port() {
        return Some(port);
    }
    let default = url.port_or_known_default()?;
    let (_, rest) = input.trim().split_once("://")?;
    let authority = rest.split(['/', '\\', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let (_, written) = host_port.rsplit_once(':')?;
    (written.parse::<u16>().ok()? == default).then_some(default)
}

fn invalid(details: String) -> UrlError {
    UrlError::new(UrlErrorKind::Invalid).with_details(details)
}

fn render_date(value: DateTime<Utc>, format: Option<&str>) -> String {
    let iso = || value.to_rfc3339_opts(SecondsFormat::Secs, true);
    let Some(format) = format else {
        return iso();
    };
    let mut out = String::new();
    // Invalid strftime items surface as a formatting error.
    match write!(out, "{}", value.format(format)) {
        Ok(()) => out,
        Err(_) => iso(),
    }
}

/// Split a raw query string into items, keeping value-less names as flags.
fn parse_query(query: &str) -> Vec<QueryItem> {
    query
        .split('&')
        .filter(|piece| !piece.is_empty())
        .filter_map(|piece| {
            let (name, value) = form_urlencoded::parse(piece.as_bytes()).next()?;
            let value = piece.contains('=').then(|| value.into_owned());
            Some(QueryItem {
                name: name.into_owned(),
                value,
            })
        })
        .collect()
}
