//! Typed access to query, route, form and cookie values.
//!
//! Every `*_int`/`*_bool`/... accessor returns `(value, present)`: the
//! parsed value and `true`, or the caller's default and `false` when the key
//! is absent or its first value does not parse.

use std::collections::HashMap;
use std::net::IpAddr;

use axum::body::Bytes;
use axum::http::header::{CONTENT_TYPE, COOKIE, HOST};
use axum::http::HeaderMap;
use futures_util::stream;
use multer::Multipart;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::http::context::Context;

/// Raw multi-valued string map, as parsed from a query string or form body.
pub type ValueMap = HashMap<String, Vec<String>>;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM: &str = "multipart/form-data";

/// Conversion from the raw string values bound to one key.
pub trait Coerce: Sized {
    fn coerce(values: &[String]) -> Option<Self>;
}

macro_rules! coerce_parse {
    ($($ty:ty),*) => {
        $(
            impl Coerce for $ty {
                fn coerce(values: &[String]) -> Option<Self> {
                    values.first()?.trim().parse().ok()
                }
            }
        )*
    };
}

coerce_parse!(i32, i64, f32, f64);

impl Coerce for bool {
    fn coerce(values: &[String]) -> Option<Self> {
        match values.first()?.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
            _ => None,
        }
    }
}

impl Coerce for String {
    fn coerce(values: &[String]) -> Option<Self> {
        values.first().cloned()
    }
}

impl Coerce for Vec<String> {
    fn coerce(values: &[String]) -> Option<Self> {
        Some(values.to_vec())
    }
}

fn lookup<T: Coerce>(values: Option<&Vec<String>>, default: T) -> (T, bool) {
    match values.and_then(|v| T::coerce(v)) {
        Some(value) => (value, true),
        None => (default, false),
    }
}

/// Parse `a=1&b=x&a=2` into a multi-valued map, keeping value order.
pub fn parse_urlencoded(input: &[u8]) -> ValueMap {
    let mut map = ValueMap::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        map.entry(key.into_owned()).or_default().push(value.into_owned());
    }
    map
}

fn has_content_type(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
}

pub(crate) fn is_multipart(headers: &HeaderMap) -> bool {
    has_content_type(headers, MULTIPART_FORM)
}

/// Fields of an urlencoded body; empty for any other content type.
pub(crate) fn urlencoded_fields(headers: &HeaderMap, body: &[u8]) -> ValueMap {
    if has_content_type(headers, FORM_URLENCODED) {
        parse_urlencoded(body)
    } else {
        ValueMap::new()
    }
}

fn multipart_reader(headers: &HeaderMap, body: &Bytes) -> Result<Multipart<'static>> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let boundary = multer::parse_boundary(content_type)?;
    let body = body.clone();
    Ok(Multipart::new(
        stream::once(async move { Ok::<_, std::io::Error>(body) }),
        boundary,
    ))
}

/// Text fields of a multipart body, in body order. File parts are skipped.
pub(crate) async fn multipart_fields(headers: &HeaderMap, body: &Bytes) -> Result<ValueMap> {
    let mut multipart = multipart_reader(headers, body)?;
    let mut fields = ValueMap::new();

    while let Some(part) = multipart.next_field().await? {
        if part.file_name().is_some() {
            continue;
        }
        let Some(name) = part.name().map(str::to_string) else {
            continue;
        };
        let value = part.text().await?;
        fields.entry(name).or_default().push(value);
    }
    Ok(fields)
}

/// An uploaded file read from a multipart body.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: usize,
    pub data: Bytes,
}

macro_rules! typed_accessors {
    ($source:ident: $($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&self, key: &str, default: $ty) -> ($ty, bool) {
                self.$source(key, default)
            }
        )*
    };
}

impl Context {
    // ---- query ----

    pub fn query_all(&self) -> ValueMap {
        parse_urlencoded(self.uri().query().unwrap_or_default().as_bytes())
    }

    pub fn query<T: Coerce>(&self, key: &str, default: T) -> (T, bool) {
        lookup(self.query_all().get(key), default)
    }

    typed_accessors!(query:
        query_int => i32,
        query_int64 => i64,
        query_float32 => f32,
        query_float64 => f64,
        query_bool => bool,
        query_string => String,
        query_strings => Vec<String>,
    );

    // ---- route params ----

    pub fn param_value<T: Coerce>(&self, key: &str, default: T) -> (T, bool) {
        let values = self.param(key).map(|v| vec![v.to_string()]);
        lookup(values.as_ref(), default)
    }

    typed_accessors!(param_value:
        param_int => i32,
        param_int64 => i64,
        param_float32 => f32,
        param_float64 => f64,
        param_bool => bool,
        param_string => String,
        param_strings => Vec<String>,
    );

    // ---- urlencoded form ----

    /// Fields of an urlencoded body, or the text fields of a multipart body
    /// once loaded (dispatch always loads them); empty otherwise.
    pub fn form_all(&self) -> ValueMap {
        self.form_fields().clone()
    }

    pub fn form<T: Coerce>(&self, key: &str, default: T) -> (T, bool) {
        lookup(self.form_fields().get(key), default)
    }

    typed_accessors!(form:
        form_int => i32,
        form_int64 => i64,
        form_float32 => f32,
        form_float64 => f64,
        form_bool => bool,
        form_string => String,
        form_strings => Vec<String>,
    );

    /// First file uploaded under `field` in a `multipart/form-data` body.
    pub async fn form_file(&self, field: &str) -> Result<FileHeader> {
        let mut multipart = multipart_reader(self.headers(), self.body())?;

        while let Some(part) = multipart.next_field().await? {
            if part.name() != Some(field) {
                continue;
            }
            let Some(file_name) = part.file_name().map(str::to_string) else {
                continue;
            };
            let content_type = part.content_type().map(|m| m.to_string());
            let data = part.bytes().await?;
            tracing::debug!(field = %field, file_name = %file_name, size = data.len(), "Multipart file read");
            return Ok(FileHeader {
                field: field.to_string(),
                file_name,
                content_type,
                size: data.len(),
                data,
            });
        }
        Err(Error::MissingField(field.to_string()))
    }

    // ---- body ----

    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(self.body())?)
    }

    // ---- request info ----

    pub fn cookies(&self) -> HashMap<String, String> {
        self.headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.trim().to_string(), value.trim().trim_matches('"').to_string()))
            })
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// `Host` header, falling back to the URI authority.
    pub fn host(&self) -> Option<String> {
        self.header(HOST.as_str())
            .map(str::to_string)
            .or_else(|| self.uri().authority().map(|a| a.to_string()))
    }

    /// Client address: `x-forwarded-for` (first hop), then `x-real-ip`,
    /// then the peer address.
    pub fn client_ip(&self) -> Option<IpAddr> {
        let forwarded = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok());
        forwarded
            .or_else(|| self.header("x-real-ip").and_then(|v| v.trim().parse().ok()))
            .or_else(|| self.remote_addr().map(|addr| addr.ip()))
    }
}
