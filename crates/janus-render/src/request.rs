//! Built-in request renders.
//!
//! A request render turns an inbound [`HttpRequest`] into raw keyword
//! arguments. Values are left as text wherever the wire format is textual;
//! the coercion plan casts them afterwards.
//!
//! | Key | Sources |
//! |---|---|
//! | `auto` | query, path parameters, then the body parsed by content type |
//! | `json` | body as a JSON object |
//! | `form` | url-encoded or multipart body, files read into memory |
//! | `query` | query string |
//! | `match` | path parameters |
//! | `simple` | query and path parameters |
//!
//! Later sources override earlier ones when keys collide.

use std::future::Future;
use std::sync::Arc;

use base64::Engine as _;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use janus_core::{HttpRequest, JanusError, JanusResult, Kwargs};
use serde_json::{json, Value};

/// A request render.
pub type RequestRender =
    Arc<dyn Fn(Arc<HttpRequest>) -> BoxFuture<'static, JanusResult<Kwargs>> + Send + Sync>;

/// Wraps an async function as a [`RequestRender`].
///
/// ```
/// use janus_render::request_render;
/// use janus_core::{HttpRequest, Kwargs};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let render = request_render(|req: Arc<HttpRequest>| async move {
///     let mut kwargs = Kwargs::new();
///     kwargs.insert("path".into(), json!(req.path()));
///     Ok(kwargs)
/// });
/// # let _ = render;
/// ```
pub fn request_render<F, Fut>(f: F) -> RequestRender
where
    F: Fn(Arc<HttpRequest>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JanusResult<Kwargs>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Every built-in request render, in registration order.
#[must_use]
pub fn builtin() -> Vec<(&'static str, RequestRender)> {
    vec![
        ("auto", request_render(auto)),
        ("json", request_render(json_body)),
        ("form", request_render(form)),
        ("query", request_render(|req: Arc<HttpRequest>| async move { query(&req) })),
        ("match", request_render(|req: Arc<HttpRequest>| async move { Ok(path_match(&req)) })),
        ("simple", request_render(|req: Arc<HttpRequest>| async move { simple(&req) })),
    ]
}

/// Query string fields.
pub fn query(req: &HttpRequest) -> JanusResult<Kwargs> {
    match req.query_string() {
        Some(qs) if !qs.is_empty() => parse_urlencoded(qs.as_bytes(), "query string"),
        _ => Ok(Kwargs::new()),
    }
}

/// Path parameters captured by the route.
#[must_use]
pub fn path_match(req: &HttpRequest) -> Kwargs {
    req.path_params()
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Query string fields merged with path parameters.
pub fn simple(req: &HttpRequest) -> JanusResult<Kwargs> {
    let mut kwargs = query(req)?;
    kwargs.extend(path_match(req));
    Ok(kwargs)
}

/// The body as a JSON object. An empty body yields no arguments.
pub async fn json_body(req: Arc<HttpRequest>) -> JanusResult<Kwargs> {
    parse_json(req.body())
}

/// Form fields from a url-encoded or multipart body.
pub async fn form(req: Arc<HttpRequest>) -> JanusResult<Kwargs> {
    match body_kind(&req) {
        BodyKind::Multipart(boundary) => parse_multipart(req.body().clone(), boundary).await,
        _ if req.body().is_empty() => Ok(Kwargs::new()),
        _ => parse_urlencoded(req.body(), "form body"),
    }
}

/// Query and path parameters plus the body parsed by its content type.
pub async fn auto(req: Arc<HttpRequest>) -> JanusResult<Kwargs> {
    let mut kwargs = simple(&req)?;
    let body = match body_kind(&req) {
        _ if req.body().is_empty() => Kwargs::new(),
        BodyKind::Json => parse_json(req.body())?,
        BodyKind::UrlEncoded => parse_urlencoded(req.body(), "form body")?,
        BodyKind::Multipart(boundary) => parse_multipart(req.body().clone(), boundary).await?,
        BodyKind::Other => {
            tracing::debug!(
                content_type = req.content_type().unwrap_or_default(),
                "ignoring body with unsupported content type"
            );
            Kwargs::new()
        }
    };
    kwargs.extend(body);
    Ok(kwargs)
}

enum BodyKind {
    Json,
    UrlEncoded,
    Multipart(String),
    Other,
}

fn body_kind(req: &HttpRequest) -> BodyKind {
    let Some(mime) = req
        .content_type()
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
    else {
        return BodyKind::Other;
    };

    if mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON) {
        return BodyKind::Json;
    }
    if mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
        return BodyKind::UrlEncoded;
    }
    if mime.essence_str() == mime::MULTIPART_FORM_DATA.essence_str() {
        if let Some(boundary) = mime.get_param(mime::BOUNDARY) {
            return BodyKind::Multipart(boundary.as_str().to_string());
        }
    }
    BodyKind::Other
}

fn parse_json(body: &Bytes) -> JanusResult<Kwargs> {
    if body.is_empty() {
        return Ok(Kwargs::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(JanusError::content_invalid("body must be a JSON object")),
        Err(e) => Err(JanusError::content_invalid(e.to_string())),
    }
}

fn parse_urlencoded(input: &[u8], what: &str) -> JanusResult<Kwargs> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(input)
        .map_err(|e| JanusError::content_invalid(format!("invalid {what}: {e}")))?;
    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect())
}

async fn parse_multipart(body: Bytes, boundary: String) -> JanusResult<Kwargs> {
    let stream = futures_util::stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut kwargs = Kwargs::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| JanusError::content_invalid(format!("multipart parse error: {e}")))?
    {
        let Some(name) = field.name().map(String::from) else {
            continue;
        };
        let file_name = field.file_name().map(String::from);
        let content_type = field.content_type().map(ToString::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| JanusError::content_invalid(format!("failed to read field: {e}")))?;

        let value = match file_name {
            Some(filename) => json!({
                "filename": filename,
                "content_type": content_type,
                "size": data.len(),
                "content": base64::engine::general_purpose::STANDARD.encode(&data),
            }),
            None => Value::String(String::from_utf8_lossy(&data).into_owned()),
        };
        kwargs.insert(name, value);
    }

    Ok(kwargs)
}
