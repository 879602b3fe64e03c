use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use reqwest::{
    Request,
    header::{AUTHORIZATION, HeaderName, HeaderValue},
};
use sha2::Sha256;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::error::ClientError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_SCHEME: &str = "bhesignature";
const REQUEST_DATE: HeaderName = HeaderName::from_static("requestdate");
const SIGNATURE: HeaderName = HeaderName::from_static("signature");

/// Authenticates outgoing requests in place, right before they are sent.
pub trait RequestSigner: Send + Sync + 'static {
    fn sign(&self, request: &mut Request) -> Result<(), ClientError>;
}

/// Leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSigner;

impl RequestSigner for NoSigner {
    fn sign(&self, _request: &mut Request) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Token-based HMAC-SHA256 request signatures.
///
/// The signing key is chained through three stages:
/// 1. `HMAC(token, method + path_and_query)`
/// 2. `HMAC(stage1, request_date[..13])` (date truncated to the hour)
/// 3. `HMAC(stage2, body)`
///
/// The base64 result goes into the `Signature` header, alongside
/// `RequestDate` and `Authorization: bhesignature <token id>`.
#[derive(Clone)]
pub struct HmacSigner {
    token_id: String,
    token: String,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner")
            .field("token_id", &self.token_id)
            .finish_non_exhaustive()
    }
}

impl HmacSigner {
    pub fn new(token_id: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        let token_id = token_id.into();
        let token = token.into();
        if token_id.trim().is_empty() {
            return Err(ClientError::Credentials("token id is empty".into()));
        }
        if token.is_empty() {
            return Err(ClientError::Credentials("token is empty".into()));
        }
        Ok(Self { token_id, token })
    }

    /// Base64 signature for a request issued at `request_date`.
    pub fn signature(
        &self,
        method: &str,
        path_and_query: &str,
        request_date: &str,
        body: &[u8],
    ) -> Result<String, ClientError> {
        let date_scope = request_date.get(..13).unwrap_or(request_date);

        let operation_key = digest(self.token.as_bytes(), &[method.as_bytes(), path_and_query.as_bytes()])?;
        let date_key = digest(&operation_key, &[date_scope.as_bytes()])?;
        let signature = digest(&date_key, &[body])?;

        Ok(STANDARD.encode(signature))
    }
}

impl RequestSigner for HmacSigner {
    fn sign(&self, request: &mut Request) -> Result<(), ClientError> {
        let request_date = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| ClientError::Signing(format!("format request date: {e}")))?;

        let url = request.url();
        let path_and_query = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let body = request
            .body()
            .and_then(|b| b.as_bytes())
            .unwrap_or_default();

        let signature = self.signature(
            request.method().as_str(),
            &path_and_query,
            &request_date,
            body,
        )?;

        let headers = request.headers_mut();
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("{SIGNATURE_SCHEME} {}", self.token_id))?,
        );
        headers.insert(REQUEST_DATE, header_value(&request_date)?);
        headers.insert(SIGNATURE, header_value(&signature)?);
        Ok(())
    }
}

fn digest(key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, ClientError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ClientError::Signing(format!("hmac key: {e}")))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value).map_err(|e| ClientError::Signing(format!("header value: {e}")))
}
