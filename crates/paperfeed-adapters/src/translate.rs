//! Client for the external text translation endpoint.

use async_trait::async_trait;
use paperfeed_storage::{FetchError, HttpFetcher};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid translation endpoint: {0}")]
    Endpoint(String),
    #[error("unreadable translation response: {0}")]
    Decode(String),
    #[error("translation rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslateError>;
}

/// `GET <endpoint>?text=<text>` answering `{"code": 200, "text": "..."}`.
#[derive(Debug, Clone)]
pub struct HttpTranslator {
    http: HttpFetcher,
    endpoint: String,
}

impl HttpTranslator {
    pub fn new(http: HttpFetcher, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    fn request_url(&self, text: &str) -> Result<Url, TranslateError> {
        Url::parse_with_params(&self.endpoint, &[("text", text)])
            .map_err(|e| TranslateError::Endpoint(format!("{}: {e}", self.endpoint)))
    }
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    code: i64,
    #[serde(default)]
    text: String,
}

fn decode_translation(body: &[u8]) -> Result<String, TranslateError> {
    let resp: TranslateResponse =
        serde_json::from_slice(body).map_err(|e| TranslateError::Decode(e.to_string()))?;
    if resp.code != 200 {
        return Err(TranslateError::Rejected {
            code: resp.code,
            message: resp.text,
        });
    }
    Ok(resp.text)
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        let url = self.request_url(text)?;
        let resp = self.http.fetch_bytes(url.as_str()).await?;
        decode_translation(&resp.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperfeed_storage::HttpClientConfig;

    #[test]
    fn ok_code_yields_text() {
        let body = r#"{"code":200,"text":"言語モデル"}"#.as_bytes();
        assert_eq!(decode_translation(body).unwrap(), "言語モデル");
    }

    #[test]
    fn non_ok_code_is_a_rejection() {
        let body = br#"{"code":400,"text":"quota exceeded"}"#;
        match decode_translation(body).unwrap_err() {
            TranslateError::Rejected { code, message } => {
                assert_eq!(code, 400);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        assert!(matches!(
            decode_translation(b"<html>moved</html>"),
            Err(TranslateError::Decode(_))
        ));
    }

    #[test]
    fn text_is_percent_encoded_into_the_query() {
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        let translator = HttpTranslator::new(http, "https://translate.example.com/exec?source=en&target=ja");
        let url = translator.request_url("a & b = c").unwrap();
        let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
        assert!(pairs.contains(&("source".to_string(), "en".to_string())));
        assert!(pairs.contains(&("text".to_string(), "a & b = c".to_string())));
    }
}
