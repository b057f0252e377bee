//! Access-token resolution.
//!
//! The token is served by an HTTP endpoint as either a bare token string or
//! a JSON object with an `access_token` field.

use serde_json::Value;
use tracing::{debug, info};

use crate::error::DropboxError;

/// Fetches the Dropbox access token from `url`.
pub async fn fetch_access_token(http: &reqwest::Client, url: &str) -> Result<String, DropboxError> {
    debug!("fetching Dropbox access token");
    let resp = http.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(DropboxError::TokenFetch(status.as_u16()));
    }

    let body = resp.text().await?;
    let token = parse_token_body(&body)?;
    info!("Dropbox access token fetched");
    Ok(token)
}

/// Extracts the token from a credentials response body.
///
/// A JSON object must carry a string `access_token`; a body that is not JSON
/// is taken as the bare token.
pub fn parse_token_body(body: &str) -> Result<String, DropboxError> {
    let trimmed = body.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => match map.get("access_token").and_then(Value::as_str) {
            Some(token) => non_empty(token.trim()),
            None => Err(DropboxError::InvalidToken),
        },
        Ok(Value::String(s)) => non_empty(s.trim()),
        Ok(_) => Err(DropboxError::InvalidToken),
        Err(_) => non_empty(trimmed),
    }
}

fn non_empty(token: &str) -> Result<String, DropboxError> {
    if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(DropboxError::InvalidToken);
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn bare_token() {
        assert_eq!(parse_token_body("sl.ABCdef123\n").unwrap(), "sl.ABCdef123");
    }

    #[test]
    fn json_token() {
        let body = r#"{"access_token": "sl.XYZ", "expires_in": 14400}"#;
        assert_eq!(parse_token_body(body).unwrap(), "sl.XYZ");
    }

    #[test]
    fn json_string_token() {
        assert_eq!(parse_token_body(r#""sl.quoted""#).unwrap(), "sl.quoted");
    }

    #[test]
    fn json_without_access_token_is_rejected() {
        let err = parse_token_body(r#"{"token":"x"}"#).unwrap_err();
        assert!(matches!(err, DropboxError::InvalidToken));
    }

    #[test]
    fn json_with_non_string_access_token_is_rejected() {
        assert!(matches!(
            parse_token_body(r#"{"access_token":42}"#),
            Err(DropboxError::InvalidToken)
        ));
        assert!(matches!(parse_token_body("[1,2]"), Err(DropboxError::InvalidToken)));
    }

    #[test]
    fn empty_body() {
        assert!(matches!(parse_token_body("  \n"), Err(DropboxError::InvalidToken)));
    }

    async fn serve_once(status: u16, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        url
    }

    #[tokio::test]
    async fn fetch_parses_response() {
        let url = serve_once(200, r#"{"access_token":"sl.remote"}"#).await;
        let token = fetch_access_token(&reqwest::Client::new(), &url).await.unwrap();
        assert_eq!(token, "sl.remote");
    }

    #[tokio::test]
    async fn fetch_reports_status() {
        let url = serve_once(404, "not found").await;
        let err = fetch_access_token(&reqwest::Client::new(), &url)
            .await
            .unwrap_err();
        assert!(matches!(err, DropboxError::TokenFetch(404)));
    }
}
