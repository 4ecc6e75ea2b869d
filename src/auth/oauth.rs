use std::collections::HashMap;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use super::token_store::{self, TokenData};
use crate::config::{AuthConfig, ClientSecret};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const DEFAULT_PORT: u16 = 8080;

/// Interactive authorization: browser consent, then code exchange.
/// Stores the resulting tokens and returns them.
pub async fn run_auth_flow(secret: &ClientSecret, auth: &AuthConfig) -> Result<TokenData> {
    let port = auth.redirect_port.unwrap_or(DEFAULT_PORT);
    let redirect_uri = format!("http://127.0.0.1:{port}/callback");

    let mut state_bytes = [0u8; 16];
    rand::fill(&mut state_bytes);
    let state: String = state_bytes.iter().map(|b| format!("{b:02x}")).collect();

    let auth_url = authorization_url(&secret.client_id, &redirect_uri, &state)?;

    let listener = match TcpListener::bind(format!("127.0.0.1:{port}")).await {
        Ok(l) => {
            tracing::debug!(port, "listening for OAuth callback");
            Some(l)
        }
        Err(e) => {
            tracing::warn!(port, "could not bind for OAuth callback: {e}");
            None
        }
    };

    println!("\nOpen this URL in your browser to authorize drivepush:\n");
    println!("  {auth_url}\n");

    // Fails silently on headless machines
    let _ = open::that(auth_url.as_str());

    if listener.is_some() {
        println!("Waiting for authorization...");
        println!("If the browser runs on another machine, paste the redirect URL or code here:");
    } else {
        println!("Paste the redirect URL or authorization code here:");
    }

    let code = match listener {
        Some(ref l) => {
            tokio::select! {
                result = accept_callback(l, &state) => result?,
                result = read_stdin() => parse_code_input(&result?)?,
            }
        }
        None => parse_code_input(&read_stdin().await?)?,
    };

    println!("\nExchanging authorization code for tokens...");

    let tokens = exchange_code(TOKEN_URL, secret, &code, &redirect_uri).await?;

    let token_path = token_store::resolve_token_path(auth.token_path.as_deref())?;
    token_store::save_tokens(&token_path, &tokens)?;

    println!("Tokens saved to {}", token_path.display());
    Ok(tokens)
}

fn authorization_url(client_id: &str, redirect_uri: &str, state: &str) -> Result<Url> {
    Url::parse_with_params(
        AUTH_URL,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", DRIVE_SCOPE),
            // offline + consent so Google issues a refresh token every time
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .context("Failed to build authorization URL")
}

/// Listen for the OAuth redirect on the loopback server.
async fn accept_callback(listener: &TcpListener, expected_state: &str) -> Result<String> {
    loop {
        let (mut stream, addr) = listener.accept().await?;
        tracing::debug!(%addr, "incoming connection");

        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        let first_line = request.lines().next().unwrap_or("");
        let path = first_line.split_whitespace().nth(1).unwrap_or("");

        // favicon and friends
        if !path.starts_with("/callback") {
            let resp = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
            let _ = stream.write_all(resp.as_bytes()).await;
            continue;
        }

        let url =
            Url::parse(&format!("http://localhost{path}")).context("malformed callback URL")?;
        let params: HashMap<_, _> = url.query_pairs().collect();

        if let Some(error) = params.get("error") {
            let body = format!(
                "<html><body><h1>Authorization failed</h1><p>{error}</p></body></html>"
            );
            send_html(&mut stream, 200, &body).await;
            anyhow::bail!("Authorization denied: {error}");
        }

        let code = match params.get("code") {
            Some(c) => c.to_string(),
            None => continue,
        };

        let recv_state = params.get("state").map(|s| s.as_ref()).unwrap_or("");
        if recv_state != expected_state {
            send_html(
                &mut stream,
                400,
                "<html><body><h1>Invalid state</h1></body></html>",
            )
            .await;
            anyhow::bail!("OAuth state mismatch, refusing the callback");
        }

        send_html(
            &mut stream,
            200,
            "<html><body><h1>drivepush is authorized</h1>\
             <p>You can close this window.</p></body></html>",
        )
        .await;

        return Ok(code);
    }
}

async fn send_html(stream: &mut (impl AsyncWriteExt + Unpin), status: u16, body: &str) {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        _ => "Unknown",
    };
    let resp = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n\
         {body}",
        body.len()
    );
    let _ = stream.write_all(resp.as_bytes()).await;
}

async fn read_stdin() -> Result<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await?
}

/// Accept either the full redirect URL or the bare code.
fn parse_code_input(input: &str) -> Result<String> {
    let input = input.trim();
    anyhow::ensure!(!input.is_empty(), "Empty input");

    if let Ok(url) = Url::parse(input) {
        let params: HashMap<_, _> = url.query_pairs().collect();
        if let Some(code) = params.get("code") {
            return Ok(code.to_string());
        }
    }

    Ok(input.to_string())
}

#[derive(serde::Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

async fn exchange_code(
    token_url: &str,
    secret: &ClientSecret,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenData> {
    let resp = reqwest::Client::new()
        .post(token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await
        .context("Failed to contact Google token endpoint")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Token exchange failed ({status}): {body}");
    }

    let r: TokenResponse = resp
        .json()
        .await
        .context("Failed to parse token response")?;
    let refresh_token = r
        .refresh_token
        .context("Google did not return a refresh token; revoke access and retry `drivepush auth`")?;
    let expires_at = chrono::Utc::now() + chrono::Duration::seconds(r.expires_in as i64);

    Ok(TokenData {
        access_token: r.access_token,
        refresh_token,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn code_from_redirect_url() {
        let code = parse_code_input("http://127.0.0.1:8080/callback?state=x&code=4%2F0Ab\n").unwrap();
        assert_eq!(code, "4/0Ab");
    }

    #[test]
    fn bare_code_passes_through() {
        assert_eq!(parse_code_input("  4/abc  ").unwrap(), "4/abc");
        assert!(parse_code_input("   ").is_err());
    }

    #[test]
    fn authorization_url_requests_offline_drive_access() {
        let url = authorization_url("cid", "http://127.0.0.1:8080/callback", "st").unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "cid");
        assert_eq!(params["scope"], DRIVE_SCOPE);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["state"], "st");
    }

    #[tokio::test]
    async fn exchange_code_parses_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "refresh_token": "1//r",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let secret = ClientSecret {
            client_id: "cid".into(),
            client_secret: "cs".into(),
        };
        let tokens = exchange_code(&format!("{}/token", server.uri()), &secret, "code", "http://x")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "ya29.new");
        assert_eq!(tokens.refresh_token, "1//r");
        assert!(tokens.expires_at > chrono::Utc::now());
    }

    #[tokio::test]
    async fn exchange_code_reports_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let secret = ClientSecret {
            client_id: "cid".into(),
            client_secret: "cs".into(),
        };
        let err = exchange_code(&server.uri(), &secret, "bad", "http://x")
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("invalid_grant"));
    }
}
