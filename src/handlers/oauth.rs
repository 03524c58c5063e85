//! OAuth 2.0 endpoints: authorization, token, revocation, discovery, and
//! client registration.
//!
//! The authorize endpoint validates the client and redirect URI before
//! anything else; failures there render an HTML error and never redirect to
//! the supplied URI. Once those two are proven, every later failure becomes
//! an error redirect that preserves `state`.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use uuid::Uuid;

use crate::config::AppState;
use crate::dto::oauth::{
    AuthorizeParams, ConsentForm, DiscoveryResponse, RegisterClientRequest,
    RegisterClientResponse, RevokeRequestForm, TokenRequestForm,
};
use crate::error::OAuthError;
use crate::handlers::{
    authorization_code_service, consent_service, oauth_client_service, scope_service,
    token_service,
};
use crate::models::OAuthClient;
use crate::services::consent::ConsentService;
use crate::services::scope::ScopeService;
use crate::utils::jwt::TokenType;
use crate::utils::pkce::{validate_code_challenge, PKCE_METHOD_PLAIN, PKCE_METHOD_S256};

/// 302 redirect; OAuth flows expect Found, not See Other
fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

/// Error redirect preserving `state`; only used after the client and
/// redirect URI have been validated
fn error_redirect(redirect_uri: &str, error: &OAuthError, state: &str) -> Response {
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    let mut location = format!("{}{}error={}", redirect_uri, separator, error.code());

    if let Some(description) = error.description() {
        location.push_str(&format!(
            "&error_description={}",
            urlencoding::encode(description)
        ));
    }
    location.push_str(&format!("&state={}", urlencoding::encode(state)));

    found(&location)
}

fn success_redirect(redirect_uri: &str, code: &str, state: &str) -> Response {
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    found(&format!(
        "{}{}code={}&state={}",
        redirect_uri,
        separator,
        code,
        urlencoding::encode(state)
    ))
}

/// Resolve the logged-in user from an edge-provided bearer token
fn authenticated_user(state: &AppState, headers: &HeaderMap) -> Option<(Uuid, Option<Uuid>)> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))?;

    let claims = state.jwt_manager.decode(token.trim()).ok()?;
    if claims.token_type != TokenType::Access {
        return None;
    }
    Some((claims.user_id().ok()?, claims.org_id))
}

/// Client credentials from HTTP Basic, falling back to the form body
fn client_credentials(
    headers: &HeaderMap,
    body_client_id: Option<&str>,
    body_client_secret: Option<&str>,
) -> Option<(String, Option<String>)> {
    if let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Basic "))
    {
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (client_id, client_secret) = decoded.split_once(':')?;
        let secret = (!client_secret.is_empty()).then(|| client_secret.to_string());
        return Some((client_id.to_string(), secret));
    }

    body_client_id.map(|client_id| {
        (
            client_id.to_string(),
            body_client_secret.map(String::from),
        )
    })
}

/// Minimal consent screen; the hidden fields round-trip every authorization
/// parameter through the approval POST
fn consent_page(client: &OAuthClient, scopes: &[String], params: &AuthorizeParams, org_id: Option<Uuid>) -> Html<String> {
    let scope_items: String = scopes
        .iter()
        .map(|scope| format!("<li><code>{}</code></li>", scope))
        .collect();

    let hidden = |name: &str, value: &str| -> String {
        format!(
            r#"<input type="hidden" name="{}" value="{}">"#,
            name, value
        )
    };

    let mut fields = String::new();
    fields.push_str(&hidden("client_id", &params.client_id));
    fields.push_str(&hidden("redirect_uri", &params.redirect_uri));
    fields.push_str(&hidden("scope", &scopes.join(" ")));
    fields.push_str(&hidden("code_challenge", &params.code_challenge));
    fields.push_str(&hidden("code_challenge_method", &params.code_challenge_method));
    fields.push_str(&hidden("state", &params.state));
    if let Some(nonce) = &params.nonce {
        fields.push_str(&hidden("nonce", nonce));
    }
    if let Some(org_id) = org_id {
        fields.push_str(&hidden("org_id", &org_id.to_string()));
    }

    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authorize {name}</title></head>
<body>
  <h1>{name} is requesting access</h1>
  <ul>{scope_items}</ul>
  <form method="post" action="/oauth/authorize">
    {fields}
    <button type="submit" name="action" value="approve">Approve</button>
    <button type="submit" name="action" value="deny">Deny</button>
  </form>
</body>
</html>"#,
        name = client.client_name,
        scope_items = scope_items,
        fields = fields,
    ))
}

/// GET /oauth/authorize
pub async fn authorize_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    let client_service = oauth_client_service(&state);

    tracing::info!(
        client_id = %params.client_id,
        scopes = %params.scope,
        "oauth_authorize_start"
    );

    // Client and redirect URI come first; failures here never redirect.
    let client = match client_service.get_client(&params.client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            tracing::warn!(client_id = %params.client_id, "oauth_authorize_invalid_client");
            return (
                StatusCode::BAD_REQUEST,
                Html("<h1>Invalid client_id</h1>".to_string()),
            )
                .into_response();
        }
        Err(e) => return e.into_response(),
    };

    if !client_service.validate_redirect_uri(&client, &params.redirect_uri) {
        return (
            StatusCode::BAD_REQUEST,
            Html(
                "<h1>Invalid redirect_uri</h1><p>It must exactly match a registered URI.</p>"
                    .to_string(),
            ),
        )
            .into_response();
    }

    // Safe to redirect from here on.
    if params.response_type != "code" {
        return error_redirect(
            &params.redirect_uri,
            &OAuthError::UnsupportedResponseType(format!(
                "Unsupported response_type: {}",
                params.response_type
            )),
            &params.state,
        );
    }

    if params.code_challenge_method != PKCE_METHOD_S256
        && params.code_challenge_method != PKCE_METHOD_PLAIN
    {
        return error_redirect(
            &params.redirect_uri,
            &OAuthError::InvalidRequest(format!(
                "Invalid code_challenge_method: {}",
                params.code_challenge_method
            )),
            &params.state,
        );
    }

    if !validate_code_challenge(&params.code_challenge, &params.code_challenge_method) {
        return error_redirect(
            &params.redirect_uri,
            &OAuthError::InvalidRequest("Invalid code_challenge format".to_string()),
            &params.state,
        );
    }

    if client.require_pkce && params.code_challenge.is_empty() {
        return error_redirect(
            &params.redirect_uri,
            &OAuthError::InvalidRequest("PKCE required for this client".to_string()),
            &params.state,
        );
    }

    let requested_scopes = ScopeService::parse_scope_string(&params.scope);
    if requested_scopes.is_empty() {
        return error_redirect(
            &params.redirect_uri,
            &OAuthError::InvalidScope("No scopes requested".to_string()),
            &params.state,
        );
    }

    // The user must be logged in; otherwise bounce to login with a return URL.
    let Some((user_id, org_id)) = authenticated_user(&state, &headers) else {
        let return_url = format!(
            "/oauth/authorize?response_type={}&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method={}",
            params.response_type,
            urlencoding::encode(&params.client_id),
            urlencoding::encode(&params.redirect_uri),
            urlencoding::encode(&params.scope),
            urlencoding::encode(&params.state),
            urlencoding::encode(&params.code_challenge),
            params.code_challenge_method,
        );
        tracing::info!("oauth_authorize_login_required");
        return Redirect::to(&format!("/login?next={}", urlencoding::encode(&return_url)))
            .into_response();
    };

    // Scopes: requested ∩ client-allowed ∩ user permissions.
    let granted = match scope_service(&state)
        .validate_and_grant(&requested_scopes, &client.allowed_scopes, user_id, org_id)
        .await
    {
        Ok(granted) => granted,
        Err(e) => return e.into_response(),
    };

    if granted.is_empty() {
        tracing::warn!(
            client_id = %params.client_id,
            user_id = %user_id,
            "oauth_authorize_no_scopes_granted"
        );
        return error_redirect(&params.redirect_uri, &OAuthError::InsufficientScope, &params.state);
    }

    // Consent, unless the first-party skip rule applies or prior consent
    // already covers the grant.
    let skip_consent =
        ConsentService::should_skip_consent(client.is_first_party, client.require_consent);

    if !skip_consent {
        let status = match consent_service(&state)
            .check_consent(user_id, &params.client_id, org_id, &granted)
            .await
        {
            Ok(status) => status,
            Err(e) => return e.into_response(),
        };

        if status.needs_new_consent {
            tracing::info!(
                client_id = %params.client_id,
                user_id = %user_id,
                "oauth_consent_required"
            );
            return consent_page(&client, &granted, &params, org_id).into_response();
        }
    }

    issue_code_and_redirect(
        &state,
        &client,
        user_id,
        org_id,
        &params.redirect_uri,
        &granted,
        &params.code_challenge,
        &params.code_challenge_method,
        params.nonce.as_deref(),
        &params.state,
        !skip_consent,
    )
    .await
}

/// POST /oauth/authorize: consent decision
pub async fn authorize_post_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ConsentForm>,
) -> Response {
    tracing::info!(client_id = %form.client_id, action = %form.action, "oauth_consent_submission");

    let Some((user_id, token_org)) = authenticated_user(&state, &headers) else {
        return (StatusCode::UNAUTHORIZED, Html("<h1>Authentication required</h1>".to_string()))
            .into_response();
    };
    let org_id = form.org_id.or(token_org);

    let client_service = oauth_client_service(&state);
    let client = match client_service.get_client(&form.client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Html("<h1>Invalid client_id</h1>".to_string()),
            )
                .into_response()
        }
        Err(e) => return e.into_response(),
    };

    if !client_service.validate_redirect_uri(&client, &form.redirect_uri) {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h1>Invalid redirect_uri</h1>".to_string()),
        )
            .into_response();
    }

    match form.action.as_str() {
        "deny" => {
            tracing::info!(client_id = %form.client_id, user_id = %user_id, "oauth_consent_denied");
            error_redirect(&form.redirect_uri, &OAuthError::AccessDenied, &form.state)
        }
        "approve" => {
            let scopes = ScopeService::parse_scope_string(&form.scope);
            issue_code_and_redirect(
                &state,
                &client,
                user_id,
                org_id,
                &form.redirect_uri,
                &scopes,
                &form.code_challenge,
                &form.code_challenge_method,
                form.nonce.as_deref(),
                &form.state,
                true,
            )
            .await
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Html("<h1>Invalid action</h1>".to_string()),
        )
            .into_response(),
    }
}

/// Persist consent (when applicable) and issue the authorization code
#[allow(clippy::too_many_arguments)]
async fn issue_code_and_redirect(
    state: &AppState,
    client: &OAuthClient,
    user_id: Uuid,
    org_id: Option<Uuid>,
    redirect_uri: &str,
    scopes: &[String],
    code_challenge: &str,
    code_challenge_method: &str,
    nonce: Option<&str>,
    oauth_state: &str,
    save_consent: bool,
) -> Response {
    if save_consent {
        if let Err(e) = consent_service(state)
            .save_consent(user_id, &client.client_id, org_id, scopes)
            .await
        {
            return e.into_response();
        }
    }

    match authorization_code_service(state)
        .create(
            &client.client_id,
            user_id,
            org_id,
            redirect_uri,
            scopes,
            code_challenge,
            code_challenge_method,
            nonce,
        )
        .await
    {
        Ok(code) => {
            tracing::info!(
                client_id = %client.client_id,
                user_id = %user_id,
                "oauth_authorize_success"
            );
            success_redirect(redirect_uri, &code, oauth_state)
        }
        Err(e) => error_redirect(redirect_uri, &e, oauth_state),
    }
}

/// POST /oauth/token
pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<TokenRequestForm>,
) -> Response {
    tracing::info!(grant_type = %form.grant_type, "oauth_token_request");

    // Client authentication first.
    let Some((client_id, client_secret)) = client_credentials(
        &headers,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    ) else {
        return OAuthError::InvalidClient.into_response();
    };

    let client = match oauth_client_service(&state)
        .authenticate(&client_id, client_secret.as_deref())
        .await
    {
        Ok(client) => client,
        Err(e) => return e.into_response(),
    };

    match form.grant_type.as_str() {
        "authorization_code" => {
            handle_authorization_code_grant(&state, &client, &form).await
        }
        "refresh_token" => handle_refresh_token_grant(&state, &client, &form).await,
        other => OAuthError::UnsupportedGrantType(format!("Unsupported grant_type: {}", other))
            .into_response(),
    }
}

async fn handle_authorization_code_grant(
    state: &AppState,
    client: &OAuthClient,
    form: &TokenRequestForm,
) -> Response {
    let Some(code) = form.code.as_deref() else {
        return OAuthError::InvalidRequest("Missing parameter: code".to_string()).into_response();
    };
    let Some(redirect_uri) = form.redirect_uri.as_deref() else {
        return OAuthError::InvalidRequest("Missing parameter: redirect_uri".to_string())
            .into_response();
    };
    let Some(code_verifier) = form.code_verifier.as_deref() else {
        return OAuthError::InvalidRequest(
            "Missing parameter: code_verifier (PKCE required)".to_string(),
        )
        .into_response();
    };

    if !oauth_client_service(state).validate_redirect_uri(client, redirect_uri) {
        return OAuthError::InvalidGrant(
            "redirect_uri does not match registered URI".to_string(),
        )
        .into_response();
    }

    let record = match authorization_code_service(state)
        .validate_and_consume(code, &client.client_id, redirect_uri, code_verifier)
        .await
    {
        Ok(record) => record,
        Err(e) => return e.into_response(),
    };

    match token_service(state)
        .create_oauth_token_response(
            record.user_id,
            &client.client_id,
            &record.scopes,
            record.organization_id,
        )
        .await
    {
        Ok(response) => {
            tracing::info!(
                client_id = %client.client_id,
                user_id = %record.user_id,
                "oauth_token_issued"
            );
            Json(response).into_response()
        }
        Err(e) => OAuthError::ServerError(e.to_string()).into_response(),
    }
}

async fn handle_refresh_token_grant(
    state: &AppState,
    client: &OAuthClient,
    form: &TokenRequestForm,
) -> Response {
    let Some(refresh_token) = form.refresh_token.as_deref() else {
        return OAuthError::InvalidRequest("Missing parameter: refresh_token".to_string())
            .into_response();
    };

    match token_service(state)
        .refresh_oauth(refresh_token, client, form.scope.as_deref())
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /oauth/revoke (RFC 7009): 200 whatever the token's fate
pub async fn revoke_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<RevokeRequestForm>,
) -> Response {
    let Some((client_id, client_secret)) = client_credentials(
        &headers,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    ) else {
        return OAuthError::InvalidClient.into_response();
    };

    let client = match oauth_client_service(&state)
        .authenticate(&client_id, client_secret.as_deref())
        .await
    {
        Ok(client) => client,
        Err(e) => return e.into_response(),
    };

    match token_service(&state).revoke_token(&form.token, &client).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({}))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /.well-known/oauth-authorization-server (RFC 8414)
pub async fn discovery_handler(State(state): State<AppState>) -> Response {
    let issuer = state.config.issuer.trim_end_matches('/').to_string();

    let scopes_supported = match scope_service(&state).get_all_available_scopes().await {
        Ok(scopes) => scopes,
        Err(e) => return e.into_response(),
    };

    Json(DiscoveryResponse {
        authorization_endpoint: format!("{}/oauth/authorize", issuer),
        token_endpoint: format!("{}/oauth/token", issuer),
        revocation_endpoint: format!("{}/oauth/revoke", issuer),
        issuer,
        response_types_supported: vec!["code"],
        grant_types_supported: vec!["authorization_code", "refresh_token"],
        token_endpoint_auth_methods_supported: vec![
            "client_secret_post",
            "client_secret_basic",
            "none",
        ],
        code_challenge_methods_supported: vec![PKCE_METHOD_S256, PKCE_METHOD_PLAIN],
        scopes_supported,
    })
    .into_response()
}

/// POST /oauth/clients: client registration
pub async fn register_client_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterClientRequest>,
) -> Result<impl IntoResponse, OAuthError> {
    let (client, secret) = oauth_client_service(&state)
        .create_client(
            &payload.client_id,
            &payload.client_name,
            payload.client_type,
            &payload.redirect_uris,
            &payload.allowed_scopes,
            payload.require_pkce,
            payload.require_consent,
            payload.is_first_party,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterClientResponse {
            client_id: client.client_id,
            client_name: client.client_name,
            client_type: client.client_type,
            client_secret: secret,
            redirect_uris: client.redirect_uris,
            allowed_scopes: client.allowed_scopes,
        }),
    ))
}
