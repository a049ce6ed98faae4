//! End-to-end tests driving the router against a mock identity provider and
//! mint service.

#[cfg(test)]
mod integration_tests {
    use crate::{EdgeOidcConfig, EdgeOidcState, ProviderEndpoints, VariableSource, base64url, router};
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode, header};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{body_string_contains, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOST: &str = "www.example.test";
    const NONCE: &str = "k3j9x0abc2mq7zty";

    async fn setup() -> (MockServer, axum::Router) {
        let mock_server = MockServer::start().await;
        let endpoints = ProviderEndpoints {
            authorize_endpoint: format!("{}/oidc/2/auth", mock_server.uri()),
            token_endpoint: format!("{}/oidc/2/token", mock_server.uri()),
            mint_endpoint: format!("{}/service/generatetoken", mock_server.uri()),
        };
        let config = EdgeOidcConfig::new()
            .with_endpoints(endpoints)
            .with_http_timeout(5);

        let mut variables = HashMap::new();
        variables.insert("PMUSER_AUTH_CLIENTID".to_string(), "client-123".to_string());
        variables.insert("PMUSER_AUTH_SECRET".to_string(), "secret-xyz".to_string());
        variables.insert("PMUSER_AUTH_AKSECRET".to_string(), "mint-key".to_string());
        let variables: Arc<dyn VariableSource> = Arc::new(variables);

        let state = EdgeOidcState::new(config, variables).unwrap();
        (mock_server, router(state))
    }

    fn id_token(nonce: &str) -> String {
        format!(
            "{}.{}.{}",
            base64url::encode(json!({"alg": "RS256", "typ": "JWT"}).to_string()),
            base64url::encode(json!({"sub": "user-1", "nonce": nonce}).to_string()),
            "c2lnbmF0dXJl"
        )
    }

    fn token_body(nonce: &str) -> Value {
        json!({
            "access_token": "provider-access-token",
            "id_token": id_token(nonce),
            "expires_in": 3600,
            "token_type": "Bearer"
        })
    }

    async fn mount_token_endpoint(mock_server: &MockServer, response: ResponseTemplate, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oidc/2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("client_id=client-123"))
            .respond_with(response)
            .expect(calls)
            .mount(mock_server)
            .await;
    }

    async fn mount_mint_endpoint(mock_server: &MockServer, response: ResponseTemplate, calls: u64) {
        Mock::given(method("GET"))
            .and(path("/service/generatetoken"))
            .and(query_param("acl", "/*"))
            .and(query_param("seconds", "3600"))
            .and(header_eq("token-key", "mint-key"))
            .respond_with(response)
            .expect(calls)
            .mount(mock_server)
            .await;
    }

    async fn send(app: axum::Router, uri: &str, cookies: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri).header(header::HOST, HOST);
        if let Some(cookies) = cookies {
            request = request.header(header::COOKIE, cookies);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn set_cookies(response: &Response<Body>) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn location(response: &Response<Body>) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_login_redirects_to_authorize_endpoint() {
        let (mock_server, app) = setup().await;

        let response = send(app, "/auth/login?url=%2Fdash", None).await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let location = location(&response);
        let expected_prefix = format!("{}/oidc/2/auth?client_id=client-123&nonce=", mock_server.uri());
        assert!(location.starts_with(&expected_prefix), "{location}");
        assert!(location.contains(
            "redirect_uri=https%3A%2F%2Fwww.example.test%2Fauth%2Fcallback&response_type=code&scope=openid"
        ));

        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], "oidcurl=/dash; Secure; Path=/auth/");
        assert!(cookies[1].starts_with("nonce="));
        assert!(cookies[1].ends_with("; Secure; Path=/auth/"));
    }

    #[tokio::test]
    async fn test_login_nonce_matches_authorize_parameter() {
        let (_mock_server, app) = setup().await;

        let response = send(app, "/auth/login", None).await;
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 1);

        let nonce_cookie = cookies[0]
            .strip_prefix("nonce=")
            .and_then(|rest| rest.split(';').next())
            .unwrap()
            .to_string();
        assert!(location(&response).contains(&format!("nonce={nonce_cookie}&")));
    }

    #[tokio::test]
    async fn test_callback_success_redirects_with_session_cookies() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(token_body(NONCE)),
            1,
        )
        .await;
        mount_mint_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_string("edge-token-value"),
            1,
        )
        .await;

        let cookies = format!("oidcurl=/dash; nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/dash");

        assert_eq!(
            set_cookies(&response),
            vec![
                "access_token=provider-access-token; Secure; Path=/",
                "__token__=edge-token-value; Secure; Path=/",
            ]
        );
    }

    #[tokio::test]
    async fn test_minted_token_is_stored_byte_for_byte() {
        let (mock_server, app) = setup().await;
        let minted = "exp=1700000000~acl=%2f*~hmac=ab12";
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(token_body(NONCE)),
            1,
        )
        .await;
        mount_mint_endpoint(&mock_server, ResponseTemplate::new(200).set_body_string(minted), 1)
            .await;

        let cookies = format!("oidcurl=/app?tab=a%20b; nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/app?tab=a%20b");
        let cookies = set_cookies(&response);
        assert_eq!(
            cookies[1],
            "__token__=exp=1700000000~acl=%2f*~hmac=ab12; Secure; Path=/"
        );
    }

    #[tokio::test]
    async fn test_login_then_callback_round_trips_return_url() {
        let (mock_server, app) = setup().await;

        let login = send(app.clone(), "/auth/login?url=%2Freports%3Fq%3D50%2525", None).await;
        let login_cookies = set_cookies(&login);
        assert_eq!(login_cookies[0], "oidcurl=/reports?q=50%25; Secure; Path=/auth/");

        let nonce = login_cookies[1]
            .strip_prefix("nonce=")
            .and_then(|rest| rest.split(';').next())
            .unwrap()
            .to_string();
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(token_body(&nonce)),
            1,
        )
        .await;
        mount_mint_endpoint(&mock_server, ResponseTemplate::new(200).set_body_string("t"), 1).await;

        let cookies = format!("oidcurl=/reports?q=50%25; nonce={nonce}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/reports?q=50%25");
    }

    #[tokio::test]
    async fn test_callback_defaults_to_root() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(token_body(NONCE)),
            1,
        )
        .await;
        mount_mint_endpoint(&mock_server, ResponseTemplate::new(200).set_body_string("t"), 1).await;

        let cookies = format!("nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn test_nonce_mismatch_is_forbidden() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(token_body("someone-elses-nonce")),
            1,
        )
        .await;
        mount_mint_endpoint(&mock_server, ResponseTemplate::new(200), 0).await;

        let cookies = format!("oidcurl=/dash; nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(set_cookies(&response).is_empty());
        assert_eq!(body_text(response).await, "Nonce failed");
    }

    #[tokio::test]
    async fn test_missing_nonce_cookie_is_forbidden() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(token_body(NONCE)),
            1,
        )
        .await;
        mount_mint_endpoint(&mock_server, ResponseTemplate::new(200), 0).await;

        let response = send(app, "/auth/callback?code=auth-code", None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, "Nonce failed");
    }

    #[tokio::test]
    async fn test_unparseable_id_token_is_forbidden() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a",
                "id_token": "not-a-jwt",
                "expires_in": 3600
            })),
            1,
        )
        .await;
        mount_mint_endpoint(&mock_server, ResponseTemplate::new(200), 0).await;

        let cookies = format!("nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_debug_block_never_calls_token_endpoint() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(&mock_server, ResponseTemplate::new(200), 0).await;

        let cookies = format!("oidcurl=debug_block; nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(set_cookies(&response).is_empty());
        let body = body_json(response).await;
        assert_eq!(body["error"], "precondition");
        assert_eq!(
            body["description"],
            "callback request not initiated, redirect-url:debug_block, query:code=auth-code"
        );
    }

    #[tokio::test]
    async fn test_missing_code_is_precondition_failure() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(&mock_server, ResponseTemplate::new(200), 0).await;

        let response = send(app, "/auth/callback?error=access_denied", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(
            body["description"],
            "callback request not initiated, redirect-url:/, query:error=access_denied"
        );
    }

    #[tokio::test]
    async fn test_mint_failure_sets_no_cookies() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(token_body(NONCE)),
            1,
        )
        .await;
        mount_mint_endpoint(
            &mock_server,
            ResponseTemplate::new(500).set_body_string("mint exploded"),
            1,
        )
        .await;

        let cookies = format!("oidcurl=/dash; nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(set_cookies(&response).is_empty());
        let body = body_json(response).await;
        assert_eq!(body["error"], "akamaitoken_faiure");
        assert_eq!(body["description"], "token generation indicates error");
        assert_eq!(body["details"], "mint exploded");
        assert!(
            body["url"]
                .as_str()
                .unwrap()
                .ends_with("/service/generatetoken?acl=/*&seconds=3600")
        );
    }

    #[tokio::test]
    async fn test_provider_json_error_passes_through() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "code expired"
            })),
            1,
        )
        .await;

        let cookies = format!("oidcurl=/dash; nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({"error": "invalid_grant", "error_description": "code expired", "url": "/dash"})
        );
    }

    #[tokio::test]
    async fn test_provider_text_error_is_callback_failure() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(503).set_body_string("<html>down</html>"),
            1,
        )
        .await;

        let cookies = format!("nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "callback_failure");
        assert_eq!(body["description"], "callback received indicates error");
        assert_eq!(body["details"], "<html>down</html>");
        assert!(body["path"].as_str().unwrap().ends_with("/oidc/2/token"));

        let params = body["params"].as_str().unwrap();
        assert!(params.contains("code=auth-code"));
        assert!(!params.contains("secret-xyz"));
        assert!(!params.contains("client_secret"));
    }

    #[tokio::test]
    async fn test_debug_break_ignores_successful_exchange() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(token_body(NONCE)),
            1,
        )
        .await;
        mount_mint_endpoint(&mock_server, ResponseTemplate::new(200), 0).await;

        let cookies = format!("oidcurl=debug_break; nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).is_empty());
        let body = body_json(response).await;
        assert_eq!(body["url"], "debug_break");
        assert_eq!(body["access_token"], "provider-access-token");
        assert!(body.get("id_decode").is_none());
    }

    #[tokio::test]
    async fn test_debug_info_returns_decoded_tokens() {
        let (mock_server, app) = setup().await;
        mount_token_endpoint(
            &mock_server,
            ResponseTemplate::new(200).set_body_json(token_body(NONCE)),
            1,
        )
        .await;
        mount_mint_endpoint(&mock_server, ResponseTemplate::new(200).set_body_string("t"), 1).await;

        let cookies = format!("oidcurl=debug_info; nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(set_cookies(&response).len(), 2);

        let body = body_json(response).await;
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["id_decode"]["payload"]["nonce"], NONCE);
        assert_eq!(body["id_decode"]["signature"], "c2lnbmF0dXJl");
        assert!(body["access_decode"]["error"].is_string());
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_bad_gateway() {
        let endpoints = ProviderEndpoints {
            token_endpoint: "http://127.0.0.1:9/oidc/2/token".to_string(),
            ..ProviderEndpoints::default()
        };
        let config = EdgeOidcConfig::new()
            .with_endpoints(endpoints)
            .with_http_timeout(5);
        let mut variables = HashMap::new();
        variables.insert("PMUSER_AUTH_CLIENTID".to_string(), "c".to_string());
        variables.insert("PMUSER_AUTH_SECRET".to_string(), "s".to_string());
        variables.insert("PMUSER_AUTH_AKSECRET".to_string(), "a".to_string());
        let variables: Arc<dyn VariableSource> = Arc::new(variables);
        let app = router(EdgeOidcState::new(config, variables).unwrap());

        let cookies = format!("nonce={NONCE}");
        let response = send(app, "/auth/callback?code=auth-code", Some(&cookies)).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "callback_failure");
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let (_mock_server, app) = setup().await;

        let response = send(app, "/auth/logout?x=1", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "No route for /auth/logout?x=1");
    }

    #[tokio::test]
    async fn test_unconfigured_base_path_is_configuration_error() {
        let (_mock_server, app) = setup().await;

        let response = send(app, "/other/login", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(set_cookies(&response).is_empty());
        let body = body_json(response).await;
        assert_eq!(body["error"], "configuration");
        assert!(
            body["description"]
                .as_str()
                .unwrap()
                .contains("PMUSER_OTHER_CLIENTID")
        );
    }

    #[tokio::test]
    async fn test_any_method_is_dispatched() {
        let (_mock_server, app) = setup().await;

        let request = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header(header::HOST, HOST)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_login_rejects_return_url_with_line_break() {
        let (_mock_server, app) = setup().await;

        let response = send(app, "/auth/login?url=%2Fdash%0D%0AX-Injected%3A%201", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(set_cookies(&response).is_empty());
        assert!(response.headers().get(header::LOCATION).is_none());
        let body = body_json(response).await;
        assert_eq!(body["error"], "precondition");
        assert_eq!(
            body["description"],
            "login request not initiated, redirect-url:/dash\\r\\nX-Injected: 1"
        );
    }
}
