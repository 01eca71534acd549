use std::sync::Arc;

use actix_web::{
    App,
    cookie::Cookie,
    http::{StatusCode, header},
    test, web,
};
use chrono::{Duration, Utc};
use linkcut::{
    auth::token::TokenService,
    domain::{id::ShortCode, models::ShortLink},
    handler::{config::Config, handlers::Handler, routes},
    memory::db::DB,
};
use serde_json::{Value, json};
use uuid::Uuid;

fn handler_config() -> Config {
    Config {
        base_url: "https://sho.rt/".to_string(),
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        cookie_secure: false,
    }
}

fn token_service() -> Arc<TokenService> {
    Arc::new(TokenService::new(
        "access-secret",
        Duration::hours(1),
        "refresh-secret",
        Duration::days(10),
    ))
}

macro_rules! test_app {
    ($db:expr) => {{
        let tokens = token_service();
        let handler = web::Data::new(Handler::new($db, Arc::clone(&tokens), &handler_config()));
        test::init_service(
            App::new()
                .app_data(handler)
                .app_data(web::Data::from(tokens))
                .app_data(routes::json_config())
                .configure(routes::configure::<Arc<DB>>),
        )
        .await
    }};
}

/// Registers an account and returns a fresh access token for it.
macro_rules! register_and_login {
    ($app:expr, $email:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/v1/users/register")
            .set_json(json!({ "email": $email, "fullName": "Test User", "password": "password123" }))
            .to_request();
        let resp = test::call_service($app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/v1/users/login")
            .set_json(json!({ "email": $email, "password": "password123" }))
            .to_request();
        let body: Value = test::call_and_read_body_json($app, req).await;
        body["data"]["accessToken"].as_str().unwrap().to_string()
    }};
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

#[actix_web::test]
async fn test_health() {
    let app = test_app!(Arc::new(DB::new()));
    for uri in ["/health/livez", "/health/readyz"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[actix_web::test]
async fn test_register_and_login() {
    let app = test_app!(Arc::new(DB::new()));

    let req = test::TestRequest::post()
        .uri("/api/v1/users/register")
        .set_json(json!({ "email": "ada@example.com", "fullName": "Ada", "password": "analytical" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["statusCode"], 201);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["email"], "ada@example.com");
    assert!(body["data"]["user"].get("passwordHash").is_none());

    let req = test::TestRequest::post()
        .uri("/api/v1/users/register")
        .set_json(json!({ "email": "ada@example.com", "fullName": "Ada", "password": "analytical" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "email": "ada@example.com", "password": "wrong-password" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "email": "ada@example.com", "password": "analytical" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookies: Vec<String> = resp
        .response()
        .cookies()
        .map(|c| c.name().to_string())
        .collect();
    assert!(cookies.contains(&"accessToken".to_string()));
    assert!(cookies.contains(&"refreshToken".to_string()));
}

#[actix_web::test]
async fn test_missing_fields_and_bad_json() {
    let app = test_app!(Arc::new(DB::new()));

    let req = test::TestRequest::post()
        .uri("/api/v1/users/register")
        .set_json(json!({ "email": "ada@example.com" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["message"], "All fields are required");

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .insert_header(header::ContentType::json())
        .set_payload("{not json")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn test_link_routes_require_authentication() {
    let app = test_app!(Arc::new(DB::new()));

    let req = test::TestRequest::get().uri("/api/v1/links").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["statusCode"], 401);
    assert_eq!(body["message"], "Unauthorized request");

    let req = test::TestRequest::get()
        .uri("/api/v1/links")
        .insert_header(bearer("not-a-jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_token_for_unknown_user_is_rejected() {
    let db = Arc::new(DB::new());
    let app = test_app!(Arc::clone(&db));
    let token = register_and_login!(&app, "ada@example.com");

    // Same secrets, but the subject lives in a different store.
    let other = test_app!(Arc::new(DB::new()));
    let req = test::TestRequest::get()
        .uri("/api/v1/users/me")
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&other, req).await;
    assert_eq!(body["statusCode"], 401);
    assert_eq!(body["message"], "Invalid Access Token");
}

#[actix_web::test]
async fn test_shorten_redirect_and_count_visits() {
    let app = test_app!(Arc::new(DB::new()));
    let token = register_and_login!(&app, "ada@example.com");

    let req = test::TestRequest::post()
        .uri("/api/v1/links")
        .insert_header(bearer(&token))
        .set_json(json!({ "originalLink": "https://www.rust-lang.org/learn" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let created = &body["data"]["createdLink"];
    let code = created["shortLink"].as_str().unwrap().to_string();
    assert_eq!(created["visits"], 0);
    assert_eq!(created["shortUrl"], format!("https://sho.rt/{}", code));

    for _ in 0..2 {
        let req = test::TestRequest::get().uri(&format!("/{}", code)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "https://www.rust-lang.org/learn"
        );
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/links")
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let links = body["data"]["userLinks"].as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["visits"], 2);
}

#[actix_web::test]
async fn test_redirect_target_has_no_control_characters() {
    let app = test_app!(Arc::new(DB::new()));
    let token = register_and_login!(&app, "ada@example.com");

    let req = test::TestRequest::post()
        .uri("/api/v1/links")
        .insert_header(bearer(&token))
        .set_json(json!({ "originalLink": "https://example.com/a\nb\tc" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let created = &body["data"]["createdLink"];
    assert_eq!(created["originalLink"], "https://example.com/abc");
    let code = created["shortLink"].as_str().unwrap().to_string();

    let req = test::TestRequest::get().uri(&format!("/{}", code)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).unwrap(),
        "https://example.com/abc"
    );
}

#[actix_web::test]
async fn test_create_link_validation() {
    let app = test_app!(Arc::new(DB::new()));
    let token = register_and_login!(&app, "ada@example.com");

    let cases = [
        json!({ "originalLink": "" }),
        json!({ "originalLink": "javascript:alert(1)" }),
        json!({
            "originalLink": "https://example.com",
            "expiryDate": (Utc::now() - Duration::days(1)).to_rfc3339()
        }),
        json!({ "originalLink": "https://example.com", "customCode": "a b" }),
    ];
    for case in cases {
        let req = test::TestRequest::post()
            .uri("/api/v1/links")
            .insert_header(bearer(&token))
            .set_json(&case)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{case}");
    }
}

#[actix_web::test]
async fn test_custom_code_is_unique() {
    let app = test_app!(Arc::new(DB::new()));
    let token = register_and_login!(&app, "ada@example.com");

    let create = || {
        test::TestRequest::post()
            .uri("/api/v1/links")
            .insert_header(bearer(&token))
            .set_json(json!({ "originalLink": "https://example.com", "customCode": "docs" }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, create()).await.status(), StatusCode::CREATED);
    assert_eq!(test::call_service(&app, create()).await.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn test_unknown_and_expired_links() {
    let db = Arc::new(DB::new());
    let app = test_app!(Arc::clone(&db));

    let req = test::TestRequest::get().uri("/nothing-here").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["statusCode"], 404);
    assert_eq!(body["message"], "Link not found");

    db.insert_link(ShortLink {
        id: Uuid::new_v4(),
        original_link: "https://example.com".to_string(),
        short_link: ShortCode::new("gone"),
        creation_date: Utc::now() - Duration::days(2),
        expiry_date: Some(Utc::now() - Duration::days(1)),
        user_id: Uuid::new_v4(),
        visits: 0,
    })
    .unwrap();

    let req = test::TestRequest::get().uri("/gone").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["statusCode"], 404);
    assert_eq!(body["message"], "Link expired");
}

#[actix_web::test]
async fn test_delete_link_ownership() {
    let app = test_app!(Arc::new(DB::new()));
    let ada = register_and_login!(&app, "ada@example.com");
    let bob = register_and_login!(&app, "bob@example.com");

    let req = test::TestRequest::post()
        .uri("/api/v1/links")
        .insert_header(bearer(&ada))
        .set_json(json!({ "originalLink": "https://example.com" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let id = body["data"]["createdLink"]["id"].as_str().unwrap().to_string();
    let code = body["data"]["createdLink"]["shortLink"]
        .as_str()
        .unwrap()
        .to_string();

    let delete = |token: &str, id: &str| {
        test::TestRequest::delete()
            .uri(&format!("/api/v1/links/{}", id))
            .insert_header(bearer(token))
            .to_request()
    };

    let resp = test::call_service(&app, delete(&bob, &id)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = test::call_service(&app, delete(&ada, "not-an-id")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::call_and_read_body_json(&app, delete(&ada, &id)).await;
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["data"]["deletedLink"]["id"], id.as_str());

    let req = test::TestRequest::get().uri(&format!("/{}", code)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_refresh_and_logout() {
    let app = test_app!(Arc::new(DB::new()));
    register_and_login!(&app, "ada@example.com");

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "email": "ada@example.com", "password": "password123" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .set_json(json!({ "refreshToken": refresh }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["statusCode"], 200);
    let access = body["data"]["accessToken"].as_str().unwrap().to_string();

    // The rotated-out token no longer works.
    let req = test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .set_json(json!({ "refreshToken": refresh }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/v1/users/logout")
        .insert_header(bearer(&access))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cleared: Vec<_> = resp.response().cookies().map(|c| c.value().to_string()).collect();
    assert_eq!(cleared, vec![String::new(), String::new()]);
}

#[actix_web::test]
async fn test_refresh_from_cookie() {
    let app = test_app!(Arc::new(DB::new()));
    register_and_login!(&app, "ada@example.com");

    let req = test::TestRequest::post()
        .uri("/api/v1/users/login")
        .set_json(json!({ "email": "ada@example.com", "password": "password123" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let refresh = resp
        .response()
        .cookies()
        .find(|c| c.name() == "refreshToken")
        .map(|c| c.value().to_string())
        .unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .cookie(Cookie::new("refreshToken", refresh.clone()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated = resp
        .response()
        .cookies()
        .find(|c| c.name() == "refreshToken")
        .map(|c| c.value().to_string())
        .unwrap();
    assert_ne!(rotated, refresh);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["refreshToken"], rotated.as_str());

    // The cookie wins over a body token, and a spent cookie is refused.
    let req = test::TestRequest::post()
        .uri("/api/v1/users/refresh-token")
        .cookie(Cookie::new("refreshToken", refresh))
        .set_json(json!({ "refreshToken": rotated }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Refresh token is expired or used");
}

#[actix_web::test]
async fn test_access_cookie_authenticates() {
    let app = test_app!(Arc::new(DB::new()));
    let token = register_and_login!(&app, "ada@example.com");

    let req = test::TestRequest::get()
        .uri("/api/v1/users/me")
        .cookie(Cookie::new("accessToken", token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["data"]["user"]["fullName"], "Test User");
}
