use std::sync::Arc;

use helpdesk_api::app::{AppState, build_app};
use helpdesk_auth::{InMemoryUserDirectory, JwtConfig, RoleAssignment, RoleClaim, User};
use helpdesk_core::{CompanyId, UserId};
use reqwest::StatusCode;
use serde_json::{Value, json};

const PASSWORD: &str = "correct horse battery";

struct TestServer {
    base_url: String,
    directory: Arc<InMemoryUserDirectory>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory backends, ephemeral port.
        let (state, directory) = AppState::in_memory(JwtConfig::new("black-box-secret"));
        let app = build_app(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            directory,
            handle,
        }
    }

    fn add_user(&self, email: &str, roles: Vec<RoleClaim>) -> UserId {
        let id = UserId::new();
        self.directory
            .add_user(
                User::new(id, email),
                PASSWORD,
                roles.into_iter().map(RoleAssignment::active).collect(),
            )
            .unwrap();
        id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct LoggedIn {
    access_token: String,
    refresh_cookie: String,
    body: Value,
}

fn refresh_cookie_of(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.split(';').next()?.trim().strip_prefix("refresh_token=").map(str::to_string))
}

async fn login(client: &reqwest::Client, srv: &TestServer, email: &str) -> LoggedIn {
    let res = client
        .post(srv.url("/auth/login"))
        .header(reqwest::header::USER_AGENT, "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0")
        .json(&json!({ "email": email, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let refresh_cookie = refresh_cookie_of(&res).expect("login sets the refresh cookie");
    let body: Value = res.json().await.unwrap();
    LoggedIn {
        access_token: body["accessToken"].as_str().unwrap().to_string(),
        refresh_cookie,
        body,
    }
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/auth/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "TOKEN_MISSING");
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let srv = TestServer::spawn().await;
    srv.add_user("agent@example.com", vec![RoleClaim::user()]);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "email": "agent@example.com", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_then_me_reports_identity_and_default_role() {
    let srv = TestServer::spawn().await;
    let company = CompanyId::new();
    let user_id = srv.add_user(
        "agent@example.com",
        vec![RoleClaim::agent(company), RoleClaim::user()],
    );
    let client = reqwest::Client::new();

    let session = login(&client, &srv, "agent@example.com").await;
    assert_eq!(session.body["tokenType"], "Bearer");
    assert_eq!(session.body["expiresIn"], 3600);
    assert_eq!(session.body["activeRole"]["code"], "AGENT");

    let res = client
        .get(srv.url("/auth/me"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["userId"], user_id.to_string());
    assert_eq!(me["email"], "agent@example.com");
    assert_eq!(me["roles"].as_array().unwrap().len(), 2);
    assert_eq!(me["companies"][0], company.to_string());
}

#[tokio::test]
async fn select_role_enforces_assignment_and_company_context() {
    let srv = TestServer::spawn().await;
    let company = CompanyId::new();
    let other_company = CompanyId::new();
    srv.add_user(
        "agent@example.com",
        vec![RoleClaim::user(), RoleClaim::agent(company)],
    );
    let client = reqwest::Client::new();
    let session = login(&client, &srv, "agent@example.com").await;
    assert_eq!(session.body["activeRole"]["code"], "USER");

    let select = |body: Value| {
        client
            .post(srv.url("/auth/select-role"))
            .bearer_auth(&session.access_token)
            .json(&body)
            .send()
    };

    let res = select(json!({ "role_code": "AGENT", "company_id": company.to_string() }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["activeRole"]["code"], "AGENT");
    assert_eq!(body["activeRole"]["company_id"], company.to_string());

    let res = select(json!({ "role_code": "AGENT", "company_id": other_company.to_string() }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "COMPANY_CONTEXT_MISMATCH");

    let res = select(json!({ "role_code": "PLATFORM_ADMIN" })).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ROLE_NOT_ASSIGNED");

    let res = select(json!({ "role_code": "USER", "company_id": company.to_string() }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = select(json!({ "role_code": "AGENT" })).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "INVALID_ROLE_REQUEST");
}

#[tokio::test]
async fn available_roles_lists_assignments_and_active_role() {
    let srv = TestServer::spawn().await;
    let company = CompanyId::new();
    srv.add_user(
        "admin@example.com",
        vec![RoleClaim::company_admin(company), RoleClaim::user()],
    );
    let client = reqwest::Client::new();
    let session = login(&client, &srv, "admin@example.com").await;

    let res = client
        .get(srv.url("/auth/available-roles"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["roles"].as_array().unwrap().len(), 2);
    assert_eq!(body["activeRole"]["code"], "COMPANY_ADMIN");
}

#[tokio::test]
async fn logout_blacklists_the_access_token_and_clears_the_cookie() {
    let srv = TestServer::spawn().await;
    srv.add_user("user@example.com", vec![RoleClaim::user()]);
    let client = reqwest::Client::new();
    let session = login(&client, &srv, "user@example.com").await;

    let res = client
        .post(srv.url("/auth/logout"))
        .bearer_auth(&session.access_token)
        .header(reqwest::header::COOKIE, format!("refresh_token={}", session.refresh_cookie))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(refresh_cookie_of(&res).as_deref(), Some(""));

    let res = client
        .get(srv.url("/auth/me"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "TOKEN_BLACKLISTED");

    // The refresh token died with the session.
    let res = client
        .post(srv.url("/auth/refresh"))
        .header(reqwest::header::COOKIE, format!("refresh_token={}", session.refresh_cookie))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_rotates_the_cookie_and_detects_replay() {
    let srv = TestServer::spawn().await;
    let company = CompanyId::new();
    srv.add_user(
        "agent@example.com",
        vec![RoleClaim::user(), RoleClaim::agent(company)],
    );
    let client = reqwest::Client::new();
    let session = login(&client, &srv, "agent@example.com").await;

    // Switch role first so the carry-over is observable.
    let res = client
        .post(srv.url("/auth/select-role"))
        .bearer_auth(&session.access_token)
        .json(&json!({ "role_code": "AGENT", "company_id": company.to_string() }))
        .send()
        .await
        .unwrap();
    let selected: Value = res.json().await.unwrap();
    let agent_token = selected["accessToken"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url("/auth/refresh"))
        .bearer_auth(&agent_token)
        .header(reqwest::header::COOKIE, format!("refresh_token={}", session.refresh_cookie))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let rotated_cookie = refresh_cookie_of(&res).expect("refresh rotates the cookie");
    assert_ne!(rotated_cookie, session.refresh_cookie);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["activeRole"]["code"], "AGENT");

    // Presenting the rotated-out token again is treated as theft.
    let res = client
        .post(srv.url("/auth/refresh"))
        .header(reqwest::header::COOKIE, format!("refresh_token={}", session.refresh_cookie))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "REFRESH_TOKEN_REVOKED");

    // ...which also killed the legitimate successor.
    let res = client
        .post(srv.url("/auth/refresh"))
        .header(reqwest::header::COOKIE, format!("refresh_token={rotated_cookie}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sessions_can_be_listed_and_revoked_remotely() {
    let srv = TestServer::spawn().await;
    srv.add_user("user@example.com", vec![RoleClaim::user()]);
    let client = reqwest::Client::new();
    let laptop = login(&client, &srv, "user@example.com").await;
    let phone = login(&client, &srv, "user@example.com").await;

    let res = client
        .get(srv.url("/auth/sessions"))
        .bearer_auth(&laptop.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions.iter().filter(|s| s["isCurrent"] == true).count(), 1);
    assert_eq!(sessions[0]["deviceName"], "Chrome on Windows");

    let current = sessions.iter().find(|s| s["isCurrent"] == true).unwrap();
    let other = sessions.iter().find(|s| s["isCurrent"] == false).unwrap();

    let res = client
        .delete(srv.url(&format!("/auth/sessions/{}", current["id"].as_str().unwrap())))
        .bearer_auth(&laptop.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .delete(srv.url(&format!("/auth/sessions/{}", other["id"].as_str().unwrap())))
        .bearer_auth(&laptop.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // The revoked device is locked out immediately.
    let res = client
        .get(srv.url("/auth/me"))
        .bearer_auth(&phone.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .delete(srv.url("/auth/sessions/not-a-uuid"))
        .bearer_auth(&laptop.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_cleanup_requires_platform_admin_as_active_role() {
    let srv = TestServer::spawn().await;
    srv.add_user("user@example.com", vec![RoleClaim::user()]);
    srv.add_user(
        "root@example.com",
        vec![RoleClaim::user(), RoleClaim::platform_admin()],
    );
    let client = reqwest::Client::new();

    let user = login(&client, &srv, "user@example.com").await;
    let res = client
        .post(srv.url("/admin/refresh-tokens/cleanup"))
        .bearer_auth(&user.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "FORBIDDEN");

    // Holding PLATFORM_ADMIN is not enough while USER is the active role.
    let root = login(&client, &srv, "root@example.com").await;
    assert_eq!(root.body["activeRole"]["code"], "USER");
    let res = client
        .post(srv.url("/admin/refresh-tokens/cleanup"))
        .bearer_auth(&root.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/auth/select-role"))
        .bearer_auth(&root.access_token)
        .json(&json!({ "role_code": "PLATFORM_ADMIN" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let selected: Value = res.json().await.unwrap();

    let res = client
        .post(srv.url("/admin/refresh-tokens/cleanup"))
        .bearer_auth(selected["accessToken"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["deleted"], 0);
}
