use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LOCATION, ORIGIN, SET_COOKIE};
use serde_json::{Value, json};

use qrportal_api::app::{AppServices, ServiceDeps, build_app};
use qrportal_auth::{InviteKind, InviteToken, PortalClaims};
use qrportal_core::{Clock, ManualClock, PrincipalId};
use qrportal_infra::{Documents, LocalIdentityProvider, LogMailer, PortalConfig, TokenExchanger};

const START_MS: i64 = 1_700_000_000_000;

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    identity: Arc<LocalIdentityProvider>,
    clock: Arc<ManualClock>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(PortalConfig::development()).await
    }

    async fn spawn_with(config: PortalConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let identity = Arc::new(LocalIdentityProvider::new(b"test-signing-secret", clock.clone()));
        let services = Arc::new(AppServices::new(
            config,
            ServiceDeps {
                documents: Documents::in_memory(),
                provider: identity.clone(),
                exchanger: Some(identity.clone() as Arc<dyn TokenExchanger>),
                mailer: Arc::new(LogMailer),
                clock: clock.clone(),
            },
        ));

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            base_url,
            services,
            identity,
            clock,
            client,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn user(&self, uid: &str) -> PrincipalId {
        let uid = PrincipalId::new(uid);
        self.identity
            .create_user(uid.clone(), Some(format!("{uid}@example.com")), PortalClaims::default())
            .unwrap();
        uid
    }

    /// Sign `uid` in through `/api/session/create`; returns the cookie header.
    async fn sign_in(&self, uid: &PrincipalId) -> String {
        let id_token = self.identity.sign_in(uid).unwrap();
        let res = self
            .client
            .post(self.url("/api/session/create"))
            .json(&json!({ "idToken": id_token }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        cookie_header(res.headers())
    }

    async fn get(&self, path: &str, cookies: &str) -> reqwest::Response {
        let mut req = self.client.get(self.url(path));
        if !cookies.is_empty() {
            req = req.header(reqwest::header::COOKIE, cookies);
        }
        req.send().await.unwrap()
    }

    async fn post(&self, path: &str, cookies: &str, body: Value) -> reqwest::Response {
        let mut req = self.client.post(self.url(path)).json(&body);
        if !cookies.is_empty() {
            req = req.header(reqwest::header::COOKIE, cookies);
        }
        req.send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// `Cookie` header value built from every non-empty `Set-Cookie`.
fn cookie_header(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter(|pair| !pair.ends_with('='))
        .collect::<Vec<_>>()
        .join("; ")
}

fn location(res: &reqwest::Response) -> &str {
    res.headers().get(LOCATION).unwrap().to_str().unwrap()
}

/// acme (owner-1) → colombo (manager-1) → cashier1 (cashier-1).
async fn provision_acme(srv: &TestServer) {
    let owner = srv.user("owner-1");
    srv.user("manager-1");
    srv.user("cashier-1");
    let cookies = srv.sign_in(&owner).await;

    let res = srv
        .post("/api/companies", &cookies, json!({ "name": "Acme", "slug": "acme" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv
        .post(
            "/api/companies/acme/branches",
            &cookies,
            json!({ "name": "Colombo", "slug": "colombo", "managerUid": "manager-1" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv
        .post(
            "/api/companies/acme/branches/colombo/cashiers",
            &cookies,
            json!({ "slug": "cashier1", "uid": "cashier-1" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn protected_page_without_cookies_redirects_to_signin() {
    let srv = TestServer::spawn().await;

    let res = srv.get("/transactions", "").await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/signin?from=%2Ftransactions");

    let res = srv.get("/admin/dashboard", "").await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/admin/signin?from=%2Fadmin%2Fdashboard");

    let res = srv.get("/admin/signin", "").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.get("/health", "").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn verify_without_session_is_unauthorized() {
    let srv = TestServer::spawn().await;

    let res = srv.get("/api/session/verify", "").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["ok"], false);

    let res = srv.get("/api/session/verify", "session=garbage").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn created_session_verifies_with_healed_permissions() {
    let srv = TestServer::spawn().await;
    let uid = PrincipalId::new("u1");
    srv.identity
        .create_user(
            uid.clone(),
            Some("u1@example.com".into()),
            PortalClaims {
                role: Some(qrportal_auth::Role::Individual),
                ..PortalClaims::default()
            },
        )
        .unwrap();

    let cookies = srv.sign_in(&uid).await;
    assert!(cookies.contains("session="));
    assert!(cookies.contains("token="));
    assert!(cookies.contains("uid=u1"));

    let res = srv.get("/api/session/verify", &cookies).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["uid"], "u1");
    assert_eq!(body["role"], "individual");
    assert_eq!(body["permissions"].as_array().unwrap().len(), 5);

    let metrics: Value = srv.get("/api/debug/metrics", "").await.json().await.unwrap();
    assert_eq!(metrics["metrics"]["claimsUpgrades"], 1);
}

#[tokio::test]
async fn destroyed_session_no_longer_verifies() {
    let srv = TestServer::spawn().await;
    let uid = srv.user("u1");
    let cookies = srv.sign_in(&uid).await;

    let res = srv.post("/api/session/destroy", &cookies, json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let cleared = res.headers().get_all(SET_COOKIE).iter().count();
    assert_eq!(cleared, 3);

    let res = srv.get("/api/session/verify", &cookies).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_picks_up_claims_changed_since_sign_in() {
    let srv = TestServer::spawn().await;
    let owner = srv.user("owner-1");
    let cookies = srv.sign_in(&owner).await;

    let res = srv
        .post("/api/companies", &cookies, json!({ "name": "Acme", "slug": "acme" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    srv.clock.advance_ms(1_000);
    let res = srv.post("/api/session/refresh", &cookies, json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let refreshed = cookie_header(res.headers());
    let token = cookies.split("; ").find(|c| c.starts_with("token=")).unwrap();

    let res = srv.get("/api/session/verify", &format!("{refreshed}; {token}")).await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["role"], "company-owner");
    assert_eq!(body["companySlug"], "acme");
}

#[tokio::test]
async fn branch_manager_is_sent_to_their_own_branch() {
    let srv = TestServer::spawn().await;
    provision_acme(&srv).await;
    let cookies = srv.sign_in(&PrincipalId::new("manager-1")).await;

    let res = srv.get("/acme/kandy", &cookies).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/acme/colombo");

    let res = srv.get("/acme/colombo", &cookies).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["role"], "branch-manager");
    assert_eq!(body["permission"], "company:cashiers");
}

#[tokio::test]
async fn cashier_page_reports_its_permission() {
    let srv = TestServer::spawn().await;
    provision_acme(&srv).await;
    let cookies = srv.sign_in(&PrincipalId::new("cashier-1")).await;

    let res = srv.get("/acme/colombo/cashier1/transactions", &cookies).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["page"], "/acme/colombo/cashier1/transactions");
    assert_eq!(body["permission"], "transactions");

    // Cashiers have no settings page; they land on their default route.
    let res = srv.get("/settings", &cookies).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/acme/colombo/cashier1");

    // A company page is the wrong layout for a cashier.
    let res = srv.get("/acme", &cookies).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/acme/colombo/cashier1");
}

#[tokio::test]
async fn expired_invites_fail_and_only_pin_invites_are_deleted() {
    let srv = TestServer::spawn().await;
    let admin = srv
        .services
        .accounts
        .create_admin("ops@example.com", "Ops")
        .await
        .unwrap();
    let admin_invite = srv
        .services
        .invites
        .issue(InviteKind::AdminPassword, "ops@example.com", admin.id)
        .await
        .unwrap();
    let pin_invite = srv
        .services
        .invites
        .issue(InviteKind::BranchPin, "mgr@example.com", PrincipalId::new("manager-1"))
        .await
        .unwrap();

    srv.clock.advance_ms(72 * 60 * 60 * 1000 + 1);

    for secret in [&admin_invite.secret, &pin_invite.secret] {
        let res = srv
            .post(
                "/api/auth/set-password",
                "",
                json!({ "token": secret, "password": "a long password" }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "ok": false, "message": "Token expired" }));
    }

    let documents = &srv.services.documents;
    let kept: Option<InviteToken> = documents
        .get(InviteKind::AdminPassword.collection(), &admin_invite.record.token_hash)
        .await
        .unwrap();
    assert!(kept.is_some());
    let gone: Option<InviteToken> = documents
        .get(InviteKind::BranchPin.collection(), &pin_invite.record.token_hash)
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn admin_invite_flow_and_single_session() {
    let srv = TestServer::spawn().await;
    srv.services
        .accounts
        .bootstrap_admin("root@example.com", "root password")
        .await
        .unwrap();

    let signin = json!({ "email": "root@example.com", "password": "root password" });
    let res = srv.post("/api/admin/signin", "", signin.clone()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let root = cookie_header(res.headers());

    // Create a second admin and invite them; the link comes back outside production.
    let res = srv
        .post(
            "/api/admin/admins",
            &root,
            json!({ "email": "ops@example.com", "displayName": "Ops" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let ops: Value = res.json().await.unwrap();
    let ops_id = ops["admin"]["id"].as_str().unwrap().to_string();

    let res = srv
        .post(
            "/api/admin/invites",
            &root,
            json!({ "email": "ops@example.com", "kind": "admin-password", "principalId": ops_id }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let invite: Value = res.json().await.unwrap();
    let link = invite["link"].as_str().unwrap();
    let secret = link.split("token=").nth(1).unwrap();

    let res = srv
        .post("/api/auth/set-password", "", json!({ "token": secret, "password": "ops password" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = srv
        .post("/api/auth/set-password", "", json!({ "token": secret, "password": "ops password" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let ops_signin = json!({ "email": "ops@example.com", "password": "ops password" });
    let res = srv.post("/api/admin/signin", "", ops_signin.clone()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let first = cookie_header(res.headers());
    let res = srv.post("/api/admin/signin", "", ops_signin).await;
    let second = cookie_header(res.headers());

    srv.services.cleanup.wait_idle().await;

    assert_eq!(srv.get("/api/admin/me", &first).await.status(), StatusCode::UNAUTHORIZED);
    let res = srv.get("/api/admin/me", &second).await;
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["admin"]["email"], "ops@example.com");

    // The root admin's session is independent.
    assert_eq!(srv.get("/api/admin/me", &root).await.status(), StatusCode::OK);

    let res = srv.post("/api/admin/signin", "", json!({ "email": "ops@example.com", "password": "wrong password" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn staff_sign_in_and_out() {
    let srv = TestServer::spawn().await;
    let staff = srv
        .services
        .accounts
        .create_staff("desk", "Front desk", None)
        .await
        .unwrap();
    let invite = srv
        .services
        .invites
        .issue(InviteKind::StaffPassword, "desk@example.com", staff.id)
        .await
        .unwrap();
    let res = srv
        .post(
            "/api/auth/set-password",
            "",
            json!({ "token": invite.secret, "password": "desk password" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv
        .post("/api/staff/signin", "", json!({ "username": "desk", "password": "desk password" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookies = cookie_header(res.headers());

    assert_eq!(srv.get("/staff/home", &cookies).await.status(), StatusCode::OK);
    assert_eq!(srv.get("/api/staff/me", &cookies).await.status(), StatusCode::OK);

    let res = srv.post("/api/staff/signout", &cookies, json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.get("/api/staff/me", &cookies).await.status(), StatusCode::UNAUTHORIZED);

    let res = srv.get("/staff/home", &cookies).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/staff/signin?from=%2Fstaff%2Fhome");
}

#[tokio::test]
async fn custom_token_is_limited_to_allowed_origins() {
    let config = PortalConfig {
        allowed_origins: vec!["https://pos.example".to_string()],
        ..PortalConfig::development()
    };
    let srv = TestServer::spawn_with(config).await;
    let uid = srv.user("u1");
    let cookies = srv.sign_in(&uid).await;

    let res = srv
        .client
        .request(reqwest::Method::OPTIONS, srv.url("/api/auth/custom-token"))
        .header(ORIGIN, "https://pos.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        res.headers().get("access-control-allow-origin").unwrap(),
        "https://pos.example"
    );

    let res = srv
        .client
        .get(srv.url("/api/auth/custom-token"))
        .header(ORIGIN, "https://evil.example")
        .header(reqwest::header::COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .get(srv.url("/api/auth/custom-token"))
        .header(ORIGIN, "https://pos.example")
        .header(reqwest::header::COOKIE, &cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("access-control-allow-credentials").unwrap(), "true");
    let body: Value = res.json().await.unwrap();
    assert!(!body["token"].as_str().unwrap().is_empty());

    let res = srv
        .client
        .get(srv.url("/api/auth/custom-token"))
        .header(ORIGIN, "https://pos.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn branch_manager_pin_round_trip() {
    let srv = TestServer::spawn().await;
    provision_acme(&srv).await;
    let manager = PrincipalId::new("manager-1");
    let invite = srv
        .services
        .invites
        .issue(InviteKind::BranchPin, "manager-1@example.com", manager.clone())
        .await
        .unwrap();

    let res = srv
        .post("/api/auth/set-pin", "", json!({ "token": invite.secret, "pin": "4321" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let cookies = srv.sign_in(&manager).await;
    let res = srv.post("/api/auth/verify-pin", &cookies, json!({ "pin": "4321" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = srv.post("/api/auth/verify-pin", &cookies, json!({ "pin": "0000" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let cashier = srv.sign_in(&PrincipalId::new("cashier-1")).await;
    let res = srv.post("/api/auth/verify-pin", &cashier, json!({ "pin": "4321" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_company_slug_conflicts() {
    let srv = TestServer::spawn().await;
    provision_acme(&srv).await;
    let other = srv.user("other-1");
    let cookies = srv.sign_in(&other).await;

    let res = srv
        .post("/api/companies", &cookies, json!({ "name": "Acme 2", "slug": "acme" }))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["ok"], false);

    let res = srv
        .post(
            "/api/companies/acme/branches",
            &cookies,
            json!({ "name": "Kandy", "slug": "kandy", "managerUid": "other-1" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn debug_metrics_are_hidden_in_production() {
    let srv = TestServer::spawn().await;
    let res = srv.get("/api/debug/metrics", "").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["metrics"]["sessionsCreated"], 0);

    let prod = TestServer::spawn_with(PortalConfig {
        production: true,
        ..PortalConfig::development()
    })
    .await;
    assert_eq!(prod.get("/api/debug/metrics", "").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(prod.get("/api/nope", "").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_user_session_token_fails_verification() {
    let srv = TestServer::spawn().await;
    let uid = srv.user("u1");
    let id_token = srv.identity.sign_in(&uid).unwrap();
    let res = srv
        .post("/api/session/create", "", json!({ "idToken": id_token, "expiresIn": 60_000 }))
        .await;
    let cookies = cookie_header(res.headers());
    assert_eq!(srv.get("/api/session/verify", &cookies).await.status(), StatusCode::OK);

    srv.clock.advance_ms(61_000);
    assert_eq!(srv.get("/api/session/verify", &cookies).await.status(), StatusCode::UNAUTHORIZED);
    assert!(srv.clock.now_ms() > START_MS);
}
