#![cfg(feature = "inmem-store")]

use actix_web::{dev::ServiceResponse, test, web, App};
use campus::auth::{Sessions, SESSION_COOKIE};
use campus::config::Settings;
use campus::rate_limit::LoginThrottle;
use campus::repo::inmem::InMemStore;
use campus::seed::seed_defaults;
use campus::storage::FsDocumentStore;
use campus::{config, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

async fn state(dir: &std::path::Path, login_limit: usize) -> AppState {
    let store = InMemStore::ephemeral();
    seed_defaults(&store, &Settings::for_tests(SECRET)).await.unwrap();
    AppState {
        store: Arc::new(store),
        documents: Arc::new(FsDocumentStore::new(dir.join("documents"))),
        sessions: Sessions::new(SECRET, 7, false),
        throttle: LoginThrottle::new(login_limit, Duration::from_secs(60)),
    }
}

async fn json_body(resp: ServiceResponse) -> Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

macro_rules! login {
    ($app:expr, $user:expr, $pass:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(&json!({"username": $user, "password": $pass}))
            .to_request();
        test::call_service(&$app, req).await
    }};
}

macro_rules! token_for {
    ($app:expr, $user:expr, $pass:expr) => {{
        let resp = login!($app, $user, $pass);
        assert_eq!(resp.status(), 200, "login as {}", $user);
        json_body(resp).await["token"].as_str().unwrap().to_string()
    }};
}

macro_rules! send {
    ($app:expr, $method:ident, $uri:expr, $token:expr) => {{
        let req = test::TestRequest::$method()
            .uri($uri)
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .to_request();
        test::call_service(&$app, req).await
    }};
    ($app:expr, $method:ident, $uri:expr, $token:expr, $body:expr) => {{
        let req = test::TestRequest::$method()
            .uri($uri)
            .insert_header(("Authorization", format!("Bearer {}", $token)))
            .set_json(&$body)
            .to_request();
        test::call_service(&$app, req).await
    }};
}

#[actix_web::test]
async fn login_sets_cookie_and_rejects_bad_passwords() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 5).await)).configure(config),
    )
    .await;

    let resp = login!(app, "admin", "admin-password");
    assert_eq!(resp.status(), 200);
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == SESSION_COOKIE)
        .expect("session cookie")
        .into_owned();
    assert_eq!(cookie.http_only(), Some(true));
    let body = json_body(resp).await;
    assert_eq!(body["user"]["username"], "admin");
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());

    // the cookie alone authenticates
    let req = test::TestRequest::get().uri("/api/v1/auth/me").cookie(cookie).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(json_body(resp).await["user"]["username"], "admin");

    let resp = login!(app, "admin", "wrong");
    assert_eq!(resp.status(), 401);
    assert_eq!(json_body(resp).await["error"], "Invalid username or password");

    let resp = login!(app, "nobody", "admin-password");
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn repeated_failures_are_throttled() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 2).await)).configure(config),
    )
    .await;

    assert_eq!(login!(app, "admin", "bad-1").status(), 401);
    assert_eq!(login!(app, "admin", "bad-2").status(), 401);
    // even the right password is refused until the window passes
    assert_eq!(login!(app, "admin", "admin-password").status(), 429);
}

#[actix_web::test]
async fn staff_see_only_their_class() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 5).await)).configure(config),
    )
    .await;
    let admin = token_for!(app, "admin", "admin-password");

    for (name, category) in [("Grade 1", "integrated"), ("Grade 2", "integrated")] {
        let resp = send!(app, post, "/api/v1/classes", admin,
            json!({"class_name": name, "category": category, "teacher_id": null, "academic_year": "2026/2027"}));
        assert_eq!(resp.status(), 201);
    }
    let resp = send!(app, post, "/api/v1/classes", admin,
        json!({"class_name": "Grade 1", "category": "integrated", "academic_year": "2026/2027"}));
    assert_eq!(resp.status(), 409);

    let resp = send!(app, post, "/api/v1/staff", admin, json!({
        "first_name": "Halima", "last_name": "Abdi", "category": "teaching",
        "class_assigned": "Grade 1", "password": "teach-pass"
    }));
    assert_eq!(resp.status(), 201);
    let staff = json_body(resp).await;
    assert_eq!(staff["staff_id"], "TS/0001");

    let mut admissions = Vec::new();
    for (first, class_name) in [("Amina", "Grade 1"), ("Bilal", "Grade 1"), ("Chiku", "Grade 2")] {
        let resp = send!(app, post, "/api/v1/students", admin, json!({
            "first_name": first, "last_name": "Test", "class_name": class_name,
            "category": "integrated", "password": "pupil-pass"
        }));
        assert_eq!(resp.status(), 201);
        admissions.push(json_body(resp).await["admission_number"].as_str().unwrap().to_string());
    }
    assert_eq!(admissions, vec!["INT/0001", "INT/0002", "INT/0003"]);

    let teacher = token_for!(app, "TS/0001", "teach-pass");
    let resp = send!(app, get, "/api/v1/students", teacher);
    assert_eq!(resp.status(), 200);
    let visible = json_body(resp).await;
    let names: Vec<_> = visible.as_array().unwrap().iter().map(|s| s["first_name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Amina", "Bilal"]);

    let resp = send!(app, get, "/api/v1/students", admin);
    assert_eq!(json_body(resp).await.as_array().unwrap().len(), 3);

    // staff cannot register students
    let resp = send!(app, post, "/api/v1/students", teacher, json!({
        "first_name": "X", "last_name": "Y", "class_name": "Grade 1",
        "category": "integrated", "password": "pupil-pass"
    }));
    assert_eq!(resp.status(), 403);

    let pupil = token_for!(app, "INT/0003", "pupil-pass");
    assert_eq!(send!(app, get, "/api/v1/students", pupil).status(), 403);

    // roster of the teacher's class
    let classes = json_body(send!(app, get, "/api/v1/classes", teacher)).await;
    let grade1 = classes.as_array().unwrap().iter().find(|c| c["class_name"] == "Grade 1").unwrap();
    let uri = format!("/api/v1/classes/{}/roster", grade1["id"].as_str().unwrap());
    let roster = json_body(send!(app, get, &uri, teacher)).await;
    assert_eq!(roster["export_file_name"], "students_Grade 1.pdf");
    assert_eq!(roster["students"].as_array().unwrap().len(), 2);

    let grade2 = classes.as_array().unwrap().iter().find(|c| c["class_name"] == "Grade 2").unwrap();
    let uri = format!("/api/v1/classes/{}/roster", grade2["id"].as_str().unwrap());
    let roster = json_body(send!(app, get, &uri, teacher)).await;
    assert!(roster["students"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn deactivated_student_login_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 5).await)).configure(config),
    )
    .await;
    let admin = token_for!(app, "admin", "admin-password");

    let resp = send!(app, post, "/api/v1/students", admin, json!({
        "first_name": "Amina", "last_name": "Yusuf", "class_name": "Hifdh A",
        "category": "tahfidh", "password": "pupil-pass"
    }));
    let student = json_body(resp).await;
    assert_eq!(student["admission_number"], "TAH/0001");
    let token = token_for!(app, "TAH/0001", "pupil-pass");

    let uri = format!("/api/v1/students/{}", student["id"].as_str().unwrap());
    let resp = send!(app, put, &uri, admin, json!({
        "first_name": "Amina", "last_name": "Yusuf", "class_name": "Hifdh A",
        "category": "tahfidh", "status": "inactive"
    }));
    assert_eq!(resp.status(), 200);
    assert_eq!(json_body(resp).await["status"], "inactive");

    let resp = login!(app, "TAH/0001", "pupil-pass");
    assert_eq!(resp.status(), 403);
    assert_eq!(json_body(resp).await["error"], "Account is deactivated");

    // an already issued session stops working for portal data
    assert_eq!(send!(app, get, "/api/v1/announcements", token).status(), 403);
}

#[actix_web::test]
async fn fees_and_payments() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 5).await)).configure(config),
    )
    .await;
    let admin = token_for!(app, "admin", "admin-password");

    let student = json_body(send!(app, post, "/api/v1/students", admin, json!({
        "first_name": "Amina", "last_name": "Yusuf", "class_name": "Ta'lim 1",
        "category": "talim", "password": "pupil-pass"
    }))).await;
    let sid = student["id"].as_str().unwrap().to_string();

    let resp = send!(app, post, "/api/v1/fees", admin, json!({"student_id": sid, "total_billed": 15000}));
    assert_eq!(resp.status(), 201);
    assert_eq!(json_body(resp).await["balance"], 15000);

    let uri = format!("/api/v1/students/{sid}/payments");
    let fee = json_body(send!(app, post, &uri, admin, json!({"amount": 5000}))).await;
    assert_eq!(fee["balance"], 10000);
    let fee = json_body(send!(app, post, &uri, admin, json!({"amount": 50000}))).await;
    assert_eq!(fee["balance"], 0);

    let resp = send!(app, post, &uri, admin, json!({"amount": 0}));
    assert_eq!(resp.status(), 400);

    // students see only their own record
    let pupil = token_for!(app, "TAL/0001", "pupil-pass");
    let mine = json_body(send!(app, get, "/api/v1/fees", pupil)).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["student_id"], sid.as_str());
    assert_eq!(send!(app, post, &uri, pupil, json!({"amount": 1})).status(), 403);
}

#[actix_web::test]
async fn announcements_follow_their_audience() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 5).await)).configure(config),
    )
    .await;
    let admin = token_for!(app, "admin", "admin-password");

    send!(app, post, "/api/v1/staff", admin, json!({
        "first_name": "Omar", "last_name": "Salim", "category": "non_teaching", "password": "staff-pass"
    }));
    send!(app, post, "/api/v1/students", admin, json!({
        "first_name": "Amina", "last_name": "Yusuf", "class_name": "Hifdh A",
        "category": "tahfidh", "password": "pupil-pass"
    }));

    for (title, audience, priority, active) in [
        ("Everyone", "all", "normal", true),
        ("Teachers", "teaching_staff", "high", true),
        ("Support staff", "non_teaching_staff", "low", true),
        ("Hifdh", "tahfidh_students", "urgent", true),
        ("Draft", "all", "urgent", false),
    ] {
        let resp = send!(app, post, "/api/v1/announcements", admin, json!({
            "title": title, "content": "...", "target_audience": audience,
            "priority": priority, "is_active": active
        }));
        assert_eq!(resp.status(), 201);
    }

    let titles = |v: Value| -> Vec<String> {
        v.as_array().unwrap().iter().map(|a| a["title"].as_str().unwrap().to_string()).collect()
    };

    let staff = token_for!(app, "NTS/0001", "staff-pass");
    let seen = titles(json_body(send!(app, get, "/api/v1/announcements", staff)).await);
    assert_eq!(seen, vec!["Everyone", "Support staff"]);

    let pupil = token_for!(app, "TAH/0001", "pupil-pass");
    let seen = titles(json_body(send!(app, get, "/api/v1/announcements", pupil)).await);
    assert_eq!(seen, vec!["Hifdh", "Everyone"]);

    let seen = titles(json_body(send!(app, get, "/api/v1/announcements", admin)).await);
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[2], "Teachers");

    let resp = send!(app, post, "/api/v1/announcements", staff, json!({
        "title": "x", "content": "y", "target_audience": "all"
    }));
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
async fn change_password_and_logout() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 5).await)).configure(config),
    )
    .await;
    let admin = token_for!(app, "admin", "admin-password");

    let resp = send!(app, post, "/api/v1/auth/password", admin, json!({
        "current_password": "admin-password", "new_password": "fresh-pass", "confirm_password": "fresh-pas"
    }));
    assert_eq!(resp.status(), 400);
    assert_eq!(json_body(resp).await["error"], "Passwords do not match");

    let resp = send!(app, post, "/api/v1/auth/password", admin, json!({
        "current_password": "admin-password", "new_password": "fresh-pass", "confirm_password": "fresh-pass"
    }));
    assert_eq!(resp.status(), 200);
    assert_eq!(login!(app, "admin", "admin-password").status(), 401);
    assert_eq!(login!(app, "admin", "fresh-pass").status(), 200);

    let resp = send!(app, post, "/api/v1/auth/logout", admin);
    assert_eq!(resp.status(), 200);
    let cleared = resp.response().cookies().find(|c| c.name() == SESSION_COOKIE).expect("removal cookie");
    assert_eq!(cleared.value(), "");
}

#[actix_web::test]
async fn document_upload_download_delete() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 5).await)).configure(config),
    )
    .await;
    let admin = token_for!(app, "admin", "admin-password");

    let pdf: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n";
    let mut body = Vec::new();
    body.extend_from_slice(
        b"--XBOUNDARY\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nTerm calendar\r\n\
          --XBOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; filename=\"calendar.pdf\"\r\n\
          Content-Type: application/pdf\r\n\r\n",
    );
    body.extend_from_slice(pdf);
    body.extend_from_slice(b"\r\n--XBOUNDARY--\r\n");

    let req = test::TestRequest::post()
        .uri("/api/v1/documents")
        .insert_header(("Authorization", format!("Bearer {}", admin)))
        .insert_header(("Content-Type", "multipart/form-data; boundary=XBOUNDARY"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let doc = json_body(resp).await;
    assert_eq!(doc["mime"], "application/pdf");
    assert_eq!(doc["file_name"], "calendar.pdf");
    assert_eq!(doc["download_count"], 0);
    let id = doc["id"].as_str().unwrap().to_string();

    let uri = format!("/api/v1/documents/{id}/download");
    let resp = send!(app, get, &uri, admin);
    assert_eq!(resp.status(), 200);
    assert_eq!(test::read_body(resp).await.as_ref(), pdf);

    let listed = json_body(send!(app, get, "/api/v1/documents", admin)).await;
    assert_eq!(listed[0]["download_count"], 1);

    let uri_doc = format!("/api/v1/documents/{id}");
    assert_eq!(send!(app, delete, &uri_doc, admin).status(), 204);
    assert_eq!(send!(app, get, &uri, admin).status(), 404);
}

#[actix_web::test]
async fn fee_balances_stay_within_the_bill() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 5).await)).configure(config),
    )
    .await;
    let admin = token_for!(app, "admin", "admin-password");

    for body in [
        json!({"student_id": "st1", "total_billed": 1000, "balance": -500}),
        json!({"student_id": "st1", "total_billed": 1000, "balance": 1500}),
        json!({"student_id": "st1", "total_billed": -1}),
    ] {
        assert_eq!(send!(app, post, "/api/v1/fees", admin, body).status(), 400);
    }

    let resp = send!(app, post, "/api/v1/fees", admin, json!({"student_id": "st1", "total_billed": 1000, "balance": 250}));
    assert_eq!(resp.status(), 201);
    let uri = format!("/api/v1/fees/{}", json_body(resp).await["id"].as_str().unwrap());

    for body in [
        json!({"student_id": "st1", "total_billed": 1000, "balance": -1}),
        json!({"student_id": "st1", "total_billed": 100, "balance": 250}),
        json!({"student_id": "st1", "total_billed": -1000, "balance": 0}),
    ] {
        assert_eq!(send!(app, put, &uri, admin, body).status(), 400);
    }
    let resp = send!(app, put, &uri, admin, json!({"student_id": "st1", "total_billed": 1200, "balance": 0}));
    assert_eq!(resp.status(), 200);
    assert_eq!(json_body(resp).await["balance"], 0);
}

#[actix_web::test]
async fn class_rename_cannot_duplicate_a_name() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(dir.path(), 5).await)).configure(config),
    )
    .await;
    let admin = token_for!(app, "admin", "admin-password");

    let mut ids = Vec::new();
    for (name, category) in [("Grade 1", "integrated"), ("Ta'lim 1", "talim")] {
        let resp = send!(app, post, "/api/v1/classes", admin,
            json!({"class_name": name, "category": category, "academic_year": "2026/2027"}));
        ids.push(json_body(resp).await["id"].as_str().unwrap().to_string());
    }

    let uri = format!("/api/v1/classes/{}", ids[1]);
    let resp = send!(app, put, &uri, admin,
        json!({"class_name": "Grade 1", "category": "talim", "academic_year": "2026/2027"}));
    assert_eq!(resp.status(), 409);

    // keeping its own name is fine
    let resp = send!(app, put, &uri, admin,
        json!({"class_name": "Ta'lim 1", "category": "talim", "academic_year": "2027/2028"}));
    assert_eq!(resp.status(), 200);
    assert_eq!(json_body(resp).await["academic_year"], "2027/2028");
}
