#![cfg(feature = "inmem-store")]

use actix_web::{dev::Payload, test, web, FromRequest};
use campus::auth::{
    authenticate, change_password, hash_password, login, verify_password, Auth, Claims, LoginOutcome,
    PasswordError, Sessions, SESSION_COOKIE,
};
use campus::models::*;
use campus::rate_limit::LoginThrottle;
use campus::registry::{register_staff, register_student};
use campus::repo::{collection, inmem::InMemStore};
use campus::require_role;
use campus::storage::FsDocumentStore;
use campus::AppState;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

fn state(store: InMemStore) -> AppState {
    AppState {
        store: Arc::new(store),
        documents: Arc::new(FsDocumentStore::new(std::env::temp_dir().join("campus-auth-tests"))),
        sessions: Sessions::new(SECRET, 7, false),
        throttle: LoginThrottle::new(5, Duration::from_secs(60)),
    }
}

async fn admin(store: &InMemStore, username: &str, password: &str) -> User {
    collection::<User>(store)
        .add(User {
            id: new_id(),
            username: username.into(),
            password_hash: hash_password(password).unwrap(),
            role: Role::Admin,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

fn new_student(password: &str) -> NewStudent {
    NewStudent {
        first_name: "Zainab".into(),
        last_name: "Musa".into(),
        class_name: "Grade 1".into(),
        category: Program::Integrated,
        parent_name: None,
        parent_phone: None,
        parent_email: None,
        password: password.into(),
    }
}

#[::core::prelude::v1::test]
fn password_hash_roundtrip() {
    let hash = hash_password("s3cret!").unwrap();
    assert_ne!(hash, "s3cret!");
    assert!(verify_password("s3cret!", &hash));
    assert!(!verify_password("wrong", &hash));
    assert!(!verify_password("s3cret!", "not-a-phc-string"));
}

#[tokio::test]
async fn authenticate_matches_exact_username_and_password() {
    let store = InMemStore::ephemeral();
    let user = admin(&store, "admin", "admin-pass").await;

    let found = authenticate(&store, "admin", "admin-pass").await.unwrap();
    assert_eq!(found.map(|u| u.id), Some(user.id));
    assert!(authenticate(&store, "admin", "nope").await.unwrap().is_none());
    assert!(authenticate(&store, "Admin", "admin-pass").await.unwrap().is_none());
    assert!(authenticate(&store, "ghost", "admin-pass").await.unwrap().is_none());
}

#[tokio::test]
async fn deactivated_student_cannot_log_in() {
    let store = InMemStore::ephemeral();
    let (user, mut student) = register_student(&store, new_student("student-pass")).await.unwrap();

    assert!(matches!(
        login(&store, &user.username, "student-pass").await.unwrap(),
        LoginOutcome::Authenticated(_)
    ));

    student.status = Status::Inactive;
    let id = student.id.clone();
    assert!(collection::<Student>(&store).update(&id, student).await.unwrap());

    // correct credentials, still refused
    assert_eq!(login(&store, &user.username, "student-pass").await.unwrap(), LoginOutcome::Deactivated);
    assert_eq!(login(&store, &user.username, "bad").await.unwrap(), LoginOutcome::InvalidCredentials);
}

#[tokio::test]
async fn deactivated_staff_cannot_log_in() {
    let store = InMemStore::ephemeral();
    let (user, mut staff) = register_staff(
        &store,
        NewStaff {
            first_name: "Omar".into(),
            last_name: "Salim".into(),
            email: None,
            phone: None,
            category: StaffCategory::NonTeaching,
            class_assigned: None,
            password: "staff-pass".into(),
        },
    )
    .await
    .unwrap();
    staff.status = Status::Inactive;
    let id = staff.id.clone();
    collection::<Staff>(&store).update(&id, staff).await.unwrap();

    assert_eq!(login(&store, &user.username, "staff-pass").await.unwrap(), LoginOutcome::Deactivated);
}

#[tokio::test]
async fn change_password_reports_form_errors() {
    let store = InMemStore::ephemeral();
    let user = admin(&store, "admin", "old-pass").await;

    let err = change_password(&store, &user.id, "wrong", "new-pass", "new-pass").await.unwrap_err();
    assert!(matches!(err, PasswordError::Incorrect));
    assert_eq!(err.to_string(), "Current password is incorrect");

    let err = change_password(&store, &user.id, "old-pass", "new-pass", "other").await.unwrap_err();
    assert_eq!(err.to_string(), "Passwords do not match");

    let err = change_password(&store, &user.id, "old-pass", "abc", "abc").await.unwrap_err();
    assert_eq!(err.to_string(), "Password must be at least 6 characters");

    change_password(&store, &user.id, "old-pass", "new-pass", "new-pass").await.unwrap();
    assert!(authenticate(&store, "admin", "new-pass").await.unwrap().is_some());
    assert!(authenticate(&store, "admin", "old-pass").await.unwrap().is_none());
}

#[actix_web::test]
async fn session_token_roundtrip_via_bearer_and_cookie() {
    let store = InMemStore::ephemeral();
    let user = admin(&store, "admin", "admin-pass").await;
    let st = state(store);
    let token = st.sessions.issue(&user).unwrap();

    let req = test::TestRequest::default()
        .app_data(web::Data::new(st.clone()))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_http_request();
    let auth = Auth::from_request(&req, &mut Payload::None).await.expect("bearer");
    assert_eq!(auth.0.sub, user.id);
    assert_eq!(auth.0.role, Role::Admin);

    let req = test::TestRequest::default()
        .app_data(web::Data::new(st.clone()))
        .cookie(st.sessions.cookie(token.clone()))
        .to_http_request();
    let auth = Auth::from_request(&req, &mut Payload::None).await.expect("cookie");
    assert_eq!(auth.0.username, "admin");

    let cookie = st.sessions.cookie(token);
    assert_eq!(cookie.name(), SESSION_COOKIE);
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.max_age().map(|d| d.whole_days()), Some(7));
}

#[actix_web::test]
async fn extractor_rejects_bad_or_missing_token() {
    let st = state(InMemStore::ephemeral());
    let req = test::TestRequest::default()
        .app_data(web::Data::new(st.clone()))
        .insert_header(("Authorization", "Bearer notatoken"))
        .to_http_request();
    assert!(Auth::from_request(&req, &mut Payload::None).await.is_err());

    let req = test::TestRequest::default().app_data(web::Data::new(st)).to_http_request();
    assert!(Auth::from_request(&req, &mut Payload::None).await.is_err());

    // signed with another secret
    let other = Sessions::new("another-secret-that-is-32-bytes-long", 7, false);
    let forged = other
        .issue(&User {
            id: "x".into(),
            username: "x".into(),
            password_hash: String::new(),
            role: Role::Admin,
            created_at: Utc::now(),
        })
        .unwrap();
    assert!(Sessions::new(SECRET, 7, false).verify(&forged).is_err());
}

#[::core::prelude::v1::test]
fn require_role_macro_enforces_roles() {
    fn guarded(a: Auth) -> Result<(), campus::error::ApiError> {
        require_role!(a, Role::Admin);
        Ok(())
    }
    let claims = |role| Claims { sub: "1".into(), username: "u".into(), role, exp: usize::MAX };
    assert!(guarded(Auth(claims(Role::Admin))).is_ok());
    assert!(guarded(Auth(claims(Role::Staff))).is_err());
    assert!(guarded(Auth(claims(Role::Student))).is_err());
}
