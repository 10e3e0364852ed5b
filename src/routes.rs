use std::sync::Arc;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_multipart::Multipart;
use chrono::Utc;
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::auth::{self, Auth, LoginOutcome, Sessions};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::LoginThrottle;
use crate::registry::{self, FeeError};
use crate::repo::{self, collection, Store};
use crate::require_role;
use crate::storage::{DocumentStore, DocumentStoreError};
use crate::visibility::{self, Viewer};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/logout").route(web::post().to(logout)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/auth/password").route(web::post().to(change_password)))
            .service(
                web::resource("/me/profile-picture")
                    .route(web::get().to(get_profile_picture))
                    .route(web::put().to(set_profile_picture))
                    .route(web::delete().to(delete_profile_picture)),
            )
            .service(
                web::resource("/staff")
                    .route(web::get().to(list_staff))
                    .route(web::post().to(create_staff)),
            )
            .service(
                web::resource("/staff/{id}")
                    .route(web::get().to(get_staff))
                    .route(web::put().to(update_staff))
                    .route(web::delete().to(delete_staff)),
            )
            .service(
                web::resource("/students")
                    .route(web::get().to(list_students))
                    .route(web::post().to(create_student)),
            )
            .service(
                web::resource("/students/{id}")
                    .route(web::get().to(get_student))
                    .route(web::put().to(update_student))
                    .route(web::delete().to(delete_student)),
            )
            .service(
                web::resource("/classes")
                    .route(web::get().to(list_classes))
                    .route(web::post().to(create_class)),
            )
            .service(
                web::resource("/classes/{id}")
                    .route(web::put().to(update_class))
                    .route(web::delete().to(delete_class)),
            )
            .service(web::resource("/classes/{id}/roster").route(web::get().to(class_roster)))
            .service(
                web::resource("/fees")
                    .route(web::get().to(list_fees))
                    .route(web::post().to(create_fee)),
            )
            .service(
                web::resource("/fees/{id}")
                    .route(web::put().to(update_fee))
                    .route(web::delete().to(delete_fee)),
            )
            .service(web::resource("/students/{id}/payments").route(web::post().to(record_payment)))
            .service(
                web::resource("/announcements")
                    .route(web::get().to(list_announcements))
                    .route(web::post().to(create_announcement)),
            )
            .service(
                web::resource("/announcements/{id}")
                    .route(web::put().to(update_announcement))
                    .route(web::delete().to(delete_announcement)),
            )
            .service(
                web::resource("/assignments")
                    .route(web::get().to(list_assignments))
                    .route(web::post().to(create_assignment)),
            )
            .service(
                web::resource("/assignments/{id}")
                    .route(web::put().to(update_assignment))
                    .route(web::delete().to(delete_assignment)),
            )
            .service(
                web::resource("/documents")
                    .route(web::get().to(list_documents))
                    .route(web::post().to(upload_document)),
            )
            .service(web::resource("/documents/{id}").route(web::delete().to(delete_document)))
            .service(web::resource("/documents/{id}/download").route(web::get().to(download_document))),
    );
}

/// Request-scoped context shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub documents: Arc<dyn DocumentStore>,
    pub sessions: Sessions,
    pub throttle: LoginThrottle,
}

/// The caller's portal profile, resolved from the session.
enum Profile {
    Admin,
    Staff(Staff),
    Student(Student),
}

impl Profile {
    fn viewer(&self) -> Viewer<'_> {
        match self {
            Profile::Admin => Viewer::Admin,
            Profile::Staff(s) => Viewer::Staff(s),
            Profile::Student(s) => Viewer::Student(s),
        }
    }
}

async fn profile_of(store: &dyn Store, auth: &Auth) -> Result<Profile, ApiError> {
    let user_id = auth.0.sub.as_str();
    match auth.0.role {
        Role::Admin => Ok(Profile::Admin),
        Role::Staff => collection::<Staff>(store)
            .find(|s| s.user_id == user_id)
            .await?
            .filter(|s| s.status == Status::Active)
            .map(Profile::Staff)
            .ok_or(ApiError::Forbidden),
        Role::Student => collection::<Student>(store)
            .find(|s| s.user_id == user_id)
            .await?
            .filter(|s| s.status == Status::Active)
            .map(Profile::Student)
            .ok_or(ApiError::Forbidden),
    }
}

fn ok_status() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

fn removed(found: bool) -> Result<HttpResponse, ApiError> {
    if found { Ok(HttpResponse::NoContent().finish()) } else { Err(ApiError::NotFound) }
}

// ---------------- Auth -------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = LoginResponse),
        (status = 401, description = "Invalid username or password"),
        (status = 403, description = "Account deactivated"),
        (status = 429, description = "Too many failed attempts")
    )
)]
pub async fn login(req: HttpRequest, data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let ip = req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string();
    let LoginRequest { username, password } = payload.into_inner();
    if !data.throttle.allows(&username, &ip) {
        return Err(ApiError::TooManyRequests);
    }
    match auth::login(data.store.as_ref(), &username, &password).await? {
        LoginOutcome::Authenticated(user) => {
            data.throttle.reset(&username, &ip);
            let token = data.sessions.issue(&user).map_err(|e| {
                tracing::error!("failed to sign session: {e}");
                ApiError::Internal
            })?;
            tracing::info!(username = %user.username, role = ?user.role, "login");
            Ok(HttpResponse::Ok()
                .cookie(data.sessions.cookie(token.clone()))
                .json(LoginResponse { token, user: UserView::from(&user) }))
        }
        LoginOutcome::InvalidCredentials => {
            data.throttle.record_failure(&username, &ip);
            Err(ApiError::Unauthorized)
        }
        LoginOutcome::Deactivated => Err(ApiError::Deactivated),
    }
}

pub async fn logout(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().cookie(data.sessions.expired_cookie()).json(serde_json::json!({"status": "ok"}))
}

#[derive(Serialize)]
struct MeResponse {
    user: UserView,
    staff: Option<Staff>,
    student: Option<Student>,
}

pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let user = collection::<User>(store).get(&auth.0.sub).await?.ok_or(ApiError::Unauthorized)?;
    let me = match profile_of(store, &auth).await? {
        Profile::Admin => MeResponse { user: UserView::from(&user), staff: None, student: None },
        Profile::Staff(s) => MeResponse { user: UserView::from(&user), staff: Some(s), student: None },
        Profile::Student(s) => MeResponse { user: UserView::from(&user), staff: None, student: Some(s) },
    };
    Ok(HttpResponse::Ok().json(me))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

pub async fn change_password(auth: Auth, data: web::Data<AppState>, payload: web::Json<ChangePasswordRequest>) -> Result<HttpResponse, ApiError> {
    let p = payload.into_inner();
    auth::change_password(data.store.as_ref(), &auth.0.sub, &p.current_password, &p.new_password, &p.confirm_password).await?;
    Ok(ok_status())
}

// ---------------- Profile picture ---------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfilePicture {
    pub data_url: Option<String>,
}

const PROFILE_PICTURE_LIMIT: usize = 2 * 1024 * 1024;

pub async fn get_profile_picture(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let data_url = repo::profile_picture(data.store.as_ref(), &auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(ProfilePicture { data_url }))
}

pub async fn set_profile_picture(auth: Auth, data: web::Data<AppState>, payload: web::Json<ProfilePicture>) -> Result<HttpResponse, ApiError> {
    let Some(data_url) = payload.into_inner().data_url else {
        return Err(ApiError::BadRequest("data_url is required".into()));
    };
    if !data_url.starts_with("data:image/") {
        return Err(ApiError::BadRequest("Profile picture must be an image data URL".into()));
    }
    if data_url.len() > PROFILE_PICTURE_LIMIT {
        return Err(ApiError::BadRequest("Profile picture is too large".into()));
    }
    repo::set_profile_picture(data.store.as_ref(), &auth.0.sub, data_url).await?;
    Ok(ok_status())
}

pub async fn delete_profile_picture(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    repo::clear_profile_picture(data.store.as_ref(), &auth.0.sub).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Staff -------------------------------------------------

pub async fn list_staff(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    Ok(HttpResponse::Ok().json(collection::<Staff>(data.store.as_ref()).get_all().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/staff",
    request_body = NewStaff,
    responses(
        (status = 201, description = "Staff registered", body = Staff),
        (status = 400, description = "Invalid password"),
        (status = 403, description = "Forbidden – Admins only")
    )
)]
pub async fn create_staff(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewStaff>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let (_, staff) = registry::register_staff(data.store.as_ref(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(staff))
}

pub async fn get_staff(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let id = path.into_inner();
    match profile_of(store, &auth).await? {
        Profile::Admin => {}
        Profile::Staff(me) if me.id == id => {}
        _ => return Err(ApiError::Forbidden),
    }
    let staff = collection::<Staff>(store).get(&id).await?.ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(staff))
}

pub async fn update_staff(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<StaffDetails>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let staff = registry::update_staff(data.store.as_ref(), &path.into_inner(), payload.into_inner())
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(staff))
}

pub async fn delete_staff(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    removed(registry::remove_staff(data.store.as_ref(), &path.into_inner()).await?)
}

// ---------------- Students ----------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/students",
    responses(
        (status = 200, description = "All students (admin) or the caller's students (staff)", body = [Student]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_students(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let students = collection::<Student>(store).get_all().await?;
    let visible = match profile_of(store, &auth).await? {
        Profile::Admin => students,
        Profile::Staff(staff) => {
            let classes = collection::<Class>(store).get_all().await?;
            visibility::students_visible_to(&staff, &classes, &students)
        }
        Profile::Student(_) => return Err(ApiError::Forbidden),
    };
    Ok(HttpResponse::Ok().json(visible))
}

#[utoipa::path(
    post,
    path = "/api/v1/students",
    request_body = NewStudent,
    responses(
        (status = 201, description = "Student registered", body = Student),
        (status = 400, description = "Invalid password"),
        (status = 403, description = "Forbidden – Admins only")
    )
)]
pub async fn create_student(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewStudent>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let (_, student) = registry::register_student(data.store.as_ref(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(student))
}

pub async fn get_student(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let id = path.into_inner();
    let student = collection::<Student>(store).get(&id).await?.ok_or(ApiError::NotFound)?;
    let allowed = match profile_of(store, &auth).await? {
        Profile::Admin => true,
        Profile::Student(me) => me.id == id,
        Profile::Staff(staff) => {
            let classes = collection::<Class>(store).get_all().await?;
            !visibility::students_visible_to(&staff, &classes, std::slice::from_ref(&student)).is_empty()
        }
    };
    if !allowed {
        return Err(ApiError::Forbidden);
    }
    Ok(HttpResponse::Ok().json(student))
}

pub async fn update_student(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<StudentDetails>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let student = registry::update_student(data.store.as_ref(), &path.into_inner(), payload.into_inner())
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(student))
}

pub async fn delete_student(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    removed(registry::remove_student(data.store.as_ref(), &path.into_inner()).await?)
}

// ---------------- Classes -----------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/classes",
    responses((status = 200, description = "List classes", body = [Class]))
)]
pub async fn list_classes(_auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(collection::<Class>(data.store.as_ref()).get_all().await?))
}

pub async fn create_class(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewClass>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let new = payload.into_inner();
    let classes = collection::<Class>(data.store.as_ref());
    if classes.find(|c| c.class_name == new.class_name).await?.is_some() {
        return Err(ApiError::Conflict);
    }
    let class = classes
        .add(Class {
            id: new_id(),
            class_name: new.class_name,
            category: new.category,
            teacher_id: new.teacher_id,
            academic_year: new.academic_year,
        })
        .await?;
    Ok(HttpResponse::Created().json(class))
}

pub async fn update_class(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<NewClass>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let id = path.into_inner();
    let new = payload.into_inner();
    let classes = collection::<Class>(data.store.as_ref());
    if classes.find(|c| c.class_name == new.class_name && c.id != id).await?.is_some() {
        return Err(ApiError::Conflict);
    }
    let class = Class {
        id: id.clone(),
        class_name: new.class_name,
        category: new.category,
        teacher_id: new.teacher_id,
        academic_year: new.academic_year,
    };
    if !classes.update(&id, class.clone()).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(class))
}

pub async fn delete_class(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    removed(collection::<Class>(data.store.as_ref()).delete(&path.into_inner()).await?)
}

pub async fn class_roster(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let classes = collection::<Class>(store).get_all().await?;
    let id = path.into_inner();
    let class = classes.iter().find(|c| c.id == id).cloned().ok_or(ApiError::NotFound)?;
    let all = collection::<Student>(store).get_all().await?;
    let students = match profile_of(store, &auth).await? {
        Profile::Admin => all,
        Profile::Staff(staff) => visibility::students_visible_to(&staff, &classes, &all),
        Profile::Student(_) => return Err(ApiError::Forbidden),
    };
    let students = students
        .into_iter()
        .filter(|s| s.class_name == class.class_name && s.category == class.category)
        .collect();
    let export_file_name = format!("students_{}.pdf", class.class_name);
    Ok(HttpResponse::Ok().json(ClassRoster { class, students, export_file_name }))
}

// ---------------- Fees --------------------------------------------------

/// Balance defaults to the full bill and must lie within `0..=total_billed`.
fn opening_balance(new: &NewFeeRecord) -> Result<i64, ApiError> {
    if new.total_billed < 0 {
        return Err(ApiError::BadRequest("Total billed cannot be negative".into()));
    }
    let balance = new.balance.unwrap_or(new.total_billed);
    if !(0..=new.total_billed).contains(&balance) {
        return Err(ApiError::BadRequest("Balance must be between 0 and the total billed".into()));
    }
    Ok(balance)
}

pub async fn list_fees(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let fees = collection::<FeeRecord>(store).get_all().await?;
    let visible: Vec<_> = match profile_of(store, &auth).await? {
        Profile::Admin => fees,
        Profile::Student(me) => fees.into_iter().filter(|f| f.student_id == me.id).collect(),
        Profile::Staff(_) => return Err(ApiError::Forbidden),
    };
    Ok(HttpResponse::Ok().json(visible))
}

pub async fn create_fee(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewFeeRecord>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let new = payload.into_inner();
    let balance = opening_balance(&new)?;
    let fees = collection::<FeeRecord>(data.store.as_ref());
    if fees.find(|f| f.student_id == new.student_id).await?.is_some() {
        return Err(ApiError::Conflict);
    }
    let fee = fees
        .add(FeeRecord {
            id: new_id(),
            student_id: new.student_id,
            total_billed: new.total_billed,
            balance,
            updated_at: Utc::now(),
        })
        .await?;
    Ok(HttpResponse::Created().json(fee))
}

pub async fn update_fee(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<NewFeeRecord>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let id = path.into_inner();
    let new = payload.into_inner();
    let balance = opening_balance(&new)?;
    let fee = FeeRecord {
        id: id.clone(),
        student_id: new.student_id,
        total_billed: new.total_billed,
        balance,
        updated_at: Utc::now(),
    };
    if !collection::<FeeRecord>(data.store.as_ref()).update(&id, fee.clone()).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(fee))
}

pub async fn delete_fee(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    removed(collection::<FeeRecord>(data.store.as_ref()).delete(&path.into_inner()).await?)
}

pub async fn record_payment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<Payment>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let fee = registry::record_payment(data.store.as_ref(), &path.into_inner(), payload.amount)
        .await
        .map_err(|e| match e {
            FeeError::NonPositive => ApiError::BadRequest(e.to_string()),
            FeeError::Repo(inner) => inner.into(),
        })?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(fee))
}

// ---------------- Announcements -----------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/announcements",
    responses((status = 200, description = "Announcements addressed to the caller", body = [Announcement]))
)]
pub async fn list_announcements(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let profile = profile_of(store, &auth).await?;
    let all = collection::<Announcement>(store).get_all().await?;
    Ok(HttpResponse::Ok().json(visibility::announcements_for(&profile.viewer(), all)))
}

pub async fn create_announcement(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewAnnouncement>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let new = payload.into_inner();
    let announcement = collection::<Announcement>(data.store.as_ref())
        .add(Announcement {
            id: new_id(),
            title: new.title,
            content: new.content,
            target_audience: new.target_audience,
            priority: new.priority,
            is_active: new.is_active,
            created_by: auth.0.sub.clone(),
            created_at: Utc::now(),
        })
        .await?;
    Ok(HttpResponse::Created().json(announcement))
}

pub async fn update_announcement(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<NewAnnouncement>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let announcements = collection::<Announcement>(data.store.as_ref());
    let id = path.into_inner();
    let current = announcements.get(&id).await?.ok_or(ApiError::NotFound)?;
    let new = payload.into_inner();
    let next = Announcement {
        title: new.title,
        content: new.content,
        target_audience: new.target_audience,
        priority: new.priority,
        is_active: new.is_active,
        ..current
    };
    if !announcements.update(&id, next.clone()).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(next))
}

pub async fn delete_announcement(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    removed(collection::<Announcement>(data.store.as_ref()).delete(&path.into_inner()).await?)
}

// ---------------- Assignments -------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/assignments",
    responses((status = 200, description = "Assignments visible to the caller", body = [Assignment]))
)]
pub async fn list_assignments(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let profile = profile_of(store, &auth).await?;
    let classes = collection::<Class>(store).get_all().await?;
    let all = collection::<Assignment>(store).get_all().await?;
    Ok(HttpResponse::Ok().json(visibility::assignments_for(&profile.viewer(), &classes, all)))
}

/// Staff may only post work for classes they are associated with.
async fn ensure_can_post(store: &dyn Store, profile: &Profile, class_name: &str, category: Program) -> Result<(), ApiError> {
    match profile {
        Profile::Admin => Ok(()),
        Profile::Staff(staff) => {
            let classes = collection::<Class>(store).get_all().await?;
            let owns = visibility::classes_for_staff(staff, &classes)
                .iter()
                .any(|c| c.class_name == class_name && c.category == category);
            if owns { Ok(()) } else { Err(ApiError::Forbidden) }
        }
        Profile::Student(_) => Err(ApiError::Forbidden),
    }
}

fn validate_link(link: &Option<String>) -> Result<(), ApiError> {
    match link {
        Some(url) if !(url.starts_with("https://") || url.starts_with("http://")) => {
            Err(ApiError::BadRequest("Link must be an http(s) URL".into()))
        }
        _ => Ok(()),
    }
}

pub async fn create_assignment(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewAssignment>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let new = payload.into_inner();
    let profile = profile_of(store, &auth).await?;
    ensure_can_post(store, &profile, &new.class_name, new.category).await?;
    validate_link(&new.link_url)?;
    let assignment = collection::<Assignment>(store)
        .add(Assignment {
            id: new_id(),
            title: new.title,
            description: new.description,
            class_name: new.class_name,
            category: new.category,
            created_by: auth.0.sub.clone(),
            assignment_type: new.assignment_type,
            link_url: new.link_url,
            due_date: new.due_date,
            is_active: new.is_active,
            created_at: Utc::now(),
        })
        .await?;
    Ok(HttpResponse::Created().json(assignment))
}

pub async fn update_assignment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<NewAssignment>) -> Result<HttpResponse, ApiError> {
    let store = data.store.as_ref();
    let assignments = collection::<Assignment>(store);
    let id = path.into_inner();
    let current = assignments.get(&id).await?.ok_or(ApiError::NotFound)?;
    if !auth.is(Role::Admin) && current.created_by != auth.0.sub {
        return Err(ApiError::Forbidden);
    }
    let new = payload.into_inner();
    let profile = profile_of(store, &auth).await?;
    ensure_can_post(store, &profile, &new.class_name, new.category).await?;
    validate_link(&new.link_url)?;
    let next = Assignment {
        title: new.title,
        description: new.description,
        class_name: new.class_name,
        category: new.category,
        assignment_type: new.assignment_type,
        link_url: new.link_url,
        due_date: new.due_date,
        is_active: new.is_active,
        ..current
    };
    if !assignments.update(&id, next.clone()).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(next))
}

pub async fn delete_assignment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let assignments = collection::<Assignment>(data.store.as_ref());
    let id = path.into_inner();
    let Some(current) = assignments.get(&id).await? else { return Err(ApiError::NotFound) };
    if !auth.is(Role::Admin) && current.created_by != auth.0.sub {
        return Err(ApiError::Forbidden);
    }
    removed(assignments.delete(&id).await?)
}

// ---------------- Documents ---------------------------------------------

const DOCUMENT_SIZE_LIMIT: usize = 20 * 1024 * 1024; // 20 MB

const ALLOWED_MIME: &[&str] = &[
    "application/pdf", "image/png", "image/jpeg",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/msword",
];

#[utoipa::path(
    get,
    path = "/api/v1/documents",
    responses((status = 200, description = "Official documents", body = [OfficialDocument]))
)]
pub async fn list_documents(_auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(collection::<OfficialDocument>(data.store.as_ref()).get_all().await?))
}

async fn read_text(field: &mut actix_multipart::Field) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| {
        log::error!("multipart read error: {e}");
        ApiError::BadRequest("Malformed form data".into())
    })? {
        if buf.len() + chunk.len() > 16 * 1024 {
            return Err(ApiError::BadRequest("Form field too long".into()));
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf).map_err(|_| ApiError::BadRequest("Form field is not UTF-8".into()))
}

/// Multipart fields: `title`, optional `description`, and `file`.
pub async fn upload_document(auth: Auth, data: web::Data<AppState>, mut payload: Multipart) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let mut title = None;
    let mut description = None;
    let mut file: Option<(String, Vec<u8>, String)> = None;

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest("Malformed form data".into())
    })? {
        let name = field.content_disposition().and_then(|cd| cd.get_name()).unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = Some(read_text(&mut field).await?),
            "description" => description = Some(read_text(&mut field).await?),
            "file" => {
                let file_name = field.content_disposition().and_then(|cd| cd.get_filename()).unwrap_or("document").to_string();
                let mut bytes = Vec::new();
                let mut hasher = Sha256::new();
                while let Some(chunk) = field.try_next().await.map_err(|e| {
                    log::error!("stream read error: {e}");
                    ApiError::BadRequest("Malformed form data".into())
                })? {
                    if bytes.len() + chunk.len() > DOCUMENT_SIZE_LIMIT {
                        return Err(ApiError::BadRequest("Document exceeds 20 MB".into()));
                    }
                    hasher.update(&chunk);
                    bytes.extend_from_slice(&chunk);
                }
                file = Some((file_name, bytes, format!("{:x}", hasher.finalize())));
            }
            _ => continue,
        }
    }

    let title = title.filter(|t| !t.trim().is_empty()).ok_or_else(|| ApiError::BadRequest("Title is required".into()))?;
    let (file_name, bytes, hash) = file.ok_or_else(|| ApiError::BadRequest("File is required".into()))?;
    let mime = infer::get(&bytes).map(|t| t.mime_type().to_string()).unwrap_or_else(|| "application/octet-stream".into());
    if !ALLOWED_MIME.contains(&mime.as_str()) {
        return Ok(HttpResponse::UnsupportedMediaType().finish());
    }
    match data.documents.save(&hash, &bytes).await {
        Ok(()) | Err(DocumentStoreError::Duplicate) => {}
        Err(e) => {
            log::error!("document store save error: {e}");
            return Err(ApiError::Internal);
        }
    }
    let doc = collection::<OfficialDocument>(data.store.as_ref())
        .add(OfficialDocument {
            id: new_id(),
            title,
            description,
            file_hash: hash,
            file_name,
            mime,
            size: bytes.len(),
            download_count: 0,
            uploaded_by: auth.0.sub.clone(),
            created_at: Utc::now(),
        })
        .await?;
    Ok(HttpResponse::Created().json(doc))
}

pub async fn download_document(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let docs = collection::<OfficialDocument>(data.store.as_ref());
    let id = path.into_inner();
    let doc = docs.get(&id).await?.ok_or(ApiError::NotFound)?;
    let bytes = match data.documents.load(&doc.file_hash).await {
        Ok(b) => b,
        Err(DocumentStoreError::NotFound) => return Err(ApiError::NotFound),
        Err(e) => {
            log::error!("document store load error: {e}");
            return Err(ApiError::Internal);
        }
    };
    docs.update_with(&id, |d| d.download_count += 1).await?;
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", doc.mime.clone()))
        .insert_header(("Content-Disposition", format!("attachment; filename=\"{}\"", doc.file_name.replace('"', ""))))
        .body(bytes))
}

pub async fn delete_document(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Admin);
    let docs = collection::<OfficialDocument>(data.store.as_ref());
    let id = path.into_inner();
    let Some(doc) = docs.get(&id).await? else { return Err(ApiError::NotFound) };
    docs.delete(&id).await?;
    // keep the file while another record still references the same content
    if !docs.get_all().await?.iter().any(|d| d.file_hash == doc.file_hash) {
        if let Err(e) = data.documents.delete(&doc.file_hash).await {
            log::warn!("document file cleanup failed for {}: {e}", doc.file_hash);
        }
    }
    Ok(HttpResponse::NoContent().finish())
}
