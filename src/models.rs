use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Record ids are opaque strings (uuid v4 for generated records)
pub type Id = String;

pub fn new_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Student,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

impl Default for Status {
    fn default() -> Self { Status::Active }
}

/// Academic program a student, class or assignment belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Program {
    Tahfidh,
    Integrated,
    Talim,
}

impl Program {
    pub const ALL: [Program; 3] = [Program::Tahfidh, Program::Integrated, Program::Talim];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StaffCategory {
    Teaching,
    NonTeaching,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    All,
    Staff,
    Students,
    TeachingStaff,
    NonTeachingStaff,
    TahfidhStudents,
    IntegratedStudents,
    TalimStudents,
}

// Declaration order is the sort order (low < urgent)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self { Priority::Normal }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentType {
    Homework,
    Classwork,
    Project,
    Revision,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct User {
    pub id: Id,
    pub username: String,
    #[serde(default)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user; the hash never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub id: Id,
    pub username: String,
    pub role: Role,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self { id: u.id.clone(), username: u.username.clone(), role: u.role }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Staff {
    pub id: Id,
    pub user_id: Id,
    pub staff_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub category: StaffCategory,
    pub class_assigned: Option<String>,
    #[serde(default)]
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewStaff {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub category: StaffCategory,
    pub class_assigned: Option<String>,
    pub password: String,
}

/// Replacement body for an existing staff profile; codes and links are kept.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StaffDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub category: StaffCategory,
    pub class_assigned: Option<String>,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Student {
    pub id: Id,
    pub user_id: Id,
    pub admission_number: String,
    pub first_name: String,
    pub last_name: String,
    pub class_name: String,
    pub category: Program,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub parent_email: Option<String>,
    #[serde(default)]
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub class_name: String,
    pub category: Program,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub parent_email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudentDetails {
    pub first_name: String,
    pub last_name: String,
    pub class_name: String,
    pub category: Program,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
    pub parent_email: Option<String>,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Class {
    pub id: Id,
    pub class_name: String,
    pub category: Program,
    pub teacher_id: Option<Id>,
    pub academic_year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewClass {
    pub class_name: String,
    pub category: Program,
    pub teacher_id: Option<Id>,
    pub academic_year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Announcement {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub target_audience: Audience,
    #[serde(default)]
    pub priority: Priority,
    pub is_active: bool,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewAnnouncement {
    pub title: String,
    pub content: String,
    pub target_audience: Audience,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Assignment {
    pub id: Id,
    pub title: String,
    pub description: Option<String>,
    pub class_name: String,
    pub category: Program,
    pub created_by: Id,
    pub assignment_type: AssignmentType,
    pub link_url: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewAssignment {
    pub title: String,
    pub description: Option<String>,
    pub class_name: String,
    pub category: Program,
    pub assignment_type: AssignmentType,
    pub link_url: Option<String>,
    pub due_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Amounts are whole currency units.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct FeeRecord {
    pub id: Id,
    pub student_id: Id,
    pub total_billed: i64,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewFeeRecord {
    pub student_id: Id,
    pub total_billed: i64,
    pub balance: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct OfficialDocument {
    pub id: Id,
    pub title: String,
    pub description: Option<String>,
    pub file_hash: String,
    pub file_name: String,
    pub mime: String,
    pub size: usize,
    pub download_count: u64,
    pub uploaded_by: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClassRoster {
    pub class: Class,
    pub students: Vec<Student>,
    pub export_file_name: String,
}

fn default_true() -> bool { true }
