use crate::models::{
    Announcement, Assignment, AssignmentType, Audience, Class, ClassRoster, FeeRecord, NewAnnouncement,
    NewAssignment, NewClass, NewFeeRecord, NewStaff, NewStudent, OfficialDocument, Payment, Priority, Program,
    Role, Staff, StaffCategory, StaffDetails, Status, Student, StudentDetails, UserView,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::login,
        crate::routes::create_staff,
        crate::routes::list_students,
        crate::routes::create_student,
        crate::routes::list_classes,
        crate::routes::list_announcements,
        crate::routes::list_assignments,
        crate::routes::list_documents,
    ),
    components(schemas(
        Role, Status, Program, StaffCategory, Audience, Priority, AssignmentType,
        UserView, Staff, NewStaff, StaffDetails, Student, NewStudent, StudentDetails,
        Class, NewClass, ClassRoster, Announcement, NewAnnouncement, Assignment, NewAssignment,
        FeeRecord, NewFeeRecord, Payment, OfficialDocument,
        crate::routes::LoginRequest, crate::routes::LoginResponse,
        crate::routes::ChangePasswordRequest, crate::routes::ProfilePicture
    )),
    tags(
        (name = "auth", description = "Login and session management"),
        (name = "people", description = "Staff and student records"),
        (name = "academics", description = "Classes, announcements and assignments"),
    )
)]
pub struct ApiDoc;
