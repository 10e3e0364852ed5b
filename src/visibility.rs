//! Role-scoped views over in-memory collections.

use std::collections::HashSet;

use crate::codes::program_of_admission;
use crate::models::*;

/// Classes a staff member is associated with, either as the class teacher
/// or through their `class_assigned` field.
pub fn classes_for_staff<'a>(staff: &Staff, classes: &'a [Class]) -> Vec<&'a Class> {
    classes
        .iter()
        .filter(|c| {
            c.teacher_id.as_deref() == Some(staff.id.as_str())
                || staff.class_assigned.as_deref() == Some(c.class_name.as_str())
        })
        .collect()
}

/// Students a staff member may see. A student qualifies when its class is
/// one of the staff member's classes and its program matches that class
/// (and its admission-number prefix, when that decodes). Students in classes
/// that do not exist are skipped.
pub fn students_visible_to(staff: &Staff, classes: &[Class], students: &[Student]) -> Vec<Student> {
    if staff.status == Status::Inactive {
        return Vec::new();
    }
    let owned: HashSet<(&str, Program)> = classes_for_staff(staff, classes)
        .into_iter()
        .map(|c| (c.class_name.as_str(), c.category))
        .collect();

    students
        .iter()
        .filter(|s| {
            owned.contains(&(s.class_name.as_str(), s.category))
                && program_of_admission(&s.admission_number).map_or(true, |p| p == s.category)
        })
        .cloned()
        .collect()
}

/// Who is looking at a list; drives audience and assignment filtering.
#[derive(Debug, Clone, Copy)]
pub enum Viewer<'a> {
    Admin,
    Staff(&'a Staff),
    Student(&'a Student),
}

impl Audience {
    pub fn includes(self, viewer: &Viewer<'_>) -> bool {
        match (self, viewer) {
            (_, Viewer::Admin) => true,
            (Audience::All, _) => true,
            (Audience::Staff, Viewer::Staff(_)) => true,
            (Audience::TeachingStaff, Viewer::Staff(s)) => s.category == StaffCategory::Teaching,
            (Audience::NonTeachingStaff, Viewer::Staff(s)) => s.category == StaffCategory::NonTeaching,
            (Audience::Students, Viewer::Student(_)) => true,
            (Audience::TahfidhStudents, Viewer::Student(s)) => s.category == Program::Tahfidh,
            (Audience::IntegratedStudents, Viewer::Student(s)) => s.category == Program::Integrated,
            (Audience::TalimStudents, Viewer::Student(s)) => s.category == Program::Talim,
            _ => false,
        }
    }
}

/// Active announcements for `viewer`, most urgent first, then newest.
/// Admins also see inactive ones.
pub fn announcements_for(viewer: &Viewer<'_>, all: Vec<Announcement>) -> Vec<Announcement> {
    let is_admin = matches!(viewer, Viewer::Admin);
    let mut v: Vec<_> = all
        .into_iter()
        .filter(|a| (a.is_active || is_admin) && a.target_audience.includes(viewer))
        .collect();
    v.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.created_at.cmp(&a.created_at)));
    v
}

/// Assignments for `viewer`. Students get active work for their class and
/// program; staff get work for their classes plus anything they created.
pub fn assignments_for(viewer: &Viewer<'_>, classes: &[Class], all: Vec<Assignment>) -> Vec<Assignment> {
    match viewer {
        Viewer::Admin => all,
        Viewer::Student(s) => all
            .into_iter()
            .filter(|a| a.is_active && a.class_name == s.class_name && a.category == s.category)
            .collect(),
        Viewer::Staff(staff) => {
            let mine = classes_for_staff(staff, classes);
            all.into_iter()
                .filter(|a| {
                    a.created_by == staff.user_id
                        || mine.iter().any(|c| c.class_name == a.class_name && c.category == a.category)
                })
                .collect()
        }
    }
}
