use chrono::{Datelike, Utc};

use crate::auth::{hash_password, PasswordError};
use crate::config::Settings;
use crate::models::*;
use crate::registry::{register_staff, register_student};
use crate::repo::{collection, Store};

/// First-run population. Does nothing once any user exists.
/// Returns whether anything was written.
pub async fn seed_defaults(store: &dyn Store, settings: &Settings) -> Result<bool, PasswordError> {
    let users = collection::<User>(store);
    if !users.get_all().await?.is_empty() {
        return Ok(false);
    }
    let admin = users
        .add(User {
            id: new_id(),
            username: settings.bootstrap_admin_username.clone(),
            password_hash: hash_password(&settings.bootstrap_admin_password)?,
            role: Role::Admin,
            created_at: Utc::now(),
        })
        .await?;
    tracing::info!(username = %admin.username, "created bootstrap admin");

    if settings.seed_demo_data {
        seed_demo(store, &admin).await?;
    }
    Ok(true)
}

async fn seed_demo(store: &dyn Store, admin: &User) -> Result<(), PasswordError> {
    let year = Utc::now().year();
    let academic_year = format!("{year}/{}", year + 1);

    let (_, teacher) = register_staff(
        store,
        NewStaff {
            first_name: "Fatuma".into(),
            last_name: "Hassan".into(),
            email: Some("fatuma.hassan@example.org".into()),
            phone: None,
            category: StaffCategory::Teaching,
            class_assigned: Some("Grade 1".into()),
            password: "changeme".into(),
        },
    )
    .await?;

    let classes = collection::<Class>(store);
    for (name, category, teacher_id) in [
        ("Grade 1", Program::Integrated, Some(teacher.id.clone())),
        ("Hifdh A", Program::Tahfidh, None),
        ("Ta'lim 1", Program::Talim, None),
    ] {
        classes
            .add(Class {
                id: new_id(),
                class_name: name.into(),
                category,
                teacher_id,
                academic_year: academic_year.clone(),
            })
            .await?;
    }

    let fees = collection::<FeeRecord>(store);
    for (first, last, class_name, category) in [
        ("Yusuf", "Ali", "Grade 1", Program::Integrated),
        ("Maryam", "Omar", "Grade 1", Program::Integrated),
        ("Ibrahim", "Said", "Hifdh A", Program::Tahfidh),
    ] {
        let (_, student) = register_student(
            store,
            NewStudent {
                first_name: first.into(),
                last_name: last.into(),
                class_name: class_name.into(),
                category,
                parent_name: None,
                parent_phone: None,
                parent_email: None,
                password: "changeme".into(),
            },
        )
        .await?;
        fees.add(FeeRecord {
            id: new_id(),
            student_id: student.id,
            total_billed: 15_000,
            balance: 15_000,
            updated_at: Utc::now(),
        })
        .await?;
    }

    collection::<Announcement>(store)
        .add(Announcement {
            id: new_id(),
            title: "Welcome to the new term".into(),
            content: "Classes resume on Monday. Please check your portal for timetables.".into(),
            target_audience: Audience::All,
            priority: Priority::High,
            is_active: true,
            created_by: admin.id.clone(),
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!("seeded demo data");
    Ok(())
}
