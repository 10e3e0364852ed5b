//! Multi-collection flows: registering profiles with their login accounts,
//! removing them again, and fee payments.

use chrono::Utc;

use crate::auth::{check_new_password, hash_password, PasswordError};
use crate::codes::{self, CodeKind};
use crate::models::*;
use crate::repo::{collection, RepoError, Store};

async fn create_user(store: &dyn Store, username: &str, password: &str, role: Role) -> Result<User, PasswordError> {
    let users = collection::<User>(store);
    if users.find(|u| u.username == username).await?.is_some() {
        return Err(RepoError::Conflict.into());
    }
    let user = User {
        id: new_id(),
        username: username.to_string(),
        password_hash: hash_password(password)?,
        role,
        created_at: Utc::now(),
    };
    Ok(users.add(user).await?)
}

/// Removes a login account whose profile could not be written and hands back the original error.
async fn discard_user(store: &dyn Store, user: &User, cause: RepoError) -> RepoError {
    tracing::warn!(username = %user.username, "profile write failed, removing account: {cause}");
    if let Err(e) = collection::<User>(store).delete(&user.id).await {
        tracing::error!(username = %user.username, "failed to remove orphaned account: {e}");
    }
    cause
}

/// Creates the staff profile and its login account; the generated staff ID is the username.
pub async fn register_staff(store: &dyn Store, new: NewStaff) -> Result<(User, Staff), PasswordError> {
    check_new_password(&new.password, &new.password)?;
    let staff_id = codes::generate(store, CodeKind::Staff(new.category)).await?;
    let user = create_user(store, &staff_id, &new.password, Role::Staff).await?;
    let staff = Staff {
        id: new_id(),
        user_id: user.id.clone(),
        staff_id,
        first_name: new.first_name,
        last_name: new.last_name,
        email: new.email,
        phone: new.phone,
        category: new.category,
        class_assigned: new.class_assigned,
        status: Status::Active,
    };
    let staff = match collection::<Staff>(store).add(staff).await {
        Ok(staff) => staff,
        Err(e) => return Err(discard_user(store, &user, e).await.into()),
    };
    tracing::info!(staff_id = %staff.staff_id, "registered staff");
    Ok((user, staff))
}

/// Creates the student profile and its login account; the admission number is the username.
pub async fn register_student(store: &dyn Store, new: NewStudent) -> Result<(User, Student), PasswordError> {
    check_new_password(&new.password, &new.password)?;
    let admission_number = codes::generate(store, CodeKind::Admission(new.category)).await?;
    let user = create_user(store, &admission_number, &new.password, Role::Student).await?;
    let student = Student {
        id: new_id(),
        user_id: user.id.clone(),
        admission_number,
        first_name: new.first_name,
        last_name: new.last_name,
        class_name: new.class_name,
        category: new.category,
        parent_name: new.parent_name,
        parent_phone: new.parent_phone,
        parent_email: new.parent_email,
        status: Status::Active,
    };
    let student = match collection::<Student>(store).add(student).await {
        Ok(student) => student,
        Err(e) => return Err(discard_user(store, &user, e).await.into()),
    };
    tracing::info!(admission_number = %student.admission_number, "registered student");
    Ok((user, student))
}

/// Replaces the editable staff fields; staff ID and account link are kept.
pub async fn update_staff(store: &dyn Store, id: &str, d: StaffDetails) -> Result<Option<Staff>, RepoError> {
    let staff = collection::<Staff>(store);
    let Some(current) = staff.get(id).await? else { return Ok(None) };
    let next = Staff {
        first_name: d.first_name,
        last_name: d.last_name,
        email: d.email,
        phone: d.phone,
        category: d.category,
        class_assigned: d.class_assigned,
        status: d.status,
        ..current
    };
    Ok(staff.update(id, next.clone()).await?.then_some(next))
}

pub async fn update_student(store: &dyn Store, id: &str, d: StudentDetails) -> Result<Option<Student>, RepoError> {
    let students = collection::<Student>(store);
    let Some(current) = students.get(id).await? else { return Ok(None) };
    let next = Student {
        first_name: d.first_name,
        last_name: d.last_name,
        class_name: d.class_name,
        category: d.category,
        parent_name: d.parent_name,
        parent_phone: d.parent_phone,
        parent_email: d.parent_email,
        status: d.status,
        ..current
    };
    Ok(students.update(id, next.clone()).await?.then_some(next))
}

/// Deletes the staff profile and its login account. False if nothing matched.
pub async fn remove_staff(store: &dyn Store, id: &str) -> Result<bool, RepoError> {
    let staff = collection::<Staff>(store);
    let Some(profile) = staff.get(id).await? else { return Ok(false) };
    let removed = staff.delete(id).await?;
    collection::<User>(store).delete(&profile.user_id).await?;
    Ok(removed)
}

/// Deletes the student profile, its login account and its fee records.
pub async fn remove_student(store: &dyn Store, id: &str) -> Result<bool, RepoError> {
    let students = collection::<Student>(store);
    let Some(profile) = students.get(id).await? else { return Ok(false) };
    let removed = students.delete(id).await?;
    collection::<User>(store).delete(&profile.user_id).await?;
    let fees = collection::<FeeRecord>(store);
    for fee in fees.get_all().await?.into_iter().filter(|f| f.student_id == id) {
        fees.delete(&fee.id).await?;
    }
    Ok(removed)
}

#[derive(thiserror::Error, Debug)]
pub enum FeeError {
    #[error("Payment amount must be positive")]
    NonPositive,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Applies a payment to the student's fee record. The balance floors at zero.
pub async fn record_payment(store: &dyn Store, student_id: &str, amount: i64) -> Result<Option<FeeRecord>, FeeError> {
    if amount <= 0 {
        return Err(FeeError::NonPositive);
    }
    let fees = collection::<FeeRecord>(store);
    let Some(fee) = fees.find(|f| f.student_id == student_id).await? else { return Ok(None) };
    // applied to the stored balance inside one mutation
    let updated = fees
        .update_with(&fee.id, move |f| {
            f.balance = (f.balance - amount).max(0);
            f.updated_at = Utc::now();
        })
        .await?;
    Ok(updated)
}
