//! Sequential, category-prefixed identifiers (admission numbers and staff IDs).

use crate::models::{Program, StaffCategory};
use crate::repo::{RepoResult, Store};

/// Which sequence a code is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Admission(Program),
    Staff(StaffCategory),
}

impl CodeKind {
    pub fn prefix(self) -> &'static str {
        match self {
            CodeKind::Admission(Program::Tahfidh) => "TAH",
            CodeKind::Admission(Program::Integrated) => "INT",
            CodeKind::Admission(Program::Talim) => "TAL",
            CodeKind::Staff(StaffCategory::Teaching) => "TS",
            CodeKind::Staff(StaffCategory::NonTeaching) => "NTS",
        }
    }

    /// Name of the counter row backing this sequence.
    pub fn counter_type(self) -> &'static str {
        match self {
            CodeKind::Admission(Program::Tahfidh) => "admission_tahfidh",
            CodeKind::Admission(Program::Integrated) => "admission_integrated",
            CodeKind::Admission(Program::Talim) => "admission_talim",
            CodeKind::Staff(StaffCategory::Teaching) => "staff_teaching",
            CodeKind::Staff(StaffCategory::NonTeaching) => "staff_non_teaching",
        }
    }
}

pub fn format_code(kind: CodeKind, value: i64) -> String {
    format!("{}/{:04}", kind.prefix(), value)
}

/// Draws the next code for `kind`. The increment and read are one store operation.
pub async fn generate(store: &dyn Store, kind: CodeKind) -> RepoResult<String> {
    let value = store.increment_counter(kind.counter_type()).await?;
    tracing::debug!(counter = kind.counter_type(), value, "generated code");
    Ok(format_code(kind, value))
}

/// Sets the counter so the next generated code has suffix `value + 1`.
pub async fn set_counter(store: &dyn Store, kind: CodeKind, value: i64) -> RepoResult<()> {
    store.set_counter(kind.counter_type(), value).await
}

/// Program encoded in an admission number's prefix, if any.
pub fn program_of_admission(code: &str) -> Option<Program> {
    let prefix = code.split('/').next()?;
    Program::ALL
        .into_iter()
        .find(|p| CodeKind::Admission(*p).prefix().eq_ignore_ascii_case(prefix))
}
