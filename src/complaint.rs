//! Reports filed against other users. Append only.

use serde::Serialize;

use crate::error::{logged, SocialError, SocialResult};
use crate::logging;
use crate::storage::{ComplaintRow, Storage, UserRow};

/// Who is being reported, as shown on the report form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTarget {
    pub id: String,
    pub username: String,
    pub display_name: String,
}

fn full_name(user: &UserRow) -> String {
    format!("{} {}", user.first_name, user.last_name).trim().to_string()
}

/// The part of the reporter's email before the `@`, or `"unknown"`.
fn reporter_username(user: Option<&UserRow>) -> String {
    user.and_then(|u| u.email.as_deref())
        .and_then(|email| email.split('@').next())
        .filter(|local| !local.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// Look up the user about to be reported.
pub fn begin_report(storage: &Storage, reported_id: &str) -> SocialResult<ReportTarget> {
    let user = storage
        .get_user(reported_id)?
        .ok_or_else(|| SocialError::NotFound(format!("user {reported_id}")))?;
    Ok(ReportTarget {
        display_name: full_name(&user),
        id: user.id,
        username: user.username,
    })
}

pub fn submit_complaint(
    storage: &Storage,
    reporter_id: &str,
    reported_id: &str,
    reason: &str,
    description: &str,
    now: i64,
) -> SocialResult<ComplaintRow> {
    if reporter_id == reported_id {
        return Err(SocialError::Validation("cannot report yourself".to_string()));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(SocialError::Validation("choose a reason".to_string()));
    }
    let reported = storage
        .get_user(reported_id)?
        .ok_or_else(|| SocialError::NotFound(format!("user {reported_id}")))?;
    let reporter = storage.get_user(reporter_id)?;

    let mut row = ComplaintRow {
        id: 0,
        reporter_id: reporter_id.to_string(),
        reporter_name: reporter.as_ref().map(full_name).unwrap_or_default(),
        reporter_username: reporter_username(reporter.as_ref()),
        reported_id: reported.id.clone(),
        reported_name: full_name(&reported),
        reported_username: reported.username.clone(),
        reason: reason.to_string(),
        description: description.trim().to_string(),
        created_at: now,
    };
    row.id = logged("complaint: submit failed", storage.insert_complaint(&row))?;
    crate::slog!(
        "complaint: {} reported {} ({})",
        logging::user_id(reporter_id),
        logging::user_id(reported_id),
        row.reason
    );
    Ok(row)
}

pub fn list_complaints_against(storage: &Storage, reported_id: &str) -> SocialResult<Vec<ComplaintRow>> {
    Ok(storage.list_complaints_against(reported_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_from_email_local_part() {
        let user = UserRow {
            email: Some("zoe.k@mail.org".to_string()),
            ..Default::default()
        };
        assert_eq!(reporter_username(Some(&user)), "zoe.k");
        assert_eq!(reporter_username(Some(&UserRow::default())), "unknown");
        assert_eq!(reporter_username(None), "unknown");
    }
}
