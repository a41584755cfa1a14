use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use thiserror::Error;

use crate::schemas::Bill;

#[derive(Debug, Error, PartialEq)]
pub enum BillError {
    #[error("invalid due date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid due time `{0}`, expected HH:mm")]
    InvalidTime(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BillStatus {
    Paid,
    Overdue,
    DueToday,
    Upcoming,
}

/// The local instant a bill falls due.
///
/// `dueDate` may be a plain date or a full ISO-8601 date-time; only the
/// calendar date is used. An empty `dueTime` means midnight.
pub fn due_at(bill: &Bill) -> Result<NaiveDateTime, BillError> {
    let date = bill
        .due_date
        .get(..10)
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .ok_or_else(|| BillError::InvalidDate(bill.due_date.clone()))?;

    let time = match bill.due_time.trim() {
        "" => NaiveTime::MIN,
        time => NaiveTime::parse_from_str(time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
            .map_err(|_| BillError::InvalidTime(bill.due_time.clone()))?,
    };

    Ok(date.and_time(time))
}

pub fn status(bill: &Bill, now: NaiveDateTime) -> Result<BillStatus, BillError> {
    if bill.is_paid {
        return Ok(BillStatus::Paid);
    }
    let due = due_at(bill)?;
    Ok(if due < now {
        BillStatus::Overdue
    } else if due.date() == now.date() {
        BillStatus::DueToday
    } else {
        BillStatus::Upcoming
    })
}

/// Validates the date fields of a bill before it is stored.
pub fn validate(bill: &Bill) -> Result<(), BillError> {
    due_at(bill).map(|_| ())
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingBill {
    #[serde(flatten)]
    pub bill: Bill,
    pub due_at: NaiveDateTime,
    pub status: BillStatus,
}

/// Unpaid bills due within `days` of `now`, overdue ones included, soonest first.
pub fn upcoming(bills: &[Bill], now: NaiveDateTime, days: i64) -> Vec<UpcomingBill> {
    let horizon = Duration::try_days(days)
        .and_then(|span| now.checked_add_signed(span))
        .unwrap_or(NaiveDateTime::MAX);
    let mut upcoming = bills
        .iter()
        .filter(|bill| !bill.is_paid)
        .filter_map(|bill| {
            let due = due_at(bill).ok()?;
            let status = status(bill, now).ok()?;
            (due <= horizon).then(|| UpcomingBill {
                bill: bill.clone(),
                due_at: due,
                status,
            })
        })
        .collect::<Vec<_>>();
    upcoming.sort_by_key(|item| item.due_at);
    upcoming
}

#[cfg(test)]
pub(crate) fn bill(id: &str, due_date: &str, due_time: &str) -> Bill {
    Bill {
        id: id.into(),
        user_id: "alice".into(),
        name: format!("bill {id}"),
        amount: 42.0,
        due_date: due_date.into(),
        due_time: due_time.into(),
        is_paid: false,
    }
}
