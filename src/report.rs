//! Dashboard totals and per-employee compliance.
//!
//! A task counts as completed once it is `Closed`; the compliance rate is the
//! rounded percentage of completed tasks among those a user is a member of.

use serde::Serialize;

use crate::fields::Status;
use crate::task::Task;
use crate::user::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: Status,
    pub count: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    /// Everything not yet closed.
    pub active: usize,
    pub overdue: usize,
    pub completed: usize,
    pub compliance_rate: u32,
    pub by_status: Vec<StatusCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeReport {
    pub user_id: String,
    pub name: String,
    pub total: usize,
    pub completed: usize,
    pub overdue: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub compliance_rate: u32,
}

fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        0
    } else {
        ((part as f64 / total as f64) * 100.0).round() as u32
    }
}

fn count(tasks: &[&Task], status: Status) -> usize {
    tasks.iter().filter(|t| t.status == status).count()
}

pub fn dashboard(tasks: &[Task]) -> DashboardStats {
    let all: Vec<&Task> = tasks.iter().collect();
    let total = all.len();
    let completed = count(&all, Status::Closed);
    DashboardStats {
        total,
        active: total - completed,
        overdue: count(&all, Status::Overdue),
        completed,
        compliance_rate: percent(completed, total),
        by_status: Status::ALL
            .iter()
            .map(|&status| {
                let n = count(&all, status);
                StatusCount {
                    status,
                    count: n,
                    percentage: percent(n, total),
                }
            })
            .collect(),
    }
}

/// One row per user, best compliance first. Ties keep the input order.
pub fn employee_reports(tasks: &[Task], users: &[User]) -> Vec<EmployeeReport> {
    let mut rows: Vec<EmployeeReport> = users
        .iter()
        .map(|user| {
            let mine: Vec<&Task> = tasks.iter().filter(|t| t.is_member(&user.id)).collect();
            let completed = count(&mine, Status::Closed);
            EmployeeReport {
                user_id: user.id.clone(),
                name: user.name.clone(),
                total: mine.len(),
                completed,
                overdue: count(&mine, Status::Overdue),
                in_progress: count(&mine, Status::InProgress),
                pending: count(&mine, Status::Pending),
                compliance_rate: percent(completed, mine.len()),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.compliance_rate.cmp(&a.compliance_rate));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::fixtures::task;
    use crate::user::fixtures::{admin, employee};

    fn tasks() -> Vec<Task> {
        let mut shared = task("4", Status::Closed, "e2");
        shared.participants.push("e1".into());
        vec![
            task("1", Status::Pending, "e1"),
            task("2", Status::Overdue, "e1"),
            task("3", Status::Closed, "e2"),
            shared,
        ]
    }

    #[test]
    fn dashboard_totals() {
        let stats = dashboard(&tasks());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.compliance_rate, 50);
        let closed = stats.by_status.iter().find(|s| s.status == Status::Closed).unwrap();
        assert_eq!((closed.count, closed.percentage), (2, 50));
    }

    #[test]
    fn empty_board_is_zero_not_nan() {
        let stats = dashboard(&[]);
        assert_eq!(stats.compliance_rate, 0);
        assert!(stats.by_status.iter().all(|s| s.percentage == 0));
    }

    #[test]
    fn employees_sorted_by_compliance() {
        let rows = employee_reports(&tasks(), &[employee("e1"), employee("e2"), admin("a1")]);
        let order: Vec<&str> = rows.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(order, vec!["e2", "e1", "a1"]);
        assert_eq!(rows[0].compliance_rate, 100);
        assert_eq!(rows[1].compliance_rate, 33);
        assert_eq!(rows[1].pending, 1);
        assert_eq!(rows[2].total, 0);
    }
}
