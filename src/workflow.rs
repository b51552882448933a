//! Task status transitions.
//!
//! [`plan_transition`] decides, without any I/O, whether an actor may move a
//! task one step along [`Status::ORDER`] and where it would land. The session
//! layer only calls the backend once a plan exists.

use std::fmt;

use crate::error::WorkflowError;
use crate::fields::Status;
use crate::task::Task;
use crate::user::User;

/// Direction of a single pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Advance,
    Regress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Advance => f.write_str("advance"),
            Direction::Regress => f.write_str("regress"),
        }
    }
}

/// An allowed move, ready to be sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub task_id: String,
    pub from: Status,
    pub to: Status,
    pub direction: Direction,
}

impl Transition {
    /// The comment a non-admin's move leaves on the task.
    pub fn auto_comment(&self) -> String {
        match self.direction {
            Direction::Advance => format!("Advanced status to {}", self.to),
            Direction::Regress => format!("Moved status back to {}", self.to),
        }
    }

    /// Forward moves landing on DONE stamp the close time for the record.
    pub fn stamps_close_time(&self) -> bool {
        self.direction == Direction::Advance && self.to == Status::Done
    }
}

/// Decide whether `actor` may move `task` one step in `direction`.
pub fn plan_transition(task: &Task, actor: &User, direction: Direction) -> Result<Transition, WorkflowError> {
    let from = task.status;
    let no_step = || WorkflowError::NoTransition { status: from, direction };

    if from == Status::Closed {
        return Err(no_step());
    }
    let to = match direction {
        Direction::Advance => from.next(),
        Direction::Regress => from.previous(),
    }
    .ok_or_else(no_step)?;

    if !actor.is_admin() {
        if !task.is_member(&actor.id) {
            return Err(WorkflowError::NotMember {
                user: actor.id.clone(),
                task: task.id.clone(),
            });
        }
        // Leaving DONE, either way, is an administrator decision.
        if from == Status::Done {
            return Err(WorkflowError::AdminOnly(Status::Done));
        }
    }

    Ok(Transition {
        task_id: task.id.clone(),
        from,
        to,
        direction,
    })
}

/// Which moves the UI should offer for this task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Moves {
    pub advance: Option<Status>,
    pub regress: Option<Status>,
}

pub fn available_moves(task: &Task, actor: &User) -> Moves {
    Moves {
        advance: plan_transition(task, actor, Direction::Advance).ok().map(|t| t.to),
        regress: plan_transition(task, actor, Direction::Regress).ok().map(|t| t.to),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::task::fixtures::task;
    use crate::user::fixtures::{admin, employee};

    #[rstest]
    #[case(Status::Pending, Status::InProgress)]
    #[case(Status::InProgress, Status::Done)]
    #[case(Status::Done, Status::Closed)]
    fn admin_advances_one_step(#[case] from: Status, #[case] to: Status) {
        let plan = plan_transition(&task("t", from, "e1"), &admin("a"), Direction::Advance).unwrap();
        assert_eq!((plan.from, plan.to), (from, to));
    }

    #[rstest]
    #[case(Status::InProgress, Status::Pending)]
    #[case(Status::Done, Status::InProgress)]
    fn admin_regresses_one_step(#[case] from: Status, #[case] to: Status) {
        let plan = plan_transition(&task("t", from, "e1"), &admin("a"), Direction::Regress).unwrap();
        assert_eq!(plan.to, to);
    }

    #[rstest]
    fn closed_never_moves(#[values(Direction::Advance, Direction::Regress)] direction: Direction) {
        let t = task("t", Status::Closed, "e1");
        for actor in [admin("a"), employee("e1")] {
            assert!(matches!(
                plan_transition(&t, &actor, direction),
                Err(WorkflowError::NoTransition { .. })
            ));
        }
    }

    #[test]
    fn overdue_has_no_manual_moves() {
        let moves = available_moves(&task("t", Status::Overdue, "e1"), &admin("a"));
        assert_eq!(moves, Moves::default());
    }

    #[test]
    fn member_cannot_leave_done() {
        let t = task("t", Status::Done, "e1");
        assert_eq!(
            plan_transition(&t, &employee("e1"), Direction::Advance),
            Err(WorkflowError::AdminOnly(Status::Done))
        );
        assert_eq!(available_moves(&t, &employee("e1")), Moves::default());
    }

    #[test]
    fn strangers_are_refused_both_ways() {
        let t = task("t", Status::InProgress, "e1");
        for direction in [Direction::Advance, Direction::Regress] {
            assert!(matches!(
                plan_transition(&t, &employee("e9"), direction),
                Err(WorkflowError::NotMember { .. })
            ));
        }
    }

    #[test]
    fn participants_move_like_the_responsible() {
        let mut t = task("t", Status::InProgress, "e1");
        t.participants.push("e2".into());
        let moves = available_moves(&t, &employee("e2"));
        assert_eq!(moves.advance, Some(Status::Done));
        assert_eq!(moves.regress, Some(Status::Pending));
    }

    #[test]
    fn auto_comment_wording() {
        let plan = plan_transition(&task("t", Status::Pending, "e1"), &employee("e1"), Direction::Advance).unwrap();
        assert_eq!(plan.auto_comment(), "Advanced status to IN_PROGRESS");
        assert!(!plan.stamps_close_time());
    }
}
