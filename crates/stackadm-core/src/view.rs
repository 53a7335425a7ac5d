//! Which setup page to show for a given state.

use crate::state::SetupState;
use crate::step::{StepId, StepStatus};

/// The page the setup route renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupView {
    /// `generate_env` is pending: ask for the initial settings.
    InitialForm,
    /// A step failed and the sequence has stopped.
    Failed { step: StepId },
    /// A step is pending, requested or running.
    Progress { step: StepId, status: StepStatus },
    /// Every step is done.
    Complete,
}

impl SetupView {
    /// Map every combination of statuses to exactly one view.
    ///
    /// Steps are scanned in order and the first step that is not `done`
    /// decides the view.
    pub fn resolve(state: &SetupState) -> Self {
        for (step, status) in state.iter() {
            match (step, status) {
                (_, StepStatus::Done) => {}
                (StepId::GenerateEnv, StepStatus::Pending) => return Self::InitialForm,
                (_, StepStatus::Failed) => return Self::Failed { step },
                (_, status) => return Self::Progress { step, status },
            }
        }
        Self::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(statuses: [StepStatus; 4]) -> SetupState {
        let mut state = SetupState::initial();
        for (id, status) in StepId::ALL.into_iter().zip(statuses) {
            state.set(id, status);
        }
        state
    }

    use StepStatus::{Done, Failed, InProgress, Pending, Requested};

    #[test]
    fn fresh_install_shows_form() {
        assert_eq!(SetupView::resolve(&SetupState::initial()), SetupView::InitialForm);
    }

    #[test]
    fn running_step_shows_progress() {
        assert_eq!(
            SetupView::resolve(&state([Done, InProgress, Pending, Pending])),
            SetupView::Progress {
                step: StepId::InitCert,
                status: InProgress
            }
        );
        assert_eq!(
            SetupView::resolve(&state([Done, Done, Requested, Pending])),
            SetupView::Progress {
                step: StepId::InitKeycloak,
                status: Requested
            }
        );
    }

    #[test]
    fn failed_step_has_its_own_view() {
        assert_eq!(
            SetupView::resolve(&state([Failed, Pending, Pending, Pending])),
            SetupView::Failed {
                step: StepId::GenerateEnv
            }
        );
        assert_eq!(
            SetupView::resolve(&state([Done, Done, Done, Failed])),
            SetupView::Failed {
                step: StepId::DockerUp
            }
        );
    }

    #[test]
    fn pending_after_done_is_progress() {
        assert_eq!(
            SetupView::resolve(&state([Done, Pending, Pending, Pending])),
            SetupView::Progress {
                step: StepId::InitCert,
                status: Pending
            }
        );
    }

    #[test]
    fn all_done_is_complete() {
        assert_eq!(
            SetupView::resolve(&state([Done, Done, Done, Done])),
            SetupView::Complete
        );
    }
}
