use thiserror::Error;

/// Phases of a voting round.
///
/// The replicated `reveal` flag is the authoritative state; the protocol is
/// rebuilt from it before every decision so all clients run the same rules
/// against the same replicated fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotePhase {
    /// Estimates are hidden and may still change.
    Collecting,
    /// Estimates are visible and frozen until a new vote starts.
    Revealed,
}

impl VotePhase {
    /// Phase implied by the replicated `reveal` flag.
    pub fn from_reveal(reveal: bool) -> Self {
        if reveal {
            VotePhase::Revealed
        } else {
            VotePhase::Collecting
        }
    }
}

/// Events that can be applied to a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteEvent {
    /// A participant sets or changes their own estimate.
    SelectEstimation,
    /// Estimates become visible to everyone.
    Reveal,
    /// All estimates are cleared and hidden again.
    StartNewVote,
    /// The shared countdown reached zero. Carries whether every active
    /// participant had voted at the moment the level was observed.
    TimerExpired {
        /// True when no active participant is missing a vote.
        all_voted: bool,
    },
}

/// Error returned when an event cannot be applied in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the protocol was in.
    pub from: VotePhase,
    /// Event that was rejected.
    pub event: VoteEvent,
}

/// The voting protocol: a two-phase state machine over a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingProtocol {
    phase: VotePhase,
}

impl VotingProtocol {
    /// Rebuild the protocol from the replicated `reveal` flag.
    pub fn from_reveal(reveal: bool) -> Self {
        Self {
            phase: VotePhase::from_reveal(reveal),
        }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> VotePhase {
        self.phase
    }

    /// Apply an event, returning the next phase.
    pub fn apply(&mut self, event: VoteEvent) -> Result<VotePhase, InvalidTransition> {
        self.phase = self.compute_transition(event)?;
        Ok(self.phase)
    }

    /// Single source of truth for the legal transitions.
    fn compute_transition(&self, event: VoteEvent) -> Result<VotePhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (VotePhase::Collecting, VoteEvent::SelectEstimation) => VotePhase::Collecting,
            (VotePhase::Collecting, VoteEvent::Reveal) => VotePhase::Revealed,
            // Expiry with a full ballot auto-reveals; with votes missing
            // the round stays open and the UI shows a votes-needed notice.
            (VotePhase::Collecting, VoteEvent::TimerExpired { all_voted: true }) => {
                VotePhase::Revealed
            }
            (VotePhase::Collecting, VoteEvent::TimerExpired { all_voted: false }) => {
                VotePhase::Collecting
            }
            (VotePhase::Collecting, VoteEvent::StartNewVote) => VotePhase::Collecting,
            (VotePhase::Revealed, VoteEvent::SelectEstimation) => {
                return Err(InvalidTransition {
                    from: self.phase,
                    event,
                });
            }
            // Reveal is a level, so repeating it is harmless.
            (VotePhase::Revealed, VoteEvent::Reveal) => VotePhase::Revealed,
            (VotePhase::Revealed, VoteEvent::StartNewVote) => VotePhase::Collecting,
            // A countdown outliving the reveal has nothing left to do.
            (VotePhase::Revealed, VoteEvent::TimerExpired { .. }) => VotePhase::Revealed,
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(protocol: &mut VotingProtocol, event: VoteEvent) -> VotePhase {
        protocol.apply(event).unwrap()
    }

    #[test]
    fn collecting_accepts_repeated_estimation_changes() {
        let mut protocol = VotingProtocol::from_reveal(false);
        assert_eq!(
            apply(&mut protocol, VoteEvent::SelectEstimation),
            VotePhase::Collecting
        );
        assert_eq!(
            apply(&mut protocol, VoteEvent::SelectEstimation),
            VotePhase::Collecting
        );
    }

    #[test]
    fn reveal_freezes_estimations_until_new_vote() {
        let mut protocol = VotingProtocol::from_reveal(false);
        apply(&mut protocol, VoteEvent::Reveal);

        let err = protocol.apply(VoteEvent::SelectEstimation).unwrap_err();
        assert_eq!(err.from, VotePhase::Revealed);
        assert_eq!(err.event, VoteEvent::SelectEstimation);

        assert_eq!(
            apply(&mut protocol, VoteEvent::StartNewVote),
            VotePhase::Collecting
        );
        assert_eq!(
            apply(&mut protocol, VoteEvent::SelectEstimation),
            VotePhase::Collecting
        );
    }

    #[test]
    fn reveal_is_idempotent() {
        let mut protocol = VotingProtocol::from_reveal(true);
        assert_eq!(apply(&mut protocol, VoteEvent::Reveal), VotePhase::Revealed);
        assert_eq!(apply(&mut protocol, VoteEvent::Reveal), VotePhase::Revealed);
    }

    #[test]
    fn expiry_auto_reveals_only_with_a_full_ballot() {
        let mut protocol = VotingProtocol::from_reveal(false);
        assert_eq!(
            apply(&mut protocol, VoteEvent::TimerExpired { all_voted: false }),
            VotePhase::Collecting
        );
        assert_eq!(
            apply(&mut protocol, VoteEvent::TimerExpired { all_voted: true }),
            VotePhase::Revealed
        );
    }

    #[test]
    fn expiry_after_reveal_changes_nothing() {
        let mut protocol = VotingProtocol::from_reveal(true);
        assert_eq!(
            apply(&mut protocol, VoteEvent::TimerExpired { all_voted: true }),
            VotePhase::Revealed
        );
    }

    #[test]
    fn new_vote_is_legal_mid_round() {
        let mut protocol = VotingProtocol::from_reveal(false);
        assert_eq!(
            apply(&mut protocol, VoteEvent::StartNewVote),
            VotePhase::Collecting
        );
    }
}
