//! 시그널링 중계 규칙
//!
//! 페이로드는 보지 않고, 누가 어떤 상태에서 무엇을 보낼 수 있는지만 판단한다.
//! 상대가 없으면 `None`을 넘긴다.

use crate::error::{CoordinatorError, SessionError};
use crate::session::{Role, SessionEvent, SessionState};

/// offer: candidate → recruiter만 허용. 이미 보낸 오퍼가 답을 기다리는 중이면 glare.
pub fn admit_offer(
    from: Role,
    candidate: SessionState,
    recruiter: Option<SessionState>,
) -> Result<(), CoordinatorError> {
    if from != Role::Candidate {
        return Err(CoordinatorError::WrongDirection {
            role: from,
            kind: "offer",
        });
    }
    if candidate == SessionState::OfferSent {
        return Err(CoordinatorError::GlareIgnored);
    }
    match recruiter {
        None => Err(CoordinatorError::PeerAbsent),
        Some(SessionState::Joined) => Ok(()),
        Some(SessionState::OfferReceived | SessionState::AnswerSent) => {
            Err(CoordinatorError::GlareIgnored)
        }
        Some(state) => Err(SessionError::InvalidTransition {
            role: Role::Recruiter,
            state,
            event: SessionEvent::RemoteOffer,
        }
        .into()),
    }
}

/// answer: recruiter → candidate만 허용. candidate가 `offer_sent`가 아니면 stale.
pub fn admit_answer(
    from: Role,
    candidate: Option<SessionState>,
    recruiter: SessionState,
) -> Result<(), CoordinatorError> {
    if from != Role::Recruiter {
        return Err(CoordinatorError::WrongDirection {
            role: from,
            kind: "answer",
        });
    }
    match candidate {
        None => Err(CoordinatorError::PeerAbsent),
        Some(SessionState::OfferSent) if recruiter == SessionState::OfferReceived => Ok(()),
        Some(_) => Err(CoordinatorError::StaleAnswer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_offer_from_candidate_to_waiting_recruiter() {
        assert_eq!(admit_offer(Role::Candidate, Joined, Some(Joined)), Ok(()));
    }

    #[test]
    fn test_offer_from_recruiter_rejected() {
        assert_eq!(
            admit_offer(Role::Recruiter, Joined, Some(Joined)),
            Err(CoordinatorError::WrongDirection {
                role: Role::Recruiter,
                kind: "offer"
            })
        );
    }

    #[test]
    fn test_second_offer_is_glare() {
        assert_eq!(
            admit_offer(Role::Candidate, OfferSent, Some(OfferReceived)),
            Err(CoordinatorError::GlareIgnored)
        );
    }

    #[test]
    fn test_offer_to_connected_recruiter_is_invalid() {
        assert!(matches!(
            admit_offer(Role::Candidate, Joined, Some(Connected)),
            Err(CoordinatorError::Session(SessionError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn test_offer_without_recruiter() {
        assert_eq!(
            admit_offer(Role::Candidate, Joined, None),
            Err(CoordinatorError::PeerAbsent)
        );
    }

    #[test]
    fn test_answer_requires_outstanding_offer() {
        assert_eq!(
            admit_answer(Role::Recruiter, Some(OfferSent), OfferReceived),
            Ok(())
        );
        assert_eq!(
            admit_answer(Role::Recruiter, Some(Joined), OfferReceived),
            Err(CoordinatorError::StaleAnswer)
        );
        assert_eq!(
            admit_answer(Role::Recruiter, Some(Connected), Connected),
            Err(CoordinatorError::StaleAnswer)
        );
    }

    #[test]
    fn test_answer_from_candidate_rejected() {
        assert!(matches!(
            admit_answer(Role::Candidate, Some(OfferSent), OfferReceived),
            Err(CoordinatorError::WrongDirection { .. })
        ));
    }
}
