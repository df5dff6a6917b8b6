//! Step-up reauthentication: per-user challenge lifecycle and escalation.

pub mod escalation;
pub mod machine;
pub mod state;

pub use escalation::{ESCALATION_INITIATOR, EscalationAction, EscalationPolicy, ThresholdEscalation};
pub use machine::{ReauthStateMachine, ReauthTimings};
pub use state::{
    Challenge, ChallengeOutcome, ChallengeSlot, ChallengeState, ChallengeView, ExpiredChallenge,
    IssueOutcome, VerifyOutcome,
};
