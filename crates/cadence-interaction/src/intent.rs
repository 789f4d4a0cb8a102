//! Intent classification.
//!
//! Every dialogue turn is mapped onto the closed [`Intent`] set before the
//! state machine branches on it.

use cadence_core::session::{Intent, SessionState};
use regex::Regex;
use std::sync::LazyLock;

static AFFIRMATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(y|yes|yeah|yep|yup|sure|ok|okay|go|go ahead|do it|proceed|confirm|run it|sounds good|lgtm)[.!\s]*$",
    )
    .unwrap()
});

static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(n|no|nope|nah|cancel|stop|abort|discard|never ?mind|don'?t|do not|not now)[.!\s]*$",
    )
    .unwrap()
});

/// Continuation phrasing: "and then ...", "also ...", "plus ...", "... as well".
static FOLLOW_UP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(and( then)?|also|then|plus|additionally|oh and|but also)\b|\bas well\b").unwrap()
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?\s*(\d{1,3})[.)]?$").unwrap());

/// Maps a dialogue turn onto an [`Intent`] given the current state.
pub trait IntentClassifier: Send + Sync {
    /// `offered_alternatives` is how many numbered alternatives the last
    /// escalation offered (zero if none are open).
    fn classify(&self, text: &str, state: &SessionState, offered_alternatives: usize) -> Intent;
}

/// Phrase-matching classifier.
///
/// Follow-up detection is heuristic; anything that is not a clear yes, no or
/// continuation while a plan is pending is ambiguous.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhraseIntentClassifier;

impl IntentClassifier for PhraseIntentClassifier {
    fn classify(&self, text: &str, state: &SessionState, offered_alternatives: usize) -> Intent {
        let text = text.trim();
        if text.is_empty() {
            return Intent::Ambiguous;
        }

        match state {
            SessionState::AwaitingConfirmation { .. } => {
                if AFFIRMATIVE.is_match(text) {
                    Intent::Affirmative
                } else if NEGATIVE.is_match(text) {
                    Intent::Negative
                } else if FOLLOW_UP.is_match(text) {
                    Intent::FollowUp
                } else {
                    Intent::Ambiguous
                }
            }
            SessionState::Idle => {
                if offered_alternatives > 0 {
                    if let Some(n) = NUMBER
                        .captures(text)
                        .and_then(|c| c.get(1))
                        .and_then(|m| m.as_str().parse::<usize>().ok())
                    {
                        return Intent::AcceptAlternative(n);
                    }
                }
                if AFFIRMATIVE.is_match(text) || NEGATIVE.is_match(text) {
                    // Nothing to confirm or decline.
                    Intent::Ambiguous
                } else {
                    Intent::NewRequest
                }
            }
            SessionState::Executing { .. } => Intent::Ambiguous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::plan::Plan;

    fn awaiting() -> SessionState {
        SessionState::AwaitingConfirmation {
            plan: Plan::new("x", vec![], ""),
        }
    }

    #[test]
    fn test_confirmation_answers() {
        let c = PhraseIntentClassifier;
        for yes in ["yes", "Y", "ok!", "go ahead", "Sounds good."] {
            assert_eq!(c.classify(yes, &awaiting(), 0), Intent::Affirmative, "{}", yes);
        }
        for no in ["no", "Nope", "cancel", "never mind", "don't"] {
            assert_eq!(c.classify(no, &awaiting(), 0), Intent::Negative, "{}", no);
        }
    }

    #[test]
    fn test_follow_up_phrasing() {
        let c = PhraseIntentClassifier;
        assert_eq!(
            c.classify("and then run the tests", &awaiting(), 0),
            Intent::FollowUp
        );
        assert_eq!(c.classify("Also update the changelog", &awaiting(), 0), Intent::FollowUp);
        assert_eq!(
            c.classify("bump the version as well", &awaiting(), 0),
            Intent::FollowUp
        );
        // "android" must not match the "and" prefix
        assert_eq!(c.classify("android build", &awaiting(), 0), Intent::Ambiguous);
    }

    #[test]
    fn test_unrelated_input_while_awaiting_is_ambiguous() {
        let c = PhraseIntentClassifier;
        assert_eq!(c.classify("what time is it", &awaiting(), 0), Intent::Ambiguous);
        assert_eq!(c.classify("yes please do it now", &awaiting(), 0), Intent::Ambiguous);
    }

    #[test]
    fn test_idle_classification() {
        let c = PhraseIntentClassifier;
        let idle = SessionState::Idle;
        assert_eq!(c.classify("deploy to staging", &idle, 0), Intent::NewRequest);
        assert_eq!(c.classify("yes", &idle, 0), Intent::Ambiguous);
        assert_eq!(c.classify("   ", &idle, 0), Intent::Ambiguous);
        assert_eq!(c.classify("2", &idle, 3), Intent::AcceptAlternative(2));
        assert_eq!(c.classify("#1", &idle, 3), Intent::AcceptAlternative(1));
        // Numbers are ordinary requests when no alternatives are open.
        assert_eq!(c.classify("2", &idle, 0), Intent::NewRequest);
    }
}
