//! Review cycle policy.
//!
//! How many reviewing/refining iterations an order may burn, and what
//! happens at the ceiling, is a deployment decision. The engine consults a
//! [`ReviewPolicy`] instead of hard-coding it; [`IterationCapPolicy`] is the
//! shipped default.

/// What the engine knows when a review lands.
#[derive(Debug, Clone, Copy)]
pub struct ReviewContext {
    /// Refinement iterations completed so far.
    pub iterations_completed: u32,
    /// Whether the reviewer approved the document.
    pub approved: bool,
    /// Reviewer quality score, 0-100, when one was produced.
    pub quality_score: Option<u8>,
}

/// Terminal or routing decision for one review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Document accepted: reviewing -> completed.
    Approve,
    /// Another pass: reviewing -> refining.
    Refine,
    /// Ceiling reached: complete anyway, recording the residual issues.
    CompleteWithIssues,
    /// Ceiling reached: give up, order fails.
    Fail,
}

/// Decides the outcome of a review given the iteration history.
pub trait ReviewPolicy: Send + Sync {
    fn decide(&self, ctx: &ReviewContext) -> ReviewDecision;
}

/// Cap refinement iterations. At the ceiling an unapproved document either
/// force-completes with its issues recorded (default) or fails, depending on
/// `fail_on_ceiling`.
#[derive(Debug, Clone, Copy)]
pub struct IterationCapPolicy {
    pub max_iterations: u32,
    pub fail_on_ceiling: bool,
}

impl IterationCapPolicy {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            fail_on_ceiling: false,
        }
    }
}

impl ReviewPolicy for IterationCapPolicy {
    fn decide(&self, ctx: &ReviewContext) -> ReviewDecision {
        if ctx.approved {
            return ReviewDecision::Approve;
        }
        if ctx.iterations_completed >= self.max_iterations {
            if self.fail_on_ceiling {
                ReviewDecision::Fail
            } else {
                ReviewDecision::CompleteWithIssues
            }
        } else {
            ReviewDecision::Refine
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(iterations_completed: u32, approved: bool) -> ReviewContext {
        ReviewContext {
            iterations_completed,
            approved,
            quality_score: Some(70),
        }
    }

    #[test]
    fn approval_wins_regardless_of_iterations() {
        let policy = IterationCapPolicy::new(3);
        assert_eq!(policy.decide(&ctx(0, true)), ReviewDecision::Approve);
        assert_eq!(policy.decide(&ctx(3, true)), ReviewDecision::Approve);
    }

    #[test]
    fn below_ceiling_refines() {
        let policy = IterationCapPolicy::new(3);
        assert_eq!(policy.decide(&ctx(0, false)), ReviewDecision::Refine);
        assert_eq!(policy.decide(&ctx(2, false)), ReviewDecision::Refine);
    }

    #[test]
    fn at_ceiling_completes_with_issues_by_default() {
        let policy = IterationCapPolicy::new(3);
        assert_eq!(
            policy.decide(&ctx(3, false)),
            ReviewDecision::CompleteWithIssues
        );
    }

    #[test]
    fn at_ceiling_fails_when_configured() {
        let policy = IterationCapPolicy {
            max_iterations: 3,
            fail_on_ceiling: true,
        };
        assert_eq!(policy.decide(&ctx(3, false)), ReviewDecision::Fail);
    }
}
