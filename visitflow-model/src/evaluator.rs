use crate::{ProgramRule, RuleContext, RuleResult, RuleVariable};

/// The external rule evaluator.
///
/// Implementations must be pure: the same rules, variables and context always
/// yield the same result, and evaluation has no side effects. The engine
/// applies the result (assignments, hidden-field clearing) itself.
pub trait RuleEvaluator: Send + Sync {
    fn evaluate(
        &self,
        rules: &[ProgramRule],
        variables: &[RuleVariable],
        context: &RuleContext,
    ) -> RuleResult;
}

impl<F> RuleEvaluator for F
where
    F: Fn(&[ProgramRule], &[RuleVariable], &RuleContext) -> RuleResult + Send + Sync,
{
    fn evaluate(
        &self,
        rules: &[ProgramRule],
        variables: &[RuleVariable],
        context: &RuleContext,
    ) -> RuleResult {
        self(rules, variables, context)
    }
}
