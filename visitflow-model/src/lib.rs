//! Rule-facing model for visitflow.
//!
//! Defines the contract between the engine and the declarative rule
//! evaluator it drives:
//! - [`RuleSet`]: the program rules and variables, opaque to the engine
//! - [`RuleContext`]: the typed input of one evaluation pass
//! - [`RuleEvaluator`]: the external, pure evaluation function
//! - [`RuleResult`]: hidden fields/sections/options, assignments, messages
//! - [`OptionSet`]: option lists and option groups used to filter choices
//!
//! The evaluator's internals live outside this workspace; only its input and
//! output shapes are fixed here.

mod context;
mod evaluator;
mod options;
mod result;
mod rules;

pub use context::RuleContext;
pub use evaluator::RuleEvaluator;
pub use options::{FieldOption, OptionGroup, OptionSet};
pub use result::{FieldMessages, MessageLevel, RuleMessage, RuleResult};
pub use rules::{ProgramRule, RuleSet, RuleVariable};
