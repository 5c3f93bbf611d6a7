//! Jsonnet template evaluation.
//!
//! Evaluation sits behind [`TemplateEvaluator`] so callers can swap the VM,
//! e.g. to add import paths or external variables. The default
//! [`VmEvaluator`] runs the full language with the standard library and no
//! file imports.

use jrsonnet_evaluator::State;
use jrsonnet_evaluator::manifest::JsonFormat;
use jrsonnet_evaluator::trace::PathResolver;
use jrsonnet_stdlib::ContextInitializer;
use serde_json::Value;

/// Name reported for the template in evaluation traces.
const SNIPPET_NAME: &str = "<package>";

/// Turns Jsonnet source into its JSON manifestation.
pub trait TemplateEvaluator: Send + Sync {
    fn evaluate(&self, source: &str) -> Result<Value, String>;
}

/// [`TemplateEvaluator`] backed by the jrsonnet VM.
///
/// A fresh VM is built per evaluation; VM state is not shared across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmEvaluator;

impl TemplateEvaluator for VmEvaluator {
    fn evaluate(&self, source: &str) -> Result<Value, String> {
        let state = State::default();
        state.set_context_initializer(ContextInitializer::new(
            state.clone(),
            PathResolver::new_cwd_fallback(),
        ));

        let val = state
            .evaluate_snippet(SNIPPET_NAME, source)
            .map_err(|err| err.to_string())?;
        let json = val
            .manifest(JsonFormat::default())
            .map_err(|err| err.to_string())?;
        serde_json::from_str(&json).map_err(|err| err.to_string())
    }
}
