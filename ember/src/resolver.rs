//! Variable Resolvers
//!
//! Before a variable name is looked up in the current variable frame, the interpreter
//! offers it to each registered [`Resolver`] in priority order.  A resolver either
//! names the frame and local name to use, defers to the next resolver, or fails; the
//! first answer that isn't [`Resolution::Deferred`] wins.  If every resolver defers,
//! the name is looked up in the current variable frame.

use crate::error::EmberError;
use crate::frame::CallStack;
use crate::frame::FrameId;
use crate::types::*;

/// The outcome of a resolver's lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Use variable `name` in `frame`'s store.
    Resolved { frame: FrameId, name: String },
    /// Not this resolver's business.
    Deferred,
}

/// A pluggable name-to-frame resolver.
pub trait Resolver {
    /// A name for diagnostics.
    fn name(&self) -> &str;

    /// Resolves a variable name to a frame and local name.
    fn resolve_variable_frame(
        &self,
        stack: &CallStack,
        name: &str,
        flags: VarFlags,
    ) -> Result<Resolution, EmberError>;
}

/// Resolves namespace-qualified names such as `::config::debug` or `sub::x`.
/// Unqualified names are deferred.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceResolver;

impl Resolver for NamespaceResolver {
    fn name(&self) -> &str {
        "namespace"
    }

    fn resolve_variable_frame(
        &self,
        stack: &CallStack,
        name: &str,
        _flags: VarFlags,
    ) -> Result<Resolution, EmberError> {
        if !name.contains("::") {
            return Ok(Resolution::Deferred);
        }

        let (qualifier, tail) = split_qualified(name)
            .ok_or_else(|| failed(name, "no variable name after qualifier"))?;
        let path = absolute_path(stack, qualifier);

        match stack.namespace_frame(&path) {
            Some(frame) => Ok(Resolution::Resolved {
                frame,
                name: tail.into(),
            }),
            None => Err(failed(name, &format!("namespace \"{}\" not found", qualifier))),
        }
    }
}

fn failed(name: &str, reason: &str) -> EmberError {
    EmberError::NameResolutionFailed {
        name: name.into(),
        reason: reason.into(),
    }
}

/// Splits a qualified name into qualifier and tail.  A leading `::` alone qualifies
/// the global namespace.  Returns `None` if the tail is empty.
///
/// ```
/// use ember::resolver::split_qualified;
///
/// assert_eq!(split_qualified("::a::b::x"), Some(("::a::b", "x")));
/// assert_eq!(split_qualified("::x"), Some(("::", "x")));
/// assert_eq!(split_qualified("a::x"), Some(("a", "x")));
/// assert_eq!(split_qualified("a::"), None);
/// assert_eq!(split_qualified("x"), None);
/// ```
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let split = name.rfind("::")?;
    let tail = &name[split + 2..];

    if tail.is_empty() {
        return None;
    }

    let qualifier = &name[..split];
    if qualifier.is_empty() {
        Some(("::", tail))
    } else {
        Some((qualifier, tail))
    }
}

/// Makes a qualifier absolute relative to the current namespace.
pub fn absolute_path(stack: &CallStack, qualifier: &str) -> String {
    if qualifier.starts_with("::") {
        return qualifier.into();
    }

    let current = stack.current_namespace();
    if current == "::" {
        format!("::{}", qualifier)
    } else {
        format!("{}::{}", current, qualifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unqualified_defers() {
        let stack = CallStack::new();
        let resolved = NamespaceResolver.resolve_variable_frame(&stack, "x", VarFlags::empty());
        assert_eq!(resolved, Ok(Resolution::Deferred));
    }

    #[test]
    fn test_absolute_name() {
        let mut stack = CallStack::new();
        let ns = stack.create_namespace("::cfg");

        let resolved =
            NamespaceResolver.resolve_variable_frame(&stack, "::cfg::debug", VarFlags::empty());
        assert_eq!(
            resolved,
            Ok(Resolution::Resolved {
                frame: ns,
                name: "debug".into()
            })
        );

        let resolved = NamespaceResolver.resolve_variable_frame(&stack, "::g", VarFlags::empty());
        assert_eq!(
            resolved,
            Ok(Resolution::Resolved {
                frame: stack.global_id(),
                name: "g".into()
            })
        );
    }

    #[test]
    fn test_relative_name() {
        let mut stack = CallStack::new();
        let outer = stack.create_namespace("::outer");
        let inner = stack.create_namespace("::outer::inner");

        let resolved =
            NamespaceResolver.resolve_variable_frame(&stack, "outer::v", VarFlags::empty());
        assert!(matches!(resolved, Ok(Resolution::Resolved { frame, .. }) if frame == outer));

        let frame = stack.new_namespace_eval_frame("::outer", outer);
        stack.push(frame);
        let resolved =
            NamespaceResolver.resolve_variable_frame(&stack, "inner::v", VarFlags::empty());
        assert!(matches!(resolved, Ok(Resolution::Resolved { frame, .. }) if frame == inner));
    }

    #[test]
    fn test_failures_are_hard_errors() {
        let stack = CallStack::new();

        let err = NamespaceResolver
            .resolve_variable_frame(&stack, "::nope::x", VarFlags::empty())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "can't resolve \"::nope::x\": namespace \"::nope\" not found"
        );

        let err = NamespaceResolver
            .resolve_variable_frame(&stack, "::a::", VarFlags::empty())
            .unwrap_err();
        assert!(matches!(err, EmberError::NameResolutionFailed { .. }));
    }
}
