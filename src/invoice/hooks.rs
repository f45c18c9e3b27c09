//! Extension hooks around the signing pipeline.
//!
//! Hooks run in registration order at two points: `before_signing` mutates
//! the document before the digest is computed, so its changes are covered by
//! the signature; `after_signing` runs on the already-signed document and its
//! changes are not. A hook may also contribute an XML fragment through
//! `additional_data`; the engine splices all fragments into the document
//! before digesting.

use libxml::tree::Document;
use thiserror::Error;

/// Failure of a single hook. Aborts the signing run; the composed invoice is
/// left untouched and can be signed again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extension hook '{hook}' failed: {message}")]
pub struct HookError {
    pub hook: String,
    pub message: String,
}

impl HookError {
    pub fn new(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

/// One pluggable extension. All methods have no-op defaults so a hook only
/// implements the phases it cares about.
pub trait ExtensionHook {
    /// Stable name used in error reports.
    fn name(&self) -> &str;

    /// Runs on the working copy before the document digest is computed.
    fn before_signing(&self, _document: &mut Document) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after the signature has been spliced in.
    fn after_signing(&self, _document: &mut Document) -> Result<(), HookError> {
        Ok(())
    }

    /// Optional XML fragment appended to the document ahead of digesting.
    fn additional_data(&self) -> Option<String> {
        None
    }
}

/// Ordered hook registry. Execution order is registration order, for both
/// phases and for fragment collection.
#[derive(Default)]
pub struct ExtensionChain {
    hooks: Vec<Box<dyn ExtensionHook>>,
}

impl ExtensionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Box<dyn ExtensionHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn run_before(&self, document: &mut Document) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.before_signing(document)?;
        }
        Ok(())
    }

    pub(crate) fn run_after(&self, document: &mut Document) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.after_signing(document)?;
        }
        Ok(())
    }

    /// Non-empty fragments in registration order.
    pub(crate) fn additional_data(&self) -> Vec<String> {
        self.hooks
            .iter()
            .filter_map(|hook| hook.additional_data())
            .filter(|fragment| !fragment.trim().is_empty())
            .collect()
    }
}
