//! Memoizer configuration

use crate::error::{Error, Result};

/// Default watermark for sweeping a reference table
pub const DEFAULT_SWEEP_THRESHOLD: usize = 64;

/// Options for a [`crate::Memoized`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoizeOptions {
    key_receiver: bool,
    sweep_threshold: usize,
    label: Option<String>,
}

impl Default for MemoizeOptions {
    fn default() -> Self {
        Self {
            key_receiver: true,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            label: None,
        }
    }
}

impl MemoizeOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a receiver other than `Undefined` becomes key zero
    ///
    /// When disabled the receiver is still forwarded to the callable, but
    /// calls on different receivers share cache entries.
    pub fn key_receiver(mut self, enabled: bool) -> Self {
        self.key_receiver = enabled;
        self
    }

    /// Minimum size a reference table reaches before dead keys are swept
    pub fn sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    /// Name attached to log events
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Is receiver keying enabled
    pub fn keys_receiver(&self) -> bool {
        self.key_receiver
    }

    /// Get the sweep threshold
    pub fn threshold(&self) -> usize {
        self.sweep_threshold
    }

    /// Get the label, if any
    pub fn name(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Check the options are usable
    pub fn validate(&self) -> Result<()> {
        if self.sweep_threshold == 0 {
            return Err(Error::InvalidOptions(
                "sweep_threshold must be greater than 0".into(),
            ));
        }
        if matches!(&self.label, Some(label) if label.is_empty()) {
            return Err(Error::InvalidOptions("label must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = MemoizeOptions::default();
        assert!(options.keys_receiver());
        assert_eq!(options.threshold(), DEFAULT_SWEEP_THRESHOLD);
        assert_eq!(options.name(), None);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_builder() {
        let options = MemoizeOptions::new()
            .key_receiver(false)
            .sweep_threshold(8)
            .label("fib");
        assert!(!options.keys_receiver());
        assert_eq!(options.threshold(), 8);
        assert_eq!(options.name(), Some("fib"));
    }

    #[test]
    fn test_options_reject_zero_threshold() {
        let result = MemoizeOptions::new().sweep_threshold(0).validate();
        assert!(matches!(result, Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn test_options_reject_empty_label() {
        let result = MemoizeOptions::new().label("").validate();
        assert!(matches!(result, Err(Error::InvalidOptions(_))));
    }
}
