//! Panic payload formatting.
//!
//! Handler panics and connection task panics are caught and logged; these
//! helpers turn the opaque payload into readable text.

use std::{any::Any, fmt};

/// Displays a panic payload.
///
/// `String` and `&'static str` payloads print as-is; anything else falls back
/// to its `Debug` form.
///
/// ```
/// use ringframe::panic::format_panic;
///
/// let caught = std::panic::catch_unwind(|| panic!("ring stalled")).unwrap_err();
/// assert_eq!(format_panic(caught).to_string(), "ring stalled");
///
/// let caught = std::panic::catch_unwind(|| panic!("slot {}", 7)).unwrap_err();
/// assert_eq!(format_panic(caught).to_string(), "slot 7");
///
/// assert!(format_panic(Box::new(42_u8)).to_string().contains("Any"));
/// ```
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl PanicMessage {
    /// Borrow the payload text when it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.0.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(text) => f.write_str(text),
            None => write!(f, "{:?}", self.0),
        }
    }
}

impl fmt::Debug for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicMessage").field(&self.to_string()).finish()
    }
}

/// Wrap a caught panic payload for display.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_string_payload_has_no_text() {
        let message = format_panic(Box::new(3_i32));
        assert!(message.as_str().is_none());
    }

    #[test]
    fn debug_shows_text() {
        let message = format_panic(Box::new("worker died"));
        assert_eq!(format!("{message:?}"), "PanicMessage(\"worker died\")");
    }
}
