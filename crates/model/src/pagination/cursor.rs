use serde::{Deserialize, Serialize};
use std::fmt;

/// Continuation token handed out by the generation service.
///
/// `None` means "start from the head of the unacknowledged result stream";
/// the service decides what that head is, so an exhausted cursor simply
/// falls back to `None`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub enum Cursor {
    /// No cursor specified.
    #[default]
    None,

    /// Opaque token returned as `next_cursor` by the previous page.
    Token(String),
}

impl Cursor {
    /// Builds the cursor that follows a page, given the page's `next_cursor`.
    pub fn after_page(next: Option<String>) -> Self {
        match next {
            Some(token) if !token.is_empty() => Cursor::Token(token),
            _ => Cursor::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Cursor::None)
    }

    /// Token to send on the wire, if any.
    pub fn token(&self) -> Option<&str> {
        match self {
            Cursor::None => None,
            Cursor::Token(token) => Some(token.as_str()),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::None => f.write_str("<start>"),
            Cursor::Token(token) => f.write_str(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_next_cursor_is_exhausted() {
        assert_eq!(Cursor::after_page(None), Cursor::None);
        assert_eq!(Cursor::after_page(Some(String::new())), Cursor::None);
        assert_eq!(
            Cursor::after_page(Some("abc".into())),
            Cursor::Token("abc".into())
        );
    }

    #[test]
    fn token_is_only_sent_when_present() {
        assert_eq!(Cursor::None.token(), None);
        assert_eq!(Cursor::Token("p2".into()).token(), Some("p2"));
    }
}
