// Offset/self-time pair for one call inside a sub-callstack

use std::fmt;

/// A call's position in time relative to its subtree root, and its self-time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallEntry {
    offset: i64,
    self_time: i64,
}

impl CallEntry {
    pub fn new(offset: i64, self_time: i64) -> Self {
        Self { offset, self_time }
    }

    /// Start time difference with the subtree root
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn self_time(&self) -> i64 {
        self.self_time
    }
}

impl fmt::Display for CallEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset = {} | self_time = {}", self.offset, self.self_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_field_wise() {
        assert_eq!(CallEntry::new(5, 10), CallEntry::new(5, 10));
        assert_ne!(CallEntry::new(5, 10), CallEntry::new(5, 11));
    }

    #[test]
    fn test_display() {
        assert_eq!(CallEntry::new(3, 7).to_string(), "offset = 3 | self_time = 7");
    }
}
