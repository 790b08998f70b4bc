//! Small shared helpers with no component of their own.

pub mod content;
