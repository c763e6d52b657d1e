/// Splits a stream into balanced json objects.
pub mod json;

/// Splits a stream into lines, and terminates written commands with a newline.
pub mod lines;
