//! DOT format utilities for graph visualization.
//!
//! Graph dumps can be rendered with Graphviz; node labels contain type ranges and
//! operation names with brackets and quotes, so they go through [`escape_dot`].

/// Escapes a string for safe use in DOT format labels and identifiers.
///
/// This function handles all characters that have special meaning in DOT format,
/// including quotes, backslashes, newlines, angle and curly brackets.
///
/// # Arguments
///
/// * `s` - The string to escape
///
/// # Returns
///
/// A new string with all special characters properly escaped.
///
/// # Examples
///
/// ```rust
/// use seaopt::utils::escape_dot;
///
/// let escaped = escape_dot("Phi<mem#2>");
/// assert_eq!(escaped, "Phi\\<mem#2\\>");
/// ```
#[must_use]
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
        .replace('<', "\\<")
        .replace('>', "\\>")
        .replace('{', "\\{")
        .replace('}', "\\}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_dot_basic() {
        assert_eq!(escape_dot("AddI"), "AddI");
    }

    #[test]
    fn test_escape_dot_quotes_and_backslash() {
        assert_eq!(escape_dot("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_dot("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_escape_dot_newlines() {
        assert_eq!(escape_dot("line1\r\nline2"), "line1\\nline2");
    }

    #[test]
    fn test_escape_dot_brackets() {
        assert_eq!(escape_dot("int:{0..5}"), "int:\\{0..5\\}");
        assert_eq!(escape_dot("Phi<v>"), "Phi\\<v\\>");
    }
}
