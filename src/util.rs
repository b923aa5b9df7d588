use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

/// Wraps a value so that it never prints in debug or display output.
///
/// Grounded in the teacher's `util::Secret`, used here for passwords carried in
/// [`crate::credentials::Credentials`] so a stray `{:?}`/log line can't leak one.
#[derive(Clone)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Deref for Secret<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> Display for Secret<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(********)")
    }
}

/// Shell-quotes a value the way the remote agent command line requires: every
/// user-controlled flag value is quoted individually rather than trusting the whole
/// command line to a single escaping pass.
pub fn shell_quote(value: &str) -> String {
    shell_escape::escape(value.into()).into_owned()
}

/// Translates a shell-style glob (`*`, `?`, `[...]`) into an anchored regex, the way
/// `fnmatch.translate` does in the original Python implementation.
pub fn glob_to_anchored_regex(glob: &str) -> String {
    let mut out = String::from("(?s)^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!')) {
                    chars.next();
                    out.push('^');
                }
                for c in chars.by_ref() {
                    out.push(c);
                    if c == ']' {
                        break;
                    }
                }
            }
            c if "\\.+^$(){}|".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn secret_display_never_leaks() {
        let s = Secret::new("hunter2".to_string());
        assert_eq!(format!("{s}"), "********");
        assert_eq!(format!("{s:?}"), "Secret(********)");
        assert_eq!(s.expose(), "hunter2");
    }

    #[test]
    fn glob_translation_matches_shell_semantics() {
        let re = Regex::new(&glob_to_anchored_regex("web-*")).unwrap();
        assert!(re.is_match("web-01.example"));
        assert!(!re.is_match("db-01.example"));

        let re = Regex::new(&glob_to_anchored_regex("node?")).unwrap();
        assert!(re.is_match("node1"));
        assert!(!re.is_match("node12"));
    }
}
