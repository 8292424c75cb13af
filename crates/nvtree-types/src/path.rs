use crate::error::{TypeError, TypeResult};
use crate::NAME_MAX;

/// One component of a dotted lookup path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathToken<'a> {
    /// Match a child by exact name.
    Exact(&'a str),
    /// Match the first GROUP child whose name starts with this prefix.
    Prefix(&'a str),
}

impl<'a> PathToken<'a> {
    /// Whether a child named `name` of the given group-ness matches.
    pub fn matches(self, name: &str, is_group: bool) -> bool {
        match self {
            Self::Exact(want) => want == name,
            Self::Prefix(prefix) => is_group && name.starts_with(prefix),
        }
    }
}

/// Split a dotted path into lookup tokens.
///
/// Each token is truncated to the name limit. A token of two or more
/// characters ending in `*` becomes a [`PathToken::Prefix`]. A single
/// trailing `.` is ignored and an empty path yields no tokens.
pub fn tokens(path: &str) -> impl Iterator<Item = PathToken<'_>> {
    let path = path.strip_suffix('.').unwrap_or(path);
    path.split('.')
        .filter(move |_| !path.is_empty())
        .map(|raw| {
            let token = truncate(raw, NAME_MAX - 1);
            match token.strip_suffix('*') {
                Some(prefix) if token.len() >= 2 => PathToken::Prefix(prefix),
                _ => PathToken::Exact(token),
            }
        })
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Check that `name` can be stored as an item name.
pub fn validate_name(name: &str) -> TypeResult<()> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.len() > NAME_MAX - 1 {
        "longer than 31 bytes"
    } else if name.contains('.') {
        "contains '.'"
    } else if name.contains('\0') {
        "contains NUL"
    } else {
        return Ok(());
    };
    Err(TypeError::InvalidName {
        name: name.to_string(),
        reason,
    })
}
