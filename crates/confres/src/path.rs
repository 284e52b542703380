use std::fmt;

use crate::error::ConfigError;

/// A non-empty sequence of keys addressing a node from the root of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    keys: Vec<String>,
}

impl Path {
    /// Builds a path from keys; `None` when `keys` is empty.
    pub fn from_keys<I, S>(keys: I) -> Option<Path>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            None
        } else {
            Some(Path { keys })
        }
    }

    pub fn new_key(key: impl Into<String>) -> Path {
        Path {
            keys: vec![key.into()],
        }
    }

    /// Parses a dotted path expression such as `a.b."c.d"`.
    ///
    /// Double quotes make a key literal, so `"c.d"` is one key. Whitespace around
    /// the expression is ignored; empty keys are rejected.
    pub fn parse(input: &str) -> Result<Path, ConfigError> {
        let bad = |reason: &str| ConfigError::BadPath {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let text = input.trim();
        if text.is_empty() {
            return Err(bad("path is empty"));
        }

        let mut keys = Vec::new();
        let mut cur = String::new();
        let mut quoted_key = false;
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => {
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some('\\') => match chars.next() {
                                Some(esc) => cur.push(esc),
                                None => return Err(bad("dangling escape in quoted key")),
                            },
                            Some(other) => cur.push(other),
                            None => return Err(bad("unterminated quoted key")),
                        }
                    }
                    quoted_key = true;
                }
                '.' => {
                    if cur.is_empty() && !quoted_key {
                        return Err(bad("path has an empty key"));
                    }
                    keys.push(std::mem::take(&mut cur));
                    quoted_key = false;
                }
                c if c.is_whitespace() => {
                    return Err(bad("unquoted whitespace in path"));
                }
                c => cur.push(c),
            }
        }
        if cur.is_empty() && !quoted_key {
            return Err(bad("path ends with an empty key"));
        }
        keys.push(cur);

        Ok(Path { keys })
    }

    pub fn first(&self) -> &str {
        &self.keys[0]
    }

    pub fn last(&self) -> &str {
        &self.keys[self.keys.len() - 1]
    }

    /// Everything after the first key, or `None` for a single-key path.
    pub fn remainder(&self) -> Option<Path> {
        Path::from_keys(self.keys[1..].iter().cloned())
    }

    pub fn parent(&self) -> Option<Path> {
        Path::from_keys(self.keys[..self.keys.len() - 1].iter().cloned())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn child(&self, key: impl Into<String>) -> Path {
        let mut keys = self.keys.clone();
        keys.push(key.into());
        Path { keys }
    }

    /// The path made of keys `[start..]`; `None` when nothing is left.
    pub fn sub_path(&self, start: usize) -> Option<Path> {
        if start >= self.keys.len() {
            return None;
        }
        Path::from_keys(self.keys[start..].iter().cloned())
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.keys.len() >= prefix.keys.len() && self.keys[..prefix.keys.len()] == prefix.keys[..]
    }

    /// Renders the path back into its dotted form, quoting keys when needed.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            if needs_quotes(key) {
                out.push('"');
                for c in key.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            } else {
                out.push_str(key);
            }
        }
        out
    }
}

fn needs_quotes(key: &str) -> bool {
    key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
