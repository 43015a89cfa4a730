//! Access tokens and where they come from.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no token stored at {}", path.display())]
    Missing { path: PathBuf },

    #[error("invalid token: {0}")]
    Invalid(&'static str),

    #[error("failed to read token from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An opaque bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Creates a token from user or file input, trimming surrounding whitespace.
    ///
    /// The token ends up in a header and a query string, so inner whitespace
    /// and control characters are rejected.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, CredentialError> {
        let token = raw.as_ref().trim();
        if token.is_empty() {
            return Err(CredentialError::Invalid("token is empty"));
        }
        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CredentialError::Invalid(
                "token contains whitespace or control characters",
            ));
        }
        Ok(Self(token.to_string()))
    }

    /// The raw token, for putting on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token([REDACTED])")
    }
}

/// Somewhere a token can be loaded from at connect time.
pub trait TokenSource: Send + Sync {
    fn load(&self) -> Result<Token, CredentialError>;
}

/// A token known up front, e.g. from configuration.
#[derive(Debug, Clone)]
pub struct StaticToken(Token);

impl StaticToken {
    pub const fn new(token: Token) -> Self {
        Self(token)
    }
}

impl TokenSource for StaticToken {
    fn load(&self) -> Result<Token, CredentialError> {
        Ok(self.0.clone())
    }
}

/// A token kept in a file written by the login flow.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenSource for FileTokenStore {
    fn load(&self) -> Result<Token, CredentialError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CredentialError::Missing {
                    path: self.path.clone(),
                });
            }
            Err(source) => {
                return Err(CredentialError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if contents.trim().is_empty() {
            return Err(CredentialError::Missing {
                path: self.path.clone(),
            });
        }
        Token::new(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn token_debug_is_redacted() {
        let token = Token::new("super-secret").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert_eq!(token.bearer(), "Bearer super-secret");
    }

    #[test]
    fn token_is_trimmed_and_validated() {
        assert_eq!(Token::new("  abc\n").unwrap().expose(), "abc");
        assert!(matches!(Token::new("   "), Err(CredentialError::Invalid(_))));
        assert!(matches!(Token::new("a b"), Err(CredentialError::Invalid(_))));
    }

    #[test]
    fn file_store_reads_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "file-token\n").unwrap();

        let token = FileTokenStore::new(&path).load().unwrap();
        assert_eq!(token.expose(), "file-token");
    }

    #[test]
    fn file_store_reports_missing_token() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent"));
        assert!(matches!(store.load(), Err(CredentialError::Missing { .. })));

        let empty = dir.path().join("empty");
        std::fs::write(&empty, "\n").unwrap();
        assert!(matches!(
            FileTokenStore::new(empty).load(),
            Err(CredentialError::Missing { .. })
        ));
    }
}
