use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Connect arguments, wiped from memory when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    connection_string: String,
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(connection_string: &str, user: &str, password: &str) -> Self {
        Self {
            connection_string: connection_string.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("connection_string", &self.connection_string)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let creds = Credentials::new("testdb", "u", "p");
        assert_eq!(creds.connection_string(), "testdb");
        assert_eq!(creds.user(), "u");
        assert_eq!(creds.password(), "p");
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("testdb", "scott", "tiger");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("scott"));
        assert!(!rendered.contains("tiger"));
    }

    #[test]
    fn test_zeroize_clears_fields() {
        let mut creds = Credentials::new("testdb", "scott", "tiger");
        creds.zeroize();
        assert!(creds.password().is_empty());
        assert!(creds.user().is_empty());
        assert!(creds.connection_string().is_empty());
    }
}
