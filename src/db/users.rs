//! Types for users and author subscriptions.

use serde::{Deserialize, Serialize};

use super::recipes::Recipe;
use crate::error::{Error, Result};

const MAX_USERNAME_LEN: usize = 150;
const MAX_FIELD_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    /// Login identifier
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_admin: bool,
    pub date_joined: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl NewUser {
    pub fn new(email: &str, username: &str) -> Self {
        Self {
            email: email.to_string(),
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            is_admin: false,
        }
    }

    /// Validate the fields and return a copy with the email normalized.
    pub fn normalized(&self) -> Result<NewUser> {
        let email = normalize_email(&self.email)?;
        if !is_valid_username(&self.username) {
            return Err(Error::validation(format!(
                "username may only contain letters, digits and @/./+/-/_ (max {MAX_USERNAME_LEN}), got {:?}",
                self.username
            )));
        }
        for (field, value) in [("first name", &self.first_name), ("last name", &self.last_name)] {
            if value.chars().count() > MAX_FIELD_LEN {
                return Err(Error::validation(format!(
                    "{field} must be at most {MAX_FIELD_LEN} characters"
                )));
            }
        }
        Ok(NewUser {
            email,
            ..self.clone()
        })
    }
}

/// An author the user follows, with a preview of their recipes
#[derive(Debug, Clone, Serialize)]
pub struct AuthorSummary {
    pub author: User,
    pub recipes: Vec<Recipe>,
    pub recipes_count: i64,
}

/// Lowercase the domain part of an email address.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim();
    let invalid = || Error::validation(format!("invalid email address {email:?}"));
    if email.is_empty() || email.chars().count() > MAX_FIELD_LEN {
        return Err(invalid());
    }
    let (local, domain) = email.rsplit_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(format!("{}@{}", local, domain.to_lowercase()))
}

pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("Chef@Example.COM").unwrap(), "Chef@example.com");
        assert_eq!(normalize_email("  a@b.c ").unwrap(), "a@b.c");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("chef@").is_err());
        assert!(normalize_email("").is_err());
    }

    #[test]
    fn test_username() {
        assert!(is_valid_username("chef.anna+1"));
        assert!(is_valid_username("повар"));
        assert!(!is_valid_username("chef anna"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username(&"a".repeat(MAX_USERNAME_LEN + 1)));
    }

    #[test]
    fn test_normalized_user() {
        let user = NewUser::new("Anna@MAIL.org", "anna").normalized().unwrap();
        assert_eq!(user.email, "Anna@mail.org");
        assert_eq!(user.username, "anna");

        assert!(matches!(
            NewUser::new("anna@mail.org", "bad name").normalized(),
            Err(Error::Validation(_))
        ));
    }
}
