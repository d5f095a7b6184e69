//! Reference data: ingredients and tags.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 200;

/// A basic ingredient with the unit its amounts are measured in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

impl NewIngredient {
    pub fn new(name: &str, measurement_unit: &str) -> Self {
        Self {
            name: name.to_string(),
            measurement_unit: measurement_unit.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_text("ingredient name", &self.name)?;
        check_text("measurement unit", &self.measurement_unit)
    }
}

/// A recipe tag; name, color and slug are each globally unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl NewTag {
    pub fn new(name: &str, color: &str, slug: &str) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
            slug: slug.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_text("tag name", &self.name)?;
        if !is_hex_color(&self.color) {
            return Err(Error::validation(format!(
                "tag color must be a #RRGGBB hex code, got {:?}",
                self.color
            )));
        }
        if !is_slug(&self.slug) {
            return Err(Error::validation(format!(
                "tag slug may only contain letters, digits, '-' and '_', got {:?}",
                self.slug
            )));
        }
        Ok(())
    }
}

fn check_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} must not be empty")));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(Error::validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn is_hex_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

pub fn is_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_NAME_LEN
        && slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
