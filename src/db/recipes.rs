//! Recipe records and the write-boundary checks for recipe drafts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::catalog::Tag;
use super::users::User;
use crate::config::RecipeLimits;
use crate::error::{Error, Result};

const MAX_RECIPE_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipe {
    pub id: i64,
    pub author_id: i64,
    pub name: String,
    pub image: String,
    pub text: String,
    /// Minutes
    pub cooking_time: i32,
    pub publish_time: String,
}

/// An ingredient portion joined with its ingredient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Portion {
    pub ingredient_id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// A recipe with everything a reader needs to display it
#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetails {
    pub recipe: Recipe,
    pub author: User,
    pub tags: Vec<Tag>,
    pub portions: Vec<Portion>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortionDraft {
    pub ingredient_id: i64,
    pub amount: i32,
}

/// Input for creating or fully replacing a recipe.
///
/// Tags and ingredients are always the complete set; an update clears the
/// stored links and inserts these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDraft {
    pub name: String,
    #[serde(default)]
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<i64>,
    pub ingredients: Vec<PortionDraft>,
}

impl RecipeDraft {
    pub fn validate(&self, limits: &RecipeLimits) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("recipe name must not be empty"));
        }
        if self.name.chars().count() > MAX_RECIPE_NAME_LEN {
            return Err(Error::validation(format!(
                "recipe name must be at most {MAX_RECIPE_NAME_LEN} characters"
            )));
        }
        if !(limits.min_cooking_time..=limits.max_cooking_time).contains(&self.cooking_time) {
            return Err(Error::validation(format!(
                "cooking time must be between {} and {} minutes, got {}",
                limits.min_cooking_time, limits.max_cooking_time, self.cooking_time
            )));
        }

        if self.tags.is_empty() {
            return Err(Error::validation("a recipe needs at least one tag"));
        }
        let mut seen = HashSet::new();
        if let Some(tag) = self.tags.iter().find(|tag| !seen.insert(**tag)) {
            return Err(Error::validation(format!("tag {tag} is listed more than once")));
        }

        if self.ingredients.is_empty() {
            return Err(Error::validation("a recipe needs at least one ingredient"));
        }
        let mut seen = HashSet::new();
        for portion in &self.ingredients {
            if !seen.insert(portion.ingredient_id) {
                return Err(Error::validation(format!(
                    "ingredient {} is listed more than once",
                    portion.ingredient_id
                )));
            }
            if !(limits.min_amount..=limits.max_amount).contains(&portion.amount) {
                return Err(Error::validation(format!(
                    "amount of ingredient {} must be between {} and {}, got {}",
                    portion.ingredient_id, limits.min_amount, limits.max_amount, portion.amount
                )));
            }
        }
        Ok(())
    }
}
