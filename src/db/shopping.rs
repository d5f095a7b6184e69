//! The shopping list aggregate and its text rendering.

use serde::Serialize;
use std::fmt::Write as _;

use super::users::User;

/// One ingredient of a shopping list, summed across every cart entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingItem {
    pub ingredient_name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingList {
    pub user: User,
    /// Ordered by ingredient name, then unit
    pub items: Vec<ShoppingItem>,
}

impl ShoppingList {
    pub fn header(&self) -> String {
        format!(
            "Shopping list for {} ({}):",
            self.user.username, self.user.email
        )
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Plain text document: the header, then one line per ingredient.
    pub fn render_text(&self) -> String {
        let mut out = self.header();
        out.push('\n');
        for item in &self.items {
            // writing to a String cannot fail
            let _ = writeln!(
                out,
                " - {} ({}): {}",
                item.ingredient_name, item.measurement_unit, item.total_amount
            );
        }
        out
    }
}
