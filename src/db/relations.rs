//! Relation kinds handled by the integrity layer.

use serde::Serialize;

/// A user's association with a recipe (favorite, cart) or with another user (subscription).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Favorite,
    /// Cart entries may repeat: each row is one planned purchase of the recipe.
    Cart,
    Subscription,
}

/// Outcome of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Added,
    Removed,
}

impl RelationKind {
    pub fn name(&self) -> &'static str {
        match self {
            RelationKind::Favorite => "favorite",
            RelationKind::Cart => "cart entry",
            RelationKind::Subscription => "subscription",
        }
    }

    /// Whether the store allows at most one row per (user, target) pair
    pub fn is_unique(&self) -> bool {
        !matches!(self, RelationKind::Cart)
    }

    /// Whether the target id refers to a user rather than a recipe
    pub fn targets_user(&self) -> bool {
        matches!(self, RelationKind::Subscription)
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            RelationKind::Favorite => "favorites",
            RelationKind::Cart => "carts",
            RelationKind::Subscription => "subscriptions",
        }
    }

    pub(crate) fn owner_column(&self) -> &'static str {
        match self {
            RelationKind::Subscription => "follower_id",
            _ => "user_id",
        }
    }

    pub(crate) fn target_column(&self) -> &'static str {
        match self {
            RelationKind::Subscription => "author_id",
            _ => "recipe_id",
        }
    }

    pub(crate) fn target_label(&self, target_id: i64) -> String {
        if self.targets_user() {
            format!("user {target_id}")
        } else {
            format!("recipe {target_id}")
        }
    }

    pub(crate) fn describe(&self, user_id: i64, target_id: i64) -> String {
        format!(
            "{} of user {} for {}",
            self.name(),
            user_id,
            self.target_label(target_id)
        )
    }
}
