mod schema;
pub mod catalog;
pub mod filters;
pub mod recipes;
pub mod relations;
pub mod shopping;
pub mod sqlite;
pub mod users;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod postgres_schema;

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

pub use catalog::{Ingredient, NewIngredient, NewTag, Tag};
pub use filters::{RecipeFilter, Viewer};
pub use recipes::{Portion, PortionDraft, Recipe, RecipeDetails, RecipeDraft};
pub use relations::{RelationKind, Toggled};
pub use schema::SCHEMA;
pub use shopping::{ShoppingItem, ShoppingList};
pub use users::{AuthorSummary, NewUser, User};

use crate::config::{DatabaseConfig, RecipeLimits};
#[cfg(feature = "postgres")]
use crate::config::DatabaseType;
use crate::error::{Error, Result};

/// Current time as stored in every timestamp column
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Macro to dispatch a method call to the active backend variant.
macro_rules! dispatch {
    // No arguments beyond self
    ($self:expr, $method:ident()) => {
        match &$self.inner {
            DatabaseInner::Sqlite(db) => db.$method(),
            #[cfg(feature = "postgres")]
            DatabaseInner::Postgres(db) => db.$method(),
        }
    };
    // With arguments
    ($self:expr, $method:ident($($arg:expr),+ $(,)?)) => {
        match &$self.inner {
            DatabaseInner::Sqlite(db) => db.$method($($arg),+),
            #[cfg(feature = "postgres")]
            DatabaseInner::Postgres(db) => db.$method($($arg),+),
        }
    };
}

enum DatabaseInner {
    Sqlite(sqlite::SqliteDb),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PgDb),
}

pub struct Database {
    inner: DatabaseInner,
    limits: RecipeLimits,
}

impl Database {
    /// Open a database connection based on the provided configuration.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        #[cfg(feature = "postgres")]
        {
            if config.backend == DatabaseType::Postgresql {
                let url = config
                    .postgresql_url
                    .as_deref()
                    .ok_or_else(|| Error::validation("PostgreSQL URL not configured"))?;
                let pool_size = config.pool_size.unwrap_or(10);
                let pg = postgres::PgDb::open(url, pool_size)?;
                return Ok(Self::from_inner(DatabaseInner::Postgres(pg)));
            }
        }

        let db = sqlite::SqliteDb::open(&config.sqlite_path)?;
        Ok(Self::from_inner(DatabaseInner::Sqlite(db)))
    }

    /// A private in-memory SQLite database with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let db = Self::from_inner(DatabaseInner::Sqlite(sqlite::SqliteDb::open_in_memory()?));
        db.initialize()?;
        Ok(db)
    }

    fn from_inner(inner: DatabaseInner) -> Self {
        Self {
            inner,
            limits: RecipeLimits::default(),
        }
    }

    /// Replace the bounds recipe drafts are validated against.
    pub fn with_limits(mut self, limits: RecipeLimits) -> Result<Self> {
        limits.validate()?;
        self.limits = limits;
        Ok(self)
    }

    pub fn initialize(&self) -> Result<()> {
        dispatch!(self, initialize())
    }

    // ========================================================================
    // User operations
    // ========================================================================

    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        let user = user.normalized()?;
        let id = dispatch!(self, create_user(&user))?;
        info!(user_id = id, username = %user.username, "Created user");
        Ok(id)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        dispatch!(self, get_user(user_id))
    }

    /// Look up a user by login email. The domain part is matched case-insensitively.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        match users::normalize_email(email) {
            Ok(email) => dispatch!(self, get_user_by_email(&email)),
            Err(_) => Ok(None),
        }
    }

    /// Delete a user with everything they own. Returns the number of recipes removed.
    pub fn delete_user(&self, user_id: i64) -> Result<usize> {
        let recipes = dispatch!(self, delete_user(user_id))?;
        info!(user_id, recipes, "Deleted user");
        Ok(recipes)
    }

    /// Authors `follower_id` is subscribed to, each with up to `recipes_limit`
    /// of their newest recipes.
    pub fn list_subscriptions(
        &self,
        follower_id: i64,
        recipes_limit: Option<usize>,
    ) -> Result<Vec<AuthorSummary>> {
        dispatch!(self, list_subscriptions(follower_id, recipes_limit))
    }

    // ========================================================================
    // Reference data operations
    // ========================================================================

    pub fn create_ingredient(&self, ingredient: &NewIngredient) -> Result<i64> {
        ingredient.validate()?;
        dispatch!(self, create_ingredient(ingredient))
    }

    /// Bulk insert, skipping ingredients that already exist. Returns how many were new.
    pub fn insert_ingredients(&self, ingredients: &[NewIngredient]) -> Result<usize> {
        for ingredient in ingredients {
            ingredient.validate()?;
        }
        dispatch!(self, insert_ingredients(ingredients))
    }

    pub fn get_ingredient(&self, ingredient_id: i64) -> Result<Option<Ingredient>> {
        dispatch!(self, get_ingredient(ingredient_id))
    }

    pub fn get_all_ingredients(&self) -> Result<Vec<Ingredient>> {
        dispatch!(self, get_all_ingredients())
    }

    /// Case-insensitive name prefix search. `%` and `_` match literally.
    pub fn search_ingredients(&self, prefix: &str) -> Result<Vec<Ingredient>> {
        dispatch!(self, search_ingredients(prefix))
    }

    pub fn create_tag(&self, tag: &NewTag) -> Result<i64> {
        tag.validate()?;
        dispatch!(self, create_tag(tag))
    }

    pub fn insert_tags(&self, tags: &[NewTag]) -> Result<usize> {
        for tag in tags {
            tag.validate()?;
        }
        dispatch!(self, insert_tags(tags))
    }

    pub fn get_tag(&self, tag_id: i64) -> Result<Option<Tag>> {
        dispatch!(self, get_tag(tag_id))
    }

    pub fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        dispatch!(self, get_tag_by_slug(slug))
    }

    pub fn get_all_tags(&self) -> Result<Vec<Tag>> {
        dispatch!(self, get_all_tags())
    }

    // ========================================================================
    // Recipe operations
    // ========================================================================

    pub fn create_recipe(&self, author_id: i64, draft: &RecipeDraft) -> Result<i64> {
        draft.validate(&self.limits)?;
        let id = dispatch!(self, create_recipe(author_id, draft))?;
        info!(recipe_id = id, author_id, "Created recipe");
        Ok(id)
    }

    /// Replace a recipe's fields, tags and portions. Author and publish time are kept.
    pub fn update_recipe(&self, recipe_id: i64, draft: &RecipeDraft) -> Result<()> {
        draft.validate(&self.limits)?;
        dispatch!(self, update_recipe(recipe_id, draft))?;
        info!(recipe_id, "Updated recipe");
        Ok(())
    }

    pub fn delete_recipe(&self, recipe_id: i64) -> Result<()> {
        dispatch!(self, delete_recipe(recipe_id))?;
        info!(recipe_id, "Deleted recipe");
        Ok(())
    }

    /// A recipe with author, tags, portions and the viewer's flags.
    pub fn get_recipe(&self, recipe_id: i64, viewer: Viewer) -> Result<Option<RecipeDetails>> {
        let Some(recipe) = dispatch!(self, get_recipe(recipe_id))? else {
            return Ok(None);
        };
        let author = dispatch!(self, get_user(recipe.author_id))?
            .ok_or_else(|| Error::not_found(format!("user {}", recipe.author_id)))?;
        let tags = dispatch!(self, get_recipe_tags(recipe_id))?;
        let portions = dispatch!(self, get_recipe_portions(recipe_id))?;
        let (is_favorited, is_in_shopping_cart) = match viewer.user_id() {
            Some(user_id) => (
                dispatch!(self, has_relation(RelationKind::Favorite, user_id, recipe_id))?,
                dispatch!(self, has_relation(RelationKind::Cart, user_id, recipe_id))?,
            ),
            None => (false, false),
        };
        Ok(Some(RecipeDetails {
            recipe,
            author,
            tags,
            portions,
            is_favorited,
            is_in_shopping_cart,
        }))
    }

    /// Recipes matching every filter, newest first.
    pub fn list_recipes(&self, filters: &[RecipeFilter], viewer: Viewer) -> Result<Vec<Recipe>> {
        dispatch!(self, list_recipes(filters, viewer))
    }

    pub fn count_favorites(&self, recipe_id: i64) -> Result<i64> {
        dispatch!(self, count_favorites(recipe_id))
    }

    // ========================================================================
    // Relation operations
    // ========================================================================

    pub fn add_relation(&self, kind: RelationKind, user_id: i64, target_id: i64) -> Result<()> {
        if kind.targets_user() && user_id == target_id {
            warn!(user_id, "Rejected subscription to self");
            return Err(Error::SelfReference);
        }
        if let Err(e) = dispatch!(self, add_relation(kind, user_id, target_id)) {
            warn!(relation = kind.name(), user_id, target_id, "Rejected relation: {}", e);
            return Err(e);
        }
        info!(relation = kind.name(), user_id, target_id, "Added relation");
        Ok(())
    }

    /// Remove the relation. For the cart, one entry is removed per call.
    pub fn remove_relation(&self, kind: RelationKind, user_id: i64, target_id: i64) -> Result<()> {
        dispatch!(self, remove_relation(kind, user_id, target_id))?;
        info!(relation = kind.name(), user_id, target_id, "Removed relation");
        Ok(())
    }

    pub fn has_relation(&self, kind: RelationKind, user_id: i64, target_id: i64) -> Result<bool> {
        dispatch!(self, has_relation(kind, user_id, target_id))
    }

    pub fn toggle_relation(
        &self,
        kind: RelationKind,
        user_id: i64,
        target_id: i64,
    ) -> Result<Toggled> {
        if self.has_relation(kind, user_id, target_id)? {
            self.remove_relation(kind, user_id, target_id)?;
            Ok(Toggled::Removed)
        } else {
            self.add_relation(kind, user_id, target_id)?;
            Ok(Toggled::Added)
        }
    }

    // ========================================================================
    // Shopping list
    // ========================================================================

    /// Sum the portions of every recipe in the user's cart by ingredient.
    pub fn compute_shopping_list(&self, user_id: i64) -> Result<ShoppingList> {
        let user = self
            .get_user(user_id)?
            .ok_or_else(|| Error::not_found(format!("user {user_id}")))?;
        let items = dispatch!(self, get_shopping_items(user_id))?;
        Ok(ShoppingList { user, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Kitchen {
        db: Database,
        anna: i64,
        boris: i64,
        breakfast: i64,
        dinner: i64,
        flour: i64,
        milk: i64,
        eggs: i64,
    }

    fn kitchen() -> Kitchen {
        let db = Database::open_in_memory().unwrap();
        let anna = db.create_user(&NewUser::new("anna@example.com", "anna")).unwrap();
        let boris = db.create_user(&NewUser::new("boris@example.com", "boris")).unwrap();
        let breakfast = db
            .create_tag(&NewTag::new("Breakfast", "#E26C2D", "breakfast"))
            .unwrap();
        let dinner = db
            .create_tag(&NewTag::new("Dinner", "#49B64E", "dinner"))
            .unwrap();
        let flour = db.create_ingredient(&NewIngredient::new("flour", "g")).unwrap();
        let milk = db.create_ingredient(&NewIngredient::new("milk", "ml")).unwrap();
        let eggs = db.create_ingredient(&NewIngredient::new("eggs", "pcs")).unwrap();
        Kitchen {
            db,
            anna,
            boris,
            breakfast,
            dinner,
            flour,
            milk,
            eggs,
        }
    }

    fn draft(name: &str, tags: Vec<i64>, ingredients: &[(i64, i32)]) -> RecipeDraft {
        RecipeDraft {
            name: name.to_string(),
            image: String::new(),
            text: "Mix and cook.".to_string(),
            cooking_time: 20,
            tags,
            ingredients: ingredients
                .iter()
                .map(|&(ingredient_id, amount)| PortionDraft {
                    ingredient_id,
                    amount,
                })
                .collect(),
        }
    }

    #[test]
    fn test_shopping_list_sums_across_recipes() {
        let k = kitchen();
        let pancakes = k
            .db
            .create_recipe(k.anna, &draft("Pancakes", vec![k.breakfast], &[(k.flour, 200), (k.milk, 300)]))
            .unwrap();
        let bread = k
            .db
            .create_recipe(k.anna, &draft("Bread", vec![k.dinner], &[(k.flour, 300)]))
            .unwrap();
        k.db.add_relation(RelationKind::Cart, k.boris, pancakes).unwrap();
        k.db.add_relation(RelationKind::Cart, k.boris, bread).unwrap();

        let list = k.db.compute_shopping_list(k.boris).unwrap();
        assert_eq!(
            list.items,
            vec![
                ShoppingItem {
                    ingredient_name: "flour".to_string(),
                    measurement_unit: "g".to_string(),
                    total_amount: 500,
                },
                ShoppingItem {
                    ingredient_name: "milk".to_string(),
                    measurement_unit: "ml".to_string(),
                    total_amount: 300,
                },
            ]
        );
        assert_eq!(
            list.render_text(),
            "Shopping list for boris (boris@example.com):\n - flour (g): 500\n - milk (ml): 300\n"
        );
    }

    #[test]
    fn test_shopping_list_keeps_units_apart() {
        let k = kitchen();
        let flour_kg = k.db.create_ingredient(&NewIngredient::new("flour", "kg")).unwrap();
        let a = k
            .db
            .create_recipe(k.anna, &draft("Cake", vec![k.breakfast], &[(k.flour, 100)]))
            .unwrap();
        let b = k
            .db
            .create_recipe(k.anna, &draft("Loaf", vec![k.breakfast], &[(flour_kg, 1)]))
            .unwrap();
        k.db.add_relation(RelationKind::Cart, k.anna, a).unwrap();
        k.db.add_relation(RelationKind::Cart, k.anna, b).unwrap();

        let list = k.db.compute_shopping_list(k.anna).unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].measurement_unit, "g");
        assert_eq!(list.items[1].measurement_unit, "kg");
    }

    #[test]
    fn test_empty_cart_gives_header_only() {
        let k = kitchen();
        let list = k.db.compute_shopping_list(k.anna).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.render_text(), "Shopping list for anna (anna@example.com):\n");
    }

    #[test]
    fn test_shopping_list_for_missing_user() {
        let k = kitchen();
        assert!(matches!(
            k.db.compute_shopping_list(9999),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_cart_entries_repeat() {
        let k = kitchen();
        let pancakes = k
            .db
            .create_recipe(k.anna, &draft("Pancakes", vec![k.breakfast], &[(k.eggs, 2)]))
            .unwrap();
        k.db.add_relation(RelationKind::Cart, k.boris, pancakes).unwrap();
        k.db.add_relation(RelationKind::Cart, k.boris, pancakes).unwrap();
        assert_eq!(k.db.compute_shopping_list(k.boris).unwrap().items[0].total_amount, 4);

        k.db.remove_relation(RelationKind::Cart, k.boris, pancakes).unwrap();
        assert!(k.db.has_relation(RelationKind::Cart, k.boris, pancakes).unwrap());
        assert_eq!(k.db.compute_shopping_list(k.boris).unwrap().items[0].total_amount, 2);

        k.db.remove_relation(RelationKind::Cart, k.boris, pancakes).unwrap();
        assert!(!k.db.has_relation(RelationKind::Cart, k.boris, pancakes).unwrap());
        assert!(matches!(
            k.db.remove_relation(RelationKind::Cart, k.boris, pancakes),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_self_subscription_rejected() {
        let k = kitchen();
        assert!(matches!(
            k.db.add_relation(RelationKind::Subscription, k.anna, k.anna),
            Err(Error::SelfReference)
        ));
        assert!(!k.db.has_relation(RelationKind::Subscription, k.anna, k.anna).unwrap());
    }

    #[test]
    fn test_favorite_twice_rejected() {
        let k = kitchen();
        let recipe = k
            .db
            .create_recipe(k.anna, &draft("Omelette", vec![k.breakfast], &[(k.eggs, 3)]))
            .unwrap();
        k.db.add_relation(RelationKind::Favorite, k.boris, recipe).unwrap();
        assert!(matches!(
            k.db.add_relation(RelationKind::Favorite, k.boris, recipe),
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(k.db.count_favorites(recipe).unwrap(), 1);
    }

    #[test]
    fn test_subscription_twice_rejected() {
        let k = kitchen();
        k.db.add_relation(RelationKind::Subscription, k.boris, k.anna).unwrap();
        let err = k
            .db
            .add_relation(RelationKind::Subscription, k.boris, k.anna)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_remove_without_add() {
        let k = kitchen();
        let recipe = k
            .db
            .create_recipe(k.anna, &draft("Omelette", vec![k.breakfast], &[(k.eggs, 3)]))
            .unwrap();
        for kind in [RelationKind::Favorite, RelationKind::Cart] {
            assert!(matches!(
                k.db.remove_relation(kind, k.boris, recipe),
                Err(Error::NotFound(_))
            ));
        }
        assert!(matches!(
            k.db.remove_relation(RelationKind::Subscription, k.boris, k.anna),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_relation_to_missing_target() {
        let k = kitchen();
        assert!(matches!(
            k.db.add_relation(RelationKind::Favorite, k.anna, 4242),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            k.db.add_relation(RelationKind::Subscription, k.anna, 4242),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            k.db.add_relation(RelationKind::Cart, 4242, 1),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_toggle_alternates() {
        let k = kitchen();
        let recipe = k
            .db
            .create_recipe(k.anna, &draft("Porridge", vec![k.breakfast], &[(k.milk, 200)]))
            .unwrap();
        let kind = RelationKind::Favorite;
        assert_eq!(k.db.toggle_relation(kind, k.boris, recipe).unwrap(), Toggled::Added);
        assert!(k.db.has_relation(kind, k.boris, recipe).unwrap());
        assert_eq!(k.db.toggle_relation(kind, k.boris, recipe).unwrap(), Toggled::Removed);
        assert!(!k.db.has_relation(kind, k.boris, recipe).unwrap());
        assert_eq!(k.db.toggle_relation(kind, k.boris, recipe).unwrap(), Toggled::Added);
    }

    #[test]
    fn test_create_recipe_validation() {
        let k = kitchen();
        let cases = [
            draft("No tags", vec![], &[(k.eggs, 1)]),
            draft("No ingredients", vec![k.breakfast], &[]),
            draft("Twice eggs", vec![k.breakfast], &[(k.eggs, 1), (k.eggs, 2)]),
            draft("Twice tagged", vec![k.breakfast, k.breakfast], &[(k.eggs, 1)]),
            draft("Zero", vec![k.breakfast], &[(k.eggs, 0)]),
            draft("   ", vec![k.breakfast], &[(k.eggs, 1)]),
            draft("Unknown tag", vec![777], &[(k.eggs, 1)]),
            draft("Unknown ingredient", vec![k.breakfast], &[(777, 1)]),
            RecipeDraft {
                cooking_time: 0,
                ..draft("Instant", vec![k.breakfast], &[(k.eggs, 1)])
            },
        ];
        for case in &cases {
            let result = k.db.create_recipe(k.anna, case);
            assert!(
                matches!(result, Err(Error::Validation(_))),
                "{:?} should be rejected, got {:?}",
                case.name,
                result
            );
        }
        assert!(k.db.list_recipes(&[], Viewer::Anonymous).unwrap().is_empty());
    }

    #[test]
    fn test_create_recipe_for_missing_author() {
        let k = kitchen();
        assert!(matches!(
            k.db.create_recipe(4242, &draft("Ghost", vec![k.breakfast], &[(k.eggs, 1)])),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_custom_limits() {
        let k = kitchen();
        let db = k
            .db
            .with_limits(RecipeLimits {
                max_cooking_time: 30,
                ..RecipeLimits::default()
            })
            .unwrap();
        let slow = RecipeDraft {
            cooking_time: 45,
            ..draft("Stew", vec![k.dinner], &[(k.milk, 1)])
        };
        assert!(matches!(db.create_recipe(k.anna, &slow), Err(Error::Validation(_))));
    }

    #[test]
    fn test_limits_below_store_bounds_rejected() {
        let db = Database::open_in_memory().unwrap();
        let result = db.with_limits(RecipeLimits {
            min_amount: 0,
            ..RecipeLimits::default()
        });
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_update_replaces_tags_and_portions() {
        let k = kitchen();
        let lunch = k.db.create_tag(&NewTag::new("Lunch", "#8775D2", "lunch")).unwrap();
        let recipe = k
            .db
            .create_recipe(k.anna, &draft("Pancakes", vec![lunch], &[(k.flour, 200), (k.milk, 300)]))
            .unwrap();
        let before = k.db.get_recipe(recipe, Viewer::Anonymous).unwrap().unwrap();

        k.db.update_recipe(recipe, &draft("Crepes", vec![k.breakfast, k.dinner], &[(k.eggs, 5)]))
            .unwrap();

        let after = k.db.get_recipe(recipe, Viewer::Anonymous).unwrap().unwrap();
        assert_eq!(after.recipe.name, "Crepes");
        assert_eq!(after.recipe.publish_time, before.recipe.publish_time);
        assert_eq!(after.recipe.author_id, k.anna);
        let tag_ids: Vec<i64> = after.tags.iter().map(|t| t.id).collect();
        assert_eq!(tag_ids, vec![k.breakfast, k.dinner]);
        let portions: Vec<(i64, i32)> = after
            .portions
            .iter()
            .map(|p| (p.ingredient_id, p.amount))
            .collect();
        assert_eq!(portions, vec![(k.eggs, 5)]);
    }

    #[test]
    fn test_failed_update_leaves_recipe_intact() {
        let k = kitchen();
        let recipe = k
            .db
            .create_recipe(k.anna, &draft("Pancakes", vec![k.breakfast], &[(k.flour, 200)]))
            .unwrap();
        assert!(k
            .db
            .update_recipe(recipe, &draft("Pancakes", vec![k.breakfast], &[(999, 1)]))
            .is_err());
        let details = k.db.get_recipe(recipe, Viewer::Anonymous).unwrap().unwrap();
        assert_eq!(details.portions.len(), 1);
        assert_eq!(details.portions[0].ingredient_id, k.flour);

        assert!(matches!(
            k.db.update_recipe(999, &draft("Pancakes", vec![k.breakfast], &[(k.flour, 1)])),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_recipe_removes_relations() {
        let k = kitchen();
        let recipe = k
            .db
            .create_recipe(k.anna, &draft("Soup", vec![k.dinner], &[(k.milk, 500)]))
            .unwrap();
        k.db.add_relation(RelationKind::Favorite, k.boris, recipe).unwrap();
        k.db.add_relation(RelationKind::Cart, k.boris, recipe).unwrap();

        k.db.delete_recipe(recipe).unwrap();
        assert!(k.db.get_recipe(recipe, Viewer::User(k.boris)).unwrap().is_none());
        assert!(!k.db.has_relation(RelationKind::Favorite, k.boris, recipe).unwrap());
        assert!(k.db.compute_shopping_list(k.boris).unwrap().is_empty());
        assert!(matches!(k.db.delete_recipe(recipe), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_recipe_details_flags() {
        let k = kitchen();
        let recipe = k
            .db
            .create_recipe(k.anna, &draft("Pancakes", vec![k.breakfast, k.dinner], &[(k.flour, 200), (k.milk, 300)]))
            .unwrap();
        k.db.add_relation(RelationKind::Favorite, k.boris, recipe).unwrap();

        let for_boris = k.db.get_recipe(recipe, Viewer::User(k.boris)).unwrap().unwrap();
        assert!(for_boris.is_favorited);
        assert!(!for_boris.is_in_shopping_cart);
        assert_eq!(for_boris.author.username, "anna");
        assert_eq!(for_boris.tags.len(), 2);
        assert_eq!(for_boris.portions[0].name, "flour");
        assert_eq!(for_boris.portions[0].measurement_unit, "g");

        let anonymous = k.db.get_recipe(recipe, Viewer::Anonymous).unwrap().unwrap();
        assert!(!anonymous.is_favorited);
        assert!(!anonymous.is_in_shopping_cart);
    }

    #[test]
    fn test_list_recipes_filters() {
        let k = kitchen();
        let pancakes = k
            .db
            .create_recipe(k.anna, &draft("Pancakes", vec![k.breakfast, k.dinner], &[(k.flour, 200)]))
            .unwrap();
        let soup = k
            .db
            .create_recipe(k.boris, &draft("Soup", vec![k.dinner], &[(k.milk, 500)]))
            .unwrap();
        let eggs = k
            .db
            .create_recipe(k.boris, &draft("Eggs", vec![k.breakfast], &[(k.eggs, 2)]))
            .unwrap();
        k.db.add_relation(RelationKind::Favorite, k.anna, soup).unwrap();
        k.db.add_relation(RelationKind::Cart, k.anna, eggs).unwrap();

        let ids = |filters: &[RecipeFilter], viewer: Viewer| -> Vec<i64> {
            k.db.list_recipes(filters, viewer)
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect()
        };

        assert_eq!(ids(&[], Viewer::Anonymous), vec![eggs, soup, pancakes]);
        assert_eq!(
            ids(&[RecipeFilter::Tags(vec!["breakfast".into(), "dinner".into()])], Viewer::Anonymous),
            vec![eggs, soup, pancakes]
        );
        assert_eq!(
            ids(&[RecipeFilter::Tags(vec!["breakfast".into()])], Viewer::Anonymous),
            vec![eggs, pancakes]
        );
        assert_eq!(ids(&[RecipeFilter::Author(k.boris)], Viewer::Anonymous), vec![eggs, soup]);
        assert_eq!(
            ids(
                &[RecipeFilter::Author(k.boris), RecipeFilter::Tags(vec!["dinner".into()])],
                Viewer::Anonymous
            ),
            vec![soup]
        );
        assert_eq!(ids(&[RecipeFilter::Favorited], Viewer::User(k.anna)), vec![soup]);
        assert_eq!(ids(&[RecipeFilter::InCart], Viewer::User(k.anna)), vec![eggs]);
        assert!(ids(&[RecipeFilter::Favorited], Viewer::Anonymous).is_empty());
        assert!(ids(&[RecipeFilter::InCart], Viewer::Anonymous).is_empty());
        assert!(ids(&[RecipeFilter::Favorited], Viewer::User(k.boris)).is_empty());
    }

    #[test]
    fn test_search_ingredients() {
        let k = kitchen();
        k.db.create_ingredient(&NewIngredient::new("Milk chocolate", "g")).unwrap();
        k.db.create_ingredient(&NewIngredient::new("100% juice", "ml")).unwrap();
        k.db.create_ingredient(&NewIngredient::new("1000 island dressing", "g")).unwrap();

        let names = |prefix: &str| -> Vec<String> {
            k.db.search_ingredients(prefix)
                .unwrap()
                .into_iter()
                .map(|i| i.name)
                .collect()
        };
        assert_eq!(names("MIL"), vec!["Milk chocolate", "milk"]);
        assert!(names("ilk").is_empty());
        assert_eq!(names("100%"), vec!["100% juice"]);
        assert_eq!(names("").len(), 6);

        k.db.create_ingredient(&NewIngredient::new("абрикосовое варенье", "г")).unwrap();
        k.db.create_ingredient(&NewIngredient::new("Абрикосы", "шт")).unwrap();
        let apricots = vec!["Абрикосы", "абрикосовое варенье"];
        assert_eq!(names("абр"), apricots);
        assert_eq!(names("АБР"), apricots);
        assert_eq!(names("Абрикосо"), vec!["абрикосовое варенье"]);
    }

    #[test]
    fn test_duplicate_reference_data() {
        let k = kitchen();
        assert!(matches!(
            k.db.create_ingredient(&NewIngredient::new("flour", "g")),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            k.db.create_tag(&NewTag::new("Brunch", "#E26C2D", "brunch")),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            k.db.create_tag(&NewTag::new("Brunch", "orange", "brunch")),
            Err(Error::Validation(_))
        ));

        let batch = vec![NewIngredient::new("flour", "g"), NewIngredient::new("salt", "g")];
        assert_eq!(k.db.insert_ingredients(&batch).unwrap(), 1);
        assert_eq!(k.db.insert_ingredients(&batch).unwrap(), 0);
        assert_eq!(k.db.get_tag_by_slug("dinner").unwrap().unwrap().id, k.dinner);
    }

    #[test]
    fn test_create_user_duplicates() {
        let k = kitchen();
        assert!(matches!(
            k.db.create_user(&NewUser::new("anna@EXAMPLE.com", "anna2")),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            k.db.create_user(&NewUser::new("other@example.com", "anna")),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            k.db.create_user(&NewUser::new("not-an-email", "carl")),
            Err(Error::Validation(_))
        ));
        let found = k.db.get_user_by_email("anna@Example.com").unwrap().unwrap();
        assert_eq!(found.id, k.anna);
        assert!(k.db.get_user_by_email("garbage").unwrap().is_none());
    }

    #[test]
    fn test_list_subscriptions() {
        let k = kitchen();
        for name in ["One", "Two", "Three"] {
            k.db.create_recipe(k.anna, &draft(name, vec![k.breakfast], &[(k.eggs, 1)]))
                .unwrap();
        }
        k.db.add_relation(RelationKind::Subscription, k.boris, k.anna).unwrap();

        let subs = k.db.list_subscriptions(k.boris, Some(2)).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].author.id, k.anna);
        assert_eq!(subs[0].recipes_count, 3);
        let names: Vec<&str> = subs[0].recipes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Three", "Two"]);

        let all = k.db.list_subscriptions(k.boris, None).unwrap();
        assert_eq!(all[0].recipes.len(), 3);
        assert!(k.db.list_subscriptions(k.anna, None).unwrap().is_empty());
    }

    #[test]
    fn test_delete_user_cascades() {
        let k = kitchen();
        let carl = k.db.create_user(&NewUser::new("carl@example.com", "carl")).unwrap();
        let annas = k
            .db
            .create_recipe(k.anna, &draft("Pie", vec![k.dinner], &[(k.flour, 300)]))
            .unwrap();
        let boris_recipe = k
            .db
            .create_recipe(k.boris, &draft("Stew", vec![k.dinner], &[(k.milk, 100)]))
            .unwrap();
        k.db.add_relation(RelationKind::Favorite, k.boris, annas).unwrap();
        k.db.add_relation(RelationKind::Cart, k.boris, annas).unwrap();
        k.db.add_relation(RelationKind::Cart, k.boris, boris_recipe).unwrap();
        k.db.add_relation(RelationKind::Favorite, k.anna, boris_recipe).unwrap();
        k.db.add_relation(RelationKind::Subscription, k.boris, k.anna).unwrap();
        k.db.add_relation(RelationKind::Subscription, k.anna, carl).unwrap();
        k.db.add_relation(RelationKind::Subscription, carl, k.boris).unwrap();

        assert_eq!(k.db.delete_user(k.anna).unwrap(), 1);

        assert!(k.db.get_user(k.anna).unwrap().is_none());
        assert!(k.db.get_recipe(annas, Viewer::Anonymous).unwrap().is_none());
        assert!(k.db.list_subscriptions(k.boris, None).unwrap().is_empty());
        assert_eq!(k.db.count_favorites(boris_recipe).unwrap(), 0);

        // other users keep their data
        assert!(k.db.get_recipe(boris_recipe, Viewer::Anonymous).unwrap().is_some());
        let list = k.db.compute_shopping_list(k.boris).unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].ingredient_name, "milk");
        assert_eq!(k.db.list_subscriptions(carl, None).unwrap().len(), 1);

        assert!(matches!(k.db.delete_user(k.anna), Err(Error::NotFound(_))));
    }
}
