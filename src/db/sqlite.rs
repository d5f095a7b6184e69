//! SQLite backend implementation.

use rusqlite::types::ToSqlOutput;
use rusqlite::{Connection, OptionalExtension, ToSql};
use std::path::Path;
use tracing::debug;

use super::catalog::{Ingredient, NewIngredient, NewTag, Tag};
use super::filters::{self, RecipeFilter, SqlValue, Viewer, RECIPE_COLUMNS};
use super::now_timestamp;
use super::recipes::{Portion, Recipe, RecipeDraft};
use super::relations::RelationKind;
use super::schema::SCHEMA;
use super::shopping::ShoppingItem;
use super::users::{AuthorSummary, NewUser, User};
use crate::error::{Error, Result};

pub struct SqliteDb {
    pub(crate) conn: Connection,
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlValue::Int(value) => value.to_sql(),
            SqlValue::Text(value) => value.to_sql(),
        }
    }
}

impl SqliteDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ========================================================================
    // User operations
    // ========================================================================

    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        if row_exists(&tx, "SELECT 1 FROM users WHERE email = ?", [&user.email])? {
            return Err(Error::already_exists(format!("user with email {}", user.email)));
        }
        if row_exists(&tx, "SELECT 1 FROM users WHERE username = ?", [&user.username])? {
            return Err(Error::already_exists(format!("user with username {}", user.username)));
        }
        let inserted = tx.execute(
            r#"
            INSERT INTO users (email, username, first_name, last_name, is_admin, date_joined)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                user.email,
                user.username,
                user.first_name,
                user.last_name,
                user.is_admin,
                now_timestamp()
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::already_exists(format!("user {}", user.email)))
            }
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, email, username, first_name, last_name, is_admin, date_joined FROM users WHERE id = ?",
                [user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, email, username, first_name, last_name, is_admin, date_joined FROM users WHERE email = ?",
                [email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Delete a user and everything that references them, children first.
    pub fn delete_user(&self, user_id: i64) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        if !row_exists(&tx, "SELECT 1 FROM users WHERE id = ?", [user_id])? {
            return Err(Error::not_found(format!("user {user_id}")));
        }
        tx.execute(
            "DELETE FROM favorites WHERE user_id = ?1 OR recipe_id IN (SELECT id FROM recipes WHERE author_id = ?1)",
            [user_id],
        )?;
        tx.execute(
            "DELETE FROM carts WHERE user_id = ?1 OR recipe_id IN (SELECT id FROM recipes WHERE author_id = ?1)",
            [user_id],
        )?;
        tx.execute(
            "DELETE FROM ingredient_portions WHERE recipe_id IN (SELECT id FROM recipes WHERE author_id = ?1)",
            [user_id],
        )?;
        tx.execute(
            "DELETE FROM recipe_tags WHERE recipe_id IN (SELECT id FROM recipes WHERE author_id = ?1)",
            [user_id],
        )?;
        let recipes = tx.execute("DELETE FROM recipes WHERE author_id = ?1", [user_id])?;
        tx.execute(
            "DELETE FROM subscriptions WHERE follower_id = ?1 OR author_id = ?1",
            [user_id],
        )?;
        tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
        tx.commit()?;
        Ok(recipes)
    }

    pub fn list_subscriptions(
        &self,
        follower_id: i64,
        recipes_limit: Option<usize>,
    ) -> Result<Vec<AuthorSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.is_admin, u.date_joined,
                   (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count
            FROM subscriptions s
            JOIN users u ON u.id = s.author_id
            WHERE s.follower_id = ?
            ORDER BY u.username
            "#,
        )?;
        let authors = stmt
            .query_map([follower_id], |row| Ok((row_to_user(row)?, row.get::<_, i64>(7)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // SQLite treats a negative LIMIT as unbounded
        let limit = recipes_limit.map(|n| n as i64).unwrap_or(-1);
        let mut recipes_stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.author_id = ? \
             ORDER BY r.publish_time DESC, r.id DESC LIMIT ?"
        ))?;
        let mut summaries = Vec::with_capacity(authors.len());
        for (author, recipes_count) in authors {
            let recipes = recipes_stmt
                .query_map(rusqlite::params![author.id, limit], row_to_recipe)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            summaries.push(AuthorSummary {
                author,
                recipes,
                recipes_count,
            });
        }
        Ok(summaries)
    }

    // ========================================================================
    // Reference data operations
    // ========================================================================

    pub fn create_ingredient(&self, ingredient: &NewIngredient) -> Result<i64> {
        let inserted = self.conn.execute(
            "INSERT INTO ingredients (name, name_lower, measurement_unit) VALUES (?, ?, ?)",
            rusqlite::params![
                ingredient.name,
                ingredient.name.to_lowercase(),
                ingredient.measurement_unit
            ],
        );
        match inserted {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(Error::already_exists(format!(
                "ingredient {} ({})",
                ingredient.name, ingredient.measurement_unit
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Bulk insert, skipping rows that already exist. Returns the number inserted.
    pub fn insert_ingredients(&self, ingredients: &[NewIngredient]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO ingredients (name, name_lower, measurement_unit) VALUES (?, ?, ?)",
            )?;
            for ingredient in ingredients {
                inserted += stmt.execute(rusqlite::params![
                    ingredient.name,
                    ingredient.name.to_lowercase(),
                    ingredient.measurement_unit
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_ingredient(&self, ingredient_id: i64) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                "SELECT id, name, measurement_unit FROM ingredients WHERE id = ?",
                [ingredient_id],
                row_to_ingredient,
            )
            .optional()?;
        Ok(ingredient)
    }

    pub fn get_all_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, measurement_unit FROM ingredients ORDER BY name, id")?;
        let ingredients = stmt
            .query_map([], row_to_ingredient)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ingredients)
    }

    /// Case-insensitive "starts with" search on ingredient names.
    ///
    /// Matches against `name_lower` so non-ASCII names fold too.
    pub fn search_ingredients(&self, prefix: &str) -> Result<Vec<Ingredient>> {
        let pattern = filters::prefix_pattern(&prefix.to_lowercase());
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, measurement_unit
            FROM ingredients
            WHERE name_lower LIKE ? ESCAPE '\'
            ORDER BY name, id
            "#,
        )?;
        let ingredients = stmt
            .query_map([pattern], row_to_ingredient)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ingredients)
    }

    pub fn create_tag(&self, tag: &NewTag) -> Result<i64> {
        let inserted = self.conn.execute(
            "INSERT INTO tags (name, color, slug) VALUES (?, ?, ?)",
            rusqlite::params![tag.name, tag.color, tag.slug],
        );
        match inserted {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(Error::already_exists(format!(
                "tag with name {}, color {} or slug {}",
                tag.name, tag.color, tag.slug
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn insert_tags(&self, tags: &[NewTag]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO tags (name, color, slug) VALUES (?, ?, ?)")?;
            for tag in tags {
                inserted += stmt.execute(rusqlite::params![tag.name, tag.color, tag.slug])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get_tag(&self, tag_id: i64) -> Result<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name, color, slug FROM tags WHERE id = ?",
                [tag_id],
                row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    pub fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                "SELECT id, name, color, slug FROM tags WHERE slug = ?",
                [slug],
                row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    pub fn get_all_tags(&self) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color, slug FROM tags ORDER BY name")?;
        let tags = stmt
            .query_map([], row_to_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    // ========================================================================
    // Recipe operations
    // ========================================================================

    pub fn create_recipe(&self, author_id: i64, draft: &RecipeDraft) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        if !row_exists(&tx, "SELECT 1 FROM users WHERE id = ?", [author_id])? {
            return Err(Error::not_found(format!("user {author_id}")));
        }
        ensure_references(&tx, draft)?;
        tx.execute(
            r#"
            INSERT INTO recipes (author_id, name, image, text, cooking_time, publish_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                author_id,
                draft.name,
                draft.image,
                draft.text,
                draft.cooking_time,
                now_timestamp()
            ],
        )?;
        let recipe_id = tx.last_insert_rowid();
        insert_recipe_links(&tx, recipe_id, draft)?;
        tx.commit()?;
        Ok(recipe_id)
    }

    /// Replace a recipe's fields, tags and portions wholesale.
    pub fn update_recipe(&self, recipe_id: i64, draft: &RecipeDraft) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if !row_exists(&tx, "SELECT 1 FROM recipes WHERE id = ?", [recipe_id])? {
            return Err(Error::not_found(format!("recipe {recipe_id}")));
        }
        ensure_references(&tx, draft)?;
        tx.execute(
            "UPDATE recipes SET name = ?, image = ?, text = ?, cooking_time = ? WHERE id = ?",
            rusqlite::params![draft.name, draft.image, draft.text, draft.cooking_time, recipe_id],
        )?;
        tx.execute("DELETE FROM recipe_tags WHERE recipe_id = ?", [recipe_id])?;
        tx.execute("DELETE FROM ingredient_portions WHERE recipe_id = ?", [recipe_id])?;
        insert_recipe_links(&tx, recipe_id, draft)?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_recipe(&self, recipe_id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if !row_exists(&tx, "SELECT 1 FROM recipes WHERE id = ?", [recipe_id])? {
            return Err(Error::not_found(format!("recipe {recipe_id}")));
        }
        tx.execute("DELETE FROM favorites WHERE recipe_id = ?", [recipe_id])?;
        tx.execute("DELETE FROM carts WHERE recipe_id = ?", [recipe_id])?;
        tx.execute("DELETE FROM ingredient_portions WHERE recipe_id = ?", [recipe_id])?;
        tx.execute("DELETE FROM recipe_tags WHERE recipe_id = ?", [recipe_id])?;
        tx.execute("DELETE FROM recipes WHERE id = ?", [recipe_id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = ?"),
                [recipe_id],
                row_to_recipe,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn get_recipe_tags(&self, recipe_id: i64) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.id, t.name, t.color, t.slug
            FROM tags t
            JOIN recipe_tags rt ON rt.tag_id = t.id
            WHERE rt.recipe_id = ?
            ORDER BY t.name
            "#,
        )?;
        let tags = stmt
            .query_map([recipe_id], row_to_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    pub fn get_recipe_portions(&self, recipe_id: i64) -> Result<Vec<Portion>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT i.id, i.name, i.measurement_unit, p.amount
            FROM ingredient_portions p
            JOIN ingredients i ON i.id = p.ingredient_id
            WHERE p.recipe_id = ?
            ORDER BY p.id
            "#,
        )?;
        let portions = stmt
            .query_map([recipe_id], |row| {
                Ok(Portion {
                    ingredient_id: row.get(0)?,
                    name: row.get(1)?,
                    measurement_unit: row.get(2)?,
                    amount: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(portions)
    }

    pub fn list_recipes(&self, filters: &[RecipeFilter], viewer: Viewer) -> Result<Vec<Recipe>> {
        let query = filters::compile(filters, viewer, |_| "?".to_string());
        if query.matches_nothing {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r {} ORDER BY r.publish_time DESC, r.id DESC",
            query.where_sql()
        );
        debug!("Listing recipes: {}", sql);
        let mut stmt = self.conn.prepare(&sql)?;
        let recipes = stmt
            .query_map(rusqlite::params_from_iter(query.params.iter()), row_to_recipe)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(recipes)
    }

    pub fn count_favorites(&self, recipe_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM favorites WHERE recipe_id = ?",
            [recipe_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ========================================================================
    // Relation operations
    // ========================================================================

    pub fn add_relation(&self, kind: RelationKind, user_id: i64, target_id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if !row_exists(&tx, "SELECT 1 FROM users WHERE id = ?", [user_id])? {
            return Err(Error::not_found(format!("user {user_id}")));
        }
        let target_sql = if kind.targets_user() {
            "SELECT 1 FROM users WHERE id = ?"
        } else {
            "SELECT 1 FROM recipes WHERE id = ?"
        };
        if !row_exists(&tx, target_sql, [target_id])? {
            return Err(Error::not_found(kind.target_label(target_id)));
        }
        // The unique index still rejects a concurrent duplicate at insert time
        if kind.is_unique() && relation_exists(&tx, kind, user_id, target_id)? {
            return Err(Error::already_exists(kind.describe(user_id, target_id)));
        }

        let sql = format!(
            "INSERT INTO {} ({}, {}, added_at) VALUES (?, ?, ?)",
            kind.table(),
            kind.owner_column(),
            kind.target_column()
        );
        match tx.execute(&sql, rusqlite::params![user_id, target_id, now_timestamp()]) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::already_exists(kind.describe(user_id, target_id)))
            }
            Err(e) if is_check_violation(&e) && kind.targets_user() => {
                return Err(Error::SelfReference)
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove one relation row; the most recent one when a cart holds repeats.
    pub fn remove_relation(&self, kind: RelationKind, user_id: i64, target_id: i64) -> Result<()> {
        let sql = format!(
            "DELETE FROM {table} WHERE id IN (SELECT id FROM {table} WHERE {owner} = ? AND {target} = ? \
             ORDER BY added_at DESC, id DESC LIMIT 1)",
            table = kind.table(),
            owner = kind.owner_column(),
            target = kind.target_column()
        );
        let removed = self.conn.execute(&sql, rusqlite::params![user_id, target_id])?;
        if removed == 0 {
            return Err(Error::not_found(kind.describe(user_id, target_id)));
        }
        Ok(())
    }

    pub fn has_relation(&self, kind: RelationKind, user_id: i64, target_id: i64) -> Result<bool> {
        relation_exists(&self.conn, kind, user_id, target_id)
    }

    // ========================================================================
    // Shopping list
    // ========================================================================

    pub fn get_shopping_items(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT i.name, i.measurement_unit, SUM(p.amount) AS total_amount
            FROM carts c
            JOIN ingredient_portions p ON p.recipe_id = c.recipe_id
            JOIN ingredients i ON i.id = p.ingredient_id
            WHERE c.user_id = ?
            GROUP BY i.name, i.measurement_unit
            ORDER BY i.name, i.measurement_unit
            "#,
        )?;
        let items = stmt
            .query_map([user_id], |row| {
                Ok(ShoppingItem {
                    ingredient_name: row.get(0)?,
                    measurement_unit: row.get(1)?,
                    total_amount: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }
}

fn row_exists<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<bool> {
    let mut stmt = conn.prepare(sql)?;
    Ok(stmt.exists(params)?)
}

fn relation_exists(conn: &Connection, kind: RelationKind, user_id: i64, target_id: i64) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} = ? AND {} = ? LIMIT 1",
        kind.table(),
        kind.owner_column(),
        kind.target_column()
    );
    row_exists(conn, &sql, rusqlite::params![user_id, target_id])
}

/// Every tag and ingredient a draft points at must exist.
fn ensure_references(conn: &Connection, draft: &RecipeDraft) -> Result<()> {
    for tag_id in &draft.tags {
        if !row_exists(conn, "SELECT 1 FROM tags WHERE id = ?", [tag_id])? {
            return Err(Error::validation(format!("unknown tag {tag_id}")));
        }
    }
    for portion in &draft.ingredients {
        if !row_exists(conn, "SELECT 1 FROM ingredients WHERE id = ?", [portion.ingredient_id])? {
            return Err(Error::validation(format!(
                "unknown ingredient {}",
                portion.ingredient_id
            )));
        }
    }
    Ok(())
}

fn insert_recipe_links(conn: &Connection, recipe_id: i64, draft: &RecipeDraft) -> Result<()> {
    let mut tag_stmt = conn.prepare("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES (?, ?)")?;
    for tag_id in &draft.tags {
        tag_stmt.execute(rusqlite::params![recipe_id, tag_id])?;
    }
    let mut portion_stmt = conn.prepare(
        "INSERT INTO ingredient_portions (recipe_id, ingredient_id, amount) VALUES (?, ?, ?)",
    )?;
    for portion in &draft.ingredients {
        portion_stmt.execute(rusqlite::params![recipe_id, portion.ingredient_id, portion.amount])?;
    }
    Ok(())
}

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        constraint_code(err),
        Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

fn is_check_violation(err: &rusqlite::Error) -> bool {
    constraint_code(err) == Some(rusqlite::ffi::SQLITE_CONSTRAINT_CHECK)
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        is_admin: row.get(5)?,
        date_joined: row.get(6)?,
    })
}

fn row_to_recipe(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
    Ok(Recipe {
        id: row.get(0)?,
        author_id: row.get(1)?,
        name: row.get(2)?,
        image: row.get(3)?,
        text: row.get(4)?,
        cooking_time: row.get(5)?,
        publish_time: row.get(6)?,
    })
}

fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        slug: row.get(3)?,
    })
}

fn row_to_ingredient(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
    Ok(Ingredient {
        id: row.get(0)?,
        name: row.get(1)?,
        measurement_unit: row.get(2)?,
    })
}
