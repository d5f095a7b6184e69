//! PostgreSQL backend implementation.

use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{GenericClient, NoTls};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use tracing::debug;

use super::catalog::{Ingredient, NewIngredient, NewTag, Tag};
use super::filters::{self, RecipeFilter, SqlValue, Viewer, RECIPE_COLUMNS};
use super::now_timestamp;
use super::postgres_schema::POSTGRES_SCHEMA;
use super::recipes::{Portion, Recipe, RecipeDraft};
use super::relations::RelationKind;
use super::shopping::ShoppingItem;
use super::users::{AuthorSummary, NewUser, User};
use crate::error::{Error, Result};

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

pub struct PgDb {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PgDb {
    pub fn open(url: &str, pool_size: u32) -> Result<Self> {
        let config: postgres::Config = url.parse()?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder().max_size(pool_size).build(manager)?;
        Ok(Self { pool })
    }

    pub fn initialize(&self) -> Result<()> {
        let mut client = self.pool.get()?;
        client.batch_execute(POSTGRES_SCHEMA)?;
        Ok(())
    }

    // ========================================================================
    // User operations
    // ========================================================================

    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        if row_exists(&mut tx, "SELECT 1 FROM users WHERE email = $1", &[&user.email])? {
            return Err(Error::already_exists(format!("user with email {}", user.email)));
        }
        if row_exists(&mut tx, "SELECT 1 FROM users WHERE username = $1", &[&user.username])? {
            return Err(Error::already_exists(format!("user with username {}", user.username)));
        }
        let inserted = tx.query_one(
            r#"
            INSERT INTO users (email, username, first_name, last_name, is_admin, date_joined)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
            &[
                &user.email,
                &user.username,
                &user.first_name,
                &user.last_name,
                &user.is_admin,
                &now_timestamp(),
            ],
        );
        let id: i64 = match inserted {
            Ok(row) => row.get(0),
            Err(e) if has_state(&e, &SqlState::UNIQUE_VIOLATION) => {
                return Err(Error::already_exists(format!("user {}", user.email)))
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit()?;
        Ok(id)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            "SELECT id, email, username, first_name, last_name, is_admin, date_joined FROM users WHERE id = $1",
            &[&user_id],
        )?;
        Ok(row.as_ref().map(row_to_user))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            "SELECT id, email, username, first_name, last_name, is_admin, date_joined FROM users WHERE email = $1",
            &[&email],
        )?;
        Ok(row.as_ref().map(row_to_user))
    }

    pub fn delete_user(&self, user_id: i64) -> Result<usize> {
        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        if !row_exists(&mut tx, "SELECT 1 FROM users WHERE id = $1", &[&user_id])? {
            return Err(Error::not_found(format!("user {user_id}")));
        }
        tx.execute(
            "DELETE FROM favorites WHERE user_id = $1 OR recipe_id IN (SELECT id FROM recipes WHERE author_id = $1)",
            &[&user_id],
        )?;
        tx.execute(
            "DELETE FROM carts WHERE user_id = $1 OR recipe_id IN (SELECT id FROM recipes WHERE author_id = $1)",
            &[&user_id],
        )?;
        tx.execute(
            "DELETE FROM ingredient_portions WHERE recipe_id IN (SELECT id FROM recipes WHERE author_id = $1)",
            &[&user_id],
        )?;
        tx.execute(
            "DELETE FROM recipe_tags WHERE recipe_id IN (SELECT id FROM recipes WHERE author_id = $1)",
            &[&user_id],
        )?;
        let recipes = tx.execute("DELETE FROM recipes WHERE author_id = $1", &[&user_id])?;
        tx.execute(
            "DELETE FROM subscriptions WHERE follower_id = $1 OR author_id = $1",
            &[&user_id],
        )?;
        tx.execute("DELETE FROM users WHERE id = $1", &[&user_id])?;
        tx.commit()?;
        Ok(recipes as usize)
    }

    pub fn list_subscriptions(
        &self,
        follower_id: i64,
        recipes_limit: Option<usize>,
    ) -> Result<Vec<AuthorSummary>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            r#"
            SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.is_admin, u.date_joined,
                   (SELECT COUNT(*) FROM recipes r WHERE r.author_id = u.id) AS recipes_count
            FROM subscriptions s
            JOIN users u ON u.id = s.author_id
            WHERE s.follower_id = $1
            ORDER BY u.username
            "#,
            &[&follower_id],
        )?;

        // LIMIT NULL is unbounded
        let limit = recipes_limit.map(|n| n as i64);
        let recipes_sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.author_id = $1 \
             ORDER BY r.publish_time DESC, r.id DESC LIMIT $2"
        );
        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let author = row_to_user(row);
            let recipes = client
                .query(recipes_sql.as_str(), &[&author.id, &limit])?
                .iter()
                .map(row_to_recipe)
                .collect();
            summaries.push(AuthorSummary {
                author,
                recipes,
                recipes_count: row.get(7),
            });
        }
        Ok(summaries)
    }

    // ========================================================================
    // Reference data operations
    // ========================================================================

    pub fn create_ingredient(&self, ingredient: &NewIngredient) -> Result<i64> {
        let mut client = self.pool.get()?;
        let inserted = client.query_one(
            "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING id",
            &[&ingredient.name, &ingredient.measurement_unit],
        );
        match inserted {
            Ok(row) => Ok(row.get(0)),
            Err(e) if has_state(&e, &SqlState::UNIQUE_VIOLATION) => Err(Error::already_exists(
                format!("ingredient {} ({})", ingredient.name, ingredient.measurement_unit),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn insert_ingredients(&self, ingredients: &[NewIngredient]) -> Result<usize> {
        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        let stmt = tx.prepare(
            "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )?;
        let mut inserted = 0;
        for ingredient in ingredients {
            inserted += tx.execute(&stmt, &[&ingredient.name, &ingredient.measurement_unit])?;
        }
        tx.commit()?;
        Ok(inserted as usize)
    }

    pub fn get_ingredient(&self, ingredient_id: i64) -> Result<Option<Ingredient>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            "SELECT id, name, measurement_unit FROM ingredients WHERE id = $1",
            &[&ingredient_id],
        )?;
        Ok(row.as_ref().map(row_to_ingredient))
    }

    pub fn get_all_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            "SELECT id, name, measurement_unit FROM ingredients ORDER BY name, id",
            &[],
        )?;
        Ok(rows.iter().map(row_to_ingredient).collect())
    }

    pub fn search_ingredients(&self, prefix: &str) -> Result<Vec<Ingredient>> {
        let pattern = filters::prefix_pattern(prefix);
        let mut client = self.pool.get()?;
        let rows = client.query(
            r#"
            SELECT id, name, measurement_unit
            FROM ingredients
            WHERE name ILIKE $1 ESCAPE '\'
            ORDER BY name, id
            "#,
            &[&pattern],
        )?;
        Ok(rows.iter().map(row_to_ingredient).collect())
    }

    pub fn create_tag(&self, tag: &NewTag) -> Result<i64> {
        let mut client = self.pool.get()?;
        let inserted = client.query_one(
            "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING id",
            &[&tag.name, &tag.color, &tag.slug],
        );
        match inserted {
            Ok(row) => Ok(row.get(0)),
            Err(e) if has_state(&e, &SqlState::UNIQUE_VIOLATION) => Err(Error::already_exists(
                format!("tag with name {}, color {} or slug {}", tag.name, tag.color, tag.slug),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn insert_tags(&self, tags: &[NewTag]) -> Result<usize> {
        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        let stmt = tx.prepare(
            "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )?;
        let mut inserted = 0;
        for tag in tags {
            inserted += tx.execute(&stmt, &[&tag.name, &tag.color, &tag.slug])?;
        }
        tx.commit()?;
        Ok(inserted as usize)
    }

    pub fn get_tag(&self, tag_id: i64) -> Result<Option<Tag>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            "SELECT id, name, color, slug FROM tags WHERE id = $1",
            &[&tag_id],
        )?;
        Ok(row.as_ref().map(row_to_tag))
    }

    pub fn get_tag_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            "SELECT id, name, color, slug FROM tags WHERE slug = $1",
            &[&slug],
        )?;
        Ok(row.as_ref().map(row_to_tag))
    }

    pub fn get_all_tags(&self) -> Result<Vec<Tag>> {
        let mut client = self.pool.get()?;
        let rows = client.query("SELECT id, name, color, slug FROM tags ORDER BY name", &[])?;
        Ok(rows.iter().map(row_to_tag).collect())
    }

    // ========================================================================
    // Recipe operations
    // ========================================================================

    pub fn create_recipe(&self, author_id: i64, draft: &RecipeDraft) -> Result<i64> {
        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        if !row_exists(&mut tx, "SELECT 1 FROM users WHERE id = $1", &[&author_id])? {
            return Err(Error::not_found(format!("user {author_id}")));
        }
        ensure_references(&mut tx, draft)?;
        let recipe_id: i64 = tx
            .query_one(
                r#"
                INSERT INTO recipes (author_id, name, image, text, cooking_time, publish_time)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id
                "#,
                &[
                    &author_id,
                    &draft.name,
                    &draft.image,
                    &draft.text,
                    &draft.cooking_time,
                    &now_timestamp(),
                ],
            )?
            .get(0);
        insert_recipe_links(&mut tx, recipe_id, draft)?;
        tx.commit()?;
        Ok(recipe_id)
    }

    pub fn update_recipe(&self, recipe_id: i64, draft: &RecipeDraft) -> Result<()> {
        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        if !row_exists(&mut tx, "SELECT 1 FROM recipes WHERE id = $1", &[&recipe_id])? {
            return Err(Error::not_found(format!("recipe {recipe_id}")));
        }
        ensure_references(&mut tx, draft)?;
        tx.execute(
            "UPDATE recipes SET name = $1, image = $2, text = $3, cooking_time = $4 WHERE id = $5",
            &[&draft.name, &draft.image, &draft.text, &draft.cooking_time, &recipe_id],
        )?;
        tx.execute("DELETE FROM recipe_tags WHERE recipe_id = $1", &[&recipe_id])?;
        tx.execute("DELETE FROM ingredient_portions WHERE recipe_id = $1", &[&recipe_id])?;
        insert_recipe_links(&mut tx, recipe_id, draft)?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_recipe(&self, recipe_id: i64) -> Result<()> {
        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        if !row_exists(&mut tx, "SELECT 1 FROM recipes WHERE id = $1", &[&recipe_id])? {
            return Err(Error::not_found(format!("recipe {recipe_id}")));
        }
        tx.execute("DELETE FROM favorites WHERE recipe_id = $1", &[&recipe_id])?;
        tx.execute("DELETE FROM carts WHERE recipe_id = $1", &[&recipe_id])?;
        tx.execute("DELETE FROM ingredient_portions WHERE recipe_id = $1", &[&recipe_id])?;
        tx.execute("DELETE FROM recipe_tags WHERE recipe_id = $1", &[&recipe_id])?;
        tx.execute("DELETE FROM recipes WHERE id = $1", &[&recipe_id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>> {
        let mut client = self.pool.get()?;
        let row = client.query_opt(
            format!("SELECT {RECIPE_COLUMNS} FROM recipes r WHERE r.id = $1").as_str(),
            &[&recipe_id],
        )?;
        Ok(row.as_ref().map(row_to_recipe))
    }

    pub fn get_recipe_tags(&self, recipe_id: i64) -> Result<Vec<Tag>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            r#"
            SELECT t.id, t.name, t.color, t.slug
            FROM tags t
            JOIN recipe_tags rt ON rt.tag_id = t.id
            WHERE rt.recipe_id = $1
            ORDER BY t.name
            "#,
            &[&recipe_id],
        )?;
        Ok(rows.iter().map(row_to_tag).collect())
    }

    pub fn get_recipe_portions(&self, recipe_id: i64) -> Result<Vec<Portion>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            r#"
            SELECT i.id, i.name, i.measurement_unit, p.amount
            FROM ingredient_portions p
            JOIN ingredients i ON i.id = p.ingredient_id
            WHERE p.recipe_id = $1
            ORDER BY p.id
            "#,
            &[&recipe_id],
        )?;
        Ok(rows
            .iter()
            .map(|row| Portion {
                ingredient_id: row.get(0),
                name: row.get(1),
                measurement_unit: row.get(2),
                amount: row.get(3),
            })
            .collect())
    }

    pub fn list_recipes(&self, filters: &[RecipeFilter], viewer: Viewer) -> Result<Vec<Recipe>> {
        let query = filters::compile(filters, viewer, |n| format!("${n}"));
        if query.matches_nothing {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes r {} ORDER BY r.publish_time DESC, r.id DESC",
            query.where_sql()
        );
        debug!("Listing recipes: {}", sql);
        let params: Vec<Box<dyn ToSql + Sync>> = query
            .params
            .iter()
            .map(|value| match value {
                SqlValue::Int(v) => Box::new(*v) as Box<dyn ToSql + Sync>,
                SqlValue::Text(v) => Box::new(v.clone()) as Box<dyn ToSql + Sync>,
            })
            .collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
        let mut client = self.pool.get()?;
        let rows = client.query(sql.as_str(), &param_refs)?;
        Ok(rows.iter().map(row_to_recipe).collect())
    }

    pub fn count_favorites(&self, recipe_id: i64) -> Result<i64> {
        let mut client = self.pool.get()?;
        let row = client.query_one(
            "SELECT COUNT(*) FROM favorites WHERE recipe_id = $1",
            &[&recipe_id],
        )?;
        Ok(row.get(0))
    }

    // ========================================================================
    // Relation operations
    // ========================================================================

    pub fn add_relation(&self, kind: RelationKind, user_id: i64, target_id: i64) -> Result<()> {
        let mut client = self.pool.get()?;
        let mut tx = client.transaction()?;
        if !row_exists(&mut tx, "SELECT 1 FROM users WHERE id = $1", &[&user_id])? {
            return Err(Error::not_found(format!("user {user_id}")));
        }
        let target_sql = if kind.targets_user() {
            "SELECT 1 FROM users WHERE id = $1"
        } else {
            "SELECT 1 FROM recipes WHERE id = $1"
        };
        if !row_exists(&mut tx, target_sql, &[&target_id])? {
            return Err(Error::not_found(kind.target_label(target_id)));
        }
        if kind.is_unique() && relation_exists(&mut tx, kind, user_id, target_id)? {
            return Err(Error::already_exists(kind.describe(user_id, target_id)));
        }

        let sql = format!(
            "INSERT INTO {} ({}, {}, added_at) VALUES ($1, $2, $3)",
            kind.table(),
            kind.owner_column(),
            kind.target_column()
        );
        match tx.execute(sql.as_str(), &[&user_id, &target_id, &now_timestamp()]) {
            Ok(_) => {}
            Err(e) if has_state(&e, &SqlState::UNIQUE_VIOLATION) => {
                return Err(Error::already_exists(kind.describe(user_id, target_id)))
            }
            Err(e) if has_state(&e, &SqlState::CHECK_VIOLATION) && kind.targets_user() => {
                return Err(Error::SelfReference)
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;
        Ok(())
    }

    pub fn remove_relation(&self, kind: RelationKind, user_id: i64, target_id: i64) -> Result<()> {
        let sql = format!(
            "DELETE FROM {table} WHERE id IN (SELECT id FROM {table} WHERE {owner} = $1 AND {target} = $2 \
             ORDER BY added_at DESC, id DESC LIMIT 1)",
            table = kind.table(),
            owner = kind.owner_column(),
            target = kind.target_column()
        );
        let mut client = self.pool.get()?;
        let removed = client.execute(sql.as_str(), &[&user_id, &target_id])?;
        if removed == 0 {
            return Err(Error::not_found(kind.describe(user_id, target_id)));
        }
        Ok(())
    }

    pub fn has_relation(&self, kind: RelationKind, user_id: i64, target_id: i64) -> Result<bool> {
        let mut client = self.pool.get()?;
        relation_exists(&mut *client, kind, user_id, target_id)
    }

    // ========================================================================
    // Shopping list
    // ========================================================================

    pub fn get_shopping_items(&self, user_id: i64) -> Result<Vec<ShoppingItem>> {
        let mut client = self.pool.get()?;
        let rows = client.query(
            r#"
            SELECT i.name, i.measurement_unit, SUM(p.amount) AS total_amount
            FROM carts c
            JOIN ingredient_portions p ON p.recipe_id = c.recipe_id
            JOIN ingredients i ON i.id = p.ingredient_id
            WHERE c.user_id = $1
            GROUP BY i.name, i.measurement_unit
            ORDER BY i.name, i.measurement_unit
            "#,
            &[&user_id],
        )?;
        Ok(rows
            .iter()
            .map(|row| ShoppingItem {
                ingredient_name: row.get(0),
                measurement_unit: row.get(1),
                total_amount: row.get(2),
            })
            .collect())
    }
}

fn has_state(err: &postgres::Error, state: &SqlState) -> bool {
    err.code() == Some(state)
}

fn row_exists<C: GenericClient>(client: &mut C, sql: &str, params: Params<'_>) -> Result<bool> {
    Ok(client.query_opt(sql, params)?.is_some())
}

fn relation_exists<C: GenericClient>(
    client: &mut C,
    kind: RelationKind,
    user_id: i64,
    target_id: i64,
) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} = $1 AND {} = $2 LIMIT 1",
        kind.table(),
        kind.owner_column(),
        kind.target_column()
    );
    row_exists(client, &sql, &[&user_id, &target_id])
}

fn ensure_references<C: GenericClient>(client: &mut C, draft: &RecipeDraft) -> Result<()> {
    for tag_id in &draft.tags {
        if !row_exists(client, "SELECT 1 FROM tags WHERE id = $1", &[tag_id])? {
            return Err(Error::validation(format!("unknown tag {tag_id}")));
        }
    }
    for portion in &draft.ingredients {
        if !row_exists(client, "SELECT 1 FROM ingredients WHERE id = $1", &[&portion.ingredient_id])? {
            return Err(Error::validation(format!(
                "unknown ingredient {}",
                portion.ingredient_id
            )));
        }
    }
    Ok(())
}

fn insert_recipe_links<C: GenericClient>(
    client: &mut C,
    recipe_id: i64,
    draft: &RecipeDraft,
) -> Result<()> {
    let tag_stmt = client.prepare("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES ($1, $2)")?;
    for tag_id in &draft.tags {
        client.execute(&tag_stmt, &[&recipe_id, tag_id])?;
    }
    let portion_stmt = client.prepare(
        "INSERT INTO ingredient_portions (recipe_id, ingredient_id, amount) VALUES ($1, $2, $3)",
    )?;
    for portion in &draft.ingredients {
        client.execute(&portion_stmt, &[&recipe_id, &portion.ingredient_id, &portion.amount])?;
    }
    Ok(())
}

fn row_to_user(row: &postgres::Row) -> User {
    User {
        id: row.get(0),
        email: row.get(1),
        username: row.get(2),
        first_name: row.get(3),
        last_name: row.get(4),
        is_admin: row.get(5),
        date_joined: row.get(6),
    }
}

fn row_to_recipe(row: &postgres::Row) -> Recipe {
    Recipe {
        id: row.get(0),
        author_id: row.get(1),
        name: row.get(2),
        image: row.get(3),
        text: row.get(4),
        cooking_time: row.get(5),
        publish_time: row.get(6),
    }
}

fn row_to_tag(row: &postgres::Row) -> Tag {
    Tag {
        id: row.get(0),
        name: row.get(1),
        color: row.get(2),
        slug: row.get(3),
    }
}

fn row_to_ingredient(row: &postgres::Row) -> Ingredient {
    Ingredient {
        id: row.get(0),
        name: row.get(1),
        measurement_unit: row.get(2),
    }
}
