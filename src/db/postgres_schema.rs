pub const POSTGRES_SCHEMA: &str = r#"
-- PostgreSQL schema for Foodgram

CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    is_admin BOOLEAN NOT NULL DEFAULT FALSE,
    date_joined TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ingredients (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    measurement_unit TEXT NOT NULL,
    UNIQUE (name, measurement_unit)
);

CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name);

CREATE TABLE IF NOT EXISTS tags (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    color TEXT NOT NULL UNIQUE,
    slug TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS recipes (
    id BIGSERIAL PRIMARY KEY,
    author_id BIGINT NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    image TEXT NOT NULL DEFAULT '',
    text TEXT NOT NULL,
    cooking_time INTEGER NOT NULL CHECK (cooking_time > 0),
    publish_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recipes_author ON recipes(author_id);
CREATE INDEX IF NOT EXISTS idx_recipes_publish_time ON recipes(publish_time);

CREATE TABLE IF NOT EXISTS recipe_tags (
    recipe_id BIGINT NOT NULL REFERENCES recipes(id),
    tag_id BIGINT NOT NULL REFERENCES tags(id),
    PRIMARY KEY (recipe_id, tag_id)
);

CREATE INDEX IF NOT EXISTS idx_recipe_tags_tag ON recipe_tags(tag_id);

CREATE TABLE IF NOT EXISTS ingredient_portions (
    id BIGSERIAL PRIMARY KEY,
    recipe_id BIGINT NOT NULL REFERENCES recipes(id),
    ingredient_id BIGINT NOT NULL REFERENCES ingredients(id),
    amount INTEGER NOT NULL CHECK (amount > 0),
    UNIQUE (recipe_id, ingredient_id)
);

CREATE INDEX IF NOT EXISTS idx_portions_ingredient ON ingredient_portions(ingredient_id);

CREATE TABLE IF NOT EXISTS favorites (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users(id),
    recipe_id BIGINT NOT NULL REFERENCES recipes(id),
    added_at TEXT NOT NULL,
    UNIQUE (user_id, recipe_id)
);

CREATE INDEX IF NOT EXISTS idx_favorites_recipe ON favorites(recipe_id);

CREATE TABLE IF NOT EXISTS carts (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users(id),
    recipe_id BIGINT NOT NULL REFERENCES recipes(id),
    added_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_carts_user ON carts(user_id);
CREATE INDEX IF NOT EXISTS idx_carts_recipe ON carts(recipe_id);

CREATE TABLE IF NOT EXISTS subscriptions (
    id BIGSERIAL PRIMARY KEY,
    follower_id BIGINT NOT NULL REFERENCES users(id),
    author_id BIGINT NOT NULL REFERENCES users(id),
    added_at TEXT NOT NULL,
    UNIQUE (follower_id, author_id),
    CHECK (follower_id <> author_id)
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_author ON subscriptions(author_id);
"#;
