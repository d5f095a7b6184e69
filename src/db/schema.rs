pub const SCHEMA: &str = r#"
-- Users: email is the login identifier
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    is_admin INTEGER NOT NULL DEFAULT 0,
    date_joined TEXT NOT NULL
);

-- Ingredients: reference data loaded from fixtures
CREATE TABLE IF NOT EXISTS ingredients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_lower TEXT NOT NULL,  -- Unicode lowercase of name; LIKE only folds ASCII
    measurement_unit TEXT NOT NULL,
    UNIQUE (name, measurement_unit)
);

CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name);
CREATE INDEX IF NOT EXISTS idx_ingredients_name_lower ON ingredients(name_lower);

-- Tags: every field is globally unique
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    color TEXT NOT NULL UNIQUE,  -- #RRGGBB
    slug TEXT NOT NULL UNIQUE
);

-- Recipes: owned by their author, deletes cascade explicitly in code
CREATE TABLE IF NOT EXISTS recipes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    image TEXT NOT NULL DEFAULT '',
    text TEXT NOT NULL,
    cooking_time INTEGER NOT NULL CHECK (cooking_time > 0),  -- minutes
    publish_time TEXT NOT NULL,
    FOREIGN KEY (author_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_recipes_author ON recipes(author_id);
CREATE INDEX IF NOT EXISTS idx_recipes_publish_time ON recipes(publish_time);

-- Recipe to tag mapping
CREATE TABLE IF NOT EXISTS recipe_tags (
    recipe_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (recipe_id, tag_id),
    FOREIGN KEY (recipe_id) REFERENCES recipes(id),
    FOREIGN KEY (tag_id) REFERENCES tags(id)
);

CREATE INDEX IF NOT EXISTS idx_recipe_tags_tag ON recipe_tags(tag_id);

-- Ingredient portions: how much of an ingredient a recipe needs
CREATE TABLE IF NOT EXISTS ingredient_portions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipe_id INTEGER NOT NULL,
    ingredient_id INTEGER NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    UNIQUE (recipe_id, ingredient_id),
    FOREIGN KEY (recipe_id) REFERENCES recipes(id),
    FOREIGN KEY (ingredient_id) REFERENCES ingredients(id)
);

CREATE INDEX IF NOT EXISTS idx_portions_ingredient ON ingredient_portions(ingredient_id);

-- Favorites: at most one per (user, recipe)
CREATE TABLE IF NOT EXISTS favorites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    recipe_id INTEGER NOT NULL,
    added_at TEXT NOT NULL,
    UNIQUE (user_id, recipe_id),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (recipe_id) REFERENCES recipes(id)
);

CREATE INDEX IF NOT EXISTS idx_favorites_recipe ON favorites(recipe_id);

-- Shopping cart: repeated (user, recipe) rows mean buying the recipe several times
CREATE TABLE IF NOT EXISTS carts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    recipe_id INTEGER NOT NULL,
    added_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (recipe_id) REFERENCES recipes(id)
);

CREATE INDEX IF NOT EXISTS idx_carts_user ON carts(user_id);
CREATE INDEX IF NOT EXISTS idx_carts_recipe ON carts(recipe_id);

-- Subscriptions: follower follows author, never themselves
CREATE TABLE IF NOT EXISTS subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    follower_id INTEGER NOT NULL,
    author_id INTEGER NOT NULL,
    added_at TEXT NOT NULL,
    UNIQUE (follower_id, author_id),
    CHECK (follower_id <> author_id),
    FOREIGN KEY (follower_id) REFERENCES users(id),
    FOREIGN KEY (author_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_author ON subscriptions(author_id);
"#;
