//! Typed read-path predicates and their translation to SQL.
//!
//! Both backends share the translation; they differ only in placeholder
//! syntax (`?` for SQLite, `$n` for PostgreSQL).

/// The user a read is performed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Viewer {
    /// Never has favorites, cart entries or subscriptions
    #[default]
    Anonymous,
    User(i64),
}

impl Viewer {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(*id),
        }
    }
}

/// A recipe listing filter. Multiple filters combine with AND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeFilter {
    /// Recipes carrying any of these tag slugs. An empty list does not filter.
    Tags(Vec<String>),
    Author(i64),
    /// Recipes the viewer has favorited
    Favorited,
    /// Recipes in the viewer's shopping cart
    InCart,
}

/// A bound SQL value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Int(i64),
    Text(String),
}

/// A WHERE clause with its parameters in placeholder order
#[derive(Debug, Default)]
pub(crate) struct RecipeQuery {
    pub clauses: Vec<String>,
    pub params: Vec<SqlValue>,
    /// Set when some predicate can never match, e.g. `Favorited` for an anonymous viewer
    pub matches_nothing: bool,
}

impl RecipeQuery {
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }
}

pub(crate) const RECIPE_COLUMNS: &str =
    "r.id, r.author_id, r.name, r.image, r.text, r.cooking_time, r.publish_time";

/// Translate filters into a WHERE clause over `recipes r`.
///
/// `placeholder` receives the 1-based position of the parameter.
pub(crate) fn compile(
    filters: &[RecipeFilter],
    viewer: Viewer,
    placeholder: impl Fn(usize) -> String,
) -> RecipeQuery {
    let mut query = RecipeQuery::default();

    for filter in filters {
        match filter {
            RecipeFilter::Tags(slugs) => {
                if slugs.is_empty() {
                    continue;
                }
                let marks: Vec<String> = slugs
                    .iter()
                    .map(|slug| {
                        query.params.push(SqlValue::Text(slug.clone()));
                        placeholder(query.params.len())
                    })
                    .collect();
                query.clauses.push(format!(
                    "r.id IN (SELECT rt.recipe_id FROM recipe_tags rt \
                     JOIN tags t ON t.id = rt.tag_id WHERE t.slug IN ({}))",
                    marks.join(", ")
                ));
            }
            RecipeFilter::Author(author_id) => {
                query.params.push(SqlValue::Int(*author_id));
                query
                    .clauses
                    .push(format!("r.author_id = {}", placeholder(query.params.len())));
            }
            RecipeFilter::Favorited | RecipeFilter::InCart => {
                let Some(user_id) = viewer.user_id() else {
                    query.matches_nothing = true;
                    continue;
                };
                let table = if *filter == RecipeFilter::Favorited {
                    "favorites"
                } else {
                    "carts"
                };
                query.params.push(SqlValue::Int(user_id));
                query.clauses.push(format!(
                    "r.id IN (SELECT x.recipe_id FROM {table} x WHERE x.user_id = {})",
                    placeholder(query.params.len())
                ));
            }
        }
    }

    query
}

/// LIKE pattern matching names that start with `prefix`, with `\` as escape character.
pub(crate) fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
