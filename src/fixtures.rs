//! Loading reference data (ingredients, tags) from JSON fixture files.

use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

use crate::db::{Database, NewIngredient, NewTag};
use crate::error::Result;

/// Outcome of one fixture import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    /// Records in the file
    pub read: usize,
    /// Records that were not already present
    pub inserted: usize,
}

impl ImportSummary {
    pub fn skipped(&self) -> usize {
        self.read - self.inserted
    }
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Import `[{"name": .., "measurement_unit": ..}]`. Existing ingredients are skipped.
pub fn import_ingredients(db: &Database, path: &Path) -> Result<ImportSummary> {
    let records: Vec<NewIngredient> = read_records(path)?;
    let inserted = db.insert_ingredients(&records)?;
    let summary = ImportSummary {
        read: records.len(),
        inserted,
    };
    info!(
        read = summary.read,
        inserted = summary.inserted,
        "Imported ingredients from {:?}",
        path
    );
    Ok(summary)
}

/// Import `[{"name": .., "color": .., "slug": ..}]`. Existing tags are skipped.
pub fn import_tags(db: &Database, path: &Path) -> Result<ImportSummary> {
    let records: Vec<NewTag> = read_records(path)?;
    let inserted = db.insert_tags(&records)?;
    let summary = ImportSummary {
        read: records.len(),
        inserted,
    };
    info!(
        read = summary.read,
        inserted = summary.inserted,
        "Imported tags from {:?}",
        path
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

    #[test]
    fn test_import_ingredients_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ingredients.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "абрикосовое варенье", "measurement_unit": "г"},
                {"name": "flour", "measurement_unit": "g"},
                {"name": "flour", "measurement_unit": "kg"}
            ]"#,
        )
        .unwrap();
        let db = Database::open_in_memory().unwrap();

        let first = import_ingredients(&db, &path).unwrap();
        assert_eq!(first, ImportSummary { read: 3, inserted: 3 });

        let second = import_ingredients(&db, &path).unwrap();
        assert_eq!(second, ImportSummary { read: 3, inserted: 0 });
        assert_eq!(second.skipped(), 3);
        assert_eq!(db.get_all_ingredients().unwrap().len(), 3);
    }

    #[test]
    fn test_import_tags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tags.json");
        std::fs::write(
            &path,
            r##"[
                {"name": "Breakfast", "color": "#E26C2D", "slug": "breakfast"},
                {"name": "Lunch", "color": "#49B64E", "slug": "lunch"}
            ]"##,
        )
        .unwrap();
        let db = Database::open_in_memory().unwrap();

        assert_eq!(import_tags(&db, &path).unwrap().inserted, 2);
        assert_eq!(import_tags(&db, &path).unwrap().inserted, 0);
        assert!(db.get_tag_by_slug("lunch").unwrap().is_some());
    }

    #[test]
    fn test_import_rejects_malformed_records() {
        let dir = tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();

        let bad_color = dir.path().join("tags.json");
        std::fs::write(&bad_color, r#"[{"name": "Lunch", "color": "green", "slug": "lunch"}]"#)
            .unwrap();
        assert!(matches!(import_tags(&db, &bad_color), Err(Error::Validation(_))));
        assert!(db.get_all_tags().unwrap().is_empty());

        let not_json = dir.path().join("ingredients.json");
        std::fs::write(&not_json, "name,measurement_unit\nflour,g\n").unwrap();
        assert!(matches!(import_ingredients(&db, &not_json), Err(Error::Json(_))));

        let missing = dir.path().join("missing.json");
        assert!(matches!(import_ingredients(&db, &missing), Err(Error::Io(_))));
    }
}
