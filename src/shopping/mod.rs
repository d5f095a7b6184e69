//! Shopping list documents: rendering and writing to disk.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::config::ShoppingConfig;
use crate::db::{Database, ShoppingItem, ShoppingList};
use crate::error::{Error, Result};

/// Export format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// The downloadable plain text list
    #[default]
    Text,
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Text => "txt",
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Text => "text",
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Text => "text/plain; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ExportFormat::Text),
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::validation(format!(
                "unknown shopping list format {other:?}, expected text, json or csv"
            ))),
        }
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    username: &'a str,
    email: &'a str,
    items: &'a [ShoppingItem],
}

/// Render a shopping list in the given format.
pub fn render(list: &ShoppingList, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Text => Ok(list.render_text().into_bytes()),
        ExportFormat::Json => {
            let doc = JsonDocument {
                username: &list.user.username,
                email: &list.user.email,
                items: &list.items,
            };
            Ok(serde_json::to_vec_pretty(&doc)?)
        }
        ExportFormat::Csv => render_csv(&list.items),
    }
}

fn render_csv(items: &[ShoppingItem]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["ingredient", "measurement_unit", "total_amount"])?;
    for item in items {
        let total = item.total_amount.to_string();
        wtr.write_record([
            item.ingredient_name.as_str(),
            item.measurement_unit.as_str(),
            total.as_str(),
        ])?;
    }
    wtr.flush()?;
    wtr.into_inner().map_err(|e| Error::Io(e.into_error()))
}

/// Compute the user's shopping list and write it to `output_path`.
/// Returns the number of distinct ingredients written.
pub fn export_shopping_list(
    db: &Database,
    user_id: i64,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize> {
    let list = db.compute_shopping_list(user_id)?;
    let content = render(&list, format)?;
    std::fs::write(output_path, content)?;

    info!(
        user_id,
        items = list.items.len(),
        "Exported shopping list as {} to {:?}",
        format.name(),
        output_path
    );
    Ok(list.items.len())
}

/// File name for the `Content-Disposition` header of a download.
pub fn attachment_filename(config: &ShoppingConfig, format: ExportFormat) -> String {
    format!("{}.{}", config.filename, format.extension())
}
