use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::PathBuf;

use foodgram::config::Config;
use foodgram::db::Database;
use foodgram::shopping::{self, ExportFormat};
use foodgram::{fixtures, logging};

enum Command {
    Init,
    Import {
        ingredients: Option<PathBuf>,
        tags: Option<PathBuf>,
    },
    ShoppingList {
        email: String,
        format: Option<ExportFormat>,
        output: Option<PathBuf>,
    },
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command_name = None;
    let mut ingredients = None;
    let mut tags = None;
    let mut email = None;
    let mut format = None;
    let mut output = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("foodgram {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => config_path = Some(PathBuf::from(value_of(&args, &mut i))),
            "--ingredients" => ingredients = Some(PathBuf::from(value_of(&args, &mut i))),
            "--tags" => tags = Some(PathBuf::from(value_of(&args, &mut i))),
            "--user" | "-u" => email = Some(value_of(&args, &mut i)),
            "--output" | "-o" => output = Some(PathBuf::from(value_of(&args, &mut i))),
            "--format" | "-f" => {
                let value = value_of(&args, &mut i);
                match value.parse::<ExportFormat>() {
                    Ok(f) => format = Some(f),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            name @ ("init" | "import" | "shopping-list") if command_name.is_none() => {
                command_name = Some(name.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let command = match command_name.as_deref() {
        Some("init") => Command::Init,
        Some("import") => Command::Import { ingredients, tags },
        Some("shopping-list") => match email {
            Some(email) => Command::ShoppingList {
                email,
                format,
                output,
            },
            None => {
                eprintln!("Error: shopping-list requires --user EMAIL");
                std::process::exit(1);
            }
        },
        _ => {
            print_help();
            std::process::exit(1);
        }
    };

    Args {
        config_path,
        command,
    }
}

/// Take the value following the flag at `args[*i]`.
fn value_of(args: &[String], i: &mut usize) -> String {
    if *i + 1 < args.len() {
        *i += 1;
        args[*i].clone()
    } else {
        eprintln!("Error: {} requires a value", args[*i]);
        std::process::exit(1);
    }
}

fn print_help() {
    println!(
        r#"foodgram - recipe sharing backend

USAGE:
    foodgram [OPTIONS] <COMMAND>

COMMANDS:
    init                        Create the database schema
    import                      Load ingredients and tags from JSON fixtures
        --ingredients PATH      Ingredient fixture (default from config)
        --tags PATH             Tag fixture (default from config)
    shopping-list               Print or save a user's shopping list
        --user, -u EMAIL        Whose cart to aggregate
        --format, -f FORMAT     text, json or csv (default from config)
        --output, -o PATH       Write to a file (or into a directory, using the
                                configured download name) instead of stdout

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    FOODGRAM_CONFIG     Path to config file (overrides default location)
    FOODGRAM_LOG        Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/foodgram/config.toml"#
    );
}

fn main() {
    if let Err(e) = run() {
        match e.downcast_ref::<foodgram::Error>() {
            Some(err) if err.is_user_facing() => eprintln!("Error: {}", err),
            _ => eprintln!("Error: {:?}", e),
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = parse_args();

    // journald on Linux, file fallback otherwise
    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.database)
        .context("Failed to open database")?
        .with_limits(config.recipes)?;
    db.initialize().context("Failed to initialize schema")?;

    match args.command {
        Command::Init => {
            println!("Database ready");
        }
        Command::Import { ingredients, tags } => {
            let import_all = ingredients.is_none() && tags.is_none();
            let ingredients = ingredients
                .or_else(|| import_all.then(|| config.fixtures.ingredients_path.clone()));
            let tags = tags.or_else(|| import_all.then(|| config.fixtures.tags_path.clone()));

            if let Some(path) = ingredients {
                let summary = fixtures::import_ingredients(&db, &path)
                    .with_context(|| format!("Failed to import ingredients from {}", path.display()))?;
                println!(
                    "Ingredients: {} read, {} inserted, {} already present",
                    summary.read,
                    summary.inserted,
                    summary.skipped()
                );
            }
            if let Some(path) = tags {
                let summary = fixtures::import_tags(&db, &path)
                    .with_context(|| format!("Failed to import tags from {}", path.display()))?;
                println!(
                    "Tags: {} read, {} inserted, {} already present",
                    summary.read,
                    summary.inserted,
                    summary.skipped()
                );
            }
        }
        Command::ShoppingList {
            email,
            format,
            output,
        } => {
            let user = db
                .get_user_by_email(&email)?
                .ok_or_else(|| anyhow!("No user with email {}", email))?;
            let format = format.unwrap_or(config.shopping.format);

            match output {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(shopping::attachment_filename(&config.shopping, format))
                    } else {
                        path
                    };
                    let count = shopping::export_shopping_list(&db, user.id, &path, format)?;
                    println!(
                        "Wrote {} ingredients to {} ({})",
                        count,
                        path.display(),
                        format.content_type()
                    );
                }
                None => {
                    let list = db.compute_shopping_list(user.id)?;
                    let content = shopping::render(&list, format)?;
                    std::io::stdout().write_all(&content)?;
                }
            }
        }
    }

    Ok(())
}
