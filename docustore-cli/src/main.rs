//! `docustore-cli` — a small CLI over a [`docustore::Db`], grounded in the
//! teacher's `kvcli` binary's `clap`-derive + `colored`-gated-on-terminal
//! idiom, scoped down to this store's own operations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use docustore::engine::Engine;
use docustore::{payload, Condition, Db, DbConfig, Document};
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docustore-cli", author, version, about = "A typed, indexed document store CLI")]
struct Args {
    /// Path to an on-disk store. Omit to use an ephemeral in-memory store.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level for `tracing` diagnostics.
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Saves a document, creating or updating it.
    Put {
        namespace: String,
        id: String,
        /// JSON value to store as the document's payload.
        json: String,
        /// Unique key to attach, in `name` form; repeatable.
        #[arg(long = "unique", value_name = "NAME")]
        unique_keys: Vec<String>,
        /// Shared key to attach, in `name` form; repeatable.
        #[arg(long = "shared", value_name = "NAME")]
        shared_keys: Vec<String>,
    },
    /// Loads a document by id.
    Get { namespace: String, id: String },
    /// Deletes a document by id, ignoring its revision.
    Rm { namespace: String, id: String },
    /// Lists every document in a namespace.
    Ls { namespace: String },
    /// Lists documents matching a filter.
    Where {
        namespace: String,
        /// Comma-separated key names the document must carry.
        #[arg(long, value_delimiter = ',')]
        has_keys: Vec<String>,
        /// Comma-separated key names, any of which the document must hold
        /// as unique.
        #[arg(long = "unique-key-in", value_delimiter = ',')]
        unique_key_in: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&args.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.db {
        Some(path) => DbConfig::OnDisk(path.clone()),
        None => DbConfig::Memory,
    };
    let into_docustore_err = |e: anyhow::Error| docustore::Error::codec(e.to_string());
    config
        .open_with(
            |db| run(db, &args).map_err(into_docustore_err),
            |db| run(db, &args).map_err(into_docustore_err),
        )
        .context("running command")
}

fn run<E: Engine>(db: Db<E>, args: &Args) -> Result<()> {
    match &args.command {
        Command::Put { namespace, id, json, unique_keys, shared_keys } => {
            let value: serde_json::Value = serde_json::from_str(json).context("parsing JSON")?;
            let mut doc = Document::new(id.clone(), payload::encode(&value)?);
            for k in unique_keys {
                doc = doc.with_unique_key(k.clone());
            }
            for k in shared_keys {
                doc = doc.with_shared_key(k.clone());
            }
            let ns = db.namespace(namespace)?;
            let saved = ns.save(doc)?;
            print_document(&saved)?;
        }
        Command::Get { namespace, id } => {
            let ns = db.namespace(namespace)?;
            match ns.load(id)? {
                Some(doc) => print_document(&doc)?,
                None => {
                    eprintln!("{}: {id:?} not found in namespace {namespace:?}", "error".red());
                    std::process::exit(1);
                }
            }
        }
        Command::Rm { namespace, id } => {
            let ns = db.namespace(namespace)?;
            ns.delete_by_id(id)?;
        }
        Command::Ls { namespace } => {
            let ns = db.namespace(namespace)?;
            let mut first = true;
            ns.fetch_all(|doc| {
                if !first {
                    println!();
                }
                first = false;
                let _ = print_document(&doc);
                Ok(true)
            })?;
        }
        Command::Where { namespace, has_keys, unique_key_in } => {
            let ns = db.namespace(namespace)?;
            let mut conditions = Vec::<Condition>::new();
            if !has_keys.is_empty() {
                conditions.push(docustore::has_keys(has_keys.clone()));
            }
            if !unique_key_in.is_empty() {
                conditions.push(docustore::has_unique_key_in(unique_key_in.clone()));
            }
            let mut first = true;
            ns.fetch_where(conditions, |doc| {
                if !first {
                    println!();
                }
                first = false;
                let _ = print_document(&doc);
                Ok(true)
            })?;
        }
    }
    Ok(())
}

fn print_document(doc: &Document) -> Result<()> {
    let body = serde_json::json!({
        "id": doc.id,
        "revision": doc.revision,
        "keys": doc.keys,
        "headers": doc.headers,
        "created_at": doc.created_at,
        "updated_at": doc.updated_at,
        "content": payload_as_json(doc),
    });
    let rendered = serde_json::to_string_pretty(&body)?;
    if std::io::stdout().is_terminal() {
        println!("{}", rendered.green());
    } else {
        println!("{rendered}");
    }
    Ok(())
}

fn payload_as_json(doc: &Document) -> serde_json::Value {
    payload::decode::<serde_json::Value>(&doc.content)
        .unwrap_or_else(|_| serde_json::Value::String(format!("<{} payload>", doc.content.tag)))
}
