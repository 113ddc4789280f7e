/*!
Statekeep CLI - Command-line interface for inspecting save payloads.

Lists, inspects, verifies, dumps and deletes save slots kept by
[`LocalFileStorage`].
*/

use anyhow::Context;
use clap::{Parser, Subcommand};
use statekeep_core::compression::codec_for;
use statekeep_core::payload::PayloadHeader;
use statekeep_core::{
    decode_payload, CompressionCodec, FormatStrategy, LocalFileStorage, SavePayload, Schema,
    SlotMetadata, StateError, StorageAdapter,
};
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "statekeep")]
#[command(about = "Inspect and manage statekeep save payloads")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the save slots
    #[arg(short, long, global = true, env = "STATEKEEP_SAVE_DIR", default_value = "./saves")]
    path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all save slots
    List,
    /// Show the header of a save slot
    Show {
        /// Slot name relative to the save directory
        slot: String,
    },
    /// Verify checksum, compression and encoding of a save slot
    Verify {
        /// Slot name relative to the save directory
        slot: String,
        /// Schema JSON file; compact payloads are only decoded with one
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },
    /// Decode a save slot and print its records as JSON
    Dump {
        /// Slot name relative to the save directory
        slot: String,
        /// Schema JSON file of the build that should read the save
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },
    /// Delete a save slot
    Delete {
        /// Slot name relative to the save directory
        slot: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct SlotInfo {
    #[tabled(rename = "Slot")]
    slot: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Saved")]
    saved: String,
    #[tabled(rename = "Encoding")]
    encoding: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Schema")]
    schema: String,
    #[tabled(rename = "Records")]
    records: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let storage = LocalFileStorage::with_base_dir(&cli.path);
    debug!(path = %cli.path.display(), "Using save directory");

    match cli.command {
        Commands::List => list_slots(&storage)?,
        Commands::Show { slot } => show_slot(&storage, &slot)?,
        Commands::Verify { slot, schema } => verify_slot(&storage, &slot, schema)?,
        Commands::Dump { slot, schema } => dump_slot(&storage, &slot, schema)?,
        Commands::Delete { slot, force } => delete_slot(&storage, &slot, force)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_payload(storage: &LocalFileStorage, slot: &str) -> Result<SavePayload, StateError> {
    let bytes = storage.load(slot)?;
    SavePayload::from_bytes(bytes)
}

fn list_slots(storage: &LocalFileStorage) -> Result<(), anyhow::Error> {
    let slots = storage.list()?;
    info!(count = slots.len(), "Listing save slots");

    let mut rows: Vec<SlotInfo> = slots
        .into_iter()
        .map(|slot| match read_payload(storage, &slot) {
            Ok(payload) => {
                let header = payload.header();
                let metadata = payload.metadata();
                SlotInfo {
                    title: metadata
                        .and_then(|m| m.title.clone())
                        .unwrap_or_else(|| "-".to_string()),
                    saved: metadata
                        .map(|m| format_timestamp(m.saved_at.timestamp()))
                        .unwrap_or_else(|| "-".to_string()),
                    encoding: format!("{:?}", header.encoding),
                    identity: format!("{:?}", header.identity_scheme),
                    schema: header.schema_id.to_string(),
                    records: header.record_count.to_string(),
                    size: format_size(payload.len() as u64),
                    slot,
                }
            }
            Err(e) => {
                warn!(slot = %slot, error = %e, "Not a readable save payload");
                SlotInfo {
                    slot,
                    title: "-".to_string(),
                    saved: "-".to_string(),
                    encoding: "-".to_string(),
                    identity: "-".to_string(),
                    schema: "-".to_string(),
                    records: "-".to_string(),
                    size: "unreadable".to_string(),
                }
            }
        })
        .collect();
    // newest first, unreadable slots last
    rows.sort_by(|a, b| b.saved.cmp(&a.saved));

    if rows.is_empty() {
        println!("No save slots found");
    } else {
        println!("{}", Table::new(rows));
    }

    Ok(())
}

fn print_header(
    slot: &str,
    header: &PayloadHeader,
    metadata: Option<&SlotMetadata>,
    len: usize,
) {
    println!("Save Slot: {slot}");
    if let Some(metadata) = metadata {
        if let Some(title) = &metadata.title {
            println!("  Title: {title}");
        }
        println!("  Saved: {}", format_timestamp(metadata.saved_at.timestamp()));
        if let Some(world) = &metadata.last_saved_world {
            println!("  World: {world}");
        }
    }
    println!("  Container Version: {}", header.format_version);
    println!("  Encoding: {:?}", header.encoding);
    println!("  Identity Scheme: {:?}", header.identity_scheme);
    println!("  Compression: {:?}", header.compression);
    println!("  Schema Version: {}", header.schema_id);
    println!("  Records: {}", header.record_count);
    println!("  Body: {}", format_size(u64::from(header.body_len)));
    println!("  Total: {}", format_size(len as u64));
}

fn show_slot(storage: &LocalFileStorage, slot: &str) -> Result<(), anyhow::Error> {
    let payload =
        read_payload(storage, slot).with_context(|| format!("Failed to read save slot '{slot}'"))?;
    print_header(slot, payload.header(), payload.metadata(), payload.len());
    match payload.checksum_hex() {
        Some(sum) => println!("  Checksum: {sum}"),
        None => println!("  Checksum: none"),
    }
    Ok(())
}

fn verify_slot(
    storage: &LocalFileStorage,
    slot: &str,
    schema_path: Option<PathBuf>,
) -> Result<(), anyhow::Error> {
    info!(slot, "Verifying save slot");

    let payload = match read_payload(storage, slot) {
        Ok(payload) => payload,
        Err(e) => {
            error!("✗ Failed to read save slot: {}", e);
            return Err(e.into());
        }
    };
    let header = payload.header();

    if header.has_checksum {
        if let Err(e) = payload.verify_integrity() {
            error!("✗ Integrity check failed: {}", e);
            return Err(anyhow::anyhow!("Integrity check failed for '{slot}'"));
        }
        println!("✓ Checksum matches");
    } else {
        println!("- No checksum recorded");
    }

    let body = codec_for(header.compression)
        .decompress(payload.body())
        .with_context(|| format!("Body of '{slot}' does not decompress"))?;
    println!("✓ Body decompresses ({})", format_size(body.len() as u64));

    if schema_path.is_none() && header.encoding == FormatStrategy::Compact {
        println!("- Compact body not decoded, pass --schema to check it");
        return Ok(());
    }
    let schema = load_schema(schema_path, header.schema_id)?;
    let stream = decode_payload(&payload, &schema)
        .with_context(|| format!("Body of '{slot}' does not decode"))?;
    println!(
        "✓ Decoded {} records with {} references",
        stream.groups.len(),
        stream.table.len()
    );
    Ok(())
}

/// Schema from a JSON file, or an empty schema at the payload's own version
fn load_schema(path: Option<PathBuf>, payload_version: u32) -> Result<Schema, anyhow::Error> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read schema {}", path.display()))?;
            Ok(Schema::from_json(&json)?)
        }
        None => Ok(Schema::new(payload_version.max(1))),
    }
}

fn dump_slot(
    storage: &LocalFileStorage,
    slot: &str,
    schema_path: Option<PathBuf>,
) -> Result<(), anyhow::Error> {
    let payload =
        read_payload(storage, slot).with_context(|| format!("Failed to read save slot '{slot}'"))?;

    let schema = load_schema(schema_path, payload.header().schema_id)?;

    let stream = decode_payload(&payload, &schema)
        .with_context(|| format!("Failed to decode save slot '{slot}'"))?;

    let document = serde_json::json!({
        "slot": slot,
        "schema_version": payload.header().schema_id,
        "metadata": payload.metadata(),
        "references": stream.table.entries(),
        "records": stream.groups,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

fn delete_slot(storage: &LocalFileStorage, slot: &str, force: bool) -> Result<(), anyhow::Error> {
    if !storage.exists(slot) {
        return Err(anyhow::anyhow!("Save slot '{slot}' does not exist"));
    }

    if !force {
        print!("Are you sure you want to delete save slot '{slot}'? (y/N): ");
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            println!("Deletion cancelled");
            return Ok(());
        }
    }

    storage.delete(slot)?;
    println!("✓ Save slot deleted successfully");
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
