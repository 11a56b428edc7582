use blobmap::{BlobMap, BlobMapBuilder};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Error, ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Info(args) => run_info(args),
        Command::Sum(args) => run_sum(args),
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "blobmap utility for baking and inspecting multi-value maps",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bake a JSON key-value file into a blobmap and print basic information
    Info(InfoArgs),
    /// Sum every value of every key, comparing against a HashMap baseline
    Sum(SumArgs),
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Path to the source JSON file mapping keys to their values
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Initial number of buckets, must be a power of two
    #[arg(long, value_name = "COUNT", default_value_t = 16)]
    bucket_count: u32,

    /// Ratio of distinct keys to buckets that triggers growth
    #[arg(long, value_name = "RATIO", default_value_t = 0.75)]
    load_factor: f32,

    /// Optional override for the hash seed
    #[arg(long, value_name = "SEED", default_value_t = 0)]
    hash_seed: u64,
}

#[derive(clap::Args)]
struct InfoArgs {
    #[command(flatten)]
    build: BuildArgs,

    /// Optional key to look up in the blobmap
    #[arg(short, long)]
    key: Option<String>,

    /// Optional bucket index to inspect
    #[arg(short, long)]
    bucket: Option<usize>,
}

#[derive(clap::Args)]
struct SumArgs {
    #[command(flatten)]
    build: BuildArgs,

    /// Number of passes over all keys
    #[arg(long, default_value_t = 1)]
    rounds: usize,
}

fn run_info(args: InfoArgs) -> Result<()> {
    let entries: Vec<(String, Value)> = load_entries_from_json(&args.build.input)?;
    let map = bake(&args.build, entries)?;

    let json = serde_json::to_string_pretty(&map.info())
        .map_err(|e| Error::other(format!("Failed to format JSON: {e}")))?;
    println!("{}", json);

    if let Some(key) = args.key {
        println!("{}: {:?}", key, map.get_values_for_key(key.as_str()));
    }

    if let Some(bucket_index) = args.bucket {
        if bucket_index >= map.bucket_count() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "Bucket index {} out of range >= {}",
                    bucket_index,
                    map.bucket_count()
                ),
            ));
        }
        let entries: Vec<_> = map.bucket(bucket_index).iter().collect();
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| Error::other(format!("Failed to format JSON: {e}")))?;
        println!("Bucket {} entries:\n{}", bucket_index, json);
    }

    Ok(())
}

fn run_sum(args: SumArgs) -> Result<()> {
    let entries: Vec<(String, i64)> = load_entries_from_json(&args.build.input)?;
    let mut baseline: HashMap<String, Vec<i64>> = HashMap::new();
    for (key, value) in &entries {
        baseline.entry(key.clone()).or_default().push(*value);
    }

    let map = bake(&args.build, entries)?;
    let keys: Vec<&String> = map.keys().collect();

    for _ in 0..args.rounds {
        let start = Instant::now();
        let (count, sum) = keys
            .iter()
            .map(|key| map.get_values_for_key(*key))
            .fold((0usize, 0i64), |(count, sum), values| {
                (count + values.len(), values.iter().fold(sum, |s, v| s.wrapping_add(*v)))
            });
        println!("blobmap: {} values summing to {} in {:?}", count, sum, start.elapsed());

        let start = Instant::now();
        let (count, sum) = keys
            .iter()
            .filter_map(|key| baseline.get(*key))
            .fold((0usize, 0i64), |(count, sum), values| {
                (count + values.len(), values.iter().fold(sum, |s, v| s.wrapping_add(*v)))
            });
        println!("hashmap: {} values summing to {} in {:?}", count, sum, start.elapsed());
    }

    Ok(())
}

fn bake<V: Clone>(args: &BuildArgs, entries: Vec<(String, V)>) -> Result<BlobMap<String, V>> {
    if !args.bucket_count.is_power_of_two() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("bucket count {} is not a power of two", args.bucket_count),
        ));
    }
    if !(args.load_factor.is_finite() && args.load_factor > 0.0) {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("load factor {} must be finite and positive", args.load_factor),
        ));
    }
    let mut builder = BlobMapBuilder::new(args.bucket_count, args.load_factor)
        .with_hash_seed(args.hash_seed);
    builder.add_all(entries);
    Ok(builder.build())
}

/// A key's values: a single JSON value or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum KeyValues<V> {
    Many(Vec<V>),
    One(V),
}

#[derive(Deserialize)]
struct KeyRecord<V> {
    key: String,
    #[serde(alias = "value")]
    values: KeyValues<V>,
}

/// Accepted input layouts: `{"key": [v, ...]}` or `[{"key": k, "values": [v, ...]}]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum MultiValueInput<V> {
    Grouped(BTreeMap<String, KeyValues<V>>),
    Records(Vec<KeyRecord<V>>),
}

fn load_entries_from_json<V: DeserializeOwned>(path: &Path) -> Result<Vec<(String, V)>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let input: MultiValueInput<V> = serde_json::from_reader(reader).map_err(|e| {
        Error::new(
            ErrorKind::InvalidData,
            format!("Failed to parse JSON input: {e}"),
        )
    })?;
    let groups: Vec<(String, KeyValues<V>)> = match input {
        MultiValueInput::Grouped(map) => map.into_iter().collect(),
        MultiValueInput::Records(records) => records
            .into_iter()
            .map(|record| (record.key, record.values))
            .collect(),
    };

    let mut entries = Vec::new();
    for (key, values) in groups {
        match values {
            KeyValues::Many(values) => {
                entries.extend(values.into_iter().map(|v| (key.clone(), v)))
            }
            KeyValues::One(value) => entries.push((key, value)),
        }
    }
    Ok(entries)
}
