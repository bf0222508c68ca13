use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use multirecall_core::{BuildConfig, IndexStore};

/// Inspect a finished multi-recall index: table counts and prefix walks.
#[derive(Parser)]
#[command(name = "inspect_index", version, about)]
struct Opts {
    /// Path to the index file
    index: PathBuf,

    /// Walk the trie from this prefix and resolve its entries
    #[clap(short, long)]
    walk: Option<String>,

    /// Maximum children printed per node
    #[clap(long, default_value_t = 20)]
    limit: usize,

    /// TOML config supplying the read-session defaults
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Read-mode mmap window bound in bytes, overriding the config
    /// (0 = unbounded)
    #[clap(long)]
    max_mmap: Option<u64>,
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    let config = match &opts.config {
        Some(path) => BuildConfig::load_toml(path)?,
        None => BuildConfig::default(),
    };
    let max_mmap = opts.max_mmap.unwrap_or(config.max_mmap);
    let store = IndexStore::open_read(&opts.index, max_mmap)?;

    let counts = store.counts()?;
    println!("{}", serde_json::to_string_pretty(&counts)?);

    if let Some(prefix) = &opts.walk {
        walk(&store, prefix, opts.limit)?;
    }
    Ok(())
}

fn walk(store: &IndexStore, prefix: &str, limit: usize) -> Result<()> {
    let Some(node) = store.find_radix_node(prefix)? else {
        println!("no node for prefix {prefix:?}");
        return Ok(());
    };
    println!(
        "node #{} weight={} child_count={} index_id={}",
        node.id, node.weight, node.child_count, node.index_id
    );

    if node.index_id != 0 {
        for dict_id in store.dict_ids_for_index(node.index_id)? {
            if let Some(entry) = store.get_dict_word(dict_id)? {
                println!(
                    "  entry #{} [{}] {} {}",
                    entry.id,
                    entry.dict,
                    entry.name,
                    serde_json::to_string(&entry.data)?
                );
            }
        }
    }

    for child_id in store.radix_children(node.id)?.into_iter().take(limit) {
        if let Some(child) = store.get_radix_node(child_id)? {
            println!(
                "  child #{} {:?} (weight {}, {} children)",
                child.id, child.hierarchy_key, child.weight, child.child_count
            );
        }
    }
    Ok(())
}
