use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use multirecall_core::{BuildConfig, IndexBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Build a multi-recall search index from a directory of dictionary files.
#[derive(Parser)]
#[command(name = "multirecall", version, about)]
struct Opts {
    /// Directory containing .csv dictionary files
    #[clap(short, long)]
    dict_dir: Option<PathBuf>,

    /// Output directory for the index file
    #[clap(short = 'o', long)]
    index_dir: Option<PathBuf>,

    /// Index file stem (default: current timestamp)
    #[clap(short = 'n', long)]
    index_name: Option<String>,

    /// Maximum masked chars per variant (0 disables masking)
    #[clap(long)]
    mask_count: Option<u32>,

    /// Affix-mining frequency floor
    #[clap(long)]
    min_freq: Option<u32>,

    /// Trailing-digit threshold (0 disables the rule)
    #[clap(long)]
    ending_digits: Option<u32>,

    /// Pinyin table TSV (falls back to the built-in table)
    #[clap(long)]
    pinyin_table: Option<PathBuf>,

    /// TOML config file; flags override its values
    #[clap(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();
    let mut config = match &opts.config {
        Some(path) => BuildConfig::load_toml(path)?,
        None => BuildConfig::default(),
    };
    if let Some(dict_dir) = opts.dict_dir {
        config.dict_dir = dict_dir;
    }
    if let Some(index_dir) = opts.index_dir {
        config.index_dir = index_dir;
    }
    if let Some(index_name) = opts.index_name {
        config.index_name = index_name;
    }
    if let Some(mask_count) = opts.mask_count {
        config.mask_count = mask_count;
    }
    if let Some(min_freq) = opts.min_freq {
        config.min_freq = min_freq;
    }
    if let Some(ending_digits) = opts.ending_digits {
        config.ending_digits = ending_digits;
    }
    if let Some(pinyin_table) = opts.pinyin_table {
        config.pinyin_table = Some(pinyin_table);
    }

    let report = IndexBuilder::new(config)?.build()?;
    info!(
        rows_read = report.rows_read,
        dict_words = report.dict_words,
        word_repeats = report.word_repeats,
        index_words = report.index_words,
        radix_nodes = report.radix_nodes,
        linked_parents = report.linked_parents,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "index created"
    );
    println!("{}", report.index_path.display());
    Ok(())
}
