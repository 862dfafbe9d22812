// Copyright (c) 2025 nnsearch Contributors
// Licensed under the nnsearch License. See LICENSE file for details.

//! nnsearch Command-Line Interface
//!
//! Build, inspect and query nearest-neighbour indices over word-vector files
//! (`word v1 v2 ...` per line).
//!
//! # Commands
//!
//! - `build` - Build an index over a data file and save it
//! - `info` - Display an index file's header
//! - `query` - Find the nearest rows to a vector
//! - `nearest` - Interactive nearest-word lookup with a cached index

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use nnsearch::{
    AutotunedParams, CenterInit, Checks, CompositeParams, Delimiter, IndexBuilder, IndexParams,
    KMeansParams, KdTreeParams, LshParams, WordTable, WordVectors,
};
use tracing_subscriber::EnvFilter;

/// nnsearch CLI - approximate nearest-neighbour search over vector files
#[derive(Parser, Debug)]
#[command(name = "nnsearch")]
#[command(author, version, about = "Approximate nearest-neighbour search CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build an index over a data file
    Build {
        /// Word-vector data file
        data: String,
        /// Where to write the index
        output: String,
        /// Data file is tab-delimited
        #[arg(long)]
        tsv: bool,
        #[command(flatten)]
        family: FamilyArgs,
    },
    /// Show index file info
    Info {
        /// Path to index file
        path: String,
    },
    /// Query an index with a single vector
    Query {
        /// Word-vector data file the index was built over
        data: String,
        /// Path to index file
        index: String,
        /// Query vector as comma-separated floats
        #[arg(short, long)]
        vector: String,
        /// Number of neighbours to return
        #[arg(short, default_value = "10")]
        k: usize,
        /// Search budget: a number, "unlimited" or "auto"
        #[arg(short, long, default_value = "32")]
        checks: String,
        /// Data file is tab-delimited
        #[arg(long)]
        tsv: bool,
    },
    /// Interactive nearest-word lookup (reads words from stdin)
    Nearest {
        /// Word-vector data file
        data: String,
        /// Data file is tab-delimited
        #[arg(long)]
        tsv: bool,
        /// Number of words to print per lookup
        #[arg(short, default_value = "10")]
        n: usize,
        #[command(flatten)]
        family: FamilyArgs,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FamilyArg {
    Linear,
    Kdtree,
    Kmeans,
    Composite,
    Lsh,
    Autotuned,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InitArg {
    Random,
    Gonzales,
    Kmeanspp,
}

/// Index family and its parameters. Unset values keep the library defaults.
#[derive(Args, Debug)]
struct FamilyArgs {
    /// Index family
    #[arg(short, long, value_enum, default_value = "kdtree")]
    family: FamilyArg,
    /// kd-trees in the forest (kdtree, composite)
    #[arg(long)]
    trees: Option<usize>,
    /// Clusters per k-means node (kmeans, composite)
    #[arg(long)]
    branching: Option<usize>,
    /// Lloyd iterations per node, 0 = until convergence (kmeans, composite)
    #[arg(long)]
    iterations: Option<usize>,
    /// Initial center policy (kmeans, composite)
    #[arg(long, value_enum)]
    centers_init: Option<InitArg>,
    /// Cluster-boundary weight (kmeans, composite)
    #[arg(long)]
    cb_index: Option<f64>,
    /// Hash tables (lsh)
    #[arg(long)]
    tables: Option<usize>,
    /// Bits per hash key (lsh)
    #[arg(long)]
    key_size: Option<usize>,
    /// Hamming radius probed (lsh)
    #[arg(long)]
    probe_level: Option<usize>,
    /// Required recall (autotuned)
    #[arg(long)]
    target_precision: Option<f64>,
    /// Build-time weight (autotuned)
    #[arg(long)]
    build_weight: Option<f64>,
    /// Memory weight (autotuned)
    #[arg(long)]
    memory_weight: Option<f64>,
    /// Fraction of rows sampled for tuning (autotuned)
    #[arg(long)]
    sample_fraction: Option<f64>,
    /// Seed for randomized construction
    #[arg(long)]
    seed: Option<u64>,
}

impl FamilyArgs {
    fn params(&self) -> IndexParams {
        let kmeans = || {
            let mut p = KMeansParams::default();
            if let Some(b) = self.branching {
                p = p.branching(b);
            }
            if let Some(i) = self.iterations {
                p = p.iterations(i);
            }
            if let Some(init) = self.centers_init {
                p = p.centers_init(init.into());
            }
            if let Some(cb) = self.cb_index {
                p = p.cb_index(cb);
            }
            p
        };

        match self.family {
            FamilyArg::Linear => IndexParams::Linear,
            FamilyArg::Kdtree => {
                IndexParams::KdTree(KdTreeParams::default().trees(self.trees.unwrap_or(4)))
            }
            FamilyArg::Kmeans => IndexParams::KMeans(kmeans()),
            FamilyArg::Composite => {
                let km = kmeans();
                IndexParams::Composite(CompositeParams {
                    trees: self.trees.unwrap_or(CompositeParams::default().trees),
                    branching: km.branching,
                    iterations: km.iterations,
                    centers_init: km.centers_init,
                    cb_index: km.cb_index,
                })
            }
            FamilyArg::Lsh => {
                let mut p = LshParams::default();
                if let Some(t) = self.tables {
                    p = p.table_count(t);
                }
                if let Some(bits) = self.key_size {
                    p = p.key_size(bits);
                }
                if let Some(level) = self.probe_level {
                    p = p.multi_probe_level(level);
                }
                IndexParams::Lsh(p)
            }
            FamilyArg::Autotuned => {
                let mut p = AutotunedParams::default();
                if let Some(t) = self.target_precision {
                    p = p.target_precision(t);
                }
                if let Some(w) = self.build_weight {
                    p = p.build_weight(w);
                }
                if let Some(w) = self.memory_weight {
                    p = p.memory_weight(w);
                }
                if let Some(f) = self.sample_fraction {
                    p = p.sample_fraction(f);
                }
                IndexParams::Autotuned(p)
            }
        }
    }

    fn builder(&self) -> IndexBuilder {
        let builder = IndexBuilder::new(self.params());
        match self.seed {
            Some(seed) => builder.seed(seed),
            None => builder,
        }
    }
}

impl From<InitArg> for CenterInit {
    fn from(arg: InitArg) -> Self {
        match arg {
            InitArg::Random => CenterInit::Random,
            InitArg::Gonzales => CenterInit::Gonzales,
            InitArg::Kmeanspp => CenterInit::KMeansPP,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build {
            data,
            output,
            tsv,
            family,
        } => cmd_build(&data, &output, tsv, &family),
        Commands::Info { path } => cmd_info(&path),
        Commands::Query {
            data,
            index,
            vector,
            k,
            checks,
            tsv,
        } => cmd_query(&data, &index, &vector, k, &checks, tsv),
        Commands::Nearest {
            data,
            tsv,
            n,
            family,
        } => cmd_nearest(&data, tsv, n, &family),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn delimiter(tsv: bool) -> Delimiter {
    if tsv {
        Delimiter::Tab
    } else {
        Delimiter::Whitespace
    }
}

fn require_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        return Err(format!("File not found: {}", path).into());
    }
    Ok(())
}

/// Build and save an index
fn cmd_build(
    data: &str,
    output: &str,
    tsv: bool,
    family: &FamilyArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    require_file(data)?;
    let table = WordTable::from_text(data, delimiter(tsv))?;

    let start = Instant::now();
    let index = family.builder().build(table.dataset())?;
    let elapsed = start.elapsed();
    nnsearch::save(&index, output)?;

    println!("Index: {}", output);
    println!("Family: {}", index.family());
    println!("Points: {} x {}", index.rows(), index.dim());
    println!("Build time: {:.2} ms", elapsed.as_secs_f64() * 1000.0);
    println!(
        "Memory: {} bytes ({:.2} KB)",
        index.memory_bytes(),
        index.memory_bytes() as f64 / 1024.0
    );
    if let Some(tuning) = index.tuning() {
        println!(
            "Tuning: recall {:.3} (target {:.3}), checks {}, {} candidates over {} sampled rows",
            tuning.recall,
            tuning.target_precision,
            tuning
                .checks
                .map_or_else(|| "n/a".to_string(), |c| c.to_string()),
            tuning.candidates,
            tuning.sample_rows
        );
    }
    Ok(())
}

/// Display index file header
fn cmd_info(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    require_file(path)?;
    let header = nnsearch::inspect(path)?;
    let file_size = std::fs::metadata(path)?.len();

    println!("Index: {}", path);
    println!(
        "File size: {} bytes ({:.2} KB)",
        file_size,
        file_size as f64 / 1024.0
    );
    println!("Format version: {}", header.version);
    println!("Family: {}", header.family);
    println!("Dimension: {}", header.dim);
    println!("Rows: {}", header.rows);
    println!("Payload: {} bytes", header.payload_len);
    Ok(())
}

fn parse_checks(text: &str) -> Result<Checks, Box<dyn std::error::Error>> {
    match text.to_lowercase().as_str() {
        "unlimited" | "all" => Ok(Checks::Unlimited),
        "auto" | "autotuned" => Ok(Checks::Autotuned),
        n => n
            .parse::<usize>()
            .map(Checks::Limited)
            .map_err(|_| {
                format!("Invalid checks: {}. Use a number, unlimited or auto", text).into()
            }),
    }
}

/// Query an index with one vector
fn cmd_query(
    data: &str,
    index_path: &str,
    vector: &str,
    k: usize,
    checks: &str,
    tsv: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    require_file(data)?;
    require_file(index_path)?;

    let query: Vec<f64> = vector
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| "Invalid query vector format. Use comma-separated floats.")?;
    let checks = parse_checks(checks)?;

    let table = WordTable::from_text(data, delimiter(tsv))?;
    let index = nnsearch::load(index_path, table.dataset())?;

    let start = Instant::now();
    let hits = index.knn(&query, k, checks)?;
    let elapsed = start.elapsed();

    println!(
        "Search results ({}) in {:.3} ms:",
        hits.len(),
        elapsed.as_secs_f64() * 1000.0
    );
    println!("{:<8} {:<30} {:<12}", "Row", "Word", "Distance");
    println!("{}", "-".repeat(52));
    for hit in &hits {
        println!(
            "{:<8} {:<30} {:.6}",
            hit.index,
            table.words()[hit.index],
            hit.distance
        );
    }
    Ok(())
}

/// Interactive nearest-word lookup
fn cmd_nearest(
    data: &str,
    tsv: bool,
    n: usize,
    family: &FamilyArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    require_file(data)?;
    let words = WordVectors::open_with(data, &family.builder(), delimiter(tsv))?;
    println!(
        "Loaded {} words. Enter a word (empty line to quit).",
        words.len()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();
    loop {
        print!("> ");
        stdout.flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let word = line.trim();
        if word.is_empty() {
            break;
        }

        let near = words.nearest(word, n)?;
        if near.is_empty() {
            println!("Unknown word: {}", word);
            continue;
        }
        for (other, distance) in &near {
            println!("  {:<30} {:.6}", other, distance);
        }
    }
    Ok(())
}
