use clap::{Args, Parser, Subcommand, ValueEnum};
use splitnet::alphabet::{Alphabet, AmbiguityPolicy};
use splitnet::bitset::Bitset;
use splitnet::compare::CompareOptions;
use splitnet::distance::{DistanceMethod, distance_matrix};
use splitnet::equal_angle::EqualAngle;
use splitnet::error::{Result, SplitNetError};
use splitnet::filter::{DimensionFilter, greedy_compatible, greedy_weakly_compatible};
use splitnet::io::{
    read_fasta, read_trees, write_layout_tsv, write_matrix_tsv, write_network_tsv, write_splits_tsv,
};
use splitnet::median_joining::{MedianJoining, is_applicable};
use splitnet::model::ReversibleModel;
use splitnet::progress::NoProgress;
use splitnet::split::Split;
use splitnet::snapshot::TreeSnapshot;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

/// Split networks, sequence distances and haplotype networks.
#[derive(Parser, Debug)]
#[command(name = "splitnet", version, about = "Split-network workbench")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Only report warnings and errors
    #[arg(short = 'q', long = "quiet", global = true, default_value_t = false)]
    quiet: bool,

    /// More output (repeat for trace)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pairwise distance matrix (TSV) from a DNA FASTA alignment
    Distances(DistancesArgs),
    /// Equal-angle layout of a tree's split network
    Layout(LayoutArgs),
    /// Median-joining network from a FASTA alignment
    MedianJoining(MedianJoiningArgs),
    /// Filter the splits of a set of trees down to a drawable system
    Filter(FilterArgs),
}

#[derive(Args, Debug)]
struct DistancesArgs {
    /// FASTA alignment (optionally .gz)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output TSV (.gz compresses, - is stdout)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Distance model
    #[arg(short = 'm', long = "model", value_enum, default_value_t = ModelArg::Jc69)]
    model: ModelArg,

    /// Transition/transversion ratio for K2P and HKY85
    #[arg(long = "kappa", default_value_t = 2.0)]
    kappa: f64,

    /// Base frequencies A,C,G,T for F81 and HKY85 (default: equal)
    #[arg(long = "freqs", value_delimiter = ',', num_args = 4)]
    freqs: Option<Vec<f64>>,

    /// How ambiguity codes are counted
    #[arg(long = "ambiguity", value_enum, default_value_t = AmbiguityArg::Average)]
    ambiguity: AmbiguityArg,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModelArg {
    /// Uncorrected p-distance
    P,
    Jc69,
    K2p,
    F81,
    Hky85,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AmbiguityArg {
    Average,
    Ignore,
}

#[derive(Args, Debug)]
struct LayoutArgs {
    /// Newick or NEXUS tree file
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Which tree of the file to draw (1-based)
    #[arg(long = "tree", default_value_t = 1)]
    tree: usize,

    /// Output TSV with node coordinates and edges
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Draw every edge with unit length
    #[arg(long = "no-weights", default_value_t = false)]
    no_weights: bool,
}

#[derive(Args, Debug)]
struct MedianJoiningArgs {
    /// FASTA alignment (optionally .gz)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output TSV with haplotypes and links
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Tolerance for feasible links and medians
    #[arg(short = 'e', long = "epsilon", default_value_t = 0.0)]
    epsilon: f64,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Newick or NEXUS file with one or more trees on the same taxa
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output TSV of the kept splits (- is stdout)
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,

    #[arg(long = "method", value_enum, default_value_t = FilterArg::Dimension)]
    method: FilterArg,

    /// Dimension bound: kept incompatible cliques have at most this many + 1 splits
    #[arg(long = "max-dimension", default_value_t = 4)]
    max_dimension: usize,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FilterArg {
    Greedy,
    Weak,
    Dimension,
}

fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => log::LevelFilter::Warn,
        (false, 0) => log::LevelFilter::Info,
        (false, 1) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let t0 = Instant::now();
    let outcome = match cli.command {
        Command::Distances(args) => run_distances(&args),
        Command::Layout(args) => run_layout(&args),
        Command::MedianJoining(args) => run_median_joining(&args),
        Command::Filter(args) => run_filter(&args),
    };
    match outcome {
        Ok(()) => log::info!("Done in {:.3}s", t0.elapsed().as_secs_f64()),
        Err(e) if e.is_canceled() => {
            log::info!("Canceled");
            std::process::exit(130);
        }
        Err(e @ (SplitNetError::Io(_) | SplitNetError::Parse(_))) => {
            log::error!("{e}");
            std::process::exit(2);
        }
        Err(e) => {
            log::error!("{e}");
            std::process::exit(3);
        }
    }
}

fn build_model(args: &DistancesArgs) -> Result<DistanceMethod> {
    let freqs = match args.freqs.as_deref() {
        Some(&[a, c, g, t]) => [a, c, g, t],
        Some(other) => {
            return Err(SplitNetError::InvalidInput(format!(
                "expected 4 base frequencies, got {}",
                other.len()
            )));
        }
        None => [0.25; 4],
    };
    Ok(match args.model {
        ModelArg::P => DistanceMethod::Uncorrected,
        ModelArg::Jc69 => DistanceMethod::MaximumLikelihood(ReversibleModel::jc69()),
        ModelArg::K2p => DistanceMethod::MaximumLikelihood(ReversibleModel::k2p(args.kappa)?),
        ModelArg::F81 => DistanceMethod::MaximumLikelihood(ReversibleModel::f81(freqs)?),
        ModelArg::Hky85 => DistanceMethod::MaximumLikelihood(ReversibleModel::hky85(args.kappa, freqs)?),
    })
}

fn run_distances(args: &DistancesArgs) -> Result<()> {
    let (names, rows) = read_fasta(&args.input)?;
    log::info!("Read {} sequences of length {}", rows.len(), rows[0].len());

    let method = build_model(args)?;
    let policy = match args.ambiguity {
        AmbiguityArg::Average => AmbiguityPolicy::Average,
        AmbiguityArg::Ignore => AmbiguityPolicy::Ignore,
    };
    let options = CompareOptions::new().with_policy(policy);

    let t1 = Instant::now();
    log::info!("Determining distances for {} combinations", rows.len() * (rows.len() - 1) / 2);
    let matrix = distance_matrix(&Alphabet::dna(), &rows, &method, &options, &NoProgress)?;
    log::info!("Determining distances {:.3}s", t1.elapsed().as_secs_f64());

    write_matrix_tsv(&args.output, &names, &matrix.to_rows())
}

fn run_layout(args: &LayoutArgs) -> Result<()> {
    let trees = read_trees(&args.input)?;
    let (name, tree) = args
        .tree
        .checked_sub(1)
        .and_then(|k| trees.get(k))
        .ok_or_else(|| {
            SplitNetError::InvalidInput(format!("tree {} requested, file has {}", args.tree, trees.len()))
        })?;
    let snapshot = TreeSnapshot::from_tree(tree)?;
    log::info!("Tree '{name}': {} taxa, {} splits", snapshot.ntax(), snapshot.splits.len());

    let layout = EqualAngle::new(!args.no_weights).apply(&snapshot.splits, &NoProgress)?;
    log::info!(
        "Layout with {} nodes and {} edges",
        layout.network.node_count(),
        layout.network.edge_count()
    );
    write_layout_tsv(&args.output, &layout, &snapshot.names)
}

fn run_median_joining(args: &MedianJoiningArgs) -> Result<()> {
    let (names, rows) = read_fasta(&args.input)?;
    if !is_applicable(&rows) {
        return Err(SplitNetError::InvalidInput(
            "median joining needs fewer than 8 distinct character states".into(),
        ));
    }
    let network = MedianJoining::new(args.epsilon).apply(&rows, None, &NoProgress)?;
    let medians = network.node_ids().filter(|&v| network.node(v).is_median()).count();
    log::info!(
        "Network with {} haplotypes ({medians} medians) and {} links",
        network.node_count(),
        network.edge_count()
    );
    write_network_tsv(&args.output, &network, &names)
}

/// Splits of all trees, weighted by the fraction of trees containing them.
fn collect_tree_splits(snapshots: &[TreeSnapshot]) -> Result<Vec<Split>> {
    let ntax = snapshots[0].ntax();
    let mut order: Vec<Bitset> = Vec::new();
    let mut counts: HashMap<Bitset, usize> = HashMap::new();
    for (k, snap) in snapshots.iter().enumerate() {
        if snap.names != snapshots[0].names {
            return Err(SplitNetError::InvalidInput(format!(
                "tree {} has a different taxon set than tree 1",
                k + 1
            )));
        }
        for split in snap.splits.iter() {
            let count = counts.entry(split.part().clone()).or_insert_with(|| {
                order.push(split.part().clone());
                0
            });
            *count += 1;
        }
    }
    let total = snapshots.len() as f64;
    order
        .into_iter()
        .map(|part| {
            let weight = counts[&part] as f64 / total;
            Split::new(ntax, part, weight)
        })
        .collect()
}

fn run_filter(args: &FilterArgs) -> Result<()> {
    let trees = read_trees(&args.input)?;
    let snapshots = trees
        .iter()
        .map(|(_, tree)| TreeSnapshot::from_tree(tree))
        .collect::<Result<Vec<_>>>()?;
    let splits = collect_tree_splits(&snapshots)?;
    log::info!("{} distinct splits in {} trees", splits.len(), snapshots.len());

    let kept = match args.method {
        FilterArg::Greedy => greedy_compatible(&splits, &NoProgress)?,
        FilterArg::Weak => greedy_weakly_compatible(&splits, &NoProgress)?,
        FilterArg::Dimension => DimensionFilter::new(args.max_dimension).apply(&splits, &NoProgress)?,
    };
    log::info!("Kept {} of {} splits", kept.len(), splits.len());

    write_splits_tsv(&args.output, &kept, &snapshots[0].names)
}
