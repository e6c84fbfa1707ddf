use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Axis;
use spikeload::quality::QualityLabel;
use spikeload::{LoadOptions, SortedSpikeData};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "spikeload", version, about = "Spike-sorting output loader")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load sorting output directories and print a summary of each
    Load {
        /// Directories containing spike_times.npy, templates.npy, ...
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Sample rate in Hz (defaults to config, then 30000)
        #[arg(long)]
        sample_rate: Option<f64>,

        /// Keep spike times in samples instead of converting to seconds
        #[arg(long)]
        samples: bool,

        /// Use spike_times_master_clock.npy
        #[arg(long)]
        master_clock: bool,

        /// Also load principal component features
        #[arg(long)]
        pcs: bool,

        /// Zero padding to strip from the template time axis
        #[arg(long)]
        padding: Option<usize>,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Count spikes inside [START, END] (same units as the loaded times)
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        window: Option<Vec<f64>>,
    },

    /// Show the cluster quality table, falling back to all-unsorted
    Clusters {
        dir: PathBuf,
    },

    /// Write cluster_group.tsv from quality codes (0 = unsorted, 1 = good, other = noise)
    Label {
        dir: PathBuf,

        /// Cluster ids, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<i64>,

        /// Quality codes, comma separated, one per id
        #[arg(long, value_delimiter = ',', required = true)]
        codes: Vec<i64>,
    },

    /// Print the calibration stored in a probe JSON file
    Probe {
        file: PathBuf,
    },

    /// Print date and hash of the latest commit in a repository
    Provenance {
        repo: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = spikeload::config::AppConfig::load();

    match cli.command {
        Commands::Load {
            dirs,
            sample_rate,
            samples,
            master_clock,
            pcs,
            padding,
            jobs,
            window,
        } => {
            // Resolve options: CLI > config > defaults
            let mut opts = config.load_options();
            if let Some(rate) = sample_rate {
                opts.sample_rate = rate;
            }
            if samples {
                opts.convert_to_seconds = false;
            }
            opts.use_master_clock |= master_clock;
            opts.include_pcs |= pcs;
            if let Some(p) = padding {
                opts.template_zero_padding = p;
            }
            if jobs > 0 {
                opts.workers = jobs;
            }

            let window = window.map(|w| (w[0], w[1]));

            if dirs.len() == 1 {
                let data = spikeload::load_sorting_output(&dirs[0], &opts)
                    .with_context(|| format!("Failed to load {}", dirs[0].display()))?;
                print_summary(&dirs[0], &data, &opts, window);
            } else {
                load_many(&dirs, &opts, window)?;
            }
        }

        Commands::Clusters { dir } => {
            let clusters = spikeload::loader::load_spike_clusters(&dir)
                .context("Failed to load spike clusters")?;
            let quality = spikeload::loader::resolve_cluster_quality(&dir, &clusters)
                .context("Failed to resolve cluster quality")?;

            println!("{:>10} {:>10} {:>8}", "Cluster", "Group", "Spikes");
            println!("{}", "-".repeat(30));
            for (id, label) in quality.cluster_ids.iter().zip(&quality.labels) {
                let n = clusters.iter().filter(|&&c| c == *id).count();
                println!("{:>10} {:>10} {:>8}", id, label, n);
            }
            println!();
            println!("Source: {:?}", quality.origin);
        }

        Commands::Label { dir, ids, codes } => {
            let path = spikeload::quality::write_cluster_group_tsv(&ids, &codes, &dir)
                .context("Failed to write cluster groups")?;
            println!("Wrote {} clusters to {}", ids.len(), path.display());
        }

        Commands::Probe { file } => {
            let cal = spikeload::probe::read_probe_json(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let valid = cal.valid_channels().len();
            println!("Channels:        {}", cal.channel_count());
            println!("Valid channels:  {}", valid);
            println!("Surface channel: {}", cal.surface_channel);
            println!("Air channel:     {}", cal.air_channel);
            if let (Some(lo), Some(hi)) = (
                cal.offset.iter().copied().reduce(f64::min),
                cal.offset.iter().copied().reduce(f64::max),
            ) {
                println!("Offset range:    {:.2} .. {:.2}", lo, hi);
            }
        }

        Commands::Provenance { repo } => {
            let info = spikeload::provenance::repo_commit_info(&repo)
                .context("Commit lookup failed")?;
            println!("Date: {}", info.date);
            println!("Hash: {}", info.hash);
        }
    }

    Ok(())
}

/// Load several directories with a progress bar, reporting failures instead of aborting.
fn load_many(dirs: &[PathBuf], opts: &LoadOptions, window: Option<(f64, f64)>) -> Result<()> {
    let pb = ProgressBar::new(dirs.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let mut loaded = Vec::new();
    let mut failed = 0usize;

    for dir in dirs {
        pb.set_message(dir.display().to_string());
        match spikeload::load_sorting_output(dir, opts) {
            Ok(data) => loaded.push((dir, data)),
            Err(e) => {
                log::warn!("Failed to load {}: {}", dir.display(), e);
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("Done: {} loaded, {} failed", loaded.len(), failed));

    for (dir, data) in &loaded {
        println!();
        print_summary(dir, data, opts, window);
    }

    if loaded.is_empty() {
        anyhow::bail!("No directories could be loaded");
    }
    Ok(())
}

fn print_summary(dir: &Path, data: &SortedSpikeData, opts: &LoadOptions, window: Option<(f64, f64)>) {
    let unit = if opts.convert_to_seconds { "s" } else { "samples" };
    let (n_templates, n_time, n_channels) = data.templates.dim();

    println!("{}", dir.display());
    println!("  Spikes:      {}", data.spike_count());
    if let (Some(first), Some(last)) = (data.spike_times.first(), data.spike_times.last()) {
        println!("  Time span:   {:.3} .. {:.3} {}", first, last, unit);
    }
    println!("  Templates:   {} x {} samples x {} channels", n_templates, n_time, n_channels);

    let q = &data.cluster_quality;
    println!(
        "  Clusters:    {} ({} good, {} noise, {} unsorted; {:?})",
        q.len(),
        q.count(QualityLabel::Good),
        q.count(QualityLabel::Noise),
        q.count(QualityLabel::Unsorted),
        q.origin,
    );

    if n_templates > 0 {
        let mean_rms = data
            .templates
            .axis_iter(Axis(0))
            .map(|t| spikeload::numeric::rms(&t.iter().copied().collect::<Vec<_>>()))
            .sum::<f64>()
            / n_templates as f64;
        println!("  Template RMS (mean): {:.3}", mean_rms);
    }

    if let Some(pcs) = &data.pc_features {
        let (_, n_pcs, n_local) = pcs.features.dim();
        println!("  PC features: {} components x {} channels", n_pcs, n_local);
    }

    if let Some((start, end)) = window {
        let times = data.spike_times.to_vec();
        let inside = spikeload::numeric::find_range(
            &times,
            start,
            end,
            spikeload::numeric::RangeMode::Within,
        );
        println!("  In window [{}, {}] {}: {} spikes", start, end, unit, inside.len());
    }
}
