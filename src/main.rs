use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use floodrisk::metrics::{DistStats, RunDistribution};
use floodrisk::model::ModelInput;
use floodrisk::{ModelConfig, Result, RiskReport};

/// Portfolio flood-risk Monte Carlo.
#[derive(Parser)]
#[command(name = "floodrisk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Portfolio document (JSON): properties, optional flood_event, gauges, stations
    #[arg(short, long)]
    input: PathBuf,

    /// Model configuration (JSON); missing keys take defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Monte Carlo trials per run
    #[arg(long)]
    trials: Option<usize>,

    /// Seed of the first run
    #[arg(long)]
    seed: Option<u64>,

    /// Risk clusters; chosen by elbow when omitted
    #[arg(long)]
    clusters: Option<usize>,

    /// Upper bound for the elbow search
    #[arg(long, default_value_t = 8)]
    max_clusters: usize,

    /// Independent seeds to run for the cross-seed VaR/ES distribution
    #[arg(long)]
    runs: Option<u64>,

    /// Write the full report as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Suppress the printed tables
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ModelConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => ModelConfig::default(),
    };
    if let Some(s) = cli.seed {
        config.seed = s;
    }
    if let Some(n) = cli.trials {
        config.n_trials = n;
    }
    let n_trials = config.n_trials;
    let start_seed = config.seed;

    let input = ModelInput::from_json_str(&std::fs::read_to_string(&cli.input)?)?;
    let model = input.into_model(config)?;
    log::info!("loaded {} properties from {}", model.properties().len(), cli.input.display());

    let report = model.assess(n_trials, cli.clusters, cli.max_clusters)?;
    for w in &report.warnings {
        log::warn!("{w}");
    }

    if let Some(path) = &cli.json {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &report)?;
        log::info!("report written to {}", path.display());
    }

    if !cli.quiet {
        print_report(&report);
    }

    if let Some(n) = cli.runs {
        let runs = model.simulate_runs(n_trials, start_seed, n)?;
        if !cli.quiet {
            match RunDistribution::from_runs(&runs) {
                Some(d) => print_distribution(&d, start_seed),
                None => eprintln!("Warning: Distribution requires >= 2 runs"),
            }
        }
    }
    Ok(())
}

fn print_report(r: &RiskReport) {
    let s = &r.summary;
    let sim = &r.simulation;

    println!("\n=== Flood scenario ({:?} depths) ===", r.depth_source);
    println!("{:>20} | {:>10} | {:>10} | {:>9} | {:>8}", "Centre", "Lat", "Lon", "Radius(m)", "Depth(m)");
    println!("{}", "-".repeat(20 + 3 + 10 + 3 + 10 + 3 + 9 + 3 + 8));
    for c in &r.flood_event.centers {
        println!(
            "{:>20} | {:>10.4} | {:>10.4} | {:>9.0} | {:>8.2}",
            c.name, c.lat, c.lon, c.radius_m, c.max_depth_m
        );
    }

    println!("\n=== Portfolio summary ===");
    println!("  Properties:              {}", s.total_properties);
    println!("  At risk (impact > 0.1):  {} ({:.1}%)", s.properties_at_risk, s.percentage_at_risk);
    println!("  Total value:             {:.0}", s.total_value);
    println!("  Value at risk:           {:.0} ({:.2}%)", s.value_at_risk, s.percentage_value_at_risk);
    println!("  Flood depth avg / max:   {:.2} m / {:.2} m", s.average_flood_depth, s.max_flood_depth);
    println!("  Average impact ratio:    {:.4}", s.average_impact_ratio);

    let a = &r.advanced;
    println!("\n=== Risk bands ===");
    println!("  High (> 0.6):            {}", a.high_risk_properties);
    println!("  Medium (0.3, 0.6]:       {}", a.medium_risk_properties);
    println!("  Low (0.1, 0.3]:          {}", a.low_risk_properties);
    println!("  Flooded:                 {} ({:.1}%)", a.properties_with_flooding, a.percentage_flooded);
    println!("  Max single loss:         {:.0}", a.max_single_property_loss);

    println!("\n=== Monte Carlo ({} trials) ===", sim.statistics.n);
    println!("{:>8} | {:>14} | {:>9}", "Metric", "Loss", "Ratio%");
    println!("{}", "-".repeat(8 + 3 + 14 + 3 + 9));
    let rows = [
        ("Mean", sim.statistics.mean, sim.mean_ratio()),
        ("VaR95", sim.statistics.var_95, sim.var_95_ratio()),
        ("ES95", sim.statistics.es_95, sim.es_95_ratio()),
        ("VaR99", sim.statistics.var_99, sim.var_99_ratio()),
        ("ES99", sim.statistics.es_99, sim.es_99_ratio()),
    ];
    for (name, loss, ratio) in rows {
        println!("{name:>8} | {loss:>14.0} | {:>8.3}%", ratio * 100.0);
    }
    println!("{:>8} | {:>14.0} |", "Max", sim.statistics.max);
    println!("{:>8} | {:>14.0} |", "Std", sim.statistics.std_dev);

    let c = &r.concentration;
    println!("\n=== Concentration ===");
    println!("  Geographic HHI: {:.4}   Impact HHI: {:.4}", c.geographic_hhi, c.impact_hhi);
    println!("{:>8} | {:>5} | {:>14} | {:>8} | {:>7} | {:>12} | {:>7}", "Cell", "N", "Value", "Depth", "Impact", "VaR", "Share²");
    println!("{}", "-".repeat(8 + 3 + 5 + 3 + 14 + 3 + 8 + 3 + 7 + 3 + 12 + 3 + 7));
    for g in &c.grid_cells {
        println!(
            "{:>8} | {:>5} | {:>14.0} | {:>8.2} | {:>7.4} | {:>12.0} | {:>7.4}",
            g.cell_id, g.property_count, g.total_value, g.mean_depth, g.mean_impact, g.value_at_risk, g.concentration_index
        );
    }

    println!("\n=== Risk clusters (inertia {:.2}) ===", r.clusters.inertia);
    println!("{:>7} | {:>5} | {:>8} | {:>12} | {:>7} | {:>12}", "Cluster", "N", "Depth", "MeanValue", "Impact", "VaR");
    println!("{}", "-".repeat(7 + 3 + 5 + 3 + 8 + 3 + 12 + 3 + 7 + 3 + 12));
    for k in &r.clusters.clusters {
        println!(
            "{:>7} | {:>5} | {:>8.2} | {:>12.0} | {:>7.4} | {:>12.0}",
            k.cluster, k.property_count, k.mean_depth, k.mean_value, k.mean_impact, k.total_value_at_risk
        );
    }

    if let Some(e) = &r.elevation {
        println!("\n=== Elevation (r = {:.3}) ===", e.elevation_correlation);
        for b in &e.bands {
            println!(
                "  {:<22} {:>5} properties, {:>5} flooded ({:.1}%), avg depth {:.2} m",
                b.label, b.properties, b.flooded, b.flood_rate, b.avg_flood_depth
            );
        }
    }

    if !r.warnings.is_empty() {
        println!("\n  {} warning(s):", r.warnings.len());
        for w in &r.warnings {
            println!("    {w}");
        }
    }
}

fn print_dist_row(name: &str, d: &DistStats) {
    println!(
        "{:>6} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0} | {:>6.3}",
        name,
        d.min,
        d.p5,
        d.p50,
        d.p95,
        d.max,
        d.coefficient_of_variation()
    );
}

fn print_distribution(d: &RunDistribution, start_seed: u64) {
    println!("\n=== Multi-Run Distribution (N={} runs, seeds {}..) ===", d.runs, start_seed);
    println!("{:>6} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12} | {:>6}", "", "min", "p5", "p50", "p95", "max", "CV");
    println!("{}", "-".repeat(6 + 5 * (3 + 12) + 3 + 6));
    print_dist_row("Mean", &d.mean);
    print_dist_row("VaR95", &d.var_95);
    print_dist_row("ES95", &d.es_95);
    print_dist_row("VaR99", &d.var_99);
    print_dist_row("ES99", &d.es_99);
}

