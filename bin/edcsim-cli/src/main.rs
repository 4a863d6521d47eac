//! Command-line entry point: parses the run configuration, validates its
//! preconditions, runs the iteration driver, and prints the stdout report.
//!
//! Defaults mirror `Config::default()` (the Rust port's own reference
//! scenario) rather than independently re-deriving the research script's
//! `get_parms()` literals, so that an invocation with zero flags and the
//! library's own defaults never silently disagree (see DESIGN.md).

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use edcsim_common::config::{
    CodeConfig, CodeType, Config, EstimatorConfig, NetworkConfig, PayloadConfig, PlaceType,
    PlacementConfig, PowerOutageConfig, RunConfig, SimType, TopologyConfig, TraceConfig,
};

#[derive(Parser, Debug)]
#[command(name = "edcsim-cli")]
#[command(about = "Monte Carlo reliability estimator for rack-organized erasure-coded storage")]
#[command(version)]
struct Args {
    /// Simulation horizon, in hours.
    #[arg(short = 'm', long, default_value_t = 87_600.0)]
    mission_time: f64,

    /// Total number of iterations across all workers.
    #[arg(short = 'i', long, default_value_t = 10_000)]
    total_iterations: u64,

    /// Worker thread count for the iteration fan-out.
    #[arg(short = 'p', long, default_value_t = 4)]
    num_processes: usize,

    /// Base PRNG seed; worker task `t` seeds from `rseed_plus + t`.
    #[arg(short = 'u', long, default_value_t = 0)]
    rseed_plus: u64,

    #[arg(short = 'R', long, default_value_t = 32)]
    num_racks: usize,

    #[arg(short = 'N', long, default_value_t = 12)]
    nodes_per_rack: usize,

    #[arg(short = 'D', long, default_value_t = 12)]
    disks_per_node: usize,

    /// MiB.
    #[arg(short = 'C', long, default_value_t = 8_000_000)]
    capacity_per_disk: u64,

    /// MiB.
    #[arg(short = 'K', long, default_value_t = 64)]
    chunk_size: u64,

    #[arg(short = 'S', long, default_value_t = 1_000)]
    num_stripes: usize,

    /// `rs`, `lrc`, or `drc`.
    #[arg(short = 't', long, default_value = "rs")]
    code_type: String,

    #[arg(short = 'n', long, default_value_t = 14)]
    code_n: usize,

    #[arg(short = 'k', long, default_value_t = 10)]
    code_k: usize,

    /// Number of local-parity groups (LRC only).
    #[arg(short = 'l', long, default_value_t = 0)]
    code_l: usize,

    /// `flat` or `hie`.
    #[arg(short = 'T', long, default_value = "flat")]
    place_type: String,

    /// Comma-separated chunk count per rack, required by `hie`.
    #[arg(short = 'g', long, default_value = "")]
    chunk_rack_config: String,

    #[arg(short = 'W', long, action = clap::ArgAction::Set, default_value_t = true)]
    use_network: bool,

    /// `cross,intra`, both MiB/s.
    #[arg(short = 's', long, default_value = "125,1000")]
    network_setting: String,

    #[arg(short = 'O', long, action = clap::ArgAction::Set, default_value_t = false)]
    use_power_outage: bool,

    #[arg(short = 'F', long, action = clap::ArgAction::Set, default_value_t = false)]
    use_trace: bool,

    #[arg(short = 'd', long, default_value_t = 0)]
    trace_id: u32,

    /// Directory `failure_events/`, `transient_events/` and
    /// `transient_repair/` live under. Only consulted when `use_trace`.
    #[arg(long, default_value = ".")]
    trace_root: PathBuf,

    /// `regular` or `unifbfb`.
    #[arg(short = 'A', long, default_value = "regular")]
    sim_type: String,

    /// Balanced failure biasing probability (unifbfb only).
    #[arg(short = 'f', long, default_value_t = 0.5)]
    fb_prob: f64,

    /// Uniformization rate (unifbfb only).
    #[arg(short = 'b', long, default_value_t = 1.0e5)]
    beta: f64,

    /// Log level, honored unless `RUST_LOG` is set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_code_type(s: &str) -> Result<CodeType> {
    match s {
        "rs" => Ok(CodeType::Rs),
        "lrc" => Ok(CodeType::Lrc),
        "drc" => Ok(CodeType::Drc),
        other => bail!("invalid code_type {other:?}: expected rs, lrc, or drc"),
    }
}

fn parse_place_type(s: &str) -> Result<PlaceType> {
    match s {
        "flat" => Ok(PlaceType::Flat),
        "hie" => Ok(PlaceType::Hierarchical),
        other => bail!("invalid place_type {other:?}: expected flat or hie"),
    }
}

fn parse_sim_type(s: &str) -> Result<SimType> {
    match s {
        "regular" => Ok(SimType::Regular),
        "unifbfb" => Ok(SimType::Unifbfb),
        other => bail!("invalid sim_type {other:?}: expected regular or unifbfb"),
    }
}

fn parse_chunk_rack_config(s: &str) -> Result<Vec<usize>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(',')
        .map(|item| {
            item.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid chunk_rack_config entry {item:?}"))
        })
        .collect()
}

fn parse_network_setting(s: &str) -> Result<(u64, u64)> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [cross, intra] = parts.as_slice() else {
        bail!("network_setting must be \"cross,intra\", got {s:?}");
    };
    Ok((
        cross.parse().with_context(|| format!("invalid cross-rack bandwidth {cross:?}"))?,
        intra.parse().with_context(|| format!("invalid intra-rack bandwidth {intra:?}"))?,
    ))
}

fn build_config(args: &Args) -> Result<Config> {
    let (cross_rack_bwth_mibps, intra_rack_bwth_mibps) = parse_network_setting(&args.network_setting)?;

    let config = Config {
        run: RunConfig {
            mission_time_hours: args.mission_time,
            total_iterations: args.total_iterations,
            num_processes: args.num_processes,
            rseed_plus: args.rseed_plus,
        },
        topology: TopologyConfig {
            num_racks: args.num_racks,
            nodes_per_rack: args.nodes_per_rack,
            disks_per_node: args.disks_per_node,
            capacity_per_disk_mib: args.capacity_per_disk,
        },
        payload: PayloadConfig {
            chunk_size_mib: args.chunk_size,
            num_stripes: args.num_stripes,
        },
        code: CodeConfig {
            code_type: parse_code_type(&args.code_type)?,
            n: args.code_n,
            k: args.code_k,
            l: args.code_l,
        },
        placement: PlacementConfig {
            place_type: parse_place_type(&args.place_type)?,
            chunk_rack_config: parse_chunk_rack_config(&args.chunk_rack_config)?,
        },
        network: NetworkConfig {
            enabled: args.use_network,
            cross_rack_bwth_mibps,
            intra_rack_bwth_mibps,
        },
        power_outage: PowerOutageConfig {
            enabled: args.use_power_outage,
            ..PowerOutageConfig::default()
        },
        trace: TraceConfig {
            enabled: args.use_trace,
            trace_id: args.trace_id,
        },
        estimator: EstimatorConfig {
            sim_type: parse_sim_type(&args.sim_type)?,
            fb_prob: args.fb_prob,
            beta: args.beta,
        },
    };

    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn print_config_echo(args: &Args, config: &Config) {
    let total_capacity_mib = config.topology.num_racks as u64
        * config.topology.nodes_per_rack as u64
        * config.topology.disks_per_node as u64
        * config.topology.capacity_per_disk_mib;
    let required_mib = config.code.n as u64 * config.payload.num_stripes as u64 * config.payload.chunk_size_mib;
    let usage_ratio = if total_capacity_mib == 0 {
        0.0
    } else {
        required_mib as f64 / total_capacity_mib as f64
    };

    println!("mission_time            = {}", args.mission_time);
    println!("total_iterations        = {}", args.total_iterations);
    println!("num_processes            = {}", args.num_processes);
    println!("rseed_plus               = {}", args.rseed_plus);
    println!("num_racks                = {}", args.num_racks);
    println!("nodes_per_rack           = {}", args.nodes_per_rack);
    println!("disks_per_node           = {}", args.disks_per_node);
    println!("capacity_per_disk (MiB)  = {}", args.capacity_per_disk);
    println!("chunk_size (MiB)         = {}", args.chunk_size);
    println!("num_stripes              = {}", args.num_stripes);
    println!("code_type                = {}", args.code_type);
    println!("code_n, code_k, code_l   = {}, {}, {}", args.code_n, args.code_k, args.code_l);
    println!("place_type               = {}", args.place_type);
    println!("chunk_rack_config        = {:?}", config.placement.chunk_rack_config);
    println!("use_network              = {}", args.use_network);
    println!("network_setting          = {}", args.network_setting);
    println!("use_power_outage         = {}", args.use_power_outage);
    println!("use_trace, trace_id      = {}, {}", args.use_trace, args.trace_id);
    println!("sim_type                 = {}", args.sim_type);
    println!("fb_prob, beta            = {}, {}", args.fb_prob, args.beta);
    println!("total_capacity (MiB)     = {total_capacity_mib}");
    println!("usage_ratio              = {usage_ratio:.6}");
    println!();
}

fn main() -> Result<()> {
    let args = Args::parse();
    edcsim_common::logging::init(&args.log_level);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    print_config_echo(&args, &config);

    let trace_root = config.trace.enabled.then(|| args.trace_root.clone());
    let report = edcsim_driver::run(&config, trace_root.as_deref())?;

    println!("num_zeroes                 = {}", report.num_zeroes);
    println!("PDL                         = {:e}", report.pdl);
    println!("RE                          = {:.4}%", report.relative_error_pct);
    println!("NOMDL (bytes/byte)          = {:e}", report.nomdl);
    println!("BR                          = {:e}", report.blocked_ratio);
    println!("Single-chunk repair ratio   = {:.6}", report.single_chunk_repair_ratio);

    Ok(())
}
