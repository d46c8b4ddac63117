//! Command-line entry point: reads a configuration file and source/target
//! point files, builds the hierarchy, partitions it, and runs the
//! evaluation, reporting per-phase timings.

use clap::Parser;
use ddfmm::{build_hierarchy, evaluate, partition_unit_level, Problem, RunParams};
use ddfmm_geometry::Vector3;
use ddfmm_traits::fft::FftwFft;
use ddfmm_traits::kernel::HelmholtzKernel;
use ddfmm_traits::linalg::ScalarGemv;
use ddfmm_traits::sort::HyksSort;
use ddfmm_traits::Complex64;
use log::info;
use mpi::traits::*;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ddfmm", about = "Distributed directional fast multipole method")]
struct Args {
    /// TOML file with the K / ptsmax / maxlevel / NPQ / ACCU / center options.
    #[arg(long)]
    config: PathBuf,

    /// Source points, one per line: "x y z re im".
    #[arg(long)]
    sources: PathBuf,

    /// Target points, one per line: "x y z re im" (the re/im columns are
    /// ignored; targets carry zero initial value).
    #[arg(long)]
    targets: PathBuf,

    /// Side length of the cubic domain enclosing every source and target.
    #[arg(long, default_value_t = 1.0)]
    domain_side: f64,
}

fn read_points(path: &PathBuf) -> Vec<(Vector3, Complex64)> {
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("failed to read {path:?}: {e}"));
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let cols: Vec<f64> = line
                .split_whitespace()
                .map(|tok| tok.parse().unwrap_or_else(|_| panic!("bad numeric field in {path:?}: {line}")))
                .collect();
            assert!(cols.len() >= 3, "expected at least x y z in {path:?}: {line}");
            let re = cols.get(3).copied().unwrap_or(0.0);
            let im = cols.get(4).copied().unwrap_or(0.0);
            (Vector3::new(cols[0], cols[1], cols[2]), Complex64::new(re, im))
        })
        .collect()
}

fn read_config(path: &PathBuf) -> ddfmm_traits::Config {
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("failed to read {path:?}: {e}"));
    let raw: toml::Value = text.parse().unwrap_or_else(|e| panic!("invalid toml in {path:?}: {e}"));
    let table = raw.as_table().unwrap_or_else(|| panic!("{path:?}: expected a top-level table"));
    let mut config = ddfmm_traits::Config::new();
    for (key, value) in table {
        let as_str = match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        config.set(key.clone(), as_str);
    }
    config
}

fn main() {
    env_logger::init();
    let universe = mpi::initialize().expect("MPI failed to initialize");
    let world = universe.world();

    let args = Args::parse();
    let config = read_config(&args.config);
    let params = RunParams::from_config(&config).expect("invalid configuration");

    let problem = Problem {
        sources: read_points(&args.sources),
        targets: read_points(&args.targets),
        domain_center: params.domain_center,
        domain_side: args.domain_side,
    };

    info!("rank {}/{}: building hierarchy", world.rank(), world.size());
    let mut hierarchy = build_hierarchy(&problem, &params);

    let sort = HyksSort::default();
    let unit_partition = partition_unit_level(&world, &hierarchy, &sort);

    let kernel = HelmholtzKernel { wavenumber: params.k };
    let gemv = ScalarGemv;
    let mlib = ddfmm_fmm::SurfaceMlib::new(&kernel, params.npq);
    let side = 2 * params.npq;
    let mut fft = FftwFft::new(side);

    let times = evaluate(&world, &mut hierarchy, &unit_partition, &mlib, &gemv, &kernel, &mut fft, params.npq);
    for (phase, millis) in &times {
        info!("rank {}: phase {phase} took {millis} ms", world.rank());
    }

    let total_targets: usize = hierarchy.boxes.values().map(|b| b.target_values.len()).sum();
    info!("rank {}: {total_targets} target values computed locally", world.rank());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("ddfmm-test-{}-{}", std::process::id(), contents.len()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn read_points_parses_positions_and_defaults_missing_value_to_zero() {
        let path = write_temp("0.0 0.0 0.0 1.0 2.0\n1.0 1.0 1.0\n");
        let points = read_points(&path);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].1, Complex64::new(1.0, 2.0));
        assert_eq!(points[1].1, Complex64::new(0.0, 0.0));
        assert_eq!(points[1].0, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn read_points_skips_blank_lines() {
        let path = write_temp("0.0 0.0 0.0\n\n   \n1.0 0.0 0.0\n");
        assert_eq!(read_points(&path).len(), 2);
    }

    #[test]
    fn read_config_maps_quoted_strings_and_bare_numbers() {
        let path = write_temp("K = 4.0\nptsmax = 10\nmaxlevel = 3\nNPQ = 4\nACCU = 3.0\ncenter = \"0,0,0\"\n");
        let config = read_config(&path);
        let params = RunParams::from_config(&config).unwrap();
        assert_eq!(params.k, 4.0);
        assert_eq!(params.ptsmax, 10);
        assert_eq!(params.npq, 4);
    }
}
