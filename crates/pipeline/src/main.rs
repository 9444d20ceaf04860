//! hestats CLI
//!
//! Command-line front end of the encrypted statistics pipeline.
//!
//! - **run**: one workload under one scheme, checked against plaintext
//! - **compare**: the same workload under the approximate and exact schemes
//! - **list**: schemes, workloads, presets and blob layouts
//! - **suggest-modulus**: size an exact-scheme plaintext modulus for a worst case
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use console::style;
use num_bigint::BigUint;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use framing::{BlobTransport, FileTransport, Layout, MemoryTransport};
use pipeline::{
    compare, Comparison, Dataset, Pipeline, PipelineFile, PipelineOptions, RunReport, Workload,
};
use shared::{Preset, SchemeConfig, SchemeTag};

#[derive(Parser)]
#[command(name = "hestats")]
#[command(about = "Aggregate statistics over homomorphically encrypted records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workload under one scheme
    Run {
        /// Scheme variant (approx, exact, additive)
        #[arg(long, short, default_value = "approx")]
        scheme: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Run a workload under the approximate and the exact scheme
    Compare {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// List schemes, workloads, presets and blob layouts
    List,

    /// Suggest a plaintext modulus for the exact scheme
    ///
    /// The worst case is `max_value × records × multiplier` in pre-scaled
    /// integer units.
    SuggestModulus {
        /// Largest absolute field value, already scaled to an integer
        #[arg(long)]
        max_value: u64,

        /// Number of records summed
        #[arg(long, default_value_t = 1)]
        records: u64,

        /// Product of the plan's integer multipliers
        #[arg(long, default_value_t = 1)]
        multiplier: u64,

        /// Ring degree the modulus must support SIMD packing for
        #[arg(long, default_value_t = 4096)]
        degree: usize,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Workload to run (average, statistics, addition, multiplication, dot)
    #[arg(long, short, default_value = "average")]
    workload: String,

    /// Parameter preset (dev, test, large)
    #[arg(long, short, default_value = "dev")]
    preset: String,

    /// TOML pipeline file overriding the preset and options
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON records to load instead of the demo data
    #[arg(long, short, conflicts_with = "records")]
    input: Option<PathBuf>,

    /// Number of synthetic records to generate instead of the demo data
    #[arg(long)]
    records: Option<usize>,

    /// Seed for synthetic data, keys and encryption randomness
    #[arg(long)]
    seed: Option<u64>,

    /// Blob layout (prefixed, open-tail, counted)
    #[arg(long)]
    layout: Option<String>,

    /// Variance protocol (disclosed-mean, fully-encrypted)
    #[arg(long)]
    variance_mode: Option<String>,

    /// Directory to exchange blobs through instead of memory
    #[arg(long)]
    blob_dir: Option<PathBuf>,

    /// Keep blob files after the run
    #[arg(long, requires = "blob_dir")]
    keep_blobs: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl CommonArgs {
    fn pipeline_file(&self) -> anyhow::Result<Option<PipelineFile>> {
        self.config
            .as_ref()
            .map(|path| {
                PipelineFile::load(path)
                    .with_context(|| format!("Failed to load pipeline file {}", path.display()))
            })
            .transpose()
    }

    fn options(&self, file: Option<&PipelineFile>) -> anyhow::Result<PipelineOptions> {
        let mut options = PipelineOptions::default();
        if let Some(file) = file {
            file.apply(&mut options).context("Invalid pipeline file")?;
        }
        if let Some(layout) = &self.layout {
            options.layout = layout.parse()?;
        }
        if let Some(mode) = &self.variance_mode {
            options.variance_mode = mode.parse()?;
        }
        if self.seed.is_some() {
            options.seed = self.seed;
        }
        options.validate()?;
        Ok(options)
    }

    fn dataset(&self) -> anyhow::Result<Dataset> {
        match (&self.input, self.records) {
            (Some(path), _) => Dataset::load(path)
                .with_context(|| format!("Failed to load records from {}", path.display())),
            (None, Some(records)) => Ok(Dataset::synthetic(records, self.seed.unwrap_or(42))),
            (None, None) => Ok(Dataset::demo()),
        }
    }

    fn transport(&self) -> anyhow::Result<Box<dyn BlobTransport>> {
        Ok(match &self.blob_dir {
            Some(dir) => Box::new(
                FileTransport::new(dir)
                    .with_context(|| format!("Failed to open blob directory {}", dir.display()))?
                    .keep(self.keep_blobs),
            ),
            None => Box::new(MemoryTransport::new()),
        })
    }
}

/// Scheme configuration for `tag`: the pipeline file's `[scheme]` section
/// when it selects the same variant, the preset otherwise
fn scheme_config(
    tag: SchemeTag,
    preset: Preset,
    file: Option<&PipelineFile>,
) -> SchemeConfig {
    match file.and_then(|f| f.scheme.as_ref()) {
        Some(config) if config.tag() == tag => config.clone(),
        _ => SchemeConfig::preset(tag, preset),
    }
}

fn run_workload(scheme: &str, common: &CommonArgs) -> anyhow::Result<()> {
    let tag: SchemeTag = scheme.parse()?;
    let workload: Workload = common.workload.parse()?;
    let preset: Preset = common.preset.parse()?;
    let file = common.pipeline_file()?;
    if let Some(config) = file.as_ref().and_then(|f| f.scheme.as_ref()) {
        if config.tag() != tag {
            anyhow::bail!(
                "Pipeline file configures the {} scheme but --scheme is {}",
                config.tag(),
                tag
            );
        }
    }
    let config = scheme_config(tag, preset, file.as_ref());
    let options = common.options(file.as_ref())?;
    let data = common.dataset()?;
    let mut transport = common.transport()?;

    if !common.json {
        println!("🔧 Running workload: {} ({})", workload, workload.description());
        println!("🔐 Scheme: {tag}, preset: {preset}");
        println!(
            "📋 Records: {}, layout: {}, transport: {}",
            data.len(),
            options.layout,
            transport.name()
        );
    }

    let pipeline = Pipeline::new(config, options).context("Invalid scheme configuration")?;
    let report = pipeline
        .run(workload, &data, transport.as_mut())
        .with_context(|| format!("Pipeline failed under the {tag} scheme"))?;

    if common.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        println!("\n🎉 Run complete!");
    }
    Ok(())
}

fn compare_workload(common: &CommonArgs) -> anyhow::Result<()> {
    let workload: Workload = common.workload.parse()?;
    let preset: Preset = common.preset.parse()?;
    let file = common.pipeline_file()?;
    let approx = scheme_config(SchemeTag::Approx, preset, file.as_ref());
    let exact = scheme_config(SchemeTag::Exact, preset, file.as_ref());
    let options = common.options(file.as_ref())?;
    let data = common.dataset()?;
    let mut transport = common.transport()?;

    if !common.json {
        println!("🔧 Comparing workload: {} ({})", workload, workload.description());
        println!("📋 Records: {}, preset: {preset}", data.len());
    }

    let comparison = compare(approx, exact, &options, workload, &data, transport.as_mut())
        .context("Comparison failed")?;

    if common.json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
    } else {
        print_comparison(&comparison);
        println!("\n🎉 Comparison complete!");
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "\n📊 {} results",
        style(report.scheme.name().to_uppercase()).bold().cyan()
    );
    for result in &report.results {
        println!("  • {} = {}", style(&result.name).bold(), result.formula);
        println!("      ops: {}", style(&result.ops).dim());
        for (value, truth) in result.values.iter().zip(&result.ground_truth) {
            println!("      encrypted {value:.6}  plaintext {truth:.6}");
        }
        let error = format!("{:.3e}", result.abs_error);
        let error = if result.abs_error == 0.0 {
            style(error).green()
        } else {
            style(error).yellow()
        };
        match result.estimated_error {
            Some(estimate) => println!("      abs error {error} (estimated ≤ {estimate:.3e})"),
            None => println!("      abs error {error}"),
        }
    }
    for s in &report.statistics {
        let b = &s.bundle;
        println!("  📈 {} (n = {})", style(&b.field).bold(), b.count);
        println!(
            "      mean {:.6}  plaintext {:.6}  error {:.3e}",
            b.mean, s.ground_truth.mean, s.mean_error
        );
        match (b.variance, b.std_dev) {
            (Some(variance), Some(std_dev)) => {
                println!(
                    "      variance {:.6}  plaintext {:.6}",
                    variance, s.ground_truth.variance
                );
                println!(
                    "      std-dev {:.6}  plaintext {:.6}",
                    std_dev, s.ground_truth.std_dev
                );
            }
            _ => println!("      variance not available under the {} scheme", b.scheme),
        }
        if let Some(mean) = b.disclosed_mean {
            println!("      {} mean {mean:.6} was disclosed", style("⚠️").yellow());
        }
    }
    for z in &report.z_scores {
        match z.z {
            Some(score) => println!("  🎯 z({} = {}) = {score:.4}", z.field, z.value),
            None => println!("  🎯 z({} = {}) unavailable", z.field, z.value),
        }
    }
    for warning in &report.warnings {
        println!("  {} {warning}", style("⚠️  precision:").yellow());
    }
    let t = &report.timings;
    println!(
        "  ⏱️  setup {:.3}s | encrypt {:.3}s | process {:.3}s | decrypt {:.3}s | total {:.3}s",
        t.setup, t.encrypt, t.process, t.decrypt, t.total
    );
    println!("  📦 {} bytes transferred", report.bytes_transferred);
}

fn print_comparison(comparison: &Comparison) {
    print_report(&comparison.approx);
    print_report(&comparison.exact);
    println!(
        "\n⚖️  exact/approx time ratio: {}",
        style(format!("{:.2}x", comparison.speedup)).bold()
    );
}

fn list() {
    println!("📋 Available schemes:");
    println!("  • approx   - Approximate real arithmetic (CKKS)");
    println!("  • exact    - Exact modular integers (BFV)");
    println!("  • additive - Additive only (Paillier)");
    println!("\n🧮 Available workloads:");
    for workload in Workload::ALL {
        println!("  • {:<14} - {}", workload.name(), workload.description());
    }
    println!("\n⚙️  Available presets:");
    for preset in Preset::ALL {
        let approx = shared::ApproxConfig::preset(preset);
        let exact = shared::ExactConfig::preset(preset);
        let additive = shared::AdditiveConfig::preset(preset);
        println!(
            "  • {:<5} - approx degree={}, exact degree={}, additive key={} bits",
            preset.name(),
            approx.degree,
            exact.degree,
            additive.key_bits
        );
    }
    println!("\n📦 Blob layouts:");
    for layout in Layout::ALL {
        println!("  • {layout}");
    }
}

fn suggest_modulus(max_value: u64, records: u64, multiplier: u64, degree: usize) -> anyhow::Result<()> {
    let worst_case = BigUint::from(max_value) * BigUint::from(records) * BigUint::from(multiplier);
    println!(
        "🔎 Worst-case magnitude: {} {}",
        worst_case,
        he_params::utils::fmt_big_summary(&worst_case)
    );
    println!(
        "📏 Required modulus bits: {}",
        he_params::required_modulus_bits(&worst_case)
    );
    let modulus = he_params::suggest_plaintext_modulus(degree, &worst_case)
        .context("No suitable plaintext modulus")?;
    println!("✅ Suggested plaintext modulus: {}", style(modulus).bold().green());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { scheme, common } => run_workload(&scheme, &common)?,
        Commands::Compare { common } => compare_workload(&common)?,
        Commands::List => list(),
        Commands::SuggestModulus {
            max_value,
            records,
            multiplier,
            degree,
        } => suggest_modulus(max_value, records, multiplier, degree)?,
    }

    Ok(())
}
