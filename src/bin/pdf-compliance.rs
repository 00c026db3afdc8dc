//! PDF Compliance CLI tool
//!
//! A command-line tool for auditing and repairing a folder of publication assets.

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_compliance::asset::expand_patterns;
use pdf_compliance::pdf::{combine_pdfs, extract_metadata, CombineOptions, DEFAULT_JPEG_QUALITY};
use pdf_compliance::pipeline::{run, RunOptions};
use pdf_compliance::raster::FallbackPolicy;
use pdf_compliance::{ComplianceProfile, Verdict};

/// PDF Compliance - Audit and repair PDF and image assets for publication
#[derive(Parser)]
#[command(name = "pdf-compliance")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Report what would change, without writing anything
    pdf-compliance audit figures/

    # Fix everything in place, keeping originals in figures/_originals*
    pdf-compliance fix figures/

    # Fold per-figure PDFs into one document
    pdf-compliance combine -o figures/chapter-3.pdf \"figures/fig-3-*.pdf\"

    # Inspect one file
    pdf-compliance info figures/fig-1.pdf")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the publication profile
#[derive(Args, Debug, Clone)]
struct ProfileArgs {
    /// Portrait page width ceiling in points
    #[arg(long)]
    max_width_pt: Option<f32>,

    /// Portrait page height ceiling in points
    #[arg(long)]
    max_height_pt: Option<f32>,

    /// Slack allowed on page measurements
    #[arg(long)]
    tolerance_pt: Option<f32>,

    /// Reference resolution for the raster bound
    #[arg(long)]
    dpi: Option<f32>,

    /// Ceiling on visible assets in the directory
    #[arg(long)]
    max_assets: Option<usize>,

    /// Do not require grayscale
    #[arg(long)]
    allow_color: bool,
}

impl ProfileArgs {
    fn profile(&self) -> ComplianceProfile {
        let mut profile = ComplianceProfile::publication();
        if let Some(w) = self.max_width_pt {
            profile.max_page_width_pt = w;
        }
        if let Some(h) = self.max_height_pt {
            profile.max_page_height_pt = h;
        }
        if let Some(t) = self.tolerance_pt {
            profile.tolerance_pt = t;
        }
        // The raster bound follows the page bound, so re-derive it whenever
        // either the page size or the resolution changed.
        let dpi = self.dpi.unwrap_or(profile.reference_dpi);
        if self.dpi.is_some() || self.max_width_pt.is_some() || self.max_height_pt.is_some() {
            profile = profile.with_reference_dpi(dpi);
        }
        if let Some(n) = self.max_assets {
            profile.max_asset_count = n;
        }
        if self.allow_color {
            profile.require_grayscale = false;
        }
        profile
    }
}

/// Options shared by audit and fix
#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Directory holding the assets
    dir: PathBuf,

    #[command(flatten)]
    profile: ProfileArgs,

    /// JPEG quality for re-encoded images (1-100)
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Treat undecodable image samples as unfixable instead of filling with white
    #[arg(long)]
    strict_images: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a directory without changing anything
    Audit(RunArgs),

    /// Audit a directory and fix what can be fixed, backing up originals
    Fix {
        #[command(flatten)]
        args: RunArgs,

        /// Audit only (same as the audit command)
        #[arg(long)]
        dry_run: bool,
    },

    /// Combine PDFs into one, fitting oversized pages
    Combine {
        /// Input PDF files (in order). Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Leave the sources in place instead of moving them to _originals
        #[arg(long)]
        keep_sources: bool,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Show page geometry and image colors of a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,

        #[command(flatten)]
        profile: ProfileArgs,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pdf_compliance=debug" } else { "pdf_compliance=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Audit(args) => cmd_run(args, true),
        Commands::Fix { args, dry_run } => cmd_run(args, dry_run),
        Commands::Combine { inputs, output, keep_sources, profile } => {
            cmd_combine(inputs, output, keep_sources, profile)
        }
        Commands::Info { input, profile, json } => cmd_info(input, profile, json),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Audit or fix a directory. Returns whether the verdict passed.
fn cmd_run(args: RunArgs, dry_run: bool) -> anyhow::Result<bool> {
    let options = RunOptions {
        input_dir: args.dir.clone(),
        profile: args.profile.profile(),
        dry_run,
        jpeg_quality: args.jpeg_quality,
        fallback: if args.strict_images { FallbackPolicy::Fail } else { FallbackPolicy::WhiteFill },
    };

    let report = run(&options).with_context(|| format!("run over {} stopped", args.dir.display()))?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report);
    }

    Ok(report.verdict() == Verdict::Pass)
}

/// Combine PDFs into one
fn cmd_combine(inputs: Vec<String>, output: PathBuf, keep_sources: bool, profile: ProfileArgs) -> anyhow::Result<bool> {
    let inputs = expand_patterns(&inputs)?;

    for path in &inputs {
        if !path.exists() {
            bail!("Input file not found: {}", path.display());
        }
    }

    eprintln!("Combining {} PDF files...", inputs.len());

    let options = CombineOptions {
        input_paths: inputs,
        output_path: output,
        move_sources: !keep_sources,
    };
    let result = combine_pdfs(&options, &profile.profile())?;

    eprintln!(
        "Combined {} pages to: {} ({} fitted, {} sources moved)",
        result.output_pages,
        result.output_path.display(),
        result.pages_fixed,
        result.moved.len()
    );
    eprintln!(
        "Assets in output directory: {} of {} allowed",
        result.asset_count.count, result.asset_count.max
    );

    Ok(result.asset_count.passed())
}

/// Show information about a PDF file
fn cmd_info(input: PathBuf, profile: ProfileArgs, json: bool) -> anyhow::Result<bool> {
    let meta = extract_metadata(&input, &profile.profile())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(true);
    }

    println!("File: {}", input.display());
    println!("Pages: {}", meta.page_count);
    if let Some(title) = &meta.title {
        println!("Title: {}", title);
    }
    if let Some(author) = &meta.author {
        println!("Author: {}", author);
    }

    for page in &meta.pages {
        println!(
            "  page {}: {}x{} pt ({:?})",
            page.index + 1,
            page.width_pt,
            page.height_pt,
            page.class
        );
    }
    for image in &meta.images {
        println!(
            "  image {} {}: {}x{} {} {:?} {} bpc",
            image.object_ref.0,
            image.object_ref.1,
            image.width,
            image.height,
            image.color_space.label(),
            image.filter,
            image.bits_per_component
        );
    }
    println!(
        "Oversized pages: {}, color images: {}",
        meta.oversized_pages(),
        meta.color_images()
    );

    Ok(true)
}
