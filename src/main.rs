#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

use imgpdf::{
    compose_folder, compose_subfolders, expand_image_paths, ComposeOptions, ComposeReport, ErrorPolicy,
    FitMode, ImageSource, PageCompositor, PageSize, RotationPolicy,
};

#[derive(Parser)]
#[command(name = "imgpdf", version, about = "Lay out JPEG/PNG images as pages of one PDF")]
struct Cli {
    /// num parallel threads for batch mode (default number of CPUs)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    /// suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// log each page's geometry
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// JSON options file, overridden by flags
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// combine images into a single PDF
    Merge {
        /// input image files or dirs (jpg, jpeg, png)
        images: Vec<PathBuf>,

        /// output PDF path, "-" for stdout
        #[arg(short, long, default_value = "output.pdf")]
        output: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// convert every image under a folder into <folder>/<folder name>.pdf
    Folder {
        dir: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// run `folder` on each immediate subfolder of a root dir
    Batch {
        root: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// generate shell completions
    Completions {
        /// shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
struct LayoutArgs {
    /// DPI assumed for the input images (default 600)
    #[arg(short, long)]
    dpi: Option<f64>,

    /// a3, a4, a5, letter, legal or WIDTHxHEIGHT in mm (default a4)
    #[arg(short, long)]
    page_size: Option<PageSize>,

    /// scaling mode (default fit)
    #[arg(short, long, value_enum)]
    fit: Option<FitMode>,

    /// margin in mm for --fit fit-margin (default 10)
    #[arg(short, long)]
    margin: Option<f64>,

    /// keep, cw, ccw or clockwise degrees
    #[arg(short, long, allow_hyphen_values = true)]
    rotate: Option<RotationPolicy>,

    /// use a landscape page for wide images
    #[arg(long)]
    auto_orient: bool,

    /// store image and content streams uncompressed
    #[arg(long)]
    no_compress: bool,

    /// what to do with images that fail (default abort)
    #[arg(long, value_enum)]
    on_error: Option<ErrorPolicy>,

    /// PDF title metadata
    #[arg(long)]
    title: Option<String>,

    /// PDF author metadata
    #[arg(long)]
    author: Option<String>,
}

impl LayoutArgs {
    fn apply(self, options: &mut ComposeOptions) {
        if let Some(dpi) = self.dpi {
            options.layout.dpi = dpi;
        }
        if let Some(page_size) = self.page_size {
            options.layout.page_size = page_size;
        }
        if let Some(fit) = self.fit {
            options.layout.fit_mode = fit;
        }
        if let Some(margin) = self.margin {
            options.layout.margin_mm = margin;
        }
        if let Some(rotate) = self.rotate {
            options.layout.rotation = rotate;
        }
        if self.auto_orient {
            options.layout.auto_orient = true;
        }
        if self.no_compress {
            options.compress = false;
        }
        if let Some(on_error) = self.on_error {
            options.on_error = on_error;
        }
        if self.title.is_some() {
            options.title = self.title;
        }
        if self.author.is_some() {
            options.author = self.author;
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) {
    let default = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn build_compositor(config: Option<&Path>, quiet: bool, layout: LayoutArgs) -> Result<PageCompositor> {
    let mut options = match config {
        Some(path) => ComposeOptions::load(path)?,
        None => ComposeOptions::default(),
    };
    layout.apply(&mut options);
    if quiet {
        options.quiet = true;
    }
    Ok(PageCompositor::new(options))
}

fn print_summary(report: &ComposeReport, output: &Path, quiet: bool) {
    if quiet {
        return;
    }
    eprintln!("Wrote {} ({} page(s))", output.display(), report.page_count());
    if !report.skipped.is_empty() {
        eprintln!("Skipped {} image(s):", report.skipped.len());
        for skipped in &report.skipped {
            eprintln!("  {}", skipped.error);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let quiet = cli.quiet;
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Merge {
            images,
            output,
            layout,
        } => {
            let compositor = build_compositor(config, quiet, layout)?;
            let images = expand_image_paths(&images)?;
            let sources: Vec<ImageSource> = images.into_iter().map(ImageSource::new).collect();
            let report = compositor.compose(&sources, &output)?;
            if output != Path::new("-") {
                print_summary(&report, &output, quiet);
            }
        }
        Commands::Folder { dir, layout } => {
            let compositor = build_compositor(config, quiet, layout)?;
            let outcome = compose_folder(&dir, &compositor);
            let report = outcome
                .result
                .with_context(|| format!("Failed to convert {}", dir.display()))?;
            print_summary(&report, &outcome.output, quiet);
        }
        Commands::Batch { root, layout } => {
            let compositor = build_compositor(config, quiet, layout)?;
            let outcomes = compose_subfolders(&root, &compositor)?;
            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(report) => print_summary(report, &outcome.output, quiet),
                    Err(e) => {
                        failed += 1;
                        tracing::error!(folder = %outcome.folder.display(), "{e}");
                    }
                }
            }
            anyhow::ensure!(
                failed == 0,
                "{} of {} folder(s) failed",
                failed,
                outcomes.len()
            );
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "imgpdf",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
