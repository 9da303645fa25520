//! CLI binary for scanroute.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `RouteConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use scanroute::{
    inspect, run, CropBands, IntensityBand, ProgressCallback, Rotation, RouteConfig,
    RunProgressCallback, RunReport, ScanRouteError, TesseractRecognizer, TextRecognizer,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn bar_style(unit: &str) -> ProgressStyle {
    ProgressStyle::with_template(&format!(
        "{{spinner:.cyan}} {{prefix:.bold}}  [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  {{msg}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Shorten long error messages to keep per-line output tidy.
fn truncate(msg: &str) -> String {
    match msg.char_indices().nth(79) {
        Some((i, _)) => format!("{}\u{2026}", &msg[..i]),
        None => msg.to_string(),
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for routing, then one for uploads,
/// with a log line per image and per failed group.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Listing scans…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_images: usize) {
        self.bar.set_length(total_images as u64);
        self.bar.set_position(0);
        self.bar.set_style(bar_style("scans"));
        self.bar.set_prefix("Routing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Routing {total_images} scans…"))
        ));
    }

    fn on_image_start(&self, _index: usize, _total: usize, image: &Path) {
        self.bar.set_message(file_name(image));
    }

    fn on_image_routed(&self, index: usize, total: usize, image: &Path, label: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  →  {}",
            green("✓"),
            index,
            total,
            file_name(image),
            bold(label),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, image: &Path, error: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            file_name(image),
            red(&truncate(error)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_images: usize, routed: usize) {
        let failed = total_images.saturating_sub(routed);
        self.bar.println(format!(
            "{} {}/{} scans routed{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&routed.to_string()),
            total_images,
            if failed == 0 {
                String::new()
            } else {
                format!("  ({} left in place)", red(&failed.to_string()))
            },
        ));
        self.bar.set_message("");
    }

    fn on_upload_start(&self, total_groups: usize, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.set_position(0);
        self.bar.set_style(bar_style("files"));
        self.bar.set_prefix("Uploading");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Uploading {total_files} files in {total_groups} groups…"
            ))
        ));
    }

    fn on_group_start(&self, prefix: char, files: usize) {
        self.bar.set_message(format!("group {prefix} ({files} files)"));
    }

    fn on_file_uploaded(&self, _prefix: char, _file: &Path) {
        self.bar.inc(1);
    }

    fn on_group_error(&self, prefix: char, error: &str) {
        self.bar.println(format!(
            "  {} group {}  {}",
            red("✗"),
            bold(&prefix.to_string()),
            red(&truncate(error)),
        ));
    }

    fn on_upload_complete(&self, total_groups: usize, uploaded_files: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} files uploaded in {} groups",
            green("✔"),
            bold(&uploaded_files.to_string()),
            total_groups,
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Route the scans in ./img and upload them (server + chromedriver running)
  scanroute

  # Route another folder, stop before uploading
  scanroute --skip-upload ~/scans/batch-07

  # Preview labels without moving anything
  scanroute --inspect-only img

  # Start the upload server, run headless, print a JSON report
  scanroute --server-cmd "node server.js" --headless --json img > report.json

  # Scans from a different scanner: move the label band
  scanroute --text-band-height 1200 --header-band-height 400 --x-right 720 img

HOW IT WORKS:
  1. Every regular file in SOURCE is cropped to the label band, thresholded
     and read with tesseract.
  2. The first recognized line with two or three words names the holder;
     the scan moves into SOURCE/<First Last>/.
  3. Once every scan has been tried, folders are grouped by first letter and
     each group is submitted through the form .uploadForm[data-form-type=<L>].

  Scans that cannot be labelled stay in SOURCE and are listed at the end.

ENVIRONMENT VARIABLES:
  TESSERACT_PATH              tesseract executable (also --tesseract)
  TESSDATA_PREFIX             existing tessdata folder with <lang>.traineddata
  TESSERACT_LOCATE_CACHE_DIR  where downloaded language models are cached
  SCANROUTE_*                 every flag below, e.g. SCANROUTE_SERVER_URL
  RUST_LOG                    log filter, e.g. RUST_LOG=scanroute=debug

SETUP:
  1. Install tesseract (apt install tesseract-ocr / brew install tesseract).
  2. Start chromedriver:   chromedriver --port=4444
  3. Start the server:     node server.js   (or pass --server-cmd)
  4. Run:                  scanroute img
"#;

/// Sort scans into folders by the name printed on them, then upload them.
#[derive(Parser, Debug)]
#[command(
    name = "scanroute",
    version,
    about = "Sort scans into folders by their printed label, then upload them by first letter",
    long_about = "Reads the label band of every scan in SOURCE with tesseract, moves each scan \
into a folder named after the label, then uploads the folders letter by letter through a local \
web form driven over WebDriver.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder holding the scans to route.
    #[arg(default_value = "img", env = "SCANROUTE_SOURCE")]
    source: PathBuf,

    /// Distance from the bottom edge to the top of the label band, in pixels.
    #[arg(long, env = "SCANROUTE_TEXT_BAND_HEIGHT", default_value_t = 1398)]
    text_band_height: u32,

    /// Height of the label band, in pixels.
    #[arg(long, env = "SCANROUTE_HEADER_BAND_HEIGHT", default_value_t = 453)]
    header_band_height: u32,

    /// Left bound of the label band.
    #[arg(long, env = "SCANROUTE_X_LEFT", default_value_t = 0)]
    x_left: u32,

    /// Right bound of the label band (exclusive).
    #[arg(long, env = "SCANROUTE_X_RIGHT", default_value_t = 580)]
    x_right: u32,

    /// Lowest grey level kept as text.
    #[arg(long, env = "SCANROUTE_THRESHOLD_LOW", default_value_t = 200)]
    threshold_low: u8,

    /// Highest grey level kept as text.
    #[arg(long, env = "SCANROUTE_THRESHOLD_HIGH", default_value_t = 255)]
    threshold_high: u8,

    /// Characters the recognizer may emit.
    #[arg(long, env = "SCANROUTE_ALLOWLIST")]
    allowlist: Option<String>,

    /// Rotate the label band before recognition: 0, 90, 180 or 270.
    #[arg(long, env = "SCANROUTE_ROTATION", default_value_t = 0,
          value_parser = parse_rotation)]
    rotation: u16,

    /// tesseract language model.
    #[arg(long, env = "SCANROUTE_LANG", default_value = "eng")]
    lang: String,

    /// tesseract page segmentation mode (0–13).
    #[arg(long, env = "SCANROUTE_PSM", default_value_t = 6,
          value_parser = clap::value_parser!(u8).range(0..=13))]
    psm: u8,

    /// tesseract executable; located automatically when omitted.
    #[arg(long, env = "SCANROUTE_TESSERACT")]
    tesseract: Option<PathBuf>,

    /// Page hosting the upload forms.
    #[arg(long, env = "SCANROUTE_SERVER_URL", default_value = "http://localhost:3000/")]
    server_url: String,

    /// WebDriver (chromedriver) endpoint.
    #[arg(long, env = "SCANROUTE_WEBDRIVER_URL", default_value = "http://localhost:4444")]
    webdriver_url: String,

    /// CSS selector of one letter's form; {prefix} is replaced by the letter.
    #[arg(
        long,
        env = "SCANROUTE_FORM_SELECTOR",
        default_value = ".uploadForm[data-form-type={prefix}]"
    )]
    form_selector: String,

    /// Pause after each upload action, in milliseconds.
    #[arg(long, env = "SCANROUTE_ACTION_PAUSE_MS", default_value_t = 50)]
    action_pause_ms: u64,

    /// WebDriver implicit wait for element lookups, in milliseconds.
    #[arg(long, env = "SCANROUTE_IMPLICIT_WAIT_MS", default_value_t = 3000)]
    implicit_wait_ms: u64,

    /// Seconds to wait for the upload server to answer.
    #[arg(long, env = "SCANROUTE_SERVER_WAIT_SECS", default_value_t = 30)]
    server_wait_secs: u64,

    /// Command that starts the upload server, e.g. "node server.js".
    #[arg(long, env = "SCANROUTE_SERVER_CMD")]
    server_cmd: Option<String>,

    /// Run the browser without a window.
    #[arg(long, env = "SCANROUTE_HEADLESS")]
    headless: bool,

    /// Route and group only; do not upload.
    #[arg(long, env = "SCANROUTE_SKIP_UPLOAD")]
    skip_upload: bool,

    /// Print the label each scan would get; move nothing.
    #[arg(long)]
    inspect_only: bool,

    /// Output the run report as JSON on stdout.
    #[arg(long, env = "SCANROUTE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCANROUTE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCANROUTE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCANROUTE_QUIET")]
    quiet: bool,
}

fn parse_rotation(s: &str) -> Result<u16, String> {
    let degrees: u16 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    Rotation::from_degrees(degrees)
        .map(|_| degrees)
        .ok_or_else(|| format!("rotation must be 0, 90, 180 or 270 (got {degrees})"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress_cb = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn RunProgressCallback>);
    let config = build_config(&cli, progress_cb)?;

    // ── Locate tesseract ─────────────────────────────────────────────────
    // The language model may be downloaded on first use; the bar stays
    // hidden unless that actually happens.
    let recognizer = locate_recognizer(&config, cli.quiet)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        if let Some(ref cb) = cli_progress {
            cb.bar.finish_and_clear();
        }
        let previews = inspect(&cli.source, recognizer, &config)
            .await
            .context("Failed to inspect scans")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&previews).context("Failed to serialize previews")?
            );
        } else {
            for p in &previews {
                match (&p.label, &p.error) {
                    (Some(label), _) => println!("{}  →  {}", file_name(&p.source), label),
                    (None, Some(e)) => println!("{}  ✗  {}", file_name(&p.source), e),
                    (None, None) => println!("{}  ?", file_name(&p.source)),
                }
                if cli.verbose {
                    println!("    {}", dim(&format!("{:?}", p.lines)));
                }
            }
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let result = run(&cli.source, recognizer, &config).await;
    if let Some(ref cb) = cli_progress {
        cb.bar.finish_and_clear();
    }
    let report = match result {
        Ok(report) => report,
        Err(ScanRouteError::UploadUnavailable { source, report }) => {
            // Scans have already moved; still show where they went.
            report_run(&cli, &report, !show_progress)?;
            return Err(anyhow::Error::new(*source).context("Upload failed"));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Run failed")),
    };
    report_run(&cli, &report, !show_progress)
}

/// Print the JSON report and/or the human summary, as the flags ask.
fn report_run(cli: &Cli, report: &RunReport, with_totals: bool) -> Result<()> {
    if cli.json {
        let json = serde_json::to_string_pretty(report).context("Failed to serialise report")?;
        println!("{json}");
    }
    if !cli.quiet {
        print_summary(report, with_totals);
    }
    Ok(())
}

/// Map CLI args to `RouteConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RouteConfig> {
    let mut builder = RouteConfig::builder()
        .crop(CropBands {
            text_band_height: cli.text_band_height,
            header_band_height: cli.header_band_height,
            x_left: cli.x_left,
            x_right: cli.x_right,
        })
        .threshold(IntensityBand {
            low: cli.threshold_low,
            high: cli.threshold_high,
        })
        .rotation(Rotation::from_degrees(cli.rotation).unwrap_or_default())
        .language(cli.lang.clone())
        .page_segmentation_mode(cli.psm)
        .server_url(cli.server_url.clone())
        .webdriver_url(cli.webdriver_url.clone())
        .form_selector(cli.form_selector.clone())
        .action_pause_ms(cli.action_pause_ms)
        .implicit_wait_ms(cli.implicit_wait_ms)
        .server_wait_secs(cli.server_wait_secs)
        .headless(cli.headless)
        .skip_upload(cli.skip_upload);

    if let Some(ref chars) = cli.allowlist {
        builder = builder.allowlist(chars.clone());
    }
    if let Some(ref path) = cli.tesseract {
        builder = builder.tesseract_path(path.clone());
    }
    if let Some(ref cmd) = cli.server_cmd {
        builder = builder.server_command(cmd.split_whitespace().map(str::to_string).collect());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Find tesseract, downloading the language model with a progress bar if needed.
fn locate_recognizer(config: &RouteConfig, quiet: bool) -> Result<Arc<dyn TextRecognizer>> {
    let dl_bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix(format!("Model {}", config.language));

    let bar = dl_bar.clone();
    let on_progress = move |downloaded: u64, total: Option<u64>| {
        if quiet {
            return;
        }
        if bar.is_hidden() {
            bar.set_draw_target(ProgressDrawTarget::stderr());
        }
        if let Some(t) = total {
            if bar.length() != Some(t) {
                bar.set_length(t);
            }
        }
        bar.set_position(downloaded);
    };

    // block_in_place keeps the callback borrow valid (no 'static
    // requirement) while offloading the blocking lookup from the executor.
    let recognizer = tokio::task::block_in_place(|| {
        TesseractRecognizer::locate_with_progress(config, Some(&on_progress))
    })
    .context("Failed to set up tesseract")?;

    if !dl_bar.is_hidden() {
        dl_bar.finish_with_message("ready ✓");
    }
    Ok(Arc::new(recognizer))
}

/// Print what went wrong, by image and by group, plus the totals.
fn print_summary(report: &RunReport, with_totals: bool) {
    let batch = &report.batch;
    if with_totals {
        eprintln!(
            "Routed {}/{} scans into {} folders in {}ms",
            batch.stats.routed_images,
            batch.stats.total_images,
            batch.stats.label_folders,
            batch.stats.duration_ms
        );
        if let Some(ref upload) = report.upload {
            eprintln!(
                "Uploaded {}/{} files in {} groups",
                upload.stats.uploaded_files, upload.stats.total_files, upload.stats.total_groups
            );
        }
    }

    let image_failures: Vec<_> = batch.failures().collect();
    if !image_failures.is_empty() {
        eprintln!("{}", bold("Scans left in place:"));
        for o in image_failures {
            if let Some(ref e) = o.error {
                eprintln!("  {} {}", red("✗"), e);
            }
        }
    }

    if let Some(ref upload) = report.upload {
        let group_failures: Vec<_> = upload.failures().collect();
        if !group_failures.is_empty() {
            eprintln!("{}", bold("Groups not fully uploaded:"));
            for g in group_failures {
                if let Some(ref e) = g.error {
                    eprintln!(
                        "  {} {}  {}",
                        red("✗"),
                        e,
                        dim(&format!("({} files skipped)", g.skipped()))
                    );
                }
            }
        }
    } else if report.groups.is_empty() {
        eprintln!("{}", dim("No groups to upload"));
    } else {
        eprintln!(
            "{}",
            dim(&format!(
                "Upload skipped: {} files in {} groups ready",
                report.groups.file_count(),
                report.groups.len()
            ))
        );
    }
}
