use anyhow::Result;
use clap::{Parser, Subcommand};
use nse_screener::analysis::Screener;
use nse_screener::filter_utils::{PageView, RelationFilter, ResultFilter};
use nse_screener::indicators::EmaPeriod;
use nse_screener::presets::ScanPreset;
use nse_screener::results_table::render_page;
use nse_screener::tui;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nse-screener")]
#[command(about = "EMA scanner for NSE equities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan and print the filtered page
    Scan {
        /// nifty50, nifty100, nifty200, gainers, losers or custom
        #[arg(short, long)]
        preset: Option<ScanPreset>,
        /// Case-insensitive match on symbol or company name
        #[arg(short, long, default_value = "")]
        search: String,
        /// all, above or below
        #[arg(short, long, default_value_t = RelationFilter::All)]
        relation: RelationFilter,
        /// 10, 20, 50 or 200
        #[arg(long, default_value_t = EmaPeriod::Ema50)]
        period: EmaPeriod,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Interactive dashboard (default)
    Tui,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let screener = Screener::from_storage().await?;

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Scan {
            preset,
            search,
            relation,
            period,
            page,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .init();

            let preset = preset.unwrap_or(screener.config.default_preset);
            let Some((snapshot, report)) = screener.run_scan(preset).await? else {
                warn!(%preset, "nothing was scanned");
                return Ok(());
            };
            println!(
                "Scanned {} symbols in {:.1}s ({} from cache, {} skipped)",
                report.total,
                report.elapsed.as_secs_f64(),
                report.cache_hits,
                report.skipped.len()
            );

            let filter = ResultFilter {
                search,
                relation,
                period,
            };
            let filtered = filter.apply(&snapshot.results);
            let view = PageView::new(&filtered, screener.config.scanner.page_size, page);
            let title = format!("{} | {} {}", preset.description(), relation, period);
            println!("{}", render_page(&view, period, &title));
        }
        Commands::Tui => {
            // The terminal belongs to the dashboard, so logs go to a file.
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(screener.storage.base_dir.join("screener.log"))?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_ansi(false)
                .with_writer(Mutex::new(log_file))
                .init();

            tui::run_tui(screener).await?;
        }
    }

    Ok(())
}
