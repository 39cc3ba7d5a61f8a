//! Command-line interface for the harvester.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::checkpoint::FileCheckpointStore;
use crate::config::HarvestConfig;
use crate::error::Result;
use crate::export::{merge_sources, write_export, SourcePriority, SourceRecords};
use crate::harvester::{HarvestEvent, HarvestState, Harvester, RunSummary};
use crate::http::create_client;
use crate::sources::{CourseSource, CurriculumApiSource, DepartmentCatalogSource};

/// Course Harvester - Collect course catalogs and link cross-listed courses.
#[derive(Parser)]
#[command(name = "course-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root directory for checkpoints (default: cache/)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one resumable harvest pass against a source.
    Harvest {
        /// Source to harvest
        source: SourceKind,

        /// Maximum number of course details to fetch in this run
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Pause between detail requests, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Rebuild the identity index before linking cross-listings
        #[arg(long)]
        rebuild_index: bool,
    },

    /// Show checkpoint progress for a source.
    Status {
        /// Source to inspect
        source: SourceKind,
    },

    /// Merge all sources into one file for the course store.
    Export {
        /// Output file (JSON)
        #[arg(short, long)]
        output: PathBuf,

        /// Which source wins when two produce the same course
        #[arg(long, value_enum, default_value_t = SourcePriority::PreferComplete)]
        priority: SourcePriority,
    },
}

/// Known sources, in export priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Curriculum REST API
    CurriculumApi,
    /// Department course catalog pages
    DepartmentCatalog,
}

impl SourceKind {
    /// Name of the source's checkpoint directory.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CurriculumApi => CurriculumApiSource::NAME,
            Self::DepartmentCatalog => DepartmentCatalogSource::NAME,
        }
    }
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = HarvestConfig::load(cli.config.as_deref())?;
    if let Some(cache_dir) = cli.cache_dir {
        config = config.with_cache_dir(cache_dir);
    }

    match cli.command {
        Commands::Harvest {
            source,
            batch_size,
            delay_ms,
            rebuild_index,
        } => {
            if let Some(batch_size) = batch_size {
                config = config.with_batch_size(batch_size);
            }
            if let Some(delay_ms) = delay_ms {
                config = config.with_request_delay_ms(delay_ms);
            }
            config.validate()?;
            harvest_command(&config, source, rebuild_index)
        }
        Commands::Status { source } => status_command(&config, source),
        Commands::Export { output, priority } => export_command(&config, &output, priority),
    }
}

/// Execute the harvest command.
fn harvest_command(config: &HarvestConfig, kind: SourceKind, rebuild_index: bool) -> Result<()> {
    let store = FileCheckpointStore::open(config.checkpoint_dir(kind.name()))?;
    let client = create_client()?;

    println!(
        "{} {} (batch size {})",
        style("Harvesting").bold(),
        style(kind.name()).cyan(),
        style(config.batch_size).green()
    );
    println!();

    let summary = match kind {
        SourceKind::CurriculumApi => {
            let source = CurriculumApiSource::from_config(client, config)?;
            run_harvester(source, store, config, rebuild_index)?
        }
        SourceKind::DepartmentCatalog => {
            let source = DepartmentCatalogSource::from_config(client, config)?;
            run_harvester(source, store, config, rebuild_index)?
        }
    };

    print_summary(&summary);
    Ok(())
}

fn run_harvester<S: CourseSource>(
    source: S,
    store: FileCheckpointStore,
    config: &HarvestConfig,
    rebuild_index: bool,
) -> Result<RunSummary> {
    let mut harvester = Harvester::new(source, store)?
        .with_request_delay(config.request_delay())
        .with_fresh_index(rebuild_index);

    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("Discovering collections...");

    let result = harvester.run(config.batch_size, |event| match event {
        HarvestEvent::CollectionSkipped { key, reason } => {
            pb.println(format!(
                "{} {} ({reason})",
                style("Skipping").yellow(),
                key.code
            ));
        }
        HarvestEvent::ItemStarted { ordinal, item } => {
            pb.set_message(format!("Fetching {}...", item.number));
            pb.println(format!(
                "{ordinal}: Getting data for {} ({})",
                style(&item.number).cyan(),
                item.id
            ));
        }
        HarvestEvent::ItemFallback { reason, .. } => {
            pb.println(format!("   - {reason}, using data from course list"));
        }
        HarvestEvent::BatchAborted { item, error } => {
            pb.println(format!(
                "{} at {}: {error}",
                style("Stopped").red().bold(),
                item.id
            ));
        }
    });

    pb.finish_and_clear();
    result
}

fn print_summary(summary: &RunSummary) {
    println!();
    if let Some(error) = &summary.batch.aborted {
        println!(
            "{} after {} item(s): {error}",
            style("Batch aborted").red().bold(),
            summary.batch.fetched
        );
        println!("  Re-run the harvester to continue.");
    }
    println!("  Newly fetched: {}", style(summary.batch.fetched).green());
    if summary.batch.fallbacks > 0 {
        println!(
            "  Using list data only: {}",
            style(summary.batch.fallbacks).yellow()
        );
    }
    if summary.skipped_keys > 0 {
        println!("  Skipped collections: {}", style(summary.skipped_keys).yellow());
    }
    if !summary.failed_keys.is_empty() {
        println!(
            "  Collections to retry: {}",
            style(summary.failed_keys.join(", ")).red()
        );
    }
    println!("  Cross-listings linked: {}", summary.links_added);
    println!("  Courses with data: {}", summary.completed_total);
    println!("  Remaining: {}", summary.pending);
    println!(
        "{} {:.2} seconds",
        style("Time elapsed:").bold(),
        summary.elapsed.as_secs_f64()
    );
}

/// Execute the status command.
fn status_command(config: &HarvestConfig, kind: SourceKind) -> Result<()> {
    let store = FileCheckpointStore::open(config.checkpoint_dir(kind.name()))?;
    let state = HarvestState::load(&store)?;

    println!("{} {}", style("Checkpoint").bold(), store.dir().display());
    match &state.collection_keys {
        Some(keys) => println!("  Collections: {}", keys.len()),
        None => println!("  Collections: {}", style("not enumerated").yellow()),
    }
    println!("  Listed collections: {}", state.listings.len());
    println!("  Listed courses: {}", state.listed_items());
    println!("  Courses with data: {}", state.completed.len());
    println!("  Records: {}", state.record_count());
    println!("  Remaining: {}", state.pending_items());
    match &state.index {
        Some(index) => println!("  Identity index: {} entries", index.len()),
        None => println!("  Identity index: {}", style("not built").yellow()),
    }
    Ok(())
}

/// Execute the export command.
fn export_command(config: &HarvestConfig, output: &Path, priority: SourcePriority) -> Result<()> {
    let mut states = Vec::new();
    for kind in SourceKind::value_variants() {
        let store = FileCheckpointStore::open(config.checkpoint_dir(kind.name()))?;
        states.push((kind.name(), HarvestState::load(&store)?));
    }

    let sources: Vec<SourceRecords<'_>> = states
        .iter()
        .map(|(name, state)| SourceRecords {
            source: name,
            records: &state.records,
        })
        .collect();
    let documents = merge_sources(&config.university_id, &sources, priority);
    let count = documents.len();
    write_export(output, &config.university_id, documents)?;

    println!(
        "{} {} courses to {}",
        style("Exported").green().bold(),
        count,
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_harvest() {
        let cli = Cli::parse_from(["course-harvester", "harvest", "curriculum-api"]);

        let Commands::Harvest {
            source,
            batch_size,
            delay_ms,
            rebuild_index,
        } = cli.command
        else {
            panic!("expected harvest command");
        };
        assert_eq!(source, SourceKind::CurriculumApi);
        assert!(batch_size.is_none());
        assert!(delay_ms.is_none());
        assert!(!rebuild_index);
    }

    #[test]
    fn test_cli_parse_harvest_with_options() {
        let cli = Cli::parse_from([
            "course-harvester",
            "harvest",
            "department-catalog",
            "--batch-size",
            "25",
            "--delay-ms",
            "500",
            "--rebuild-index",
            "--cache-dir",
            "/tmp/cache",
        ]);

        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/cache")));
        let Commands::Harvest {
            source,
            batch_size,
            delay_ms,
            rebuild_index,
        } = cli.command
        else {
            panic!("expected harvest command");
        };
        assert_eq!(source, SourceKind::DepartmentCatalog);
        assert_eq!(batch_size, Some(25));
        assert_eq!(delay_ms, Some(500));
        assert!(rebuild_index);
    }

    #[test]
    fn test_cli_parse_export_default_priority() {
        let cli = Cli::parse_from(["course-harvester", "export", "--output", "out.json"]);
        let Commands::Export { output, priority } = cli.command else {
            panic!("expected export command");
        };
        assert_eq!(output, PathBuf::from("out.json"));
        assert_eq!(priority, SourcePriority::PreferComplete);
    }

    #[test]
    fn test_source_kind_names() {
        assert_eq!(SourceKind::CurriculumApi.name(), "curriculum_api");
        assert_eq!(SourceKind::DepartmentCatalog.name(), "department_catalog");
    }
}
