use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use photoarchive::photoarchive_core::progress::NoopSink;
use photoarchive::photoarchive_core::service::OperationTask;
use photoarchive::photoarchive_core::validate::validate_archive;
use photoarchive::photoarchive_core::{
    ArchiveService, CancelToken, Cli, Commands, ImportOptions, Library, Phase, ProgressEvent,
    ProgressReporter, Strategy, ValidationLimits,
};
use simplelog::{CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, WriteLogger};
use std::fs::File;

const BAR_TICKS: u64 = 1000;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize loggers
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Warn,
        Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];

    if cli.log {
        loggers.push(WriteLogger::new(
            cli.log_level,
            Config::default(),
            File::create("photoarchive.log")?,
        ));
    }

    CombinedLogger::init(loggers)?;

    match cli.command {
        Commands::Create { library_dir } => {
            Library::create(&library_dir)?;
            println!("Created library at {}", library_dir.display());
            println!("  library.db - categories and photo metadata");
            println!("  photos/    - photo files");
        }

        Commands::Category {
            library_dir,
            display_name,
            color,
        } => {
            let mut lib = Library::open(&library_dir)?;
            let category = lib.add_category(&display_name, &color)?;
            println!(
                "Created category '{}' ({})",
                category.display_name, category.color_hex
            );
        }

        Commands::Add {
            source_dir,
            library_dir,
            category,
            favorite,
        } => {
            let mut lib = Library::open(&library_dir)?;
            let stats = lib.add_photos(&source_dir, category.as_deref(), favorite)?;

            println!("\nAdd complete!");
            println!("  {} photos added", stats.photos_added);
            if stats.duplicates_skipped > 0 {
                println!("  {} duplicates skipped", stats.duplicates_skipped);
            }
            if stats.errors > 0 {
                println!("  {} errors (see log)", stats.errors);
            }
        }

        Commands::List { library_dir } => {
            let lib = Library::open(&library_dir)?;
            let db = lib.database();

            println!("Library: {}", library_dir.display());
            println!("─────────────────────────────────");
            for (category, count) in db.photo_counts()? {
                let marker = if category.is_default { " (default)" } else { "" };
                println!("{:<24} {:>8}{}", category.display_name, count, marker);
            }
            println!("─────────────────────────────────");
            println!(
                "Total: {} photos ({:.1} MB)",
                db.photo_count()?,
                db.total_photo_size()? as f64 / 1_048_576.0
            );
        }

        Commands::Export {
            library_dir,
            archive,
        } => {
            let lib = Library::open(&library_dir)?;
            let service = ArchiveService::new(lib);
            let task = service.spawn_export(archive)?;
            follow(&task)?;
            let report = task.wait()?;

            println!("\nExport complete!");
            println!("  {}", report.archive_path.display());
            println!(
                "  {} photos in {} categories ({} bytes)",
                report.photo_count, report.category_count, report.total_bytes
            );
            if !report.warnings.is_empty() {
                println!("  {} photos could not be read:", report.warnings.len());
                print!("{}", report.warnings);
            }
        }

        Commands::Validate { archive, limits } => {
            let limits = ValidationLimits::from(&limits);
            let result = validate_archive(
                &archive,
                &limits,
                &ProgressReporter::new(NoopSink),
                &CancelToken::new(),
            )?;

            println!("Archive OK: {}", archive.display());
            println!("  {} photo entries", result.entry_count);
            println!("  {} bytes uncompressed", result.total_uncompressed_size);
            println!("  {} byte manifest", result.manifest_size);
        }

        Commands::Import {
            archive,
            library_dir,
            strategy,
            match_content,
            limits,
        } => {
            let lib = Library::open(&library_dir)?;
            let options = ImportOptions {
                strategy: Strategy::from(strategy),
                limits: ValidationLimits::from(&limits),
                match_content_hash: match_content,
                scratch_parent: Some(lib.scratch_dir()),
            };
            let service = ArchiveService::new(lib);
            let task = service.import_with_options(&archive, options)?;
            follow(&task)?;
            let summary = task.wait()?;

            println!("\nImport complete ({})!", summary.strategy);
            println!(
                "  {} categories created, {} matched",
                summary.categories_imported, summary.categories_matched
            );
            if summary.categories_removed > 0 {
                println!("  {} categories removed", summary.categories_removed);
            }
            println!("  {} photos imported", summary.photos_imported);
            if summary.photos_skipped > 0 {
                println!("  {} duplicates skipped", summary.photos_skipped);
            }
            if summary.photos_not_removed > 0 {
                println!("  {} old photos could not be removed", summary.photos_not_removed);
            }
            for failure in &summary.failures {
                println!(
                    "  failed: {} ({}): {}",
                    failure.name, failure.record_id, failure.reason
                );
            }
            if summary.cancelled {
                println!("  cancelled before all photos were processed");
            }
            summary.into_result()?;
        }
    }

    Ok(())
}

/// Render a task's phase events as one progress bar per phase.
fn follow<T>(task: &OperationTask<T>) -> Result<()> {
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")?;

    let mut current: Option<(Phase, ProgressBar)> = None;
    for event in task.events().iter() {
        match event {
            ProgressEvent::Phase { phase, fraction } => {
                let bar = match current.take() {
                    Some((p, bar)) if p == phase => bar,
                    previous => {
                        if let Some((_, bar)) = previous {
                            bar.finish();
                        }
                        let bar = ProgressBar::new(BAR_TICKS).with_style(bar_style.clone());
                        bar.set_message(phase.as_str());
                        bar
                    }
                };
                bar.set_position((fraction * BAR_TICKS as f64) as u64);
                current = Some((phase, bar));
            }
            ProgressEvent::Finished(_) => {
                if let Some((_, bar)) = current.take() {
                    bar.finish();
                }
            }
        }
    }
    Ok(())
}
