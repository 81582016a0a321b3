//! Nimble CLI
//!
//! Command-line tool for inspecting goods-receiving sheets and merging donor
//! files into them.

mod logging;

use clap::{Parser, Subcommand, ValueEnum};
use nimble_core::{
    export_matching, merge_with_settings, records_to_json, resolve_folder, write_records_csv,
    Dataset, MergeReport, MergeSettings,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "nimble")]
#[command(about = "Goods-receiving sheet merger", long_about = None)]
#[command(version)]
struct Cli {
    /// Log debug detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the records of a sheet
    Show {
        /// Sheet to show (.csv or .xlsx)
        #[arg(short, long)]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Maximum number of records to display (table only)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List the headers of a sheet
    Headers {
        /// Sheet to inspect
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List donor files a folder merge would process
    Pending {
        /// Donor folder
        #[arg(long)]
        folder: PathBuf,

        /// List every file, even those merged before
        #[arg(long)]
        ignore_cache: bool,
    },

    /// Fill a sheet from one donor file by key
    MergeFile {
        /// Sheet to update
        #[arg(short, long)]
        target: PathBuf,

        /// Donor file
        #[arg(short, long)]
        donor: PathBuf,

        /// Join key as target_header=donor_header
        #[arg(long, value_parser = parse_pair)]
        on: (String, String),

        /// Field mapping as target_header=donor_header (repeatable)
        #[arg(short, long, value_parser = parse_pair)]
        map: Vec<(String, String)>,

        /// Write the result here instead of overwriting the target
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fill or extend a sheet from every new file in a donor folder
    MergeFolder {
        /// Sheet to update
        #[arg(short, long)]
        target: PathBuf,

        /// Donor folder
        #[arg(long)]
        folder: PathBuf,

        /// File whose headers name the donor columns
        #[arg(long)]
        template: PathBuf,

        /// Join key as target_header=donor_header; append records when omitted
        #[arg(long, value_parser = parse_pair)]
        on: Option<(String, String)>,

        /// Field mapping as target_header=donor_header (repeatable)
        #[arg(short, long, value_parser = parse_pair)]
        map: Vec<(String, String)>,

        /// When appending, skip donor records whose value under this target
        /// header already exists
        #[arg(long)]
        dont_import_if: Option<String>,

        /// Process every donor file, even those merged before
        #[arg(long)]
        ignore_cache: bool,

        /// Write the result here instead of overwriting the target
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the merges configured in a settings file
    Merge {
        /// Settings file (.ini)
        #[arg(short, long)]
        settings: PathBuf,

        /// Sheet to update; defaults to the file named in the settings
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Process every donor file, even those merged before
        #[arg(long)]
        ignore_cache: bool,

        /// Write the result here instead of overwriting the target
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also save the settings as <file name>.ini into this directory
        #[arg(long)]
        save_settings: Option<PathBuf>,
    },

    /// Save the records matching header=value to a new file
    Export {
        /// Source sheet
        #[arg(short, long)]
        file: PathBuf,

        /// Filter as header=value
        #[arg(long = "where", value_parser = parse_pair)]
        filter: (String, String),

        /// Destination file
        #[arg(short, long)]
        dest: PathBuf,

        /// Workbook to start from (.xlsx only)
        #[arg(long)]
        template: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> nimble_core::Result<()> {
    match command {
        Commands::Show {
            file,
            format,
            limit,
        } => cmd_show(&file, format, limit),
        Commands::Headers { file } => cmd_headers(&file),
        Commands::Pending {
            folder,
            ignore_cache,
        } => cmd_pending(&folder, ignore_cache),
        Commands::MergeFile {
            target,
            donor,
            on,
            map,
            output,
        } => {
            let mut settings = MergeSettings::new(&target);
            settings.merge_file = Some(donor);
            settings.set_merge_if(&on.0, &on.1);
            for (t, d) in &map {
                settings.add_header(t, d);
            }
            cmd_merge(&target, &settings, false, output.as_deref())
        }
        Commands::MergeFolder {
            target,
            folder,
            template,
            on,
            map,
            dont_import_if,
            ignore_cache,
            output,
        } => {
            let mut settings = MergeSettings::new(&target);
            settings.merge_folder = Some(folder);
            settings.merge_folder_template = Some(template);
            settings.dont_import_if = dont_import_if.unwrap_or_default();
            if let Some((t, d)) = &on {
                settings.set_merge_folder_if(t, d);
            }
            for (t, d) in &map {
                settings.add_folder_header(t, d);
            }
            cmd_merge(&target, &settings, ignore_cache, output.as_deref())
        }
        Commands::Merge {
            settings,
            target,
            ignore_cache,
            output,
            save_settings,
        } => {
            let mut loaded = MergeSettings::load(&settings)?;
            let target = target
                .or_else(|| loaded.file.clone())
                .ok_or_else(|| nimble_core::Error::Settings {
                    path: settings.clone(),
                    line: 0,
                    message: "no target file configured".to_string(),
                })?;
            cmd_merge(&target, &loaded, ignore_cache, output.as_deref())?;

            if let Some(dir) = save_settings {
                loaded.file = Some(target.clone());
                let path = MergeSettings::path_for(&dir, &target);
                loaded.save(&path)?;
                println!("Settings saved to {}", path.display());
            }
            Ok(())
        }
        Commands::Export {
            file,
            filter,
            dest,
            template,
        } => cmd_export(&file, &filter, &dest, template.as_deref()),
    }
}

fn cmd_show(file: &Path, format: OutputFormat, limit: Option<usize>) -> nimble_core::Result<()> {
    let dataset = Dataset::open(file)?;

    match format {
        OutputFormat::Csv => write_records_csv(&dataset, io::stdout().lock())?,
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&records_to_json(&dataset))?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            let keys = dataset.header_keys();
            let header: Vec<&str> = keys.iter().map(|k| k.name.as_str()).collect();
            println!("{}", header.join("\t"));
            println!("{}", "-".repeat(header.len() * 12));

            let row_limit = limit.unwrap_or(dataset.len());
            let mut stdout = io::stdout().lock();
            for record in dataset.records().iter().take(row_limit) {
                let values: Vec<&str> = keys.iter().map(|k| record.get(k)).collect();
                writeln!(stdout, "{}", values.join("\t"))?;
            }

            if dataset.len() > row_limit {
                println!("... ({} more records)", dataset.len() - row_limit);
            }
        }
    }

    Ok(())
}

fn cmd_headers(file: &Path) -> nimble_core::Result<()> {
    let dataset = Dataset::open(file)?;

    println!("File: {}", file.display());
    println!("Header row: {}", dataset.header_row().map_or(0, |r| r + 1));
    println!("Records: {}", dataset.len());
    println!();
    for info in dataset.header_info() {
        println!("  column {:>3}  {}", info.column + 1, info.key);
    }

    Ok(())
}

fn cmd_pending(folder: &Path, ignore_cache: bool) -> nimble_core::Result<()> {
    let files = resolve_folder(folder, ignore_cache)?;

    println!("Files to merge ({}):", files.len());
    for path in &files {
        println!("  {}", path.display());
    }

    Ok(())
}

fn cmd_merge(
    target_path: &Path,
    settings: &MergeSettings,
    ignore_cache: bool,
    output: Option<&Path>,
) -> nimble_core::Result<()> {
    debug!(sheet = %target_path.display(), ignore_cache, "running merge");
    let mut target = Dataset::open(target_path)?;
    let report = merge_with_settings(&mut target, settings, ignore_cache)?;
    print_report(&report);

    target.save(output, None)?;
    println!(
        "\nSaved {} records to {}",
        target.len(),
        output.unwrap_or(target_path).display()
    );

    Ok(())
}

fn cmd_export(
    file: &Path,
    filter: &(String, String),
    dest: &Path,
    template: Option<&Path>,
) -> nimble_core::Result<()> {
    let dataset = Dataset::open(file)?;
    let key = dataset
        .find_header(&filter.0)
        .ok_or_else(|| nimble_core::Error::InvalidJoinConfiguration {
            header: filter.0.clone(),
            path: file.to_path_buf(),
        })?;

    let count = export_matching(&dataset, &key, &filter.1, dest, template)?;
    if count == 0 {
        println!("No records where {} = '{}'", key, filter.1);
    } else {
        println!("Exported {} records to {}", count, dest.display());
    }

    Ok(())
}

fn print_report(report: &MergeReport) {
    println!("Merge complete:");
    println!("  {} cells merged", report.cells_merged);
    println!("  {} records updated", report.records_updated);
    println!("  {} records appended", report.records_appended);

    if !report.donors_processed.is_empty() {
        println!("\nDonor files ({}):", report.donors_processed.len());
        for path in &report.donors_processed {
            println!("  - {}", path.display());
        }
    }

    if !report.donors_skipped.is_empty() {
        println!("\nSkipped ({}):", report.donors_skipped.len());
        for (path, reason) in &report.donors_skipped {
            println!("  {}: {}", path.display(), reason);
        }
    }
}

/// Parse `left=right`
fn parse_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(left, right)| (left.trim().to_string(), right.trim().to_string()))
        .ok_or_else(|| format!("expected 'left=right', got '{}'", s))
}
