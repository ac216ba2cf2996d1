//! CLI entry point for `mailsift`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailsift::config::{self, Config};
use mailsift::error_log::ErrorLog;
use mailsift::extract::{InlineMode, MessageAssembler};
use mailsift::fetch::{self, FetchReport, SortOrder};
use mailsift::model::message::ExtractedMessage;
use mailsift::store::mbox::{list_folders_in, MboxTransport};
use mailsift::store::transport::MailTransport;

#[derive(Parser)]
#[command(
    name = "mailsift",
    version,
    about = "Extract attachments and bodies from mailbox messages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Read messages, save attachments and archive each message
    Fetch {
        /// MBOX file or directory of MBOX files
        mailbox: PathBuf,
        /// Folder to read when MAILBOX is a directory [default: INBOX]
        #[arg(long)]
        folder: Option<String>,
        #[command(flatten)]
        overrides: FetchOverrides,
        /// Print the extracted messages as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the folders of a mailbox
    Folders {
        mailbox: PathBuf,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Command-line overrides for the `[fetch]` config section.
#[derive(clap::Args)]
struct FetchOverrides {
    /// Maximum number of messages to read (0 = all)
    #[arg(long)]
    limit: Option<usize>,
    /// Directory for attachments and archive files
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Comma-separated attachment extensions to keep
    #[arg(long, value_name = "EXTS")]
    allowed_ext: Option<String>,
    /// Write an archival .eml file per message
    #[arg(long, value_name = "BOOL")]
    save_to_file: Option<bool>,
    /// Delete processed messages
    #[arg(long)]
    delete: bool,
    /// Move processed messages to this folder
    #[arg(long, value_name = "FOLDER")]
    move_to: Option<String>,
    /// Only delete/move messages that had attachments
    #[arg(long)]
    attachments_required: bool,
    #[arg(long, value_enum)]
    sort: Option<SortOrder>,
    /// Which cid: references to rewrite in HTML bodies
    #[arg(long, value_enum)]
    inline_rewrite: Option<InlineMode>,
    /// Per-message time budget in seconds (0 = none)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Stop at the first message that cannot be read
    #[arg(long)]
    abort_on_error: bool,
    /// Archive template file
    #[arg(long, value_name = "FILE", env = "MAILSIFT_TEMPLATE")]
    template: Option<PathBuf>,
}

impl FetchOverrides {
    fn apply(self, cfg: &mut config::FetchConfig) {
        if let Some(limit) = self.limit {
            cfg.limit = limit;
        }
        if let Some(dir) = self.output_dir {
            cfg.output_dir = dir;
        }
        if let Some(exts) = self.allowed_ext {
            cfg.allowed_extensions = exts;
        }
        if let Some(save) = self.save_to_file {
            cfg.save_to_file = save;
        }
        cfg.delete_after_read |= self.delete;
        if let Some(target) = self.move_to {
            cfg.move_to_folder = target;
        }
        cfg.attachments_required |= self.attachments_required;
        if let Some(sort) = self.sort {
            cfg.sort_order = sort;
        }
        if let Some(mode) = self.inline_rewrite {
            cfg.inline_rewrite = mode;
        }
        if let Some(secs) = self.timeout {
            cfg.message_timeout_secs = secs;
        }
        cfg.abort_on_fetch_error |= self.abort_on_error;
        if self.template.is_some() {
            cfg.template = self.template;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        Commands::Fetch {
            mailbox,
            folder,
            overrides,
            json,
        } => {
            overrides.apply(&mut config.fetch);
            cmd_fetch(&mailbox, folder.as_deref(), &config, json)
        }
        Commands::Folders { mailbox } => cmd_folders(&mailbox),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailsift.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailsift", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// List the folders of a mailbox.
fn cmd_folders(mailbox: &Path) -> anyhow::Result<()> {
    if !mailbox.exists() {
        anyhow::bail!("Mailbox not found: {}", mailbox.display());
    }
    let folders = if mailbox.is_dir() {
        list_folders_in(mailbox)?
    } else {
        MboxTransport::open(mailbox, None)?.list_folders()?
    };
    for folder in folders {
        println!("{folder}");
    }
    Ok(())
}

/// Run one extraction batch and flush the error log.
fn cmd_fetch(mailbox: &Path, folder: Option<&str>, config: &Config, json: bool) -> anyhow::Result<()> {
    if !mailbox.exists() {
        anyhow::bail!("Mailbox not found: {}", mailbox.display());
    }

    let mut transport = MboxTransport::open(mailbox, folder)?;
    let assembler = MessageAssembler::new(config.fetch.assemble_options()?);
    let options = config.fetch.fetch_options();
    let mut errors = ErrorLog::new();

    let pb = ProgressBar::new(transport.message_count() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Reading [{bar:40.cyan/blue}] {pos}/{len} messages ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let result = fetch::get_messages(
        &mut transport,
        &mut errors,
        &assembler,
        &options,
        Some(&|done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
            true
        }),
    );
    pb.finish_and_clear();

    // Flush whatever was recorded, even when the batch failed.
    let log_dir = config::log_dir(config);
    match errors.flush(&log_dir) {
        Ok(Some(path)) => eprintln!("  {} error(s) written to {}", errors.len(), path.display()),
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "Could not write the error log"),
    }

    let report = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report.messages)?);
    } else {
        print_report(&report, &config.fetch.output_dir, start.elapsed());
    }
    Ok(())
}

/// One line per message followed by a summary.
fn print_report(report: &FetchReport, output_dir: &Path, elapsed: Duration) {
    use humansize::{format_size, BINARY};

    for message in &report.messages {
        println!("{}", message_line(message));
    }

    println!(
        "--> Read {} message(s) and wrote {} message(s) and attachment(s) to output folder.",
        report.messages.len(),
        report.files_written()
    );

    let attachment_bytes: u64 = report
        .messages
        .iter()
        .flat_map(|m| m.attachments.iter())
        .filter_map(|name| std::fs::metadata(output_dir.join(name)).ok())
        .map(|meta| meta.len())
        .sum();
    println!(
        "    {} attachment(s), {} in {:.2?}",
        report.attachment_count(),
        format_size(attachment_bytes, BINARY),
        elapsed
    );
    if !report.skipped.is_empty() {
        println!("    {} message(s) skipped after errors", report.skipped.len());
    }
    if report.deleted > 0 {
        println!("    {} message(s) deleted", report.deleted);
    }
    if report.moved > 0 {
        println!("    {} message(s) moved", report.moved);
    }
}

fn message_line(message: &ExtractedMessage) -> String {
    let date = message.date_utc().with_timezone(&Local).format("%d.%m.%Y %H:%M");
    format!(
        "{} - {} - {} - {} - {}",
        message.uid,
        date,
        message.subject,
        message.from_address(),
        if message.process { "processed" } else { "skipped" }
    )
}
