//! CLI entry point for `mailarchiver`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailarchiver::config::Config;
use mailarchiver::index::reader as index_reader;
use mailarchiver::normalize::{Envelope, OutgoingMessage};
use mailarchiver::pipeline::{ArchiveOutcome, Archiver};

#[derive(Parser)]
#[command(
    name = "mailarchiver",
    version,
    about = "Archive outgoing email messages to a browsable on-disk store"
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
    /// Archive raw messages (.eml files, or stdin when none is given)
    Archive {
        files: Vec<PathBuf>,
        /// Archive root (overrides the configuration)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
        /// Transport name recorded in the metadata
        #[arg(long, value_name = "NAME")]
        transport: Option<String>,
        /// Envelope sender, used when the message has no From header
        #[arg(long, value_name = "ADDR")]
        envelope_from: Option<String>,
        /// Envelope recipient, used when the message has no To/Cc/Bcc (repeatable)
        #[arg(long = "rcpt", value_name = "ADDR")]
        rcpt: Vec<String>,
        /// Message id assigned by the transport
        #[arg(long, value_name = "ID")]
        message_id: Option<String>,
        /// Parse with the mail-parser object model instead of the byte parser
        #[arg(long)]
        parsed: bool,
        /// Explicitly ask for the message not to be archived
        #[arg(long)]
        skip: bool,
    },
    /// Show the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Options shared by every message of one `archive` run.
struct ArchiveOptions {
    transport: Option<String>,
    envelope: Option<Envelope>,
    message_id: Option<String>,
    parsed: bool,
    skip: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mailarchiver::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Archive {
            files,
            root,
            transport,
            envelope_from,
            rcpt,
            message_id,
            parsed,
            skip,
        } => {
            let envelope = (envelope_from.is_some() || !rcpt.is_empty()).then(|| Envelope {
                sender: envelope_from,
                recipients: rcpt,
            });
            let options = ArchiveOptions {
                transport,
                envelope,
                message_id,
                parsed,
                skip,
            };
            cmd_archive(config, &files, root, &options)
        }
        Commands::Config { init } => cmd_config(&config, init),
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

    let log_dir = mailarchiver::config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailarchiver.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Archive each file (or stdin) and print a summary.
fn cmd_archive(
    mut config: Config,
    files: &[PathBuf],
    root: Option<PathBuf>,
    options: &ArchiveOptions,
) -> anyhow::Result<()> {
    if let Some(root) = root {
        config.archive.root = root;
    }
    let archiver = Archiver::from_config(&config);

    let inputs: Vec<Option<&Path>> = if files.is_empty() {
        vec![None]
    } else {
        files.iter().map(|f| Some(f.as_path())).collect()
    };

    let pb = if inputs.len() > 1 {
        let pb = ProgressBar::new(inputs.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} Archiving [{bar:40.cyan/blue}] {pos}/{len}")
                .expect("valid template")
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let start = Instant::now();
    let mut archived = 0usize;
    let mut skipped = 0usize;
    let mut disabled = 0usize;
    let mut archived_bytes = 0u64;
    let mut last_day = None;

    for input in &inputs {
        let bytes = read_input(*input)?;
        let message = build_message(bytes, options);
        let label = input.map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());

        match archiver.archive(&message)? {
            ArchiveOutcome::Archived(entry) => {
                archived += 1;
                archived_bytes += entry.meta.size + entry.meta.attachments_bytes;
                last_day = Some(entry.meta.sent_at.date_naive());
                pb.println(format!("  archived  {label} -> {}", entry.meta.path));
            }
            ArchiveOutcome::Skipped(reason) => {
                skipped += 1;
                pb.println(format!("  skipped   {label} ({reason})"));
            }
            ArchiveOutcome::Disabled => disabled += 1,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    print_summary(
        archiver.store().root(),
        archived,
        skipped,
        disabled,
        archived_bytes,
        last_day,
        start.elapsed(),
    )
}

fn read_input(path: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Cannot read message from stdin")?;
            Ok(buf)
        }
    }
}

fn build_message(bytes: Vec<u8>, options: &ArchiveOptions) -> OutgoingMessage {
    let mut message = if options.parsed {
        match OutgoingMessage::parsed(&bytes) {
            Some(message) => message,
            None => {
                tracing::warn!("mail-parser rejected the message, using the byte parser");
                OutgoingMessage::raw(bytes)
            }
        }
    } else {
        OutgoingMessage::raw(bytes)
    };

    if let Some(envelope) = &options.envelope {
        message = message.with_envelope(envelope.clone());
    }
    if let Some(transport) = &options.transport {
        message = message.with_transport(transport.as_str());
    }
    if let Some(id) = &options.message_id {
        message = message.with_message_id(id.as_str());
    }
    message.with_skip(options.skip)
}

fn print_summary(
    root: &Path,
    archived: usize,
    skipped: usize,
    disabled: usize,
    archived_bytes: u64,
    last_day: Option<chrono::NaiveDate>,
    elapsed: std::time::Duration,
) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<20} {}", "Archive root", root.display());
    println!("  {:<20} {}", "Archived", archived);
    println!("  {:<20} {}", "Skipped", skipped);
    if disabled > 0 {
        println!("  {:<20} {} (archiving disabled)", "Not archived", disabled);
    }
    println!(
        "  {:<20} {}",
        "Bytes written",
        format_size(archived_bytes, BINARY)
    );

    if let Some(day) = last_day {
        let entries = index_reader::read_day(root, day)?;
        let (messages, attachments) = index_reader::totals(&entries);
        println!(
            "  {:<20} {} entries, {} messages, {} attachments",
            format!("Index {}", day.format("%Y-%m-%d")),
            entries.len(),
            format_size(messages, BINARY),
            format_size(attachments, BINARY)
        );
    }

    println!("  {:<20} {:.2?}", "Elapsed", elapsed);
    println!();
    Ok(())
}

/// Print the effective configuration, or write the defaults with `--init`.
fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        let path = mailarchiver::config::save_config(&Config::default())?;
        println!("  Wrote default configuration to {}", path.display());
        return Ok(());
    }

    if let Some(path) = mailarchiver::config::config_file_path() {
        println!("# {}", path.display());
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailarchiver", &mut std::io::stdout());
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
