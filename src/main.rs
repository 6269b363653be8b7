use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use genmq::{exit_codes, GenerateConfig, MergeConfig, RowSelection, SplitConfig, SplitThreshold};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "genmq",
    version,
    author,
    about = "Generate, split, and merge Moodle quiz XML",
    long_about = "Generate Moodle quiz XML from a LaTeX template and a CSV variable database.\n\n\
    Each data row of the database produces one question variant: placeholders in the \
    template are replaced with the row's values and the variant is compiled with the \
    moodle.sty toolchain (or wrapped directly in simple mode). The split and merge \
    subcommands repartition quiz files that Moodle's import size limit rejects.\n\n\
    USAGE EXAMPLES:\n  \
      # Generate from a template and database (pdflatex + pythontex)\n  \
      genmq generate -t exam.tex -c students.csv\n\n  \
      # Substitution only, no LaTeX toolchain\n  \
      genmq generate -t exam.tex -c students.csv --simple\n\n  \
      # Split a large bank into files of at most 40 questions\n  \
      genmq split bank.xml -q 40 -d parts\n\n  \
      # Merge the parts back into one document\n  \
      genmq merge all.xml -d parts"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate quiz XML from a LaTeX template and a CSV database.
    ///
    /// One question variant is produced per data row; the header row names
    /// the placeholders.
    Generate(GenerateArgs),

    /// Split a quiz XML file into smaller, independently importable files.
    ///
    /// Question order is preserved and category context is replicated into
    /// every part. A JSON manifest describing the partition is written
    /// alongside.
    Split(SplitArgs),

    /// Merge a directory of quiz XML files into one document.
    ///
    /// Members are taken in name order; the first contributes its full
    /// context, the rest contribute their questions.
    Merge(MergeArgs),
}

#[derive(Parser, Debug)]
#[command(group = ArgGroup::new("rows").args(["number", "index"]))]
struct GenerateArgs {
    /// LaTeX template file with {{name}} or \VAR{name} placeholders
    #[arg(short, long, value_name = "FILE")]
    template: PathBuf,

    /// CSV database; the header row names the placeholders
    #[arg(short, long, value_name = "FILE")]
    csv: PathBuf,

    /// Output XML path (defaults to the template name with .xml)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Skip the LaTeX toolchain and wrap substituted text directly
    #[arg(short, long)]
    simple: bool,

    /// Process only the first N data rows
    #[arg(short, long, value_name = "N")]
    number: Option<usize>,

    /// Process only the single data row with this 1-based number
    #[arg(short, long, value_name = "ROW")]
    index: Option<usize>,

    /// Skip the pythontex pass and its pdflatex rerun
    #[arg(long)]
    no_pythontex: bool,

    /// Keep per-run compile workspaces for debugging
    #[arg(long)]
    keep_temps: bool,

    /// Write captured toolchain output to log files next to the output
    #[arg(long)]
    log: bool,

    /// pdflatex executable name or path
    #[arg(long, env = "GENMQ_PDFLATEX", value_name = "CMD")]
    pdflatex: Option<String>,

    /// pythontex executable name or path
    #[arg(long, env = "GENMQ_PYTHONTEX", value_name = "CMD")]
    pythontex: Option<String>,

    /// Overwrite an existing output file without keeping a backup
    #[arg(long)]
    no_backup: bool,
}

#[derive(Parser, Debug)]
#[command(group = ArgGroup::new("threshold").args(["questions", "max_size"]))]
struct SplitArgs {
    /// Moodle quiz XML file to split
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Maximum questions per output file
    #[arg(short, long, value_name = "N")]
    questions: Option<usize>,

    /// Maximum output file size in MiB (default 20)
    #[arg(short = 'z', long, value_name = "MIB")]
    max_size: Option<u64>,

    /// Directory for the split files (defaults to the input's directory)
    #[arg(short = 'd', long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Overwrite existing output files without keeping backups
    #[arg(long)]
    no_backup: bool,
}

#[derive(Parser, Debug)]
struct MergeArgs {
    /// Path of the merged output document
    #[arg(value_name = "FILE")]
    output: PathBuf,

    /// Directory searched for *.xml member files
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    directory: PathBuf,

    /// Overwrite an existing output file without keeping a backup
    #[arg(long)]
    no_backup: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders its own message; --help and --version are not
            // errors, everything else is a usage error.
            let code = if err.use_stderr() {
                exit_codes::CONFIG
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            return ExitCode::from(code as u8);
        }
    };

    setup_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(command: Command) -> genmq::Result<()> {
    match command {
        Command::Generate(args) => {
            let mut builder = GenerateConfig::builder()
                .template(args.template)
                .database(args.csv)
                .simple(args.simple)
                .pythontex(!args.no_pythontex)
                .keep_temps(args.keep_temps)
                .capture_logs(args.log)
                .backup_existing(!args.no_backup);

            if let Some(output) = args.output {
                builder = builder.output(output);
            }
            if let Some(n) = args.number {
                builder = builder.rows(RowSelection::First(n));
            }
            if let Some(i) = args.index {
                builder = builder.rows(RowSelection::Only(i));
            }
            if let Some(cmd) = args.pdflatex {
                builder = builder.pdflatex_cmd(cmd);
            }
            if let Some(cmd) = args.pythontex {
                builder = builder.pythontex_cmd(cmd);
            }

            genmq::generate(builder.build()?)?;
        }
        Command::Split(args) => {
            let mut config = SplitConfig::new(args.input).backup_existing(!args.no_backup);

            if let Some(n) = args.questions {
                config = config.threshold(SplitThreshold::Questions(n));
            }
            if let Some(mib) = args.max_size {
                config = config.threshold(SplitThreshold::max_size_mib(mib));
            }
            if let Some(dir) = args.output_dir {
                config = config.output_dir(dir);
            }

            genmq::split(config)?;
        }
        Command::Merge(args) => {
            let config = MergeConfig::new(args.output)
                .directory(args.directory)
                .backup_existing(!args.no_backup);

            genmq::merge(config)?;
        }
    }

    Ok(())
}

fn setup_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::new("genmq=info"),
        1 => EnvFilter::new("genmq=debug"),
        _ => EnvFilter::new("genmq=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();
}
