mod commands;
mod error;

use std::path::PathBuf;

use structopt::clap::AppSettings::*;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(
        name = "c",
        visible_alias = "create",
        about = "Create a new archive of PATHs and print it on standard output"
    )]
    Create {
        #[structopt(
            name = "PATH",
            parse(from_os_str),
            help = "Files and directories to archive, recursively"
        )]
        paths: Vec<PathBuf>,
    },

    #[structopt(
        name = "x",
        visible_alias = "extract",
        about = "Extract the archive on standard input relative to the current directory"
    )]
    Extract,

    #[structopt(
        name = "t",
        visible_alias = "list",
        about = "List the paths stored in the archive on standard input"
    )]
    List,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ptar",
    about = "Create, extract and list plain text archives.\nOptions must precede the command.",
    settings = &[SubcommandRequiredElseHelp, DisableHelpSubcommand, VersionlessSubcommands],
    usage = "ptar [OPTIONS] <c|x|t> [PATH]..."
)]
struct CliOpts {
    #[structopt(
        long,
        help = "Read PATHs to archive from standard input, one per line, after those given as arguments"
    )]
    paths_from_stdin: bool,

    #[structopt(short, long, help = "Disable standard output buffering")]
    unbuffered: bool,

    #[structopt(
        short,
        long,
        help = "List PATHs added or extracted on standard error"
    )]
    verbose: bool,

    #[structopt(subcommand)]
    cmd: Commands,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = CliOpts::from_iter(wild::args_os());

    let result = match opts.cmd {
        Commands::Create { paths } => {
            commands::create(paths, opts.paths_from_stdin, opts.unbuffered, opts.verbose)
        }
        Commands::Extract => commands::extract(opts.verbose),
        Commands::List => commands::list(opts.unbuffered),
    };

    if let Err(e) = result {
        eprintln!("{}", e.report());
        std::process::exit(1);
    }
}
