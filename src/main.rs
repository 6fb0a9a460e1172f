// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::Parser;

use pipe_detect::cli::args::{Cli, Commands};
use pipe_detect::cli::count::{run_clear_cache, run_count};

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Count(args) => run_count(args),
        Commands::ClearCache(args) => run_clear_cache(args),
    }
}
