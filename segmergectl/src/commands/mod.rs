pub mod cache;
pub mod fetch;
pub mod health;
pub mod merge;
pub mod plan;

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::Cli;

pub(crate) fn print_completions(shell: Shell) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    generate(shell, &mut command, name, &mut std::io::stdout());
}
