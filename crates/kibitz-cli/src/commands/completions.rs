use super::EXIT_SUCCESS;
use clap::CommandFactory;
use clap_complete::{generate, Shell};

pub fn run<C: CommandFactory>(shell: Shell) -> u8 {
    let mut cmd = C::command();
    generate(shell, &mut cmd, "kibitz", &mut std::io::stdout());
    EXIT_SUCCESS
}
