use super::args::*;

pub mod baseline;
pub(crate) mod run;
pub mod validate;

use crate::exit_codes::EXIT_SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args).await,
        Command::Validate(args) => validate::run(args),
        Command::Baseline(args) => match args.cmd {
            BaselineSub::List(list_args) => baseline::cmd_baseline_list(list_args),
        },
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(EXIT_SUCCESS)
        }
    }
}
