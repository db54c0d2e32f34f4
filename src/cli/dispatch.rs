use super::{
    Cli,
    commands::{Command, ConfigCommand},
};
use crate::{Result, config::Config, handlers, output};
use std::sync::Arc;

pub async fn dispatch(mut cli: Cli, config: Arc<Config>) -> Result<()> {
    let command = cli.command.take().unwrap_or(Command::Run);

    match command {
        Command::Run => {
            let result = handlers::harvest::handle_run(config.clone()).await?;
            output::print_output(&result, cli.json, config.output.json_pretty)
        }
        Command::Login => handlers::login::handle_login(config).await,
        Command::Status => {
            let result = handlers::status::handle_status(&config)?;
            output::print_output(&result, cli.json, config.output.json_pretty)
        }
        Command::Config { subcommand } => handle_config_command(subcommand, &cli, &config),
    }
}

fn handle_config_command(subcommand: ConfigCommand, cli: &Cli, config: &Config) -> Result<()> {
    match subcommand {
        ConfigCommand::Init => {
            let result = handlers::config_handler::handle_config_init()?;
            output::print_output(&result, cli.json, true)
        }
        ConfigCommand::Show => {
            let result = handlers::config_handler::handle_config_show(config)?;
            output::print_output(&result, cli.json, true)
        }
        ConfigCommand::Path => {
            let result = handlers::config_handler::handle_config_path()?;
            output::print_output(&result, cli.json, true)
        }
    }
}
