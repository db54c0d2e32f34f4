use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    #[command(about = "Harvest the collection, resuming from the last checkpoint (default)")]
    Run,

    #[command(about = "Open a browser to sign in and store the session cookies")]
    Login,

    #[command(about = "Show checkpoint and stored asset counts")]
    Status,

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        subcommand: ConfigCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    #[command(about = "Initialize config file with defaults")]
    Init,

    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Show config file path")]
    Path,
}
