use clap::{Arg, ArgAction, Command};

pub(super) const MODE_PUBLISH: &str = "publish";
pub(super) const MODE_DIRECT: &str = "direct";
pub(super) const MODE_LOG: &str = "log";

pub(super) fn root_cli() -> Command {
    Command::new("catalogflow")
        .about("Catalog feed ingestion into locale search indices")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(add_ingest_subcommand())
        .subcommand(add_verify_subcommand())
        .subcommand(add_create_index_subcommand())
        .subcommand(add_consume_subcommand())
}

fn file_arg() -> Arg {
    Arg::new("file")
        .long("file")
        .help("Path to the delimited feed file")
        .required(true)
        .action(ArgAction::Set)
        .value_parser(clap::value_parser!(std::path::PathBuf))
}

fn add_ingest_subcommand() -> Command {
    Command::new("ingest")
        .about("Decode a feed file and dispatch it in batches")
        .arg_required_else_help(true)
        .arg(file_arg())
        .arg(
            Arg::new("mode")
                .long("mode")
                .help("Where flushed batches go")
                .action(ArgAction::Set)
                .value_parser([MODE_PUBLISH, MODE_DIRECT, MODE_LOG])
                .default_value(MODE_PUBLISH),
        )
        .arg(
            Arg::new("lang")
                .long("lang")
                .help("Write every record to this locale's index (direct mode only)")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(String)),
        )
}

fn add_verify_subcommand() -> Command {
    Command::new("verify")
        .about("Sample a feed file and count how many sampled skus the index holds")
        .arg_required_else_help(true)
        .arg(file_arg())
        .arg(
            Arg::new("lang")
                .long("lang")
                .help("Locale whose index is checked")
                .required(true)
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(String)),
        )
}

fn add_create_index_subcommand() -> Command {
    Command::new("create-index")
        .about("Create every configured locale index that does not exist yet")
        .arg(
            Arg::new("settings")
                .long("settings")
                .help("JSON file with the index settings and mappings")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
}

fn add_consume_subcommand() -> Command {
    Command::new("consume").about("Run the upsert and feed-notification consumers")
}
