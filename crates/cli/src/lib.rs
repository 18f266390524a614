pub mod bootstrap;
pub mod commands;
pub mod logging;
pub mod service;

use std::path::PathBuf;
use std::process::ExitCode;

use chainpolicy_core::config::{ConfigOverrides, LoadOptions};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "chainpolicy",
    about = "Translate blockchain selection intents into enforced policies",
    long_about = "Parse and translate intents, manage stored intents and their policies, maintain conversion rates, run migrations and inspect configuration.",
    after_help = "Examples:\n  chainpolicy parse for client1 select the fastest blockchain\n  chainpolicy intent create --owner alice \"for client1 select bitcoin as default\"\n  chainpolicy rates set CHF 1.09"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Path to a chainpolicy.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override pdp.enabled")]
    pdp_enabled: Option<bool>,
    #[arg(long, global = true, help = "Override pdp.base_url")]
    pdp_url: Option<String>,
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                pdp_enabled: self.pdp_enabled,
                pdp_base_url: self.pdp_url.clone(),
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Check a sentence against the intent grammar and list accepted next tokens")]
    Parse { text: Vec<String> },
    #[command(about = "Translate an intent into policies without enforcing them")]
    Translate {
        #[arg(required = true)]
        text: Vec<String>,
    },
    #[command(subcommand, about = "Create, update, delete and list stored intents")]
    Intent(IntentCommand),
    #[command(subcommand, about = "Manage currency conversion rates")]
    Rates(RatesCommand),
    #[command(about = "Apply pending database migrations")]
    Migrate {
        #[arg(long, help = "Revert every applied migration instead")]
        revert: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

#[derive(Debug, Subcommand)]
enum IntentCommand {
    #[command(about = "Translate, enforce and store a new intent")]
    Create {
        #[arg(long)]
        owner: String,
        #[arg(required = true)]
        text: Vec<String>,
    },
    #[command(about = "Replace an intent's text and reconcile its policies")]
    Update {
        id: String,
        #[arg(required = true)]
        text: Vec<String>,
    },
    #[command(about = "Retire an intent's policies and delete it")]
    Delete { id: String },
    #[command(about = "Show one intent with its policies")]
    Show { id: String },
    #[command(about = "List an owner's intents with their policies")]
    List {
        #[arg(long)]
        owner: String,
    },
}

#[derive(Debug, Subcommand)]
enum RatesCommand {
    #[command(about = "Store the USD value of one unit of a currency")]
    Set { currency: String, rate: String },
    #[command(about = "List stored conversion rates")]
    List,
}

fn sentence(words: &[String]) -> String {
    words.join(" ")
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();
    logging::init(&options);

    let result = match cli.command {
        Command::Parse { text } => commands::parse::run(&sentence(&text)),
        Command::Translate { text } => commands::translate::run(&options, &sentence(&text)),
        Command::Intent(IntentCommand::Create { owner, text }) => {
            commands::intent::create(&options, &owner, &sentence(&text))
        }
        Command::Intent(IntentCommand::Update { id, text }) => {
            commands::intent::update(&options, &id, &sentence(&text))
        }
        Command::Intent(IntentCommand::Delete { id }) => commands::intent::delete(&options, &id),
        Command::Intent(IntentCommand::Show { id }) => commands::intent::show(&options, &id),
        Command::Intent(IntentCommand::List { owner }) => commands::intent::list(&options, &owner),
        Command::Rates(RatesCommand::Set { currency, rate }) => {
            commands::rates::set(&options, &currency, &rate)
        }
        Command::Rates(RatesCommand::List) => commands::rates::list(&options),
        Command::Migrate { revert } => commands::migrate::run(&options, revert),
        Command::Config => commands::config::run(&options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
