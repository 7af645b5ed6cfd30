use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::create_user::CreateUserArgs;
use commands::import::ImportArgs;

#[derive(Parser)]
#[command(name = "rollcall", about = "Student badge issuance", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, env = "ROLLCALL_CONFIG", default_value = "rollcall.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create the data directory, a default configuration and the database
    Init {
        /// Data directory path
        #[arg(long, default_value = "/var/lib/rollcall")]
        data_dir: String,
    },
    /// Start the web console
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },
    /// Import a class roster and print the new login codes
    Import {
        /// Group to import into (created when missing)
        #[arg(long)]
        group: String,
        /// Username of the curator leading the group
        #[arg(long)]
        curator: String,
        /// CSV delimiter, defaults to roster.default_delimiter
        #[arg(long)]
        delimiter: Option<char>,
        /// Parse the file and report counts without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Roster file (.csv, .xls, .xlsx or .ods)
        file: String,
    },
    /// Create an active curator or administrator account
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// curator or administrator
        #[arg(long, default_value = "curator")]
        role: String,
        #[arg(long)]
        password: String,
    },
    /// Show account, group and pass statistics
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => {
            commands::init::run(&data_dir).await?;
        }
        Commands::Serve { port } => {
            commands::serve::run(&cli.config, port).await?;
        }
        Commands::Import {
            group,
            curator,
            delimiter,
            dry_run,
            file,
        } => {
            let args = ImportArgs {
                group: &group,
                curator: &curator,
                file: &file,
                delimiter,
                dry_run,
            };
            commands::import::run(&cli.config, args).await?;
        }
        Commands::CreateUser {
            username,
            email,
            role,
            password,
        } => {
            let args = CreateUserArgs {
                username: &username,
                email: &email,
                role: &role,
                password: &password,
            };
            commands::create_user::run(&cli.config, args).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config).await?;
        }
    }

    Ok(())
}
