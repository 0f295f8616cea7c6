use clap::Parser;
use todo_iterator::app::AppContext;
use todo_iterator::cli::{Cli, Commands};
use todo_iterator::cli_handlers::{
    handle_add, handle_done, handle_list, handle_login, handle_logout, handle_queue,
    handle_remove, handle_reset, handle_status, handle_sync, handle_tree,
};
use todo_iterator::error::Result;
use todo_iterator::logging::LoggingConfig;
use todo_iterator::tasks::TaskStore;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LoggingConfig::from_args(cli.quiet, cli.verbose > 0, cli.json);
    if let Err(e) = todo_iterator::logging::init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli).await {
        let error_response = e.to_error_response();
        eprintln!("{}", serde_json::to_string_pretty(&error_response).unwrap());
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let ctx = AppContext::load_or_init().await?;
    let store = TaskStore::new(&ctx.pool);

    match cli.command.clone() {
        Commands::Add {
            name,
            description,
            parent,
            format,
        } => handle_add(&store, &name, &description, parent, &format).await?,

        Commands::List { parent, format } => handle_list(&store, parent, &format).await?,

        Commands::Tree { format } => handle_tree(&store, &format).await?,

        Commands::Queue { format } => handle_queue(&store, &format).await?,

        Commands::Done { id } => handle_done(&store, &id).await?,

        Commands::Remove { id } => handle_remove(&store, &id).await?,

        Commands::Sync { full } => {
            let engine = ctx.sync_engine();
            handle_sync(&engine, full).await?
        },

        Commands::Login => {
            let engine = ctx.sync_engine();
            handle_login(&engine).await?
        },

        Commands::Logout => {
            let engine = ctx.sync_engine();
            handle_logout(&engine).await?
        },

        Commands::Reset => {
            let engine = ctx.sync_engine();
            handle_reset(&engine).await?
        },

        Commands::Status { format } => {
            let engine = ctx.sync_engine();
            handle_status(&engine, &format).await?
        },
    }

    Ok(())
}
