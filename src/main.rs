use std::process::ExitCode;

use bluepair::{
    cli::{self, Args, PromptChooser},
    Config, Result, Session,
};
use clap::Parser;

#[pollster::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if args.debug {
        logger.filter_module(env!("CARGO_CRATE_NAME"), log::LevelFilter::Debug);
    }
    logger.init();

    match start(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn start(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let session = Session::new().await?;
    cli::run(args, config, &session, &mut PromptChooser).await
}
