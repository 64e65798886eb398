use clap::Parser;
use printlink::cli::{Cli, Cmd};
use printlink::{app, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let (mut config, config_path) = app::load_config(args.config.as_deref())?;

    init_logging(&config.logging)?;
    tracing::debug!("PrintLink {} using {}", printlink::VERSION, config_path.display());

    match args.cmd {
        Cmd::Ports(opts) => app::list(&opts),
        Cmd::InitConfig => app::init_config(&config, &config_path),
        Cmd::Run(opts) => {
            app::apply_overrides(&mut config, &opts)?;
            app::run(config, opts).await
        }
    }
}
