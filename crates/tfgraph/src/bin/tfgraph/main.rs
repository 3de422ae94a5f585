mod cli;

use tfgraph::config::Config;
use tfgraph::graph::Graph;
use tfgraph::plugin::{OfflineLoader, PluginLoader, ProviderInfoLoader};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFGRAPH_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Build(build_cli) => build(build_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn build(cli: cli::BuildCommand) -> anyhow::Result<()> {
    let config = load(&cli.input)?;
    let loader = loader(&cli.plugins);
    let graph = tfgraph::build_graph(&config, loader.as_ref())?;

    output(&cli.output, &graph)?;
    Ok(())
}

fn loader(plugins: &cli::PluginArgs) -> Box<dyn ProviderInfoLoader> {
    if plugins.offline {
        return Box::new(OfflineLoader);
    }

    let loader = plugins
        .plugin_dirs
        .iter()
        .fold(PluginLoader::new(), |loader, dir| loader.search_dir(dir))
        .system_path(!plugins.no_system_path)
        .timeout(plugins.timeout());

    Box::new(loader)
}

fn load(input: &cli::InputArgs) -> anyhow::Result<Config> {
    if !input.workdir && input.files.is_empty() && input.directories.is_empty() {
        let stdin = std::io::read_to_string(std::io::stdin())?;
        let body = hcl_edit::parser::parse_body(&stdin)?;
        return Ok(Config::try_from(body)?);
    }

    let mut config = Config::default();

    if input.workdir {
        config.load_directory(&std::env::current_dir()?)?;
    }

    for file_path in &input.files {
        config.load_file(file_path)?;
    }

    for dir_path in &input.directories {
        config.load_directory(dir_path)?;
    }

    Ok(config)
}

fn output(output: &cli::OutputArgs, graph: &Graph) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), graph)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), graph)?,
    };

    Ok(())
}

/// (tfgraph-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    let config = load(&cli.input)?;

    match cli.command {
        cli::DevSubCommand::Config => println!("{config:#?}"),
        cli::DevSubCommand::Graph => {
            let graph = tfgraph::build_graph(&config, &OfflineLoader)?;
            println!("{graph:#?}")
        }
    }

    Ok(())
}
