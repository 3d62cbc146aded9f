use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

/// Xel package manager.
///
/// Installs, removes and lists the packages a Xel project depends on.
/// Packages come from the configured registry or from git repositories
/// (`git+<url>`) and are cached under the first configured module path.
///
/// EXAMPLES:
///     xel pkg add colors@^1.2.0        Install a package and record it
///     xel pkg add                      Install every declared dependency
///     xel pkg remove colors            Remove a dependency
///     xel pkg list                     List declared dependencies
///
/// ENVIRONMENT VARIABLES:
///     XEL_HOME            Configuration directory (default ~/.xel)
///     XEL_MODULE_PATHS    Module paths, overriding config.json
///     XEL_REGISTRY        Registry URI, overriding config.json
///     XEL_LOG             Log filter (default 'warn')
///     XEL_DEV_MODE        Set to '1' to skip version compatibility checks
///     NO_COLOR            Set to disable colored output
#[derive(Parser)]
#[command(name = "xel")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage project packages
    #[command(subcommand)]
    Pkg(PkgCommand),
}

#[derive(Subcommand)]
enum PkgCommand {
    /// Install packages and record them in xel.json
    ///
    /// Each package is given as name[@constraint]. Without a constraint the
    /// one declared in xel.json is used, then '*'. Without any package,
    /// every declared dependency is installed. Dependencies of newly
    /// installed packages are installed too.
    ///
    /// EXAMPLES:
    ///     xel pkg add colors                       Highest available version
    ///     xel pkg add colors@~1.2                  Constrained version
    ///     xel pkg add @scope/util@latest           Newest from the registry
    ///     xel pkg add git+https://host/repo.git    From git tags
    #[command(visible_alias = "install")]
    Add {
        /// Packages to install (name[@constraint])
        packages: Vec<String>,
    },

    /// Remove packages
    ///
    /// Declared dependencies are removed from xel.json and xel.lock.
    /// Anything else is deleted from the module cache.
    ///
    /// EXAMPLES:
    ///     xel pkg remove colors                    Remove a dependency
    ///     xel pkg remove --global colors@1.0.0     Delete an installed version
    #[command(visible_alias = "uninstall")]
    Remove {
        /// Delete installed versions from the module cache
        #[arg(long, short = 'g')]
        global: bool,
        /// Only edit xel.json and xel.lock
        #[arg(long, short = 'l')]
        local: bool,
        /// Packages to remove (name[@constraint])
        packages: Vec<String>,
    },

    /// List the dependencies declared in xel.json
    #[command(visible_alias = "ls")]
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cli_config = config::Config::from_env();
    install_tracing(&cli_config.log_filter);
    if cli_config.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let project_dir = std::env::current_dir().context("Failed to read working directory")?;

    match cli.command {
        Commands::Pkg(PkgCommand::Add { packages }) => {
            let manager = commands::package_manager(cli_config.runtime_versions())?;
            commands::add::run(
                commands::add::AddArgs {
                    packages,
                    project_dir,
                },
                &manager,
            )?;
        }
        Commands::Pkg(PkgCommand::Remove {
            global,
            local,
            packages,
        }) => {
            let mode = commands::remove::RemoveMode::from_flags(global, local)?;
            let manager = commands::package_manager(cli_config.runtime_versions())?;
            commands::remove::run(
                commands::remove::RemoveArgs {
                    packages,
                    mode,
                    project_dir,
                },
                &manager,
            )?;
        }
        Commands::Pkg(PkgCommand::List) => {
            commands::list::run(&project_dir)?;
        }
    }

    Ok(())
}

fn install_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
