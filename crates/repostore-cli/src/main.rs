//! Repostore CLI: serve the repository store, inspect computed storage
//! paths, and drive a running server.

use clap::{Parser, Subcommand};
use repostore_client::Client;
use repostore_core::{encode_repository_path, CloneSpec, RemoteOpts, RepoId, VcsType};
use repostore_server::{observability, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

/// repostore caches and serves information about VCS repositories.
#[derive(Parser, Debug)]
#[command(name = "repostore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Storage root dir for VCS repositories
    #[arg(short = 's', long, global = true)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an HTTP server that serves repository data
    Serve {
        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// HTTP listen address
        #[arg(long)]
        bind_addr: Option<SocketAddr>,

        /// Debug mode: report internal error messages to clients
        /// (don't use on publicly available servers)
        #[arg(short, long)]
        debug: bool,

        /// Require HTTP basic auth, as 'user:password'
        #[arg(long)]
        basic_auth: Option<String>,

        /// HTTP response cache: 'none', 'memory', or 'disk:<dir>'
        #[arg(long)]
        cache: Option<String>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,

        /// Log format (json, pretty)
        #[arg(long)]
        log_format: Option<String>,
    },

    /// Print the computed storage path of a repository
    Repo {
        /// Repository identifier, e.g. example.com/foo/bar
        repo_id: String,
    },

    /// Ask a running server to clone a repository
    Clone {
        /// Repository identifier
        repo_id: String,

        /// VCS type of the remote (git, hg)
        #[arg(long, default_value = "git")]
        vcs: String,

        /// URL to clone from
        #[arg(long)]
        url: String,

        /// Base URL of the server
        #[arg(long, default_value = "http://127.0.0.1:9090")]
        server: String,
    },

    /// Fetch a URL from a running server and print the response body
    Get {
        /// URL to fetch
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("repostore: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            config,
            bind_addr,
            debug,
            basic_auth,
            cache,
            log_level,
            log_format,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::from_file(&path)?,
                None => ServerConfig::default(),
            };
            config.merge_env()?;

            if let Some(dir) = cli.storage_dir {
                config.storage_dir = dir;
            }
            if let Some(addr) = bind_addr {
                config.bind_addr = addr;
            }
            if debug {
                config.debug = true;
            }
            if let Some(auth) = basic_auth {
                config.basic_auth = Some(auth);
            }
            if let Some(cache) = cache {
                config.cache = cache.parse().map_err(anyhow::Error::msg)?;
            }
            if let Some(level) = log_level {
                config.log_level = level;
            }
            if let Some(format) = log_format {
                config.log_format = format;
            }
            config.validate()?;

            observability::init_logging(&config.log_level, config.log_format == "json");
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                storage_dir = %config.storage_dir.display(),
                "starting repostore"
            );
            repostore_server::serve(config).await
        }

        Commands::Repo { repo_id } => {
            let repo_id = RepoId::parse(repo_id)?;
            let storage_dir = cli
                .storage_dir
                .unwrap_or_else(|| ServerConfig::default().storage_dir);
            let path = storage_dir.join(encode_repository_path(&repo_id)?);
            println!("{}", path.display());
            Ok(())
        }

        Commands::Clone {
            repo_id,
            vcs,
            url,
            server,
        } => {
            let repo_id = RepoId::parse(repo_id)?;
            let spec = CloneSpec {
                vcs_type: VcsType::parse(vcs)?,
                clone_url: url,
                remote_opts: RemoteOpts::default(),
            };
            let client = Client::new(&server)?;
            let repo = client.repository(repo_id.clone());
            repo.clone_or_update(&spec).await?;
            println!("cloned {repo_id}");
            Ok(())
        }

        Commands::Get { url } => {
            let response = reqwest::get(&url).await?;
            let status = response.status();
            let body = response.text().await?;
            print!("{body}");
            if !status.is_success() {
                anyhow::bail!("HTTP {status}");
            }
            Ok(())
        }
    }
}
