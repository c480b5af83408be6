use std::{error::Error, path::PathBuf, process};

use clap::{command, Parser, Subcommand, ValueEnum, ValueHint};
use log::{debug, error, info, LevelFilter};
use serde::Serialize;

use soundgate::{
    config::Config,
    gateway::Gateway,
    protocol::{Paginated, Playlist, Protocol, Track, User},
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// A TOML file that overrides the user agent, API hosts and cache
    /// time-to-lives. Without it, the production defaults are used.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "SOUNDGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON instead of human-readable text.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Resolve a user permalink, like `artist`
    User { permalink: String },

    /// Resolve a track permalink, like `artist/track`
    Track { permalink: String },

    /// Resolve a playlist permalink, like `artist/sets/album`
    Playlist { permalink: String },

    /// List the tracks uploaded by a user
    UserTracks {
        permalink: String,

        /// Query string to pass along, like `?limit=20`
        #[arg(long, default_value = "")]
        args: String,
    },

    /// Search for tracks, users or playlists
    Search {
        #[arg(value_enum)]
        kind: SearchKind,

        /// Search terms
        query: String,

        /// Number of results per page
        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },

    /// Print a playable URL for a track permalink
    Stream {
        permalink: String,

        /// Only consider this protocol
        #[arg(long, value_enum)]
        protocol: Option<StreamProtocol>,
    },

    /// Fetch the next batch of missing playlist tracks from a cursor
    Missing { cursor: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SearchKind {
    Tracks,
    Users,
    Playlists,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StreamProtocol {
    Progressive,
    Hls,
}

impl From<StreamProtocol> for Protocol {
    fn from(protocol: StreamProtocol) -> Self {
        match protocol {
            StreamProtocol::Progressive => Protocol::Progressive,
            StreamProtocol::Hls => Protocol::Hls,
        }
    }
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("soundgate", level);
    }

    logger.init();
}

/// Loads the configuration file, if any.
fn load_config(path: Option<&PathBuf>) -> soundgate::error::Result<Config> {
    match path {
        Some(path) => {
            debug!("loading configuration from {}", path.display());
            Config::from_file(path)
        }
        None => Ok(Config::default()),
    }
}

/// Something that can be printed for humans.
trait Describe {
    fn describe(&self) -> String;
}

impl Describe for User {
    fn describe(&self) -> String {
        format!(
            "{} ({})\n{}",
            self.format_username(),
            self.permalink,
            self.format_description()
        )
    }
}

impl Describe for Track {
    fn describe(&self) -> String {
        let artist = self
            .user
            .as_ref()
            .map(User::format_username)
            .unwrap_or_default();
        format!(
            "{artist} - {} [{}]\n{}",
            self.title,
            self.id,
            self.format_description()
        )
    }
}

impl Describe for Playlist {
    fn describe(&self) -> String {
        let mut out = format!("{} [{}]\n{}", self.title, self.id, self.format_description());
        for (i, track) in self.tracks.iter().enumerate() {
            if track.is_stub() {
                out.push_str(&format!("\n{:>3}. ({})", i + 1, track.id));
            } else {
                out.push_str(&format!("\n{:>3}. {}", i + 1, track.title));
            }
        }
        if !self.missing_tracks.is_empty() {
            out.push_str(&format!("\nMissing: {}", self.missing_tracks));
        }
        out
    }
}

fn print<T>(json: bool, value: &T) -> Result<(), Box<dyn Error>>
where
    T: Serialize + Describe,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value.describe());
    }
    Ok(())
}

fn print_all<T>(json: bool, values: &[T]) -> Result<(), Box<dyn Error>>
where
    T: Serialize + Describe,
{
    if json {
        println!("{}", serde_json::to_string_pretty(values)?);
    } else {
        for value in values {
            println!("{}\n", value.describe());
        }
    }
    Ok(())
}

/// Fetches `pages` pages of a listing, starting with `page`.
async fn collect_pages<T>(
    gateway: &Gateway,
    mut page: Paginated<T>,
    pages: u32,
) -> soundgate::error::Result<Vec<T>>
where
    T: serde::de::DeserializeOwned + soundgate::protocol::Entity,
{
    let mut results = std::mem::take(&mut page.collection);
    for _ in 1..pages {
        if !page.has_next() {
            break;
        }
        gateway.proceed(&mut page).await?;
        results.append(&mut page.collection);
    }
    Ok(results)
}

/// Runs a single command.
///
/// # Errors
///
/// Returns an error when the configuration cannot be loaded, or when the
/// upstream cannot satisfy the request.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(args.config.as_ref())?;
    let gateway = Gateway::new(&config)?;

    match args.command {
        Command::User { permalink } => print(args.json, &gateway.user(&permalink).await?),
        Command::Track { permalink } => print(args.json, &gateway.track(&permalink).await?),
        Command::Playlist { permalink } => {
            print(args.json, &gateway.playlist(&permalink).await?)
        }
        Command::UserTracks {
            permalink,
            args: query,
        } => {
            let user = gateway.user(&permalink).await?;
            let page = gateway.user_tracks(&user, &query).await?;
            print_all(args.json, &page.collection)
        }
        Command::Search {
            kind,
            query,
            limit,
            pages,
        } => {
            let search = format!(
                "?q={}&limit={limit}",
                url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>()
            );
            match kind {
                SearchKind::Tracks => {
                    let first = gateway.search_tracks(&search).await?;
                    print_all(args.json, &collect_pages(&gateway, first, pages).await?)
                }
                SearchKind::Users => {
                    let first = gateway.search_users(&search).await?;
                    print_all(args.json, &collect_pages(&gateway, first, pages).await?)
                }
                SearchKind::Playlists => {
                    let first = gateway.search_playlists(&search).await?;
                    print_all(args.json, &collect_pages(&gateway, first, pages).await?)
                }
            }
        }
        Command::Stream {
            permalink,
            protocol,
        } => {
            let track = gateway.track(&permalink).await?;
            let url = match protocol {
                Some(protocol) => gateway.stream_url_for(&track, protocol.into()).await?,
                None => gateway.stream_url(&track).await?,
            };
            println!("{url}");
            Ok(())
        }
        Command::Missing { cursor } => {
            let (tracks, next) = gateway.next_missing_tracks(&cursor).await?;
            print_all(args.json, &tracks)?;
            if !next.is_empty() {
                info!("more tracks missing: {next}");
            }
            Ok(())
        }
    }
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the requested command.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();
    debug!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
