//! Process configuration gathered from the command line and the environment.

use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use clap::Parser;

use crate::cron_auth::CronSecret;

/// The environment variable holding the trigger credential.
pub const CRON_SECRET_VAR: &str = "CRON_SECRET";

/// The HTTP server for the wallet ledger's recurring transaction scheduler.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    pub db_path: PathBuf,

    /// The address to serve the API from.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,
}

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct Config {
    /// File path to the application SQLite database.
    pub db_path: PathBuf,
    /// The socket address to listen on.
    pub address: SocketAddr,
    /// The trigger credential, `None` if `CRON_SECRET` is unset or blank.
    pub cron_secret: Option<CronSecret>,
}

impl Config {
    /// Build the config from parsed command line `args` and the process environment.
    pub fn from_env_and_args(args: Args) -> Self {
        Self::from_lookup_and_args(|key| env::var(key).ok(), args)
    }

    fn from_lookup_and_args(lookup: impl Fn(&str) -> Option<String>, args: Args) -> Self {
        let cron_secret = lookup(CRON_SECRET_VAR)
            .as_deref()
            .and_then(CronSecret::new);

        Self {
            db_path: args.db_path,
            address: SocketAddr::new(args.host, args.port),
            cron_secret,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use clap::{CommandFactory, Parser};

    use crate::config::{Args, CRON_SECRET_VAR, Config};

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_to_localhost_3000() {
        let args = Args::parse_from(["server", "--db-path", "ledger.db"]);

        let config = Config::from_lookup_and_args(|_| None, args);

        assert_eq!(config.address, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.db_path.to_str(), Some("ledger.db"));
    }

    #[test]
    fn host_and_port_can_be_set() {
        let args = Args::parse_from([
            "server",
            "--db-path",
            "ledger.db",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
        ]);

        let config = Config::from_lookup_and_args(|_| None, args);

        assert_eq!(config.address, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn db_path_is_required() {
        assert!(Args::try_parse_from(["server"]).is_err());
    }

    #[test]
    fn reads_cron_secret_from_environment() {
        let args = Args::parse_from(["server", "--db-path", "ledger.db"]);

        let config = Config::from_lookup_and_args(
            |key| (key == CRON_SECRET_VAR).then(|| "hunter2".to_owned()),
            args,
        );

        let secret = config.cron_secret.expect("secret should be set");
        assert!(secret.verify("hunter2"));
    }

    #[test]
    fn blank_cron_secret_is_unset() {
        let args = Args::parse_from(["server", "--db-path", "ledger.db"]);

        let config = Config::from_lookup_and_args(|_| Some("  ".to_owned()), args);

        assert!(config.cron_secret.is_none());
    }
}
