use clap::Parser;
use std::path::PathBuf;

/// QDU: disk usage for paths on a storage cluster, answered by the cluster's
/// aggregate API and by du for everything else
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Paths to measure (default: current)
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Display sizes in 1024-byte blocks
    #[arg(short = 'k', long)]
    pub in_kibibytes: bool,

    /// Display only a total for each path
    #[arg(short = 's', long)]
    pub summarize: bool,

    /// Username for the cluster API
    #[arg(short = 'u', long, env = "QDU_USER", default_value = "admin")]
    pub user: String,

    /// Password for the cluster API
    #[arg(
        short = 'p',
        long,
        env = "QDU_PASSWORD",
        default_value = "admin",
        hide_env_values = true
    )]
    pub password: String,

    /// Port the cluster API listens on
    #[arg(short = 'P', long, env = "QDU_PORT", default_value_t = 8000)]
    pub port: u16,

    /// How long to wait for the API port to accept a connection, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    pub probe_timeout: u64,

    /// Give up on a single API request after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Directory entries requested per listing page
    #[arg(
        long,
        value_name = "N",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub page_size: u32,

    /// Verify the cluster's TLS certificate
    #[arg(long)]
    pub strict_tls: bool,

    /// More logging on stderr (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("qdu").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_only_file_argument() {
        let args = parse(&["foobar"]);
        assert_eq!(args.paths, vec![PathBuf::from("foobar")]);
        assert!(!args.in_kibibytes);
        assert_eq!(args.user, "admin");
        assert_eq!(args.password, "admin");
        assert_eq!(args.port, 8000);
    }

    #[test]
    fn test_defaults_to_current_directory() {
        let args = parse(&[]);
        assert_eq!(args.paths, vec![PathBuf::from(".")]);
        assert!(!args.summarize);
    }

    #[test]
    fn test_in_kibibytes_short_and_long() {
        assert!(parse(&["-k", "foobar"]).in_kibibytes);
        assert!(parse(&["--in-kibibytes", "foobar"]).in_kibibytes);
    }

    #[test]
    fn test_credentials_and_port() {
        let args = parse(&["-u", "my_user", "-p", "my_password", "-P", "8001", "foobar"]);
        assert_eq!(args.user, "my_user");
        assert_eq!(args.password, "my_password");
        assert_eq!(args.port, 8001);

        let args = parse(&["--user", "u2", "--password", "p2", "--port", "9000", "foobar"]);
        assert_eq!(args.user, "u2");
        assert_eq!(args.password, "p2");
        assert_eq!(args.port, 9000);
    }

    #[test]
    fn test_multiple_paths_keep_order() {
        let args = parse(&["-s", "b", "a", "c"]);
        assert!(args.summarize);
        assert_eq!(
            args.paths,
            vec![PathBuf::from("b"), PathBuf::from("a"), PathBuf::from("c")]
        );
    }

    #[test]
    fn test_bad_port_is_usage_error() {
        let result = Args::try_parse_from(["qdu", "-P", "notaport", "x"]);
        assert!(result.is_err());
        let result = Args::try_parse_from(["qdu", "--page-size", "0", "x"]);
        assert!(result.is_err());
    }
}
