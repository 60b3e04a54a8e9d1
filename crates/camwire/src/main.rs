mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "camwire",
    version,
    about = "Camera frame transfer over a serial link"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "CAMWIRE_LOG",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() { exit::USAGE } else { exit::SUCCESS };
            std::process::exit(code);
        }
    };
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "camwire",
            "serve",
            "/dev/ttyS1",
            "--source",
            "frames/",
            "--chunk-size",
            "256",
            "--once",
        ])
        .expect("serve args should parse");

        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.chunk_size, 256);
        assert_eq!(args.baud, 115_200);
        assert_eq!(args.chunk_delay, "5ms");
        assert!(args.once);
    }

    #[test]
    fn serve_requires_source() {
        let err = Cli::try_parse_from(["camwire", "serve", "/dev/ttyS1"])
            .expect_err("missing --source should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_receive_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "camwire",
            "receive",
            "/dev/ttyUSB0",
            "--out",
            "shot.jpg",
            "--header-timeout",
            "3s",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("receive args should parse");

        assert_eq!(cli.format, Some(OutputFormat::Json));
        assert_eq!(cli.log_level, LogLevel::Debug);
        let Command::Receive(args) = cli.command else {
            panic!("expected receive");
        };
        assert_eq!(args.header_timeout, "3s");
        assert_eq!(args.ack_timeout, "2s");
        assert_eq!(args.chunk_timeout, "5s");
    }

    #[test]
    fn rejects_chunk_size_out_of_range() {
        let err = Cli::try_parse_from([
            "camwire",
            "serve",
            "/dev/ttyS1",
            "--source",
            "a.jpg",
            "--chunk-size",
            "70000",
        ])
        .expect_err("chunk size above u16 should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
