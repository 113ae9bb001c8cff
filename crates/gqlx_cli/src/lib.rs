//! Command-line interface for gqlx.
//!
//! # Usage
//!
//! ```bash
//! # Run a query file against the demo schema
//! gqlx exec query.graphql --variables '{"id": "b1"}'
//!
//! # Read the query from stdin
//! echo '{ books { title } }' | gqlx exec -
//!
//! # Serve the demo schema over HTTP
//! gqlx serve --port 4000
//! ```

pub mod demo;

use clap::{Parser, Subcommand};
use colored::Colorize;
use gqlx_http::{GraphQLService, ServerConfig};
use gqlx_runtime::{parse_variables, PreparedQuery, Value};
use miette::{NamedSource, Report};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gqlx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a query file against the demo schema
    Exec {
        /// Query file, or `-` for stdin
        file: PathBuf,

        /// Operation to run when the document has several
        #[arg(short, long)]
        operation: Option<String>,

        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,

        /// Abort execution after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Serve the demo schema over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Path of the GraphQL endpoint
        #[arg(long, default_value = "/graphql")]
        path: String,

        /// Abort each request after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Do not serve the HTML query page
        #[arg(long)]
        no_playground: bool,
    },

    /// Print version information
    Version,
}

impl Cli {
    /// The log filter used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_filter(&self) -> &'static str {
        if self.verbose {
            "gqlx=debug"
        } else if self.quiet {
            "gqlx=warn"
        } else {
            "gqlx=info"
        }
    }
}

/// Runs the synchronous commands. `serve` is handled by [`serve`].
pub fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Exec {
            file,
            operation,
            variables,
            pretty,
            timeout_ms,
        } => exec(
            &file,
            operation.as_deref(),
            variables.as_deref(),
            pretty,
            timeout_ms,
        ),
        Commands::Serve { .. } => {
            // Handled in main.rs
            Ok(0)
        }
        Commands::Version => {
            println!("gqlx {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

fn read_source(file: &Path) -> std::io::Result<(String, String)> {
    if file.as_os_str() == "-" {
        let mut source = String::new();
        std::io::stdin().read_to_string(&mut source)?;
        return Ok(("<stdin>".to_string(), source));
    }
    let source = std::fs::read_to_string(file)?;
    Ok((file.display().to_string(), source))
}

fn exec(
    file: &Path,
    operation: Option<&str>,
    variables: Option<&str>,
    pretty: bool,
    timeout_ms: Option<u64>,
) -> Result<i32, Box<dyn std::error::Error>> {
    let (name, source) = read_source(file)?;
    let library = demo::library();
    let schema = demo::schema(&library)?;

    let query = match PreparedQuery::prepare(&schema, &source, operation.unwrap_or_default()) {
        Ok(query) => query,
        Err(err) => {
            let report = Report::new(err).with_source_code(NamedSource::new(name, source));
            eprintln!("{report:?}");
            return Ok(1);
        }
    };
    let variables = parse_variables(variables.unwrap_or_default())?;

    let mut ctx = demo::context(&library);
    if let Some(ms) = timeout_ms {
        ctx = ctx.with_timeout(Duration::from_millis(ms));
    }
    let listener = demo::listener(&ctx);
    let response = query.execute(&ctx, Value::Null, &variables, Some(&*listener));

    let json: serde_json::Value = serde_json::from_slice(&response)?;
    if pretty {
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", String::from_utf8_lossy(&response));
    }

    let errors = json
        .get("errors")
        .and_then(serde_json::Value::as_array)
        .map_or(0, Vec::len);
    if errors > 0 {
        eprintln!("{} {} error(s)", "Completed with".yellow().bold(), errors);
        return Ok(1);
    }
    Ok(0)
}

/// Serves the demo schema until the server fails.
pub async fn serve(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let Commands::Serve {
        port,
        host,
        path,
        timeout_ms,
        no_playground,
    } = cli.command
    else {
        return Ok(0);
    };

    let library = demo::library();
    let schema = demo::schema(&library)?;
    let mut service = GraphQLService::new(schema)
        .with_context(move || demo::context(&library))
        .with_listener(demo::listener)
        .with_playground(!no_playground);
    if let Some(ms) = timeout_ms {
        service = service.with_timeout(Duration::from_millis(ms));
    }

    let config = ServerConfig::new()
        .with_host(host.as_str())
        .with_port(port)
        .with_path(path.as_str());
    if !cli.quiet {
        println!(
            "{} http://{}:{}{}",
            "gqlx serving on".green().bold(),
            host,
            port,
            path
        );
    }
    gqlx_http::serve(Arc::new(service), config).await?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exec() {
        let cli = Cli::try_parse_from([
            "gqlx",
            "exec",
            "query.graphql",
            "--operation",
            "Books",
            "--variables",
            r#"{"id":"b1"}"#,
            "--pretty",
        ])
        .unwrap();
        let Commands::Exec {
            file,
            operation,
            variables,
            pretty,
            timeout_ms,
        } = cli.command
        else {
            panic!("expected exec");
        };
        assert_eq!(file, PathBuf::from("query.graphql"));
        assert_eq!(operation.as_deref(), Some("Books"));
        assert_eq!(variables.as_deref(), Some(r#"{"id":"b1"}"#));
        assert!(pretty);
        assert_eq!(timeout_ms, None);
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["gqlx", "-v", "serve"]).unwrap();
        assert_eq!(cli.default_filter(), "gqlx=debug");
        let Commands::Serve {
            port,
            host,
            path,
            no_playground,
            ..
        } = cli.command
        else {
            panic!("expected serve");
        };
        assert_eq!((port, host.as_str(), path.as_str()), (4000, "127.0.0.1", "/graphql"));
        assert!(!no_playground);
    }

    #[test]
    fn test_exec_reports_failures_with_exit_code() {
        let dir = std::env::temp_dir().join(format!("gqlx-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let ok = dir.join("ok.graphql");
        std::fs::write(&ok, "{ book(id: \"b2\") { title } }").unwrap();
        assert_eq!(exec(&ok, None, None, false, None).unwrap(), 0);

        let invalid = dir.join("invalid.graphql");
        std::fs::write(&invalid, "{ book(id: \"b2\") { subtitle } }").unwrap();
        assert_eq!(exec(&invalid, None, None, false, None).unwrap(), 1);

        let failing = dir.join("failing.graphql");
        std::fs::write(&failing, "mutation { recordView(id: \"nope\") }").unwrap();
        assert_eq!(exec(&failing, None, None, false, None).unwrap(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
