//! Log output for the `hookline` binary and for hosts embedding the pipelines.
//!
//! Pipeline events (`registry.committed`, `query.executed`, `submit.completed`
//! and friends) are written to stderr so the JSON a command prints on stdout
//! stays parseable. Without `RUST_LOG`, the chosen level applies to the
//! hookline crates and everything else is held at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives used when `RUST_LOG` is unset.
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,hookline_core={level},hookline={level}")
}

/// Install the global subscriber. Calls after the first one are no-ops.
///
/// `json` switches to newline-delimited JSON lines.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
