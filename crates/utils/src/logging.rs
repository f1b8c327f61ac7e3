use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over the verbosity flag when set.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("services=debug,sard_wiki=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });

    // try_init so a second call (tests, embedding) is harmless
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
