use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn default_directives(component: &str) -> String {
    format!("info,nanatech=debug,{component}=debug")
}

/// Installs the global subscriber. `NANATECH_LOG` wins over `RUST_LOG`.
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_tracing(component: &str) {
    let filter = std::env::var("NANATECH_LOG")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(component)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .try_init();
}
