use anyhow::Context as _;

/// The CDP client and its websocket layer are chatty at info level, and
/// their events say nothing about a capture's progress. RUST_LOG overrides
/// all of this.
const DEFAULT_DIRECTIVES: &str = "info,chromiumoxide=warn,hyper=warn,tungstenite=warn";

pub fn init() -> anyhow::Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(DEFAULT_DIRECTIVES)
            .context("build default log filter")?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("set global tracing subscriber: {err}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected() {
        // Whichever test in this process initialized the subscriber first
        // wins; every later init must fail rather than silently replace it.
        let _ = init();
        let second = init();
        assert!(second.is_err());
        assert!(
            second
                .unwrap_err()
                .to_string()
                .contains("tracing subscriber")
        );
    }

    #[test]
    fn default_directives_parse_as_a_filter() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_DIRECTIVES).is_ok());
    }
}
