use ako_core::ConfigStore;

/// Write the default configuration unless one exists (or `force` is set).
pub fn run(store: &ConfigStore, force: bool) -> anyhow::Result<()> {
    if store.exists() && !force {
        println!(
            "{} already exists; pass --force to overwrite it.",
            store.path().display()
        );
        return Ok(());
    }

    let config = store.init()?;
    println!(
        "Wrote {} (ollama at {}, model {}).",
        store.path().display(),
        config.ollama.host,
        config.ollama.model
    );
    Ok(())
}
