use anyhow::Context;
use jirasync_core::config::{Config, ENV_API_TOKEN, ENV_BASE_URL, ENV_EMAIL};
use jirasync_core::{io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing jirasync in: {}", root.display());

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        Config::default()
            .save(root)
            .context("failed to write jirasync.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let example = root.join(paths::ENV_EXAMPLE_FILE);
    let content = format!(
        "{ENV_BASE_URL}=https://your-site.atlassian.net\n{ENV_EMAIL}=you@example.com\n{ENV_API_TOKEN}=\n"
    );
    if io::write_if_missing(&example, content.as_bytes())
        .with_context(|| format!("failed to write {}", example.display()))?
    {
        println!("  created: {}", paths::ENV_EXAMPLE_FILE);
    } else {
        println!("  exists:  {}", paths::ENV_EXAMPLE_FILE);
    }

    io::ensure_gitignore_entry(root, paths::ENV_FILE).context("failed to update .gitignore")?;
    println!("  ignored: {}", paths::ENV_FILE);

    println!("\nNext: copy {} to {} and fill in your API token.", paths::ENV_EXAMPLE_FILE, paths::ENV_FILE);
    Ok(())
}
