use clap::Subcommand;

/// Offline catalog commands. None of them start a browser.
#[derive(Subcommand, Debug, Clone)]
pub enum CatalogCommands {
    /// Lists catalog descriptors with their artifact and preview status.
    List,
    /// Validates every descriptor and exits non-zero if any has errors.
    Check,
}
